use crate::config::SourceMode;
use parking_lot::Mutex;
use robofleet_core::{SnapshotStore, SourceHealth, SourceStatus};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct MonitorHealth {
    pub uptime_seconds: u64,
    pub started_at: String,
    pub memory_usage_mb: f32,
    pub mode: SourceMode,
    pub transport_status: String,
    pub transport_reconnects: u32,
    pub source: SourceStatus,
    /// Last good snapshot is still served but too many acquisitions failed since.
    pub stale: bool,
    pub snapshot_revision: u64,
    pub robots_tracked: usize,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    started_at: OffsetDateTime,
    mode: SourceMode,
    stale_after: u32,
    source: SourceHealth,
    transport_reconnects: Arc<AtomicU32>,
    transport_status: Arc<Mutex<String>>,
}

impl HealthTracker {
    pub fn new(mode: SourceMode, source: SourceHealth, stale_after: u32) -> Self {
        let initial = match mode {
            SourceMode::Poll => "polling",
            SourceMode::Push => "connecting",
        };
        Self {
            start_time: Instant::now(),
            started_at: OffsetDateTime::now_utc(),
            mode,
            stale_after,
            source,
            transport_reconnects: Arc::new(AtomicU32::new(0)),
            transport_status: Arc::new(Mutex::new(initial.to_string())),
        }
    }

    pub fn mark_transport_connected(&self) {
        *self.transport_status.lock() = "connected".to_string();
    }

    pub fn mark_transport_stopped(&self) {
        *self.transport_status.lock() = "stopped".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.transport_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.transport_status.lock() = "reconnecting".to_string();
    }

    pub fn is_stale(&self) -> bool {
        self.source.is_stale(self.stale_after)
    }

    pub fn get_health(&self, store: &SnapshotStore) -> MonitorHealth {
        let current = store.current();
        MonitorHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            started_at: self.started_at.format(&Rfc3339).unwrap_or_default(),
            memory_usage_mb: get_memory_usage_mb(),
            mode: self.mode,
            transport_status: self.transport_status.lock().clone(),
            transport_reconnects: self.transport_reconnects.load(Ordering::Relaxed),
            source: self.source.status(),
            stale: self.is_stale(),
            snapshot_revision: current.as_ref().map_or(0, |s| s.revision()),
            robots_tracked: current.as_ref().map_or(0, |s| s.len()),
        }
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }

    0.0
}
