/**
 * SOURCE SYNC - drives snapshot acquisition into the store
 *
 * ROLE:
 * - poll mode : one task, fixed interval, one acquisition at a time
 * - push mode : one task draining a channel of feed events
 * - both : successes replace the store, failures only touch `SourceHealth`
 *
 * BACKPRESSURE:
 * Ticks missed while a fetch is still running are skipped, never queued.
 * Every fetch is bounded by `fetch_timeout`.
 *
 * SHUTDOWN:
 * `SyncHandle::stop` signals over a watch channel. An acquisition in flight
 * is dropped and its result never reaches the store.
 */

use crate::error::FleetError;
use crate::models::{FleetSnapshot, Timestamp};
use crate::source::{FeedEvent, SnapshotSource};
use crate::state::{new_state, Shared};
use crate::store::SnapshotStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    Connecting,
    Healthy,
    Unavailable,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub source: String,
    pub state: SourceState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub rejected_payloads: u64,
    pub last_success: Option<Timestamp>,
    pub last_revision: Option<u64>,
    pub last_error: Option<String>,
}

/// Acquisition bookkeeping shared between a sync driver and whoever reports on it.
#[derive(Clone)]
pub struct SourceHealth {
    status: Shared<SourceStatus>,
}

impl SourceHealth {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            status: new_state(SourceStatus {
                source: source.into(),
                state: SourceState::Connecting,
                consecutive_failures: 0,
                total_failures: 0,
                rejected_payloads: 0,
                last_success: None,
                last_revision: None,
                last_error: None,
            }),
        }
    }

    pub fn record_success(&self, revision: u64) {
        let mut status = self.status.lock();
        if status.consecutive_failures > 0 {
            info!(
                source = %status.source,
                after_failures = status.consecutive_failures,
                "snapshot source recovered"
            );
        }
        status.state = SourceState::Healthy;
        status.consecutive_failures = 0;
        status.last_success = Some(Timestamp::now());
        status.last_revision = Some(revision);
        status.last_error = None;
    }

    pub fn record_failure(&self, error: &FleetError) {
        let mut status = self.status.lock();
        status.state = SourceState::Unavailable;
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        status.total_failures += 1;
        status.last_error = Some(error.to_string());
    }

    /// A malformed payload: counted, but the source itself is still reachable.
    pub fn record_rejected(&self, error: &FleetError) {
        let mut status = self.status.lock();
        status.rejected_payloads += 1;
        status.last_error = Some(error.to_string());
    }

    pub fn mark_stopped(&self) {
        self.status.lock().state = SourceState::Stopped;
    }

    /// True once `stale_after` acquisitions in a row have failed.
    pub fn is_stale(&self, stale_after: u32) -> bool {
        self.status.lock().consecutive_failures >= stale_after.max(1)
    }

    pub fn status(&self) -> SourceStatus {
        self.status.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(4),
        }
    }
}

/// Installs a successful event, or records why there was nothing to install.
pub fn apply_event(
    event: FeedEvent,
    store: &SnapshotStore,
    health: &SourceHealth,
) -> Result<Arc<FleetSnapshot>, FleetError> {
    match event {
        Ok(snapshot) => {
            let installed = store.replace(snapshot);
            health.record_success(installed.revision());
            Ok(installed)
        }
        Err(e) if e.is_malformed() => {
            warn!(error = %e, "snapshot rejected, keeping previous state");
            health.record_rejected(&e);
            Err(e)
        }
        Err(e) => {
            warn!(error = %e, "snapshot source unavailable, keeping last good state");
            health.record_failure(&e);
            Err(e)
        }
    }
}

async fn acquire_bounded<S: SnapshotSource + ?Sized>(source: &S, fetch_timeout: Duration) -> FeedEvent {
    match timeout(fetch_timeout, source.acquire()).await {
        Ok(result) => result,
        Err(_) => Err(FleetError::unavailable(format!(
            "{} timed out after {}ms",
            source.name(),
            fetch_timeout.as_millis()
        ))),
    }
}

/// One acquisition outside any loop (initial load, manual refresh).
pub async fn acquire_once<S: SnapshotSource + ?Sized>(
    source: &S,
    store: &SnapshotStore,
    health: &SourceHealth,
    fetch_timeout: Duration,
) -> Result<Arc<FleetSnapshot>, FleetError> {
    let event = acquire_bounded(source, fetch_timeout).await;
    apply_event(event, store, health)
}

/// Running sync driver. Dropping it also stops the driver, but without waiting.
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    fn spawn<F>(body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> JoinHandle<()>,
    {
        let (shutdown, rx) = watch::channel(false);
        let task = body(rx);
        Self { shutdown, task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals shutdown and waits for the driver task to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync task ended abnormally");
        }
    }
}

/// Polls `source` every `settings.interval` until stopped.
pub fn spawn_poller<S>(
    source: S,
    store: Arc<SnapshotStore>,
    health: SourceHealth,
    settings: PollSettings,
) -> SyncHandle
where
    S: SnapshotSource + 'static,
{
    SyncHandle::spawn(move |mut shutdown| {
        tokio::spawn(async move {
            let mut ticker = interval(settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                source = source.name(),
                interval_ms = settings.interval.as_millis() as u64,
                "poller started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        debug!(source = source.name(), "shutdown during acquisition, result discarded");
                        break;
                    }
                    event = acquire_bounded(&source, settings.fetch_timeout) => {
                        let _ = apply_event(event, &store, &health);
                    }
                }
            }

            health.mark_stopped();
            info!(source = source.name(), "poller stopped");
        })
    })
}

/// Drains push-feed events into the store until stopped or the feed closes.
pub fn spawn_feed(
    mut feed: mpsc::Receiver<FeedEvent>,
    store: Arc<SnapshotStore>,
    health: SourceHealth,
) -> SyncHandle {
    SyncHandle::spawn(move |mut shutdown| {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    event = feed.recv() => match event {
                        Some(event) => {
                            let _ = apply_event(event, &store, &health);
                        }
                        None => {
                            info!("push feed closed");
                            break;
                        }
                    }
                }
            }

            health.mark_stopped();
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, RobotRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(id: &str) -> FleetSnapshot {
        FleetSnapshot::new(vec![RobotRecord {
            id: id.to_string(),
            online: true,
            battery_percent: 50.0,
            cpu_usage_percent: 5.0,
            ram_consumption_mb: 64.0,
            last_updated: Timestamp::now(),
            location: Some(GeoPoint::new(1.0, 2.0)),
        }])
        .unwrap()
    }

    struct Fixed(FeedEvent);

    #[async_trait]
    impl SnapshotSource for Fixed {
        async fn acquire(&self) -> Result<FleetSnapshot, FleetError> {
            self.0.clone()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct Slow {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Slow {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SnapshotSource for Slow {
        async fn acquire(&self) -> Result<FleetSnapshot, FleetError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(snapshot("slow"))
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_network_error_keeps_current_snapshot() {
        let store = SnapshotStore::new();
        let health = SourceHealth::new("test");
        let first = store.replace(snapshot("kept"));

        let source = Fixed(Err(FleetError::unavailable("connection refused")));
        let err = acquire_once(&source, &store, &health, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, FleetError::SourceUnavailable(_)));
        assert!(Arc::ptr_eq(&store.current().unwrap(), &first));
        let status = health.status();
        assert_eq!(status.state, SourceState::Unavailable);
        assert_eq!(status.consecutive_failures, 1);
        assert!(health.is_stale(1));
        assert!(!health.is_stale(3));
    }

    #[tokio::test]
    async fn test_malformed_payload_keeps_empty_state() {
        let store = SnapshotStore::new();
        let health = SourceHealth::new("test");
        let source = Fixed(Err(FleetError::malformed("expected a JSON array")));

        let err = acquire_once(&source, &store, &health, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(err.is_malformed());
        assert!(store.current().is_none());
        let status = health.status();
        assert_eq!(status.rejected_payloads, 1);
        assert_eq!(status.state, SourceState::Connecting);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let store = SnapshotStore::new();
        let health = SourceHealth::new("test");
        health.record_failure(&FleetError::unavailable("down"));
        health.record_failure(&FleetError::unavailable("down"));

        acquire_once(&Fixed(Ok(snapshot("a"))), &store, &health, Duration::from_secs(1))
            .await
            .unwrap();

        let status = health.status();
        assert_eq!(status.state, SourceState::Healthy);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.total_failures, 2);
        assert_eq!(status.last_revision, Some(1));
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_unavailable() {
        let store = SnapshotStore::new();
        let health = SourceHealth::new("test");
        let source = Slow::new(Duration::from_millis(300));

        let err = acquire_once(&source, &store, &health, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::SourceUnavailable(ref msg) if msg.contains("timed out")));
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_poller_never_overlaps() {
        let store = Arc::new(SnapshotStore::new());
        let health = SourceHealth::new("slow");
        let source = Slow::new(Duration::from_millis(40));

        let handle = spawn_poller(
            source.clone(),
            store.clone(),
            health.clone(),
            PollSettings {
                interval: Duration::from_millis(5),
                fetch_timeout: Duration::from_secs(1),
            },
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop().await;

        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(source.calls.load(Ordering::SeqCst) >= 2);
        assert!(store.revision() >= 1);
        assert_eq!(health.status().state, SourceState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_during_acquisition_discards_result() {
        let store = Arc::new(SnapshotStore::new());
        let health = SourceHealth::new("slow");
        let source = Slow::new(Duration::from_secs(30));

        let handle = spawn_poller(
            source.clone(),
            store.clone(),
            health.clone(),
            PollSettings {
                interval: Duration::from_millis(5),
                fetch_timeout: Duration::from_secs(60),
            },
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .expect("stop should not wait for the fetch");
        assert!(store.current().is_none());
        assert_eq!(health.status().state, SourceState::Stopped);
    }

    #[tokio::test]
    async fn test_feed_applies_events_until_closed() {
        let store = Arc::new(SnapshotStore::new());
        let health = SourceHealth::new("push");
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_feed(rx, store.clone(), health.clone());

        tx.send(Ok(snapshot("one"))).await.unwrap();
        tx.send(Err(FleetError::malformed("not an array"))).await.unwrap();
        tx.send(Ok(snapshot("two"))).await.unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(store.revision(), 2);
        assert!(store.current().unwrap().get("two").is_some());
        let status = health.status();
        assert_eq!(status.rejected_payloads, 1);
        assert_eq!(status.state, SourceState::Stopped);
        handle.stop().await;
    }
}
