/*!
Test harness for the snapshot pipeline

Wires a `ScriptedSource` to a real store, source health and view derivers,
and records every revision the store announces so tests can assert on
notification order.
*/

use crate::mock_source::ScriptedSource;
use anyhow::Result;
use parking_lot::Mutex;
use robofleet_core::sync::{acquire_once, spawn_poller};
use robofleet_core::{
    DerivationConfig, FleetSnapshot, FleetViews, PollSettings, SnapshotStore, SourceHealth,
    Subscription, SyncHandle, TableView, ViewState,
};
use std::sync::Arc;
use std::time::Duration;

pub struct TestHarness {
    pub source: ScriptedSource,
    pub views: FleetViews,
    pub health: SourceHealth,
    notifications: Arc<Mutex<Vec<u64>>>,
    _recorder: Subscription,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(DerivationConfig::default())
    }

    pub fn with_config(config: DerivationConfig) -> Self {
        env_logger::try_init().ok();

        let store = Arc::new(SnapshotStore::new());
        let notifications = Arc::new(Mutex::new(Vec::new()));
        let seen = notifications.clone();
        let recorder = store.subscribe(move |snapshot: &Arc<FleetSnapshot>| {
            seen.lock().push(snapshot.revision());
        });

        Self {
            source: ScriptedSource::new(),
            views: FleetViews::new(store, config),
            health: SourceHealth::new("scripted"),
            notifications,
            _recorder: recorder,
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        self.views.store()
    }

    /// One acquisition through the scripted source, as an initial load would do.
    pub async fn acquire(&self) -> Result<Arc<FleetSnapshot>, robofleet_core::FleetError> {
        acquire_once(&self.source, self.store(), &self.health, Duration::from_secs(5)).await
    }

    pub fn start_polling(&self, interval: Duration) -> SyncHandle {
        spawn_poller(
            self.source.clone(),
            self.store().clone(),
            self.health.clone(),
            PollSettings {
                interval,
                fetch_timeout: Duration::from_secs(5),
            },
        )
    }

    /// Polls until the store reaches `revision`; `false` on timeout.
    pub async fn wait_for_revision(&self, revision: u64, timeout_ms: u64) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if self.store().revision() >= revision {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        log::warn!("timeout waiting for revision {revision}");
        false
    }

    /// Revisions announced to subscribers, in delivery order.
    pub fn notifications(&self) -> Vec<u64> {
        self.notifications.lock().clone()
    }

    pub fn table(&self, state: &ViewState) -> TableView {
        self.views.table_view(state)
    }

    pub fn assert_table_ids(&self, state: &ViewState, expected: &[&str]) -> Result<()> {
        let view = self.table(state);
        let actual: Vec<&str> = view.robots().map(|r| r.id.as_str()).collect();
        if actual != expected {
            anyhow::bail!(
                "table page {} ({}): expected {:?}, got {:?}",
                view.page,
                view.filter,
                expected,
                actual
            );
        }
        Ok(())
    }

    pub fn get_stats(&self) -> HarnessStats {
        let status = self.health.status();
        HarnessStats {
            acquisitions: self.source.calls(),
            notifications: self.notifications.lock().len(),
            revision: self.store().revision(),
            rejected_payloads: status.rejected_payloads,
            failures: status.total_failures,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessStats {
    pub acquisitions: usize,
    pub notifications: usize,
    pub revision: u64,
    pub rejected_payloads: u64,
    pub failures: u64,
}
