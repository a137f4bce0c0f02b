/**
 * VIEWS - pure projections of the current snapshot
 *
 * ROLE:
 * - table : filter + pagination over the robot list
 * - map : markers for located robots + cached center
 * - aggregate : per-robot series and fleet summary for charts
 *
 * `FleetViews` bundles the derivers around a shared store. Each call
 * reads the current snapshot once, so a view never mixes two revisions.
 */

pub mod aggregate;
pub mod map;
pub mod table;

pub use aggregate::{derive_aggregate, AggregatePoint, AggregateView, FleetSummary};
pub use map::{marker_class, MapDeriver, MapView, Marker, MarkerClass};
pub use table::{
    derive_table, row_highlight, total_pages, RobotFilter, RowHighlight, TableRow, TableView,
    ViewState,
};

use crate::config::DerivationConfig;
use crate::models::RobotRecord;
use crate::state::{new_state, Shared};
use crate::store::{SnapshotStore, Subscription};
use std::sync::Arc;
use tracing::debug;

pub struct FleetViews {
    store: Arc<SnapshotStore>,
    config: DerivationConfig,
    map: MapDeriver,
}

impl FleetViews {
    pub fn new(store: Arc<SnapshotStore>, config: DerivationConfig) -> Self {
        Self {
            map: MapDeriver::new(config.fallback_center, config.low_battery_threshold),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn config(&self) -> &DerivationConfig {
        &self.config
    }

    pub fn table_view(&self, state: &ViewState) -> TableView {
        let snapshot = self.store.current();
        derive_table(snapshot.as_deref(), state, self.config.low_battery_threshold)
    }

    pub fn map_view(&self) -> MapView {
        let snapshot = self.store.current();
        self.map.derive(snapshot.as_deref())
    }

    pub fn aggregate_view(&self) -> AggregateView {
        let snapshot = self.store.current();
        derive_aggregate(snapshot.as_deref(), self.config.low_battery_threshold)
    }

    /// Single robot lookup in the current snapshot.
    pub fn robot(&self, id: &str) -> Option<RobotRecord> {
        self.store.current()?.get(id).cloned()
    }

    /// Opens a table session whose page is revalidated on every replacement.
    pub fn table_session(&self) -> TableSession {
        TableSession::attach(
            self.store.clone(),
            ViewState::new(self.config.page_size),
            self.config.low_battery_threshold,
        )
    }
}

/// A presenting surface's table state, kept valid across snapshot
/// replacements for as long as the session lives.
pub struct TableSession {
    store: Arc<SnapshotStore>,
    state: Shared<ViewState>,
    low_battery_threshold: f64,
    subscription: Subscription,
}

impl TableSession {
    pub fn attach(store: Arc<SnapshotStore>, state: ViewState, low_battery_threshold: f64) -> Self {
        let state = new_state(state);

        let watched = state.clone();
        let subscription = store.subscribe(move |snapshot| {
            let mut state = watched.lock();
            if state.revalidate(snapshot, low_battery_threshold) {
                debug!(
                    revision = snapshot.revision(),
                    filter = %state.filter(),
                    "table page no longer valid, back to page 1"
                );
            }
        });

        Self {
            store,
            state,
            low_battery_threshold,
            subscription,
        }
    }

    pub fn set_filter(&self, filter: RobotFilter) {
        self.state.lock().set_filter(filter);
    }

    /// Requests a page, pinned to the last page of the current snapshot.
    pub fn request_page(&self, page: usize) -> usize {
        let snapshot = self.store.current();
        let mut state = self.state.lock();
        state.request_page(page);
        state.clamp_to(snapshot.as_deref(), self.low_battery_threshold)
    }

    pub fn state(&self) -> ViewState {
        self.state.lock().clone()
    }

    pub fn view(&self) -> TableView {
        let snapshot = self.store.current();
        let state = self.state();
        derive_table(snapshot.as_deref(), &state, self.low_battery_threshold)
    }

    /// Stops tracking replacements; returns the final state.
    pub fn detach(self) -> ViewState {
        let state = self.state();
        self.subscription.cancel();
        state
    }
}
