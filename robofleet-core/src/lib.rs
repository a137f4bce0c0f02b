//! Robofleet core - fleet snapshot synchronisation and view derivation
//!
//! Pipeline: a [`SnapshotSource`] (poll) or push feed produces [`FleetSnapshot`]s,
//! the [`SnapshotStore`] installs them atomically and fans them out to
//! subscribers, and the derivers in [`views`] project the current snapshot into
//! the table, map and aggregate views consumed by presentation surfaces.

pub mod config;
pub mod error;
pub mod models;
pub mod source;
pub mod state;
pub mod store;
pub mod sync;
pub mod views;

pub use config::{DerivationConfig, DEFAULT_PAGE_SIZE, FALLBACK_CENTER, LOW_BATTERY_THRESHOLD};
pub use error::FleetError;
pub use models::{decode_snapshot, Degradation, FleetSnapshot, GeoPoint, RobotRecord, Timestamp};
pub use source::{FeedEvent, SnapshotSource};
pub use store::{SnapshotStore, Subscription};
pub use sync::{PollSettings, SourceHealth, SourceState, SourceStatus, SyncHandle};
pub use views::{
    AggregateView, FleetViews, MapView, Marker, MarkerClass, RobotFilter, TableSession, TableView,
    ViewState,
};
