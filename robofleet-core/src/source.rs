//! Snapshot acquisition seam.
//!
//! Pull transports implement [`SnapshotSource`] and are driven by
//! [`crate::sync::spawn_poller`]; push transports hand [`FeedEvent`]s to
//! [`crate::sync::spawn_feed`] through a channel.

use crate::error::FleetError;
use crate::models::FleetSnapshot;
use async_trait::async_trait;
use std::sync::Arc;

/// One complete robot collection, or the reason none could be obtained.
pub type FeedEvent = Result<FleetSnapshot, FleetError>;

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetches the full fleet state. Partial results are never returned:
    /// either every record decoded or the whole call fails.
    async fn acquire(&self) -> Result<FleetSnapshot, FleetError>;

    /// Label used in logs and health reports.
    fn name(&self) -> &str;
}

#[async_trait]
impl<S: SnapshotSource + ?Sized> SnapshotSource for Arc<S> {
    async fn acquire(&self) -> Result<FleetSnapshot, FleetError> {
        (**self).acquire().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
