/// Errors raised while acquiring or validating fleet snapshots.
///
/// None of these are fatal: the store keeps its last good snapshot and the
/// sync drivers retry on the next tick or reconnect.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FleetError {
    /// Payload failed shape validation; the whole snapshot is rejected.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
    /// Acquisition failed (network, timeout, broker).
    #[error("snapshot source unavailable: {0}")]
    SourceUnavailable(String),
}

impl FleetError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedSnapshot(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedSnapshot(_))
    }
}
