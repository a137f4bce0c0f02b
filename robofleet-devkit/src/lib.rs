/*!
# Robofleet DevKit - test tooling for the snapshot pipeline

Helpers for exercising the store and derivers without a live fleet backend:
- fixture builders for robot records and wire payloads
- a scripted `SnapshotSource` replaying canned responses
- a harness wiring source, store, health and views together
*/

pub mod fixtures;
pub mod mock_source;
pub mod test_utils;

pub use fixtures::{fleet, wire_payload, RobotBuilder};
pub use mock_source::{ScriptStep, ScriptedSource};
pub use test_utils::TestHarness;
