//! Storage for compacted state machine state. The log is never compacted here, so a snapshot is
//! a point-in-time copy of the state machine and all recovery is by full log replay.

mod store;

pub use store::InMemorySnapshotStore;
pub use store::NoOpSnapshotStore;
pub use store::Snapshot;
pub use store::SnapshotStore;
