//! This mod is meant to hold most of the code for the library's client-facing API.
mod client;
mod event_bus;
mod options;
mod replicated_log;
mod types;
mod wiring;

pub use client::BootstrapClusterError;
pub use client::RaftNode;
pub use client::SnapshotError;
pub use client::SnapshotInfo;
pub use event_bus::ElectionEvent;
pub use event_bus::ElectionObserver;
pub use event_bus::ElectionState;
pub use event_bus::Event;
pub use event_bus::EventListener;
pub use event_bus::FollowerEventData;
pub use options::RaftOptions;
pub use replicated_log::EnqueueEntryError;
pub use replicated_log::EnqueueEntryInput;
pub use replicated_log::EnqueueEntryOutput;
pub use replicated_log::ReplicatedLog;
pub use types::RaftEntryId;
pub use types::RaftLeaderInfo;
pub use types::RaftMemberInfo;
pub use wiring::try_create_raft_node;
pub use wiring::HttpOptions;
pub use wiring::RaftNetwork;
pub use wiring::RaftNodeConfig;
pub use wiring::RaftNodeCreationError;
