mod actor;
mod api;
mod commitlog;
mod replica;
mod router;
mod server;
mod snapshot;
mod transport;
mod grpc {
    include!("../generated/raft.rs");
}

pub use api::try_create_raft_node;
pub use api::BootstrapClusterError;
pub use api::ElectionEvent as RaftElectionEvent;
pub use api::ElectionObserver as RaftElectionObserver;
pub use api::ElectionState as RaftElectionState;
pub use api::EnqueueEntryError;
pub use api::EnqueueEntryInput;
pub use api::EnqueueEntryOutput;
pub use api::Event as RaftEvent;
pub use api::EventListener as RaftEventListener;
pub use api::FollowerEventData as RaftFollowerEventData;
pub use api::HttpOptions;
pub use api::RaftEntryId;
pub use api::RaftLeaderInfo;
pub use api::RaftMemberInfo;
pub use api::RaftNetwork;
pub use api::RaftNode;
pub use api::RaftNodeConfig;
pub use api::RaftNodeCreationError;
pub use api::RaftOptions;
pub use api::ReplicatedLog as RaftReplicatedLog;
pub use api::SnapshotError;
pub use api::SnapshotInfo;
pub use commitlog::Index;
pub use replica::NoOpStateMachine;
pub use replica::StateMachine;
pub use replica::StateMachineOutput;
pub use replica::Term;
pub use router::ProxyTarget;
pub use router::RouterError;
pub use snapshot::InMemorySnapshotStore;
pub use snapshot::NoOpSnapshotStore;
pub use snapshot::Snapshot;
pub use snapshot::SnapshotStore;
pub use transport::LocalNetwork;

// Learning 1: `create::{root_mod}` should not have any code. Just `mod` and `pub use` statements.
// Learning 2: All `mod` statements, anywhere, should not be `pub`. Only export `pub` via individual
//             use statements.
//
// This keeps the `crate::{root_mod}` root_mod only responsible for exporting types to the rest of
// crate, and allows me to organize my root_mod impl however I want.
