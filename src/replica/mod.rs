mod election;
mod local_state;
mod peers;
mod replica;
mod replica_api;
mod replica_wiring;
mod state_machine;
mod write_ahead_log;

pub(crate) use election::ElectionStateChange;
pub(crate) use election::ElectionStateChangeListener;
pub(crate) use election::ElectionStateSnapshot;
pub(crate) use election::LeadershipObserver;
pub use local_state::Term;
pub(crate) use local_state::VolatileLocalState;
pub(crate) use peers::ClusterTracker;
pub use peers::ReplicaId;
pub(crate) use peers::ReplicaMetadata;
pub(crate) use replica::Replica;
pub(crate) use replica_api::*;
pub(crate) use replica_wiring::create_replica;
pub(crate) use replica_wiring::ReplicaParts;
pub(crate) use replica_wiring::ReplicaTimings;
pub use state_machine::NoOpStateMachine;
pub use state_machine::StateMachine;
pub use state_machine::StateMachineOutput;
pub(crate) use write_ahead_log::EntryKind;
pub(crate) use write_ahead_log::WriteAheadLog;
pub(crate) use write_ahead_log::WriteAheadLogEntry;

#[cfg(test)]
pub(crate) mod test_support {
    pub(crate) use super::peers::tests::{cluster, member};
}
