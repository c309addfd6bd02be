use crate::commitlog::Index;
use crate::replica::local_state::Term;
use crate::replica::peers::ReplicaId;
use crate::replica::state_machine::StateMachineOutput;
use crate::replica::write_ahead_log::EntryKind;
use crate::transport::TransportError;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;

#[derive(Debug)]
pub(crate) struct EnqueueForReplicationInput {
    pub(crate) data: Bytes,
}

/// Sent once the enqueued entry is committed and applied to the local state machine.
#[derive(Debug)]
pub(crate) struct EnqueueForReplicationOutput {
    pub(crate) enqueued_term: Term,
    pub(crate) enqueued_index: Index,
    pub(crate) state_machine_output: StateMachineOutput,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum EnqueueForReplicationError {
    #[error("I'm not leader")]
    LeaderRedirect(LeaderRedirectInfo),

    // Can be retried with exponential backoff. Likely an election is in progress.
    #[error("Cluster is in a tough shape. No one is leader.")]
    NoLeader,

    // Entry may or may not eventually commit under the next leader.
    #[error("Lost leadership before entry was committed")]
    LeadershipLost,

    #[error("Failed to persist log")]
    LocalIoError(io::Error),

    #[error("Replica actor is dead RIP")]
    ActorExited,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LeaderRedirectInfo {
    pub(crate) replica_id: ReplicaId,
    pub(crate) raft_addr: SocketAddr,
    pub(crate) app_addr: SocketAddr,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum BootstrapError {
    #[error("Only the designated bootstrap replica may bootstrap the cluster")]
    NotDesignated,
    #[error("Log is not empty; bootstrap is strictly one-time")]
    LogNotEmpty,
    #[error("Failed to persist configuration entry")]
    LocalIoError(io::Error),
    #[error("Replica actor is dead RIP")]
    ActorExited,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum TakeSnapshotError {
    #[error("Nothing has been applied to the state machine yet")]
    NothingApplied,
    #[error("Snapshot store failure")]
    LocalIoError(io::Error),
    #[error("Replica actor is dead RIP")]
    ActorExited,
}

#[derive(Debug)]
pub(crate) struct TakeSnapshotOutput {
    pub(crate) last_included_term: Term,
    pub(crate) last_included_index: Index,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequestVoteInput {
    pub(crate) candidate_term: Term,
    pub(crate) candidate_id: ReplicaId,
    pub(crate) candidate_last_log_entry: Option<(Term, Index)>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequestVoteOutput {
    // Receiver's current term, after handling the request.
    pub(crate) term: Term,
    pub(crate) vote_granted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AppendEntriesInput {
    pub(crate) leader_term: Term,
    pub(crate) leader_id: ReplicaId,
    // "Previous log entry" is the log entry immediately preceding the new ones.
    pub(crate) leader_previous_log_entry: Option<(Term, Index)>,
    pub(crate) leader_commit_index: Option<Index>,
    pub(crate) new_entries: Vec<AppendEntriesLogEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AppendEntriesLogEntry {
    pub(crate) term: Term,
    pub(crate) kind: EntryKind,
    pub(crate) data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AppendEntriesOutput {
    pub(crate) term: Term,
    pub(crate) success: bool,
    pub(crate) last_log_index: Option<Index>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum AppendEntriesError {
    #[error("We (server) had an IO failure: {0:?}")]
    ServerIoError(io::Error),
    #[error("We (server) are unavailable because actor is dead RIP")]
    ActorExited,
}

#[derive(Debug, thiserror::Error)]
#[error("We (server) are unavailable because actor is dead RIP")]
pub(crate) struct ActorExitedError;

#[derive(Debug)]
pub(crate) struct RequestVoteReplyFromPeer {
    pub(crate) peer_id: ReplicaId,
    pub(crate) term: Term,
    pub(crate) result: Result<RequestVoteOutput, TransportError>,
}

#[derive(Debug)]
pub(crate) struct AppendEntriesReplyFromPeer {
    pub(crate) descriptor: AppendEntriesReplyFromPeerDescriptor,
    pub(crate) result: Result<AppendEntriesOutput, TransportError>,
}

// This is basically info about the original request
#[derive(Debug)]
pub(crate) struct AppendEntriesReplyFromPeerDescriptor {
    pub(crate) peer_id: ReplicaId,
    pub(crate) term: Term,
    pub(crate) seq_no: u64,
    pub(crate) previous_log_entry_index: Option<Index>,
    pub(crate) num_log_entries: usize,
}

/// HeartbeatTick contains info for a single tick of a leader's per-peer timer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HeartbeatTick {
    pub(crate) peer_id: ReplicaId,
    pub(crate) term: Term,
}

/// ElectionTimeoutTick is fired by a follower/candidate timer armed during `term`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ElectionTimeoutTick {
    pub(crate) term: Term,
}
