use crate::commitlog::Index;
use crate::replica;
use crate::replica::Term;
use std::net::SocketAddr;

// Opaque type for application to match entries with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaftEntryId {
    pub(crate) term: Term,
    pub(crate) entry_index: Index,
}

impl RaftEntryId {
    pub fn term(&self) -> Term {
        self.term
    }

    pub fn index(&self) -> Index {
        self.entry_index
    }
}

#[derive(Clone, Debug)]
pub struct RaftMemberInfo {
    pub replica_id: String,
    /// Where peers reach this member's consensus RPC server.
    pub raft_addr: SocketAddr,
    /// Where routers forward application traffic while this member is leader.
    pub app_addr: SocketAddr,
}

impl From<RaftMemberInfo> for replica::ReplicaMetadata {
    fn from(member_info: RaftMemberInfo) -> Self {
        Self::new(
            replica::ReplicaId::new(member_info.replica_id),
            member_info.raft_addr,
            member_info.app_addr,
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RaftLeaderInfo {
    pub replica_id: String,
    pub raft_addr: SocketAddr,
    pub app_addr: SocketAddr,
}

impl From<replica::LeaderRedirectInfo> for RaftLeaderInfo {
    fn from(internal_leader: replica::LeaderRedirectInfo) -> Self {
        Self {
            replica_id: internal_leader.replica_id.into_inner(),
            raft_addr: internal_leader.raft_addr,
            app_addr: internal_leader.app_addr,
        }
    }
}
