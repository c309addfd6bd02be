use crate::grpc::{ProtoClusterConfiguration, ProtoClusterMember};
use prost::Message;
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

/// ReplicaId is the unique identity of a cluster member.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ReplicaId(String);

impl ReplicaId {
    pub fn new(id: impl Into<String>) -> Self {
        ReplicaId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable info about one cluster member.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ReplicaMetadata {
    replica_id: ReplicaId,
    // Where peers send consensus RPCs.
    raft_addr: SocketAddr,
    // Where the request router forwards application traffic when this member is leader.
    app_addr: SocketAddr,
}

impl ReplicaMetadata {
    pub(crate) fn new(replica_id: ReplicaId, raft_addr: SocketAddr, app_addr: SocketAddr) -> Self {
        ReplicaMetadata {
            replica_id,
            raft_addr,
            app_addr,
        }
    }

    pub(crate) fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    pub(crate) fn raft_addr(&self) -> SocketAddr {
        self.raft_addr
    }

    pub(crate) fn app_addr(&self) -> SocketAddr {
        self.app_addr
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub(crate) enum ClusterConfigError {
    #[error("Cluster has no members")]
    Empty,
    #[error("Replica ID {0:?} appears more than once")]
    DuplicateReplicaId(ReplicaId),
    #[error("My replica ID {0:?} is not in the cluster")]
    MeNotInCluster(ReplicaId),
    #[error("Malformed cluster configuration: {0}")]
    Malformed(String),
}

/// ClusterTracker is the static cluster configuration, as seen from one member. It is fixed for
/// the lifetime of the process.
#[derive(Clone)]
pub(crate) struct ClusterTracker {
    my_replica_id: ReplicaId,
    // Ordered as given at startup.
    members: Vec<ReplicaMetadata>,
}

impl ClusterTracker {
    pub(crate) fn new(my_replica_id: ReplicaId, members: Vec<ReplicaMetadata>) -> Result<Self, ClusterConfigError> {
        if members.is_empty() {
            return Err(ClusterConfigError::Empty);
        }

        let mut seen = HashSet::with_capacity(members.len());
        for member in members.iter() {
            if !seen.insert(member.replica_id()) {
                return Err(ClusterConfigError::DuplicateReplicaId(member.replica_id().clone()));
            }
        }

        if !seen.contains(&my_replica_id) {
            return Err(ClusterConfigError::MeNotInCluster(my_replica_id));
        }

        Ok(ClusterTracker { my_replica_id, members })
    }

    pub(crate) fn my_replica_id(&self) -> &ReplicaId {
        &self.my_replica_id
    }

    pub(crate) fn contains_member(&self, replica_id: &ReplicaId) -> bool {
        self.metadata(replica_id).is_some()
    }

    pub(crate) fn metadata(&self, replica_id: &ReplicaId) -> Option<&ReplicaMetadata> {
        self.members.iter().find(|m| m.replica_id() == replica_id)
    }

    pub(crate) fn members(&self) -> &[ReplicaMetadata] {
        &self.members
    }

    pub(crate) fn num_voting_replicas(&self) -> usize {
        self.members.len()
    }

    pub(crate) fn majority(&self) -> usize {
        (self.num_voting_replicas() / 2) + 1
    }

    pub(crate) fn iter_peers(&self) -> impl Iterator<Item = &ReplicaMetadata> {
        let me = self.my_replica_id.clone();
        self.members.iter().filter(move |m| m.replica_id() != &me)
    }

    pub(crate) fn peer_ids(&self) -> HashSet<ReplicaId> {
        self.iter_peers().map(|m| m.replica_id().clone()).collect()
    }

    /// Serialized member list, as stored in the Configuration log entry.
    pub(crate) fn encode_configuration(&self) -> Vec<u8> {
        let proto = ProtoClusterConfiguration {
            members: self
                .members
                .iter()
                .map(|m| ProtoClusterMember {
                    replica_id: m.replica_id().as_str().to_string(),
                    raft_addr: m.raft_addr().to_string(),
                    app_addr: m.app_addr().to_string(),
                })
                .collect(),
        };

        let mut bytes = Vec::with_capacity(proto.encoded_len());
        proto
            .encode(&mut bytes)
            .expect("Vec has enough capacity for encoded configuration");
        bytes
    }

    pub(crate) fn decode_configuration(bytes: &[u8]) -> Result<Vec<ReplicaMetadata>, ClusterConfigError> {
        let proto =
            ProtoClusterConfiguration::decode(bytes).map_err(|e| ClusterConfigError::Malformed(e.to_string()))?;

        let mut members = Vec::with_capacity(proto.members.len());
        for member in proto.members {
            let raft_addr = parse_addr(&member.raft_addr)?;
            let app_addr = parse_addr(&member.app_addr)?;
            members.push(ReplicaMetadata::new(
                ReplicaId::new(member.replica_id),
                raft_addr,
                app_addr,
            ));
        }

        Ok(members)
    }
}

fn parse_addr(addr: &str) -> Result<SocketAddr, ClusterConfigError> {
    addr.parse()
        .map_err(|_| ClusterConfigError::Malformed(format!("Invalid address {:?}", addr)))
}
