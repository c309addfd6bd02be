use crate::actor::WeakActorClient;
use crate::replica::{AppendEntriesInput, AppendEntriesOutput, ReplicaId, RequestVoteInput, RequestVoteOutput};
use crate::transport::{PeerTransport, TransportError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// LocalNetwork connects replicas in the same process. RPCs are delivered straight into the
/// peer's event loop, subject to the partition rules configured here.
///
/// Links are checked when a request is sent. A request already delivered is answered even if the
/// link is cut afterwards.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    inner: Arc<RwLock<NetworkState>>,
}

#[derive(Default)]
struct NetworkState {
    nodes: HashMap<ReplicaId, WeakActorClient>,
    isolated: HashSet<ReplicaId>,
    // Empty means no partition. Otherwise, only members of the same group can talk. Nodes not
    // named in any group form one more group together.
    groups: Vec<HashSet<ReplicaId>>,
}

impl NetworkState {
    fn group_of(&self, id: &ReplicaId) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(id))
    }

    fn link_is_up(&self, from: &ReplicaId, to: &ReplicaId) -> bool {
        if self.isolated.contains(from) || self.isolated.contains(to) {
            return false;
        }
        self.groups.is_empty() || self.group_of(from) == self.group_of(to)
    }
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut every link to and from `replica_id`.
    pub fn isolate(&self, replica_id: &str) {
        self.write().isolated.insert(ReplicaId::new(replica_id));
    }

    /// Replace the current partition. Each group can only talk within itself.
    pub fn partition(&self, groups: &[&[&str]]) {
        let mut state = self.write();
        state.groups = groups
            .iter()
            .map(|group| group.iter().map(|id| ReplicaId::new(*id)).collect())
            .collect();
    }

    /// Restore every link, including isolated nodes.
    pub fn heal(&self) {
        let mut state = self.write();
        state.isolated.clear();
        state.groups.clear();
    }

    /// Forget a node, as if its process died. Requests to it fail as disconnected.
    pub fn remove(&self, replica_id: &str) {
        self.write().nodes.remove(&ReplicaId::new(replica_id));
    }

    pub(crate) fn register(&self, replica_id: ReplicaId, actor_client: WeakActorClient) {
        self.write().nodes.insert(replica_id, actor_client);
    }

    pub(crate) fn transport_for(&self, my_replica_id: ReplicaId) -> LocalTransport {
        LocalTransport {
            network: self.clone(),
            my_replica_id,
        }
    }

    fn route(&self, from: &ReplicaId, to: &ReplicaId) -> Result<WeakActorClient, TransportError> {
        let state = self
            .inner
            .read()
            .map_err(|_| TransportError::Unavailable("Local network lock poisoned".into()))?;

        if !state.link_is_up(from, to) {
            return Err(TransportError::Unavailable(format!("Link {} -> {} is down", from, to)));
        }

        state
            .nodes
            .get(to)
            .cloned()
            .ok_or(TransportError::Disconnected)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, NetworkState> {
        // Test-only controls; a poisoned lock means a test already panicked.
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// LocalTransport is one replica's view of the LocalNetwork.
pub(crate) struct LocalTransport {
    network: LocalNetwork,
    my_replica_id: ReplicaId,
}

#[async_trait::async_trait]
impl PeerTransport for LocalTransport {
    async fn request_vote(
        &self,
        peer_id: &ReplicaId,
        input: RequestVoteInput,
    ) -> Result<RequestVoteOutput, TransportError> {
        let peer = self.network.route(&self.my_replica_id, peer_id)?;
        peer.request_vote(input).await.map_err(|_| TransportError::Disconnected)
    }

    async fn append_entries(
        &self,
        peer_id: &ReplicaId,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, TransportError> {
        let peer = self.network.route(&self.my_replica_id, peer_id)?;
        peer.append_entries(input)
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_up(network: &LocalNetwork, from: &str, to: &str) -> bool {
        network
            .inner
            .read()
            .unwrap()
            .link_is_up(&ReplicaId::new(from), &ReplicaId::new(to))
    }

    #[test]
    fn partition_groups_only_talk_within() {
        let network = LocalNetwork::new();
        network.partition(&[&["a", "b"], &["c", "d", "e"]]);

        assert!(link_up(&network, "a", "b"));
        assert!(link_up(&network, "c", "e"));
        assert!(!link_up(&network, "a", "c"));
        assert!(!link_up(&network, "e", "b"));
        // Unnamed nodes share a group.
        assert!(link_up(&network, "x", "y"));
        assert!(!link_up(&network, "x", "a"));

        network.heal();
        assert!(link_up(&network, "a", "c"));
    }

    #[test]
    fn isolation_cuts_both_directions() {
        let network = LocalNetwork::new();
        network.isolate("a");
        assert!(!link_up(&network, "a", "b"));
        assert!(!link_up(&network, "b", "a"));
        assert!(link_up(&network, "b", "c"));

        network.heal();
        assert!(link_up(&network, "a", "b"));
    }

    #[tokio::test]
    async fn unknown_node_is_disconnected() {
        let network = LocalNetwork::new();
        let transport = network.transport_for(ReplicaId::new("a"));
        let result = transport
            .request_vote(
                &ReplicaId::new("b"),
                RequestVoteInput {
                    candidate_term: crate::replica::Term::new(1),
                    candidate_id: ReplicaId::new("a"),
                    candidate_last_log_entry: None,
                },
            )
            .await;
        assert!(matches!(result, Err(TransportError::Disconnected)));
    }
}
