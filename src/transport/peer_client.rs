use crate::grpc::grpc_raft_client::GrpcRaftClient;
use crate::replica::{
    AppendEntriesInput, AppendEntriesOutput, ClusterTracker, ReplicaId, RequestVoteInput, RequestVoteOutput,
};
use crate::transport::{wire, PeerTransport, TransportError};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// GrpcTransport sends consensus RPCs over tonic. Each peer gets a fixed pool of channels, each
/// one its own HTTP/2 connection, so one slow call doesn't hold up the others.
pub(crate) struct GrpcTransport {
    logger: slog::Logger,
    peers: HashMap<ReplicaId, PeerChannelPool>,
    rpc_timeout: Duration,
}

struct PeerChannelPool {
    clients: Vec<GrpcRaftClient<Channel>>,
    next: AtomicUsize,
}

impl PeerChannelPool {
    fn new(addr: SocketAddr, max_pool: usize, rpc_timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = Endpoint::from_shared(format!("http://{}", addr))
            .map_err(|e| invalid_endpoint(addr, e))?
            .timeout(rpc_timeout);

        let mut clients = Vec::with_capacity(max_pool);
        for _ in 0..max_pool {
            // Lazy, so peers that are down at startup don't fail construction.
            let channel = endpoint.connect_lazy().map_err(|e| invalid_endpoint(addr, e))?;
            clients.push(GrpcRaftClient::new(channel));
        }

        Ok(PeerChannelPool {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    fn client(&self) -> GrpcRaftClient<Channel> {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        self.clients[i].clone()
    }
}

fn invalid_endpoint(addr: SocketAddr, e: impl fmt::Display) -> TransportError {
    TransportError::Unavailable(format!("Invalid endpoint {}: {}", addr, e))
}

impl GrpcTransport {
    pub(crate) fn new(
        logger: slog::Logger,
        cluster_tracker: &ClusterTracker,
        max_pool: usize,
        rpc_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut peers = HashMap::new();
        for peer in cluster_tracker.iter_peers() {
            let pool = PeerChannelPool::new(peer.raft_addr(), max_pool, rpc_timeout)?;
            peers.insert(peer.replica_id().clone(), pool);
        }

        Ok(GrpcTransport {
            logger,
            peers,
            rpc_timeout,
        })
    }

    fn client(&self, peer_id: &ReplicaId) -> Result<GrpcRaftClient<Channel>, TransportError> {
        self.peers
            .get(peer_id)
            .map(PeerChannelPool::client)
            .ok_or_else(|| TransportError::PeerNotFound(peer_id.clone()))
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<tonic::Response<T>, tonic::Status>>,
    {
        match tokio::time::timeout(self.rpc_timeout, call).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(TransportError::Unavailable(status.to_string())),
            Err(_elapsed) => Err(TransportError::Timeout),
        }
    }
}

#[async_trait::async_trait]
impl PeerTransport for GrpcTransport {
    async fn request_vote(
        &self,
        peer_id: &ReplicaId,
        input: RequestVoteInput,
    ) -> Result<RequestVoteOutput, TransportError> {
        let mut client = self.client(peer_id)?;
        let request = wire::request_vote_to_proto(input);

        slog::debug!(self.logger, "ClientWire - {:?}", request; "Peer" => %peer_id);
        let reply = self.bounded(client.request_vote(request)).await;
        slog::debug!(self.logger, "ClientWire - {:?}", reply; "Peer" => %peer_id);

        reply.map(wire::request_vote_output_from_proto)
    }

    async fn append_entries(
        &self,
        peer_id: &ReplicaId,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, TransportError> {
        let mut client = self.client(peer_id)?;
        let request = wire::append_entries_to_proto(input);

        slog::trace!(self.logger, "ClientWire - {:?}", request; "Peer" => %peer_id);
        let reply = self.bounded(client.append_entries(request)).await;
        slog::trace!(self.logger, "ClientWire - {:?}", reply; "Peer" => %peer_id);

        reply.map(wire::append_entries_output_from_proto)
    }
}
