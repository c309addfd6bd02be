//! Outbound delivery of consensus RPCs to peers. Transports never retry; the replica's timers do.

mod local;
mod peer_client;
mod wire;

pub use local::LocalNetwork;
pub(crate) use peer_client::GrpcTransport;
pub(crate) use wire::append_entries_from_proto;
pub(crate) use wire::append_entries_output_to_proto;
pub(crate) use wire::request_vote_from_proto;
pub(crate) use wire::request_vote_output_to_proto;
pub(crate) use wire::MalformedMessage;

use crate::replica::{AppendEntriesInput, AppendEntriesOutput, ReplicaId, RequestVoteInput, RequestVoteOutput};

#[derive(Debug, thiserror::Error)]
pub(crate) enum TransportError {
    #[error("RPC timed out")]
    Timeout,
    #[error("Peer unavailable: {0}")]
    Unavailable(String),
    #[error("Peer {0:?} is not a known cluster member")]
    PeerNotFound(ReplicaId),
    #[error("Peer replica has exited")]
    Disconnected,
    #[error("Malformed reply: {0}")]
    Malformed(String),
}

impl From<MalformedMessage> for TransportError {
    fn from(e: MalformedMessage) -> Self {
        TransportError::Malformed(e.0)
    }
}

/// PeerTransport is the client half of the transport. One instance is shared by all the
/// in-flight RPC tasks a replica spawns, so it must be usable concurrently.
#[async_trait::async_trait]
pub(crate) trait PeerTransport: Send + Sync {
    async fn request_vote(
        &self,
        peer_id: &ReplicaId,
        input: RequestVoteInput,
    ) -> Result<RequestVoteOutput, TransportError>;

    async fn append_entries(
        &self,
        peer_id: &ReplicaId,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, TransportError>;
}
