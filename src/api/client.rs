use crate::actor::ActorClient;
use crate::api::event_bus::{ElectionEvent, EventListener};
use crate::api::replicated_log::ReplicatedLog;
use crate::commitlog::Index;
use crate::replica;
use crate::replica::Term;
use crate::router::{HttpServerHandle, ProxyTarget};
use std::io;
use std::net::SocketAddr;

/// RaftNode is the handle to one running cluster member. Dropping it shuts the member down: the
/// HTTP endpoints stop accepting connections, then the replica event loop and the consensus RPC
/// server exit.
pub struct RaftNode {
    pub(crate) replicated_log: ReplicatedLog,
    pub(crate) event_listener: EventListener,
    pub(crate) proxy_target: ProxyTarget,
    pub(crate) actor_client: ActorClient,
    pub(crate) router_server: Option<HttpServerHandle>,
    pub(crate) app_server: Option<HttpServerHandle>,
}

impl RaftNode {
    pub fn replicated_log(&self) -> &ReplicatedLog {
        &self.replicated_log
    }

    pub fn event_listener(&mut self) -> &mut EventListener {
        &mut self.event_listener
    }

    pub fn election_state(&self) -> ElectionEvent {
        self.event_listener.latest()
    }

    /// Where this member's request router currently forwards to.
    pub fn proxy_target(&self) -> &ProxyTarget {
        &self.proxy_target
    }

    /// Bound address of the request router, if HTTP is enabled.
    pub fn router_addr(&self) -> Option<SocketAddr> {
        self.router_server.as_ref().map(|s| s.local_addr())
    }

    /// Bound address of the application endpoint, if HTTP is enabled.
    pub fn app_addr(&self) -> Option<SocketAddr> {
        self.app_server.as_ref().map(|s| s.local_addr())
    }

    /// One-time cluster initialization. Only allowed on the member configured with
    /// `bootstrap = true`, and only while its log is empty.
    pub async fn bootstrap_cluster(&self) -> Result<(), BootstrapClusterError> {
        self.actor_client.bootstrap().await.map_err(|e| e.into())
    }

    /// Saves a copy of the state machine, as of the last applied entry, to the snapshot store.
    pub async fn take_snapshot(&self) -> Result<SnapshotInfo, SnapshotError> {
        self.actor_client
            .take_snapshot()
            .await
            .map(|o| SnapshotInfo {
                last_included_term: o.last_included_term,
                last_included_index: o.last_included_index,
            })
            .map_err(|e| e.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapClusterError {
    #[error("This member is not the designated bootstrap member")]
    NotDesignated,
    #[error("Log is not empty; the cluster was already bootstrapped")]
    LogNotEmpty,
    #[error("Failed to persist log")]
    LocalIoError(#[source] io::Error),
    #[error("Replica task has exited")]
    ReplicaExited,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotInfo {
    pub last_included_term: Term,
    pub last_included_index: Index,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Nothing has been applied to the state machine yet")]
    NothingApplied,
    #[error("Failed to save snapshot")]
    LocalIoError(#[source] io::Error),
    #[error("Replica task has exited")]
    ReplicaExited,
}

// ------- Conversions --------

impl From<replica::BootstrapError> for BootstrapClusterError {
    fn from(internal_error: replica::BootstrapError) -> Self {
        match internal_error {
            replica::BootstrapError::NotDesignated => BootstrapClusterError::NotDesignated,
            replica::BootstrapError::LogNotEmpty => BootstrapClusterError::LogNotEmpty,
            replica::BootstrapError::LocalIoError(e) => BootstrapClusterError::LocalIoError(e),
            replica::BootstrapError::ActorExited => BootstrapClusterError::ReplicaExited,
        }
    }
}

impl From<replica::TakeSnapshotError> for SnapshotError {
    fn from(internal_error: replica::TakeSnapshotError) -> Self {
        match internal_error {
            replica::TakeSnapshotError::NothingApplied => SnapshotError::NothingApplied,
            replica::TakeSnapshotError::LocalIoError(e) => SnapshotError::LocalIoError(e),
            replica::TakeSnapshotError::ActorExited => SnapshotError::ReplicaExited,
        }
    }
}
