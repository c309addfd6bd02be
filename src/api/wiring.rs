use crate::actor::{ActorClient, ReplicaActor};
use crate::api::client::{BootstrapClusterError, RaftNode};
use crate::api::event_bus::{ElectionObserver, ElectionObserverAdapter, EventListener};
use crate::api::options::{RaftOptions, RaftOptionsValidated};
use crate::api::replicated_log::ReplicatedLog;
use crate::api::types::RaftMemberInfo;
use crate::commitlog::{CachedLog, InMemoryLog};
use crate::replica::{
    ClusterTracker, LeadershipObserver, NoOpStateMachine, ReplicaId, ReplicaMetadata, ReplicaParts, ReplicaTimings,
    StateMachine, WriteAheadLogEntry,
};
use crate::router::{serve_http, ApplicationServer, LeaderTracker, ProxyTarget, RequestRouter, RouterError};
use crate::server::RpcServer;
use crate::snapshot::{NoOpSnapshotStore, SnapshotStore};
use crate::transport::{GrpcTransport, LocalNetwork, PeerTransport};
use crate::{replica, server};
use std::convert::TryFrom;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

// Decoded entries kept in memory in front of the commit log.
const LOG_CACHE_CAPACITY: usize = 512;

pub struct RaftNodeConfig {
    pub my_replica_id: String,
    pub cluster_members: Vec<RaftMemberInfo>,
    /// Exactly one member of a new cluster sets this. That member bootstraps the cluster during
    /// creation.
    pub bootstrap: bool,
    pub logger: slog::Logger,
    pub options: RaftOptions,
    pub state_machine: Box<dyn StateMachine>,
    pub snapshot_store: Box<dyn SnapshotStore>,
    pub network: RaftNetwork,
    /// Serve the request router and application endpoint. Without this, the node only takes part
    /// in consensus.
    pub http: Option<HttpOptions>,
    pub election_observers: Vec<Arc<dyn ElectionObserver>>,
}

impl RaftNodeConfig {
    /// A non-bootstrapping gRPC member with default options, a no-op state machine and no
    /// snapshots.
    pub fn new(my_replica_id: impl Into<String>, cluster_members: Vec<RaftMemberInfo>, logger: slog::Logger) -> Self {
        RaftNodeConfig {
            my_replica_id: my_replica_id.into(),
            cluster_members,
            bootstrap: false,
            logger,
            options: RaftOptions::default(),
            state_machine: Box::new(NoOpStateMachine::new()),
            snapshot_store: Box::new(NoOpSnapshotStore),
            network: RaftNetwork::Grpc,
            http: None,
            election_observers: Vec::new(),
        }
    }
}

pub enum RaftNetwork {
    /// Peers are reached over gRPC at their `raft_addr`, and this node serves gRPC at its own.
    Grpc,
    /// Peers live in this process. Nothing is bound for consensus traffic.
    InProcess(LocalNetwork),
}

#[derive(Clone, Copy, Debug)]
pub struct HttpOptions {
    /// Where clients send application requests. The application endpoint itself listens on this
    /// member's `app_addr`.
    pub router_addr: SocketAddr,
}

#[derive(Debug, thiserror::Error)]
pub enum RaftNodeCreationError {
    #[error("Invalid cluster info: {0}")]
    InvalidClusterInfo(String),
    #[error("Illegal options for configuring node: {0}")]
    IllegalOptions(String),
    #[error("Failed to set up peer transport: {0}")]
    Transport(String),
    #[error("Log initialization failure")]
    LogInitialization(#[source] io::Error),
    #[error("Failed to start HTTP endpoint")]
    Router(#[source] RouterError),
    #[error("Failed to bootstrap cluster")]
    Bootstrap(#[source] BootstrapClusterError),
}

pub async fn try_create_raft_node(config: RaftNodeConfig) -> Result<RaftNode, RaftNodeCreationError> {
    let root_logger = config
        .logger
        .new(slog::o!("Replica" => config.my_replica_id.clone()));

    let options = RaftOptionsValidated::try_from(config.options)
        .map_err(|e| RaftNodeCreationError::IllegalOptions(e.to_string()))?;

    let my_replica_id = ReplicaId::new(config.my_replica_id);
    let cluster_members = config.cluster_members.into_iter().map(ReplicaMetadata::from).collect();
    let cluster_tracker = ClusterTracker::new(my_replica_id.clone(), cluster_members)
        .map_err(|e| RaftNodeCreationError::InvalidClusterInfo(e.to_string()))?;
    let my_metadata = cluster_tracker
        .metadata(&my_replica_id)
        .cloned()
        .ok_or_else(|| RaftNodeCreationError::InvalidClusterInfo("My replica ID not in cluster config".into()))?;

    let (actor_client, actor_queue_rx) = ActorClient::new(10);

    let proxy_target = ProxyTarget::new();
    let mut observers: Vec<Arc<dyn LeadershipObserver>> = vec![Arc::new(LeaderTracker::new(
        root_logger.new(slog::o!("Component" => "LeaderTracker")),
        cluster_tracker.clone(),
        my_metadata.app_addr(),
        proxy_target.clone(),
    ))];
    for observer in config.election_observers {
        observers.push(Arc::new(ElectionObserverAdapter(observer)));
    }

    let (transport, server_shutdown_handle, server_shutdown_signal) = match &config.network {
        RaftNetwork::Grpc => {
            let transport: Arc<dyn PeerTransport> = Arc::new(
                GrpcTransport::new(
                    root_logger.new(slog::o!("Component" => "GrpcTransport")),
                    &cluster_tracker,
                    options.max_pool,
                    options.rpc_timeout,
                )
                .map_err(|e| RaftNodeCreationError::Transport(e.to_string()))?,
            );
            let (handle, signal) = server::shutdown_signal();
            (transport, Some(handle), Some(signal))
        }
        RaftNetwork::InProcess(network) => {
            let transport: Arc<dyn PeerTransport> = Arc::new(network.transport_for(my_replica_id.clone()));
            (transport, None, None)
        }
    };

    let commit_log: CachedLog<WriteAheadLogEntry, InMemoryLog<WriteAheadLogEntry>> =
        CachedLog::new(InMemoryLog::create(), LOG_CACHE_CAPACITY);
    let (replica, election_state_change_listener) = replica::create_replica(
        root_logger.clone(),
        cluster_tracker,
        config.bootstrap,
        ReplicaParts {
            commit_log,
            state_machine: config.state_machine,
            snapshot_store: config.snapshot_store,
            transport,
            observers,
        },
        server_shutdown_handle,
        actor_client.weak(),
        ReplicaTimings {
            leader_heartbeat_duration: options.leader_heartbeat_duration,
            follower_min_timeout: options.follower_min_timeout,
            follower_max_timeout: options.follower_max_timeout,
            append_entries_timeout: options.leader_append_entries_timeout,
            max_entries_per_append: options.max_entries_per_append,
        },
    )
    .map_err(RaftNodeCreationError::LogInitialization)?;

    let replicated_log = ReplicatedLog::new(actor_client.clone());

    // Bind before the replica starts, so a taken port fails creation cleanly.
    let (router_server, app_server) = match config.http {
        Some(http) => {
            let router_server = serve_http(
                root_logger.new(slog::o!("Component" => "RequestRouter")),
                http.router_addr,
                RequestRouter::new(
                    root_logger.new(slog::o!("Component" => "RequestRouter")),
                    proxy_target.clone(),
                ),
            )
            .map_err(RaftNodeCreationError::Router)?;
            let app_server = serve_http(
                root_logger.new(slog::o!("Component" => "ApplicationServer")),
                my_metadata.app_addr(),
                ApplicationServer::new(
                    root_logger.new(slog::o!("Component" => "ApplicationServer")),
                    replicated_log.clone(),
                ),
            )
            .map_err(RaftNodeCreationError::Router)?;
            (Some(router_server), Some(app_server))
        }
        None => (None, None),
    };

    let replica_actor = ReplicaActor::new(root_logger.clone(), actor_queue_rx, replica);
    tokio::spawn(replica_actor.run_event_loop());

    if let Some(server_shutdown_signal) = server_shutdown_signal {
        let replica_raft_server = RpcServer::new(root_logger.clone(), actor_client.weak());
        tokio::spawn(replica_raft_server.run(my_metadata.raft_addr(), server_shutdown_signal));
    }
    if let RaftNetwork::InProcess(network) = &config.network {
        network.register(my_replica_id, actor_client.weak());
    }

    let node = RaftNode {
        replicated_log,
        event_listener: EventListener::new(election_state_change_listener),
        proxy_target,
        actor_client,
        router_server,
        app_server,
    };

    if config.bootstrap {
        node.bootstrap_cluster()
            .await
            .map_err(RaftNodeCreationError::Bootstrap)?;
    }

    Ok(node)
}
