use crate::actor::WeakActorClient;
use crate::commitlog::Log;
use crate::replica::election::{ElectionConfig, ElectionState, ElectionStateChangeListener, LeadershipObserver};
use crate::replica::replica::ReplicaConfig;
use crate::replica::{ClusterTracker, Replica, StateMachine, Term, VolatileLocalState, WriteAheadLog, WriteAheadLogEntry};
use crate::server::ServerShutdownHandle;
use crate::snapshot::SnapshotStore;
use crate::transport::PeerTransport;
use std::io;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct ReplicaTimings {
    pub leader_heartbeat_duration: Duration,
    pub follower_min_timeout: Duration,
    pub follower_max_timeout: Duration,
    pub append_entries_timeout: Duration,
    pub max_entries_per_append: usize,
}

pub(crate) struct ReplicaParts<L> {
    pub commit_log: L,
    pub state_machine: Box<dyn StateMachine>,
    pub snapshot_store: Box<dyn SnapshotStore>,
    pub transport: Arc<dyn PeerTransport>,
    pub observers: Vec<Arc<dyn LeadershipObserver>>,
}

pub(crate) fn create_replica<L>(
    logger: slog::Logger,
    cluster_tracker: ClusterTracker,
    bootstrap_designated: bool,
    parts: ReplicaParts<L>,
    server_shutdown_handle: Option<ServerShutdownHandle>,
    actor_client: WeakActorClient,
    timings: ReplicaTimings,
) -> Result<(Replica<L>, ElectionStateChangeListener), io::Error>
where
    L: Log<WriteAheadLogEntry> + 'static,
{
    let my_replica_id = cluster_tracker.my_replica_id().clone();

    let write_ahead_log = WriteAheadLog::new(
        logger.clone(),
        parts.commit_log,
        parts.state_machine,
        parts.snapshot_store,
    )?;

    let (election_state, election_state_change_listener) = ElectionState::new_follower(
        ElectionConfig {
            my_replica_id: my_replica_id.clone(),
            leader_heartbeat_duration: timings.leader_heartbeat_duration,
            follower_min_timeout: timings.follower_min_timeout,
            follower_max_timeout: timings.follower_max_timeout,
        },
        actor_client.clone(),
        Term::new(0),
        parts.observers,
    );

    let local_state = Box::new(VolatileLocalState::new(my_replica_id));

    let replica = Replica::new(ReplicaConfig {
        logger,
        cluster_tracker,
        bootstrap_designated,
        local_state,
        election_state,
        write_ahead_log,
        transport: parts.transport,
        actor_client,
        append_entries_timeout: timings.append_entries_timeout,
        check_quorum_window: timings.follower_max_timeout,
        max_entries_per_append: timings.max_entries_per_append,
        server_shutdown_handle,
    });

    Ok((replica, election_state_change_listener))
}
