use crate::commitlog::Log;
use crate::replica::{
    ActorExitedError, AppendEntriesError, AppendEntriesInput, AppendEntriesOutput, AppendEntriesReplyFromPeer,
    BootstrapError, ElectionTimeoutTick, EnqueueForReplicationError, EnqueueForReplicationInput,
    EnqueueForReplicationOutput, HeartbeatTick, Replica, RequestVoteInput, RequestVoteOutput,
    RequestVoteReplyFromPeer, TakeSnapshotError, TakeSnapshotOutput, WriteAheadLogEntry,
};
use std::fmt;
use tokio::sync::{mpsc, oneshot};

// Design choice: Disk interaction is synchronous inside the event loop. Every mutation of
// role/term/log/commit index happens in `handle_event()`, one event at a time.
#[derive(Debug)]
pub(crate) enum Event {
    // Leader: Append to log, replicate, reply once applied.
    // Candidate: Reject request.
    // Follower: Redirect.
    EnqueueForReplication(
        EnqueueForReplicationInput,
        Callback<Result<EnqueueForReplicationOutput, EnqueueForReplicationError>>,
    ),

    // One-time cluster initialization on the designated replica.
    Bootstrap(Callback<Result<(), BootstrapError>>),

    // Copy applied state machine state into the snapshot store.
    TakeSnapshot(Callback<Result<TakeSnapshotOutput, TakeSnapshotError>>),

    // RPC from a peer, delivered by the transport's server side.
    InboundRpc(InboundRpc),

    // Candidate: Update local state. Transition to leader if quorum vote.
    // Leader/Follower: discard unless it reveals a newer term.
    RequestVoteReplyFromPeer(RequestVoteReplyFromPeer),

    // Leader: Update peer replication progress, advance commit index.
    // Candidate/Follower: discard unless it reveals a newer term.
    AppendEntriesReplyFromPeer(AppendEntriesReplyFromPeer),

    // Leader: Send AppendEntries to one peer.
    HeartbeatTimer(HeartbeatTick),

    // Follower/Candidate: Start a new election.
    ElectionTimeout(ElectionTimeoutTick),
}

/// InboundRpc is the tagged union of consensus RPCs. All kinds go through the same event queue.
#[derive(Debug)]
pub(crate) enum InboundRpc {
    RequestVote(RequestVoteInput, Callback<RequestVoteOutput>),
    AppendEntries(
        AppendEntriesInput,
        Callback<Result<AppendEntriesOutput, AppendEntriesError>>,
    ),
}

pub(crate) struct Callback<T>(pub(crate) oneshot::Sender<T>);

impl<T> Callback<T> {
    pub(crate) fn send(self, message: T) {
        // Caller may have given up waiting. That's fine.
        let _ = self.0.send(message);
    }
}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback")
    }
}

/// ActorClient is the strong handle to the replica event loop. The loop runs until every
/// ActorClient is dropped.
#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

/// WeakActorClient does not keep the event loop alive. Used by timers, transports, and the RPC
/// server, so that dropping the user facing handle shuts the replica down.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

impl ActorClient {
    pub(crate) fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (ActorClient { sender: tx }, rx)
    }

    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    pub(crate) async fn enqueue_for_replication(
        &self,
        input: EnqueueForReplicationInput,
    ) -> Result<EnqueueForReplicationOutput, EnqueueForReplicationError> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(Event::EnqueueForReplication(input, Callback(tx)))
            .await
            .is_err()
        {
            return Err(EnqueueForReplicationError::ActorExited);
        }

        rx.await.unwrap_or(Err(EnqueueForReplicationError::ActorExited))
    }

    pub(crate) async fn bootstrap(&self) -> Result<(), BootstrapError> {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Event::Bootstrap(Callback(tx))).await.is_err() {
            return Err(BootstrapError::ActorExited);
        }

        rx.await.unwrap_or(Err(BootstrapError::ActorExited))
    }

    pub(crate) async fn take_snapshot(&self) -> Result<TakeSnapshotOutput, TakeSnapshotError> {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Event::TakeSnapshot(Callback(tx))).await.is_err() {
            return Err(TakeSnapshotError::ActorExited);
        }

        rx.await.unwrap_or(Err(TakeSnapshotError::ActorExited))
    }
}

impl WeakActorClient {
    pub(crate) async fn request_vote(&self, input: RequestVoteInput) -> Result<RequestVoteOutput, ActorExitedError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::InboundRpc(InboundRpc::RequestVote(input, Callback(tx))))
            .await?;

        rx.await.map_err(|_| ActorExitedError)
    }

    pub(crate) async fn append_entries(
        &self,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, AppendEntriesError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::InboundRpc(InboundRpc::AppendEntries(input, Callback(tx))))
            .await
            .map_err(|_| AppendEntriesError::ActorExited)?;

        rx.await.unwrap_or(Err(AppendEntriesError::ActorExited))
    }

    pub(crate) async fn notify_request_vote_reply_from_peer(
        &self,
        reply: RequestVoteReplyFromPeer,
    ) -> Result<(), ActorExitedError> {
        self.send(Event::RequestVoteReplyFromPeer(reply)).await
    }

    pub(crate) async fn notify_append_entries_reply_from_peer(
        &self,
        reply: AppendEntriesReplyFromPeer,
    ) -> Result<(), ActorExitedError> {
        self.send(Event::AppendEntriesReplyFromPeer(reply)).await
    }

    pub(crate) async fn heartbeat_timer(&self, tick: HeartbeatTick) -> Result<(), ActorExitedError> {
        self.send(Event::HeartbeatTimer(tick)).await
    }

    pub(crate) async fn election_timeout(&self, tick: ElectionTimeoutTick) -> Result<(), ActorExitedError> {
        self.send(Event::ElectionTimeout(tick)).await
    }

    async fn send(&self, event: Event) -> Result<(), ActorExitedError> {
        let sender = self.sender.upgrade().ok_or(ActorExitedError)?;
        sender.send(event).await.map_err(|_| ActorExitedError)
    }
}

/// ReplicaActor is replica logic in actor model.
pub(crate) struct ReplicaActor<L>
where
    L: Log<WriteAheadLogEntry>,
{
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    replica: Replica<L>,
}

impl<L> ReplicaActor<L>
where
    L: Log<WriteAheadLogEntry> + 'static,
{
    pub(crate) fn new(logger: slog::Logger, receiver: mpsc::Receiver<Event>, replica: Replica<L>) -> Self {
        ReplicaActor {
            logger,
            receiver,
            replica,
        }
    }

    pub(crate) async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            self.handle_event(event);

            if let Some(e) = self.replica.fatal_error() {
                slog::crit!(
                    self.logger,
                    "Replica can no longer guarantee log durability/ordering. Stopping. Cause: {:?}",
                    e
                );
                break;
            }
        }

        slog::info!(self.logger, "Replica event loop has exited.");
    }

    // This must NOT be async. Any long running work must be spawned on another task
    // and come back as an event to this actor.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::EnqueueForReplication(input, callback) => {
                self.replica.handle_enqueue_for_replication(input, callback);
            }
            Event::Bootstrap(callback) => {
                callback.send(self.replica.handle_bootstrap());
            }
            Event::TakeSnapshot(callback) => {
                callback.send(self.replica.handle_take_snapshot());
            }
            Event::InboundRpc(InboundRpc::RequestVote(input, callback)) => {
                callback.send(self.replica.server_handle_request_vote(input));
            }
            Event::InboundRpc(InboundRpc::AppendEntries(input, callback)) => {
                callback.send(self.replica.server_handle_append_entries(input));
            }
            Event::RequestVoteReplyFromPeer(reply) => {
                self.replica.handle_request_vote_reply_from_peer(reply);
            }
            Event::AppendEntriesReplyFromPeer(reply) => {
                self.replica.handle_append_entries_reply_from_peer(reply);
            }
            Event::HeartbeatTimer(tick) => {
                self.replica.handle_heartbeat_timer(tick);
            }
            Event::ElectionTimeout(tick) => {
                self.replica.handle_election_timeout(tick);
            }
        }
    }
}
