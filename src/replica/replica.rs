use crate::actor::{Callback, WeakActorClient};
use crate::commitlog::{Index, Log};
use crate::replica::election::{CurrentLeader, ElectionState, PeerStateUpdate};
use crate::replica::local_state::{PersistentLocalState, Term};
use crate::replica::peers::{ClusterTracker, ReplicaId};
use crate::replica::replica_api::{
    AppendEntriesError, AppendEntriesInput, AppendEntriesLogEntry, AppendEntriesOutput, AppendEntriesReplyFromPeer,
    AppendEntriesReplyFromPeerDescriptor, BootstrapError, ElectionTimeoutTick, EnqueueForReplicationError,
    EnqueueForReplicationInput, EnqueueForReplicationOutput, HeartbeatTick, LeaderRedirectInfo, RequestVoteInput,
    RequestVoteOutput, RequestVoteReplyFromPeer, TakeSnapshotError, TakeSnapshotOutput,
};
use crate::replica::write_ahead_log::{EntryKind, WriteAheadLog, WriteAheadLogEntry};
use crate::server::ServerShutdownHandle;
use crate::transport::{PeerTransport, TransportError};
use std::sync::Arc;
use std::{cmp, io};
use tokio::time::Duration;

pub(crate) struct ReplicaConfig<L>
where
    L: Log<WriteAheadLogEntry>,
{
    pub logger: slog::Logger,
    pub cluster_tracker: ClusterTracker,
    pub bootstrap_designated: bool,
    pub local_state: Box<dyn PersistentLocalState>,
    pub election_state: ElectionState,
    pub write_ahead_log: WriteAheadLog<L>,
    pub transport: Arc<dyn PeerTransport>,
    pub actor_client: WeakActorClient,
    pub append_entries_timeout: Duration,
    pub check_quorum_window: Duration,
    pub max_entries_per_append: usize,
    pub server_shutdown_handle: Option<ServerShutdownHandle>,
}

pub(crate) struct Replica<L>
where
    L: Log<WriteAheadLogEntry>,
{
    logger: slog::Logger,
    my_replica_id: ReplicaId,
    cluster_tracker: ClusterTracker,
    bootstrap_designated: bool,
    local_state: Box<dyn PersistentLocalState>,
    election_state: ElectionState,
    wal: WriteAheadLog<L>,
    transport: Arc<dyn PeerTransport>,
    actor_client: WeakActorClient,
    append_entries_timeout: Duration,
    // Leader steps down if it hasn't heard from a majority within this window.
    check_quorum_window: Duration,
    max_entries_per_append: usize,
    // Set when the log can no longer be trusted. The event loop stops after seeing this.
    fatal_error: Option<io::Error>,
    // Dropped with the replica, which stops the RPC server.
    _server_shutdown_handle: Option<ServerShutdownHandle>,
}

impl<L> Replica<L>
where
    L: Log<WriteAheadLogEntry> + 'static,
{
    pub(crate) fn new(config: ReplicaConfig<L>) -> Self {
        Replica {
            logger: config.logger,
            my_replica_id: config.cluster_tracker.my_replica_id().clone(),
            cluster_tracker: config.cluster_tracker,
            bootstrap_designated: config.bootstrap_designated,
            local_state: config.local_state,
            election_state: config.election_state,
            wal: config.write_ahead_log,
            transport: config.transport,
            actor_client: config.actor_client,
            append_entries_timeout: config.append_entries_timeout,
            check_quorum_window: config.check_quorum_window,
            max_entries_per_append: config.max_entries_per_append,
            fatal_error: None,
            _server_shutdown_handle: config.server_shutdown_handle,
        }
    }

    pub(crate) fn fatal_error(&self) -> Option<&io::Error> {
        self.fatal_error.as_ref()
    }

    fn record_fatal_error(&mut self, e: io::Error) -> io::Error {
        slog::crit!(self.logger, "Failed to append to log: {:?}", e);
        let for_caller = io::Error::new(e.kind(), e.to_string());
        self.fatal_error.replace(e);
        for_caller
    }

    pub(crate) fn handle_enqueue_for_replication(
        &mut self,
        input: EnqueueForReplicationInput,
        callback: Callback<Result<EnqueueForReplicationOutput, EnqueueForReplicationError>>,
    ) {
        // Leader check
        match self.election_state.current_leader() {
            CurrentLeader::Me => { /* carry on */ }
            CurrentLeader::Other(leader_id) => {
                callback.send(Err(self.leader_redirect(&leader_id)));
                return;
            }
            CurrentLeader::Unknown => {
                callback.send(Err(EnqueueForReplicationError::NoLeader));
                return;
            }
        }

        // > If command received from client: append entry to local log,
        // > respond after entry applied to state machine (§5.3)
        let term = self.local_state.current_term();
        let new_entry = WriteAheadLogEntry {
            term,
            kind: EntryKind::Command,
            data: input.data.to_vec(),
        };
        match self.wal.append(new_entry) {
            Ok(appended_index) => {
                self.wal.register_pending_write(appended_index, term, callback);
                self.after_leader_append(term);
            }
            Err(e) => {
                let e = self.record_fatal_error(e);
                callback.send(Err(EnqueueForReplicationError::LocalIoError(e)));
            }
        }
    }

    fn leader_redirect(&self, leader_id: &ReplicaId) -> EnqueueForReplicationError {
        match self.cluster_tracker.metadata(leader_id) {
            Some(leader) => EnqueueForReplicationError::LeaderRedirect(LeaderRedirectInfo {
                replica_id: leader_id.clone(),
                raft_addr: leader.raft_addr(),
                app_addr: leader.app_addr(),
            }),
            // We only accept AppendEntries from members, so this shouldn't happen.
            None => EnqueueForReplicationError::NoLeader,
        }
    }

    /// One-time cluster initialization. Writes the cluster configuration as the first committed
    /// entry, then lets the normal election timer take over.
    pub(crate) fn handle_bootstrap(&mut self) -> Result<(), BootstrapError> {
        if !self.bootstrap_designated {
            return Err(BootstrapError::NotDesignated);
        }
        if !self.wal.is_empty() {
            return Err(BootstrapError::LogNotEmpty);
        }

        self.local_state.store_term_if_increased(Term::new(1));
        let term = self.local_state.current_term();

        let entry = WriteAheadLogEntry {
            term,
            kind: EntryKind::Configuration,
            data: self.cluster_tracker.encode_configuration(),
        };
        let index = match self.wal.append(entry) {
            Ok(index) => index,
            Err(e) => return Err(BootstrapError::LocalIoError(self.record_fatal_error(e))),
        };
        self.wal.ratchet_fwd_commit_index_if_changed(index);
        self.wal.apply_all_committed_entries();

        slog::info!(
            self.logger,
            "Bootstrapped cluster of {} members at {:?}/{:?}",
            self.cluster_tracker.num_voting_replicas(),
            term,
            index
        );

        // Re-arm the election timer for the new term.
        self.step_down(term, None);
        Ok(())
    }

    pub(crate) fn handle_take_snapshot(&mut self) -> Result<TakeSnapshotOutput, TakeSnapshotError> {
        self.wal.take_snapshot()
    }

    fn step_down(&mut self, term: Term, leader: Option<ReplicaId>) {
        let was_leader = self.election_state.is_leader();
        self.election_state.transition_to_follower(term, leader);
        if was_leader {
            self.wal.fail_all_pending_writes();
        }
        slog::info!(self.logger, "Election state: {:?}", self.election_state);
    }

    pub(crate) fn server_handle_request_vote(&mut self, input: RequestVoteInput) -> RequestVoteOutput {
        // Read our local term/vote state as 1 atomic action.
        let (current_term, mut opt_voted_for) = self.local_state.voted_for_current_term();
        let not_granted = |term| RequestVoteOutput {
            term,
            vote_granted: false,
        };

        // Ensure candidate is known member.
        if !self.cluster_tracker.contains_member(&input.candidate_id) {
            slog::warn!(self.logger, "Not granting vote. {:?} is not a member.", input.candidate_id);
            return not_granted(current_term);
        }

        // 1. Reply false if term < currentTerm (§5.1)
        if input.candidate_term < current_term {
            slog::info!(self.logger, "Not granting vote. Candidate term is out of date.");
            return not_granted(current_term);
        }

        // > If RPC request or response contains term T > currentTerm:
        // > set currentTerm = T, convert to follower (§5.1)
        if self.local_state.store_term_if_increased(input.candidate_term) {
            slog::info!(
                self.logger,
                "Observed increased term {:?} in RequestVote call.",
                input.candidate_term
            );
            self.step_down(input.candidate_term, None);
            // A new term means we haven't voted in it yet.
            opt_voted_for = None;
        }
        let current_term = input.candidate_term;

        // 2. If votedFor is null or candidateId, and candidate’s log is at
        // least as up-to-date as receiver’s log, grant vote (§5.2, §5.4).
        if let Some(voted_for) = opt_voted_for {
            if *voted_for != input.candidate_id {
                slog::info!(self.logger, "Not granting vote. We already voted for {:?}.", voted_for);
                return not_granted(current_term);
            }
        }

        if !self.is_candidate_log_gte_mine(input.candidate_last_log_entry) {
            slog::info!(self.logger, "Not granting vote. Candidate log is out of date.");
            return not_granted(current_term);
        }

        let cas_success = self
            .local_state
            .store_vote_for_term_if_unvoted(current_term, input.candidate_id.clone());
        let already_voted_for_candidate = matches!(
            self.local_state.voted_for_current_term(),
            (term, Some(voted_for)) if term == current_term && *voted_for == input.candidate_id
        );

        if cas_success || already_voted_for_candidate {
            slog::info!(self.logger, "Voting for {:?} in term {:?}.", input.candidate_id, current_term);
            // Granting a vote counts as hearing from a valid candidate.
            self.election_state.reset_timeout_if_follower();
            return RequestVoteOutput {
                term: current_term,
                vote_granted: true,
            };
        }

        not_granted(current_term)
    }

    fn is_candidate_log_gte_mine(&self, candidate_last_entry: Option<(Term, Index)>) -> bool {
        // > Raft determines which of two logs is more up-to-date
        // > by comparing the index and term of the last entries in the
        // > logs. If the logs have last entries with different terms, then
        // > the log with the later term is more up-to-date. If the logs
        // > end with the same term, then whichever log is longer is
        // > more up-to-date.
        match (self.wal.latest_entry(), candidate_last_entry) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some((my_term, my_index)), Some((candidate_term, candidate_index))) => {
                (candidate_term, candidate_index) >= (my_term, my_index)
            }
        }
    }

    pub(crate) fn handle_request_vote_reply_from_peer(&mut self, reply: RequestVoteReplyFromPeer) {
        let output = match reply.result {
            Ok(output) => output,
            Err(e) => {
                // Not retried. The next election timeout starts a fresh round.
                slog::info!(self.logger, "RequestVote to {:?} failed: {}", reply.peer_id, e);
                return;
            }
        };

        if self.local_state.store_term_if_increased(output.term) {
            slog::info!(
                self.logger,
                "Peer {:?} is on newer term {:?}. Stepping down.",
                reply.peer_id,
                output.term
            );
            self.step_down(output.term, None);
            return;
        }

        let current_term = self.local_state.current_term();
        if current_term != reply.term {
            slog::info!(
                self.logger,
                "Received vote for outdated term {:?}, current term: {:?}.",
                reply.term,
                current_term,
            );
            return;
        }

        if !output.vote_granted {
            slog::info!(
                self.logger,
                "Vote not granted from {:?} for term {:?}",
                reply.peer_id,
                reply.term,
            );
            return;
        }

        let num_votes_received = match self.election_state.add_vote_if_candidate(reply.peer_id) {
            Some(v) => v,
            None => {
                slog::debug!(
                    self.logger,
                    "Received vote for term {:?} while {:?}",
                    reply.term,
                    self.election_state,
                );
                return;
            }
        };

        slog::info!(
            self.logger,
            "Received {}/{} votes for term {:?}",
            num_votes_received,
            self.cluster_tracker.num_voting_replicas(),
            reply.term,
        );

        if num_votes_received >= self.cluster_tracker.majority() {
            self.become_leader(reply.term);
        }
    }

    fn become_leader(&mut self, term: Term) {
        self.election_state.transition_to_leader(
            term,
            self.cluster_tracker.peer_ids(),
            self.wal.latest_entry().map(|(_, index)| index),
        );
        slog::info!(self.logger, "Election state: {:?}", self.election_state);

        // Entries from earlier terms only commit once something from this term does.
        let noop = WriteAheadLogEntry {
            term,
            kind: EntryKind::NoOp,
            data: Vec::new(),
        };
        match self.wal.append(noop) {
            Ok(_) => self.after_leader_append(term),
            Err(e) => {
                self.record_fatal_error(e);
            }
        }
    }

    /// New entries exist on the leader. Commit what we can, and push to every peer that isn't
    /// already waiting on a reply.
    fn after_leader_append(&mut self, term: Term) {
        self.advance_leader_commit_index(term);

        let idle_peers = match self.election_state.leader_state() {
            Some(leader_state) => leader_state.idle_peer_ids(),
            None => return,
        };
        for peer_id in idle_peers {
            self.send_append_entries(&peer_id, term);
        }
    }

    fn advance_leader_commit_index(&mut self, term: Term) {
        // > If there exists an N such that N > commitIndex, a majority
        // > of matchIndex[i] ≥ N, and log[N].term == currentTerm:
        // > set commitIndex = N (§5.3, §5.4).
        let my_latest_index = self.wal.latest_entry().map(|(_, index)| index);
        let tentative_new_commit_index = match self.election_state.leader_state() {
            Some(leader_state) => leader_state.quorum_matched_index(my_latest_index, self.cluster_tracker.majority()),
            None => return,
        };

        if let Some(tentative_new_commit_index) = tentative_new_commit_index {
            match self
                .wal
                .ratchet_fwd_commit_index_if_valid(tentative_new_commit_index, term)
            {
                Ok(_) => self.wal.apply_all_committed_entries(),
                Err(ioe) => slog::warn!(
                    self.logger,
                    "IO failure while confirming new commit index {:?}: {:?}",
                    tentative_new_commit_index,
                    ioe
                ),
            }
        }
    }

    pub(crate) fn server_handle_append_entries(
        &mut self,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, AppendEntriesError> {
        let current_term = self.local_state.current_term();

        // Ensure leader is known member.
        if !self.cluster_tracker.contains_member(&input.leader_id) {
            slog::warn!(self.logger, "Rejecting AppendEntries from non-member {:?}", input.leader_id);
            return Ok(self.append_entries_rejection(current_term));
        }

        // 1. Reply false if term < currentTerm (§5.1)
        if input.leader_term < current_term {
            return Ok(self.append_entries_rejection(current_term));
        }

        // > If RPC request or response contains term T > currentTerm:
        // > set currentTerm = T, convert to follower (§5.1)
        if self.local_state.store_term_if_increased(input.leader_term) {
            self.step_down(input.leader_term, Some(input.leader_id.clone()));
        } else if self.election_state.is_leader() {
            slog::error!(
                self.logger,
                "{:?} claims leadership of my term {:?}. Rejecting.",
                input.leader_id,
                current_term
            );
            return Ok(self.append_entries_rejection(current_term));
        } else {
            self.election_state.observe_leader(current_term, &input.leader_id);
        }
        let current_term = input.leader_term;

        self.election_state.reset_timeout_if_follower();

        // 2. Reply false if [my] log doesn't contain an entry at [leader's]
        // prevLogIndex whose term matches [leader's] prevLogTerm (§5.3)
        if let Some((leader_prev_entry_term, leader_prev_entry_index)) = input.leader_previous_log_entry {
            match self.wal.read(leader_prev_entry_index) {
                Ok(Some(my_previous_log_entry)) if my_previous_log_entry.term == leader_prev_entry_term => {}
                Ok(_) => return Ok(self.append_entries_rejection(current_term)),
                Err(e) => return Err(AppendEntriesError::ServerIoError(e)),
            }
        }

        // 3. If [my] existing entry conflicts with [leader's new entries]
        // (same index but different terms), delete [my] existing entry and
        // all that follow it (§5.3)
        // 4. Append any new entries not already in the log
        let mut last_new_entry_index = input.leader_previous_log_entry.map(|(_, index)| index);
        let mut next_entry_index = last_new_entry_index
            .map(|index| index.plus(1))
            .unwrap_or_else(Index::start_index);
        for new_entry in input.new_entries {
            let opt_existing_entry = self
                .wal
                .read(next_entry_index)
                .map_err(AppendEntriesError::ServerIoError)?;

            match opt_existing_entry {
                // 4. (no-op)
                Some(existing_entry) if existing_entry.term == new_entry.term => {}
                opt_existing_entry => {
                    if opt_existing_entry.is_some() {
                        // 3. (delete)
                        slog::info!(self.logger, "Truncating conflicting log suffix from {:?}", next_entry_index);
                        self.wal
                            .truncate(next_entry_index)
                            .map_err(AppendEntriesError::ServerIoError)?;
                    }

                    // 4. (append)
                    if let Err(e) = self.wal.append(Self::to_log_entry(new_entry)) {
                        return Err(AppendEntriesError::ServerIoError(self.record_fatal_error(e)));
                    }
                }
            }

            last_new_entry_index = Some(next_entry_index);
            next_entry_index = next_entry_index.plus(1);
        }

        // 5. If leaderCommit > commitIndex, set commitIndex = min(leaderCommit, index of last new entry)
        if let (Some(leader_commit_index), Some(last_new_entry_index)) =
            (input.leader_commit_index, last_new_entry_index)
        {
            self.wal
                .ratchet_fwd_commit_index_if_changed(cmp::min(leader_commit_index, last_new_entry_index));
        }

        // > If commitIndex > lastApplied: increment lastApplied, apply
        // > log[lastApplied] to state machine (§5.3)
        self.wal.apply_all_committed_entries();

        Ok(AppendEntriesOutput {
            term: current_term,
            success: true,
            last_log_index: self.wal.latest_entry().map(|(_, index)| index),
        })
    }

    fn append_entries_rejection(&self, term: Term) -> AppendEntriesOutput {
        AppendEntriesOutput {
            term,
            success: false,
            last_log_index: self.wal.latest_entry().map(|(_, index)| index),
        }
    }

    fn to_log_entry(entry: AppendEntriesLogEntry) -> WriteAheadLogEntry {
        WriteAheadLogEntry {
            term: entry.term,
            kind: entry.kind,
            data: entry.data.to_vec(),
        }
    }

    pub(crate) fn handle_append_entries_reply_from_peer(&mut self, reply: AppendEntriesReplyFromPeer) {
        let logger = self.logger.new(slog::o!(
            "Peer" => format!("{:?}", reply.descriptor.peer_id),
            "SeqNo" => reply.descriptor.seq_no,
        ));
        slog::trace!(logger, "AE reply from peer result: {:?}", reply.result);

        // 1. Check for stale term rejection
        if let Ok(output) = &reply.result {
            if self.local_state.store_term_if_increased(output.term) {
                slog::warn!(logger, "Rejected by peer because my term is stale.");
                self.step_down(output.term, None);
                return;
            }
        }

        let current_term = self.local_state.current_term();
        if current_term != reply.descriptor.term {
            slog::info!(
                logger,
                "Received AE reply for outdated term {:?}, but we're on term {:?}",
                reply.descriptor.term,
                current_term
            );
            return;
        }

        let peer_log_update = match reply.result {
            Ok(AppendEntriesOutput { success: true, .. }) => PeerStateUpdate::Success {
                previous_log_entry: reply.descriptor.previous_log_entry_index,
                num_entries_replicated: reply.descriptor.num_log_entries,
            },
            Ok(AppendEntriesOutput { last_log_index, .. }) => {
                slog::info!(logger, "Peer log doesn't match. Peer's last index: {:?}", last_log_index);
                PeerStateUpdate::PeerLogBehind {
                    peer_last_log_index: last_log_index,
                }
            }
            Err(e) => {
                slog::warn!(logger, "AE failure: {}", e);
                PeerStateUpdate::OtherError
            }
        };

        // 2. Update peer log tracker
        let leader_state = match self.election_state.leader_state_mut() {
            Some(leader_state) => leader_state,
            None => {
                slog::info!(logger, "No longer leader");
                return;
            }
        };
        let peer_state = match leader_state.peer_state_mut(&reply.descriptor.peer_id) {
            Some(peer_state) => peer_state,
            None => {
                slog::warn!(logger, "Peer not found while handling AE reply");
                return;
            }
        };
        let send_now = peer_state.handle_append_entries_result(&logger, reply.descriptor.seq_no, peer_log_update);
        let (next_index, _) = peer_state.next_and_previous_log_index();

        // 3. Check for majority replication and apply new commits.
        self.advance_leader_commit_index(current_term);

        // 4. Keep streaming while the peer is behind and we made progress. Anything else waits for
        // the next heartbeat.
        // > If last log index ≥ nextIndex for a follower: send
        // > AppendEntries RPC with log entries starting at nextIndex
        let has_more = matches!(self.wal.latest_entry(), Some((_, last_index)) if last_index >= next_index);
        if send_now && has_more {
            self.send_append_entries(&reply.descriptor.peer_id, current_term);
        }
    }

    pub(crate) fn handle_heartbeat_timer(&mut self, tick: HeartbeatTick) {
        let current_term = self.local_state.current_term();
        if current_term != tick.term {
            slog::debug!(
                self.logger,
                "Received heartbeat tick for outdated term {:?}, current term: {:?}",
                tick.term,
                current_term
            );
            return;
        }

        let num_in_contact = match self.election_state.leader_state() {
            Some(leader_state) => leader_state.num_in_contact_within(self.check_quorum_window),
            None => return,
        };
        if num_in_contact < self.cluster_tracker.majority() {
            slog::warn!(
                self.logger,
                "Heard from only {}/{} replicas recently. Stepping down.",
                num_in_contact,
                self.cluster_tracker.num_voting_replicas()
            );
            self.step_down(current_term, None);
            return;
        }

        self.send_append_entries(&tick.peer_id, current_term);
    }

    fn send_append_entries(&mut self, peer_id: &ReplicaId, current_term: Term) {
        let commit_index = self.wal.commit_index();
        let peer_state = match self
            .election_state
            .leader_state_mut()
            .and_then(|leader_state| leader_state.peer_state_mut(peer_id))
        {
            Some(peer_state) => peer_state,
            None => {
                slog::debug!(self.logger, "Not sending AE to {:?}; not leader or unknown peer", peer_id);
                return;
            }
        };

        // Simplicity vs throughput tradeoff. Only 1 outstanding request per peer, no pipelining.
        // Entries are still batched.
        if peer_state.has_outstanding_request() {
            slog::debug!(self.logger, "Outstanding AE to {:?}, skipping", peer_id);
            return;
        }

        let (next_index, opt_previous_index) = peer_state.next_and_previous_log_index();
        let request = append_entries_request::build(
            &self.wal,
            current_term,
            self.my_replica_id.clone(),
            next_index,
            opt_previous_index,
            commit_index,
            self.max_entries_per_append,
        );
        let (input, num_log_entries) = match request {
            Ok(r) => r,
            Err(e) => {
                slog::error!(self.logger, "Can't build AE for {:?}: {:?}", peer_id, e);
                return;
            }
        };

        let descriptor = AppendEntriesReplyFromPeerDescriptor {
            peer_id: peer_id.clone(),
            term: current_term,
            seq_no: peer_state.next_seq_no(),
            previous_log_entry_index: opt_previous_index,
            num_log_entries,
        };
        peer_state.reset_heartbeat_timer();

        let transport = self.transport.clone();
        let actor_client = self.actor_client.clone();
        let timeout = self.append_entries_timeout;
        tokio::task::spawn(async move {
            let result =
                match tokio::time::timeout(timeout, transport.append_entries(&descriptor.peer_id, input)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout),
                };
            let _ = actor_client
                .notify_append_entries_reply_from_peer(AppendEntriesReplyFromPeer { descriptor, result })
                .await;
        });
    }

    pub(crate) fn handle_election_timeout(&mut self, tick: ElectionTimeoutTick) {
        let current_term = self.local_state.current_term();
        if current_term != tick.term {
            slog::debug!(
                self.logger,
                "Ignoring election timeout armed in term {:?}, current term: {:?}",
                tick.term,
                current_term
            );
            return;
        }
        if self.election_state.is_leader() {
            return;
        }

        // Only bootstrap or a leader puts the first entry in a log. Until then, stay out of
        // elections so two empty replicas can't elect each other.
        if self.wal.is_empty() {
            slog::debug!(self.logger, "Log is empty. Waiting to hear from a leader.");
            return;
        }

        // Write-ahead log style: Vote for self on local state before transitioning to candidate.
        let new_term = self.local_state.increment_term_and_vote_for_self();
        self.election_state.transition_to_candidate_and_vote_for_self(new_term);
        slog::info!(self.logger, "Election timeout. Election state: {:?}", self.election_state);

        if self.cluster_tracker.majority() <= 1 {
            self.become_leader(new_term);
            return;
        }

        let candidate_last_log_entry = self.wal.latest_entry();
        for peer_id in self.cluster_tracker.peer_ids() {
            let input = RequestVoteInput {
                candidate_term: new_term,
                candidate_id: self.my_replica_id.clone(),
                candidate_last_log_entry,
            };
            let transport = self.transport.clone();
            let actor_client = self.actor_client.clone();
            tokio::task::spawn(async move {
                let result = transport.request_vote(&peer_id, input).await;
                let _ = actor_client
                    .notify_request_vote_reply_from_peer(RequestVoteReplyFromPeer {
                        peer_id,
                        term: new_term,
                        result,
                    })
                    .await;
            });
        }
    }
}

mod append_entries_request {
    use crate::commitlog::{Index, Log};
    use crate::replica::replica_api::{AppendEntriesInput, AppendEntriesLogEntry};
    use crate::replica::write_ahead_log::{WriteAheadLog, WriteAheadLogEntry};
    use crate::replica::{ReplicaId, Term};
    use bytes::Bytes;
    use std::io;

    /// Returns the request plus the number of entries it carries.
    pub(super) fn build<L>(
        wal: &WriteAheadLog<L>,
        current_term: Term,
        my_id: ReplicaId,
        next_index: Index,
        opt_previous_index: Option<Index>,
        commit_index: Option<Index>,
        max_entries: usize,
    ) -> Result<(AppendEntriesInput, usize), io::Error>
    where
        L: Log<WriteAheadLogEntry>,
    {
        let leader_previous_log_entry = match opt_previous_index {
            None => None,
            Some(previous_index) => match wal.read(previous_index)? {
                Some(entry) => Some((entry.term, previous_index)),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("Peer's previous index {:?} is missing from log", previous_index),
                    ))
                }
            },
        };

        let mut new_entries = Vec::new();
        let mut index = next_index;
        while new_entries.len() < max_entries {
            match wal.read(index)? {
                Some(entry) => new_entries.push(AppendEntriesLogEntry {
                    term: entry.term,
                    kind: entry.kind,
                    data: Bytes::from(entry.data),
                }),
                None => break,
            }
            index = index.plus(1);
        }
        let num_entries = new_entries.len();

        Ok((
            AppendEntriesInput {
                leader_term: current_term,
                leader_id: my_id,
                leader_previous_log_entry,
                leader_commit_index: commit_index,
                new_entries,
            },
            num_entries,
        ))
    }
}
