use crate::commitlog::Index;
use crate::replica::election::timers::HeartbeatTimerHandle;
use crate::replica::ReplicaId;
use std::cmp;
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

pub(crate) struct LeaderStateTracker {
    peer_state: HashMap<ReplicaId, PeerState>,
}

impl LeaderStateTracker {
    pub(super) fn new(peer_state: HashMap<ReplicaId, PeerState>) -> Self {
        LeaderStateTracker { peer_state }
    }

    pub(crate) fn peer_state_mut(&mut self, peer_id: &ReplicaId) -> Option<&mut PeerState> {
        self.peer_state.get_mut(peer_id)
    }

    pub(crate) fn idle_peer_ids(&self) -> Vec<ReplicaId> {
        self.peer_state
            .iter()
            .filter(|(_, ps)| !ps.has_outstanding_request())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Highest index replicated on a majority, counting ourselves as holding `my_latest_index`.
    pub(crate) fn quorum_matched_index(&self, my_latest_index: Option<Index>, majority: usize) -> Option<Index> {
        let mut matched: Vec<Option<Index>> = self.peer_state.values().map(|ps| ps.matched()).collect();
        matched.push(my_latest_index);
        quorum_index(matched, majority)
    }

    /// Number of replicas (including ourselves) we've heard from within `window`.
    pub(crate) fn num_in_contact_within(&self, window: Duration) -> usize {
        let now = Instant::now();
        let peers = self
            .peer_state
            .values()
            .filter(|ps| now.saturating_duration_since(ps.last_contact) <= window)
            .count();
        peers + 1
    }
}

// Sorted ascending, the value `majority` places from the end is held by at least a majority.
fn quorum_index(mut matched_indexes: Vec<Option<Index>>, majority: usize) -> Option<Index> {
    assert!(
        majority >= 1 && majority <= matched_indexes.len(),
        "Majority {} is not satisfiable by {} replicas",
        majority,
        matched_indexes.len()
    );
    matched_indexes.sort();
    matched_indexes[matched_indexes.len() - majority]
}

pub(crate) struct PeerState {
    // Held to send heartbeats for this peer
    heartbeat_timer: HeartbeatTimerHandle,

    // > index of the next log entry to send to that server
    // > (initialized to leader last log index + 1)
    next: Index,
    // > index of highest log entry known to be replicated on server
    // > (initialized to 0, increases monotonically)
    matched: Option<Index>,

    // SeqNo is a logical clock of this leader's interactions with the peer. Each request takes
    // the next SeqNo and its reply carries it back. Replies older than the last received one are
    // discarded.
    last_sent_seq_no: u64,
    last_received_seq_no: u64,

    // Last time the peer answered us in this term. Starts at leadership acquisition.
    last_contact: Instant,
}

impl PeerState {
    pub(super) fn new(heartbeat_timer: HeartbeatTimerHandle, leader_latest_index: Option<Index>) -> Self {
        PeerState {
            heartbeat_timer,
            next: leader_latest_index
                .map(|i| i.plus(1))
                .unwrap_or_else(Index::start_index),
            matched: None,
            last_sent_seq_no: 0,
            last_received_seq_no: 0,
            last_contact: Instant::now(),
        }
    }

    pub(crate) fn next_and_previous_log_index(&self) -> (Index, Option<Index>) {
        (self.next, self.next.checked_minus(1))
    }

    pub(crate) fn matched(&self) -> Option<Index> {
        self.matched
    }

    /// Returns true if the peer should be sent the next request right away, rather than on its
    /// next heartbeat.
    pub(crate) fn handle_append_entries_result(
        &mut self,
        logger: &slog::Logger,
        received_seq_no: u64,
        update: PeerStateUpdate,
    ) -> bool {
        if !self.ratchet_fwd_received_seq_no(received_seq_no) {
            slog::warn!(
                logger,
                "Dropping out of date seq-no({:?}): {:?}",
                received_seq_no,
                update
            );
            return false;
        }

        match update {
            PeerStateUpdate::OtherError => false,
            PeerStateUpdate::Success {
                previous_log_entry,
                num_entries_replicated,
            } => {
                self.last_contact = Instant::now();
                self.update_log(previous_log_entry, num_entries_replicated);
                true
            }
            PeerStateUpdate::PeerLogBehind { peer_last_log_index } => {
                self.last_contact = Instant::now();
                self.rewind_log(logger, peer_last_log_index)
            }
        }
    }

    fn update_log(&mut self, previous_log_entry: Option<Index>, num_entries_replicated: usize) {
        // Peer's log now matches ours through prev + n. A heartbeat (n = 0) still confirms prev.
        let confirmed = match (previous_log_entry, num_entries_replicated) {
            (None, 0) => return,
            (None, n) => Index::new_usize(n),
            (Some(prev), n) => prev.plus(n as u64),
        };

        let new_matched = match self.matched {
            Some(matched) => cmp::max(matched, confirmed),
            None => confirmed,
        };
        self.matched.replace(new_matched);
        self.next = cmp::max(self.next, new_matched.plus(1));
    }

    /// Returns true if `next` moved.
    fn rewind_log(&mut self, logger: &slog::Logger, peer_last_log_index: Option<Index>) -> bool {
        // Skip straight past the peer's log end if it told us where that is.
        let hinted = peer_last_log_index
            .map(|i| i.plus(1))
            .unwrap_or_else(Index::start_index);

        let decremented = match self.next.checked_minus(1) {
            Some(decremented) => decremented,
            None => {
                slog::warn!(logger, "Can't rewind peer log, already at beginning of log.");
                return false;
            }
        };
        let new_next = cmp::max(cmp::min(decremented, hinted), Index::start_index());

        if matches!(self.matched, Some(m) if new_next <= m) {
            // Only happens if the peer lost its log, e.g. it restarted without durable storage.
            // Nothing it held is known to match anymore.
            slog::warn!(
                logger,
                "Peer rejected entries at or below its matched index {:?}. Peer's last index: {:?}. \
                 Replicating again from {:?}.",
                self.matched,
                peer_last_log_index,
                new_next
            );
            self.matched = None;
        }

        let moved = new_next != self.next;
        self.next = new_next;
        moved
    }

    pub(crate) fn has_outstanding_request(&self) -> bool {
        self.last_received_seq_no < self.last_sent_seq_no
    }

    pub(crate) fn next_seq_no(&mut self) -> u64 {
        self.last_sent_seq_no += 1;
        self.last_sent_seq_no
    }

    /// returns true if the state was mutated.
    fn ratchet_fwd_received_seq_no(&mut self, received_seq_no: u64) -> bool {
        if self.last_received_seq_no < received_seq_no && received_seq_no <= self.last_sent_seq_no {
            self.last_received_seq_no = received_seq_no;
            true
        } else {
            false
        }
    }

    pub(crate) fn reset_heartbeat_timer(&self) {
        self.heartbeat_timer.reset_heartbeat_timer();
    }
}

#[derive(Debug)]
pub(crate) enum PeerStateUpdate {
    Success {
        previous_log_entry: Option<Index>,
        num_entries_replicated: usize,
    },
    PeerLogBehind {
        peer_last_log_index: Option<Index>,
    },
    OtherError,
}
