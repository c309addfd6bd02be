use crate::replica::{ClusterTracker, ElectionStateChange, ElectionStateSnapshot, LeadershipObserver, Term};
use std::net::SocketAddr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// ProxyTarget is where application traffic should go right now: the leader's application
/// endpoint, or nothing while no leader is known.
///
/// It has one writer, the `LeaderTracker` running inside the replica event loop. Readers always
/// see a whole update.
#[derive(Clone, Default)]
pub struct ProxyTarget {
    inner: Arc<RwLock<TargetState>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct TargetState {
    term: Term,
    addr: Option<SocketAddr>,
}

impl ProxyTarget {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The address to forward to, captured once per request.
    pub fn current(&self) -> Option<SocketAddr> {
        self.read().addr
    }

    /// Term of the leadership change that produced the current target.
    pub fn term(&self) -> Term {
        self.read().term
    }

    /// Swap in a new target. Updates from a term older than the current one are dropped, so the
    /// target only ever moves forward with the replica's term.
    pub(crate) fn update(&self, term: Term, addr: Option<SocketAddr>) -> bool {
        let mut state = self.write();
        if term < state.term {
            return false;
        }
        *state = TargetState { term, addr };
        true
    }

    // The lock is never held across anything that can panic.
    fn read(&self) -> RwLockReadGuard<'_, TargetState> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TargetState> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// LeaderTracker resolves each election state change into a `ProxyTarget` update.
pub(crate) struct LeaderTracker {
    logger: slog::Logger,
    cluster_tracker: ClusterTracker,
    my_app_addr: SocketAddr,
    target: ProxyTarget,
}

impl LeaderTracker {
    pub(crate) fn new(
        logger: slog::Logger,
        cluster_tracker: ClusterTracker,
        my_app_addr: SocketAddr,
        target: ProxyTarget,
    ) -> Self {
        LeaderTracker {
            logger,
            cluster_tracker,
            my_app_addr,
            target,
        }
    }

    fn resolve(&self, state: &ElectionStateSnapshot) -> Option<SocketAddr> {
        match state {
            ElectionStateSnapshot::Leader => Some(self.my_app_addr),
            ElectionStateSnapshot::Follower(leader_id) => match self.cluster_tracker.metadata(leader_id) {
                Some(leader) => Some(leader.app_addr()),
                None => {
                    slog::warn!(self.logger, "Leader {:?} is not a cluster member", leader_id);
                    None
                }
            },
            ElectionStateSnapshot::Candidate | ElectionStateSnapshot::FollowerNoLeader => None,
        }
    }
}

impl LeadershipObserver for LeaderTracker {
    fn on_election_state_change(&self, change: &ElectionStateChange) {
        let addr = self.resolve(&change.state);
        if self.target.update(change.term, addr) {
            slog::info!(self.logger, "Proxy target is now {:?} ({:?})", addr, change.term);
        } else {
            slog::debug!(
                self.logger,
                "Ignoring leadership change from old term {:?}, target is on {:?}",
                change.term,
                self.target.term()
            );
        }
    }
}
