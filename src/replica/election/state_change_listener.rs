use crate::replica::{ReplicaId, Term};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ElectionStateSnapshot {
    Leader,
    Candidate,
    Follower(ReplicaId),
    FollowerNoLeader,
}

/// One transition of the local election state, as seen in `term`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ElectionStateChange {
    pub(crate) term: Term,
    pub(crate) state: ElectionStateSnapshot,
}

/// LeadershipObserver is invoked synchronously from the replica event loop on every transition,
/// in order. Implementations must not block.
pub(crate) trait LeadershipObserver: Send + Sync {
    fn on_election_state_change(&self, change: &ElectionStateChange);
}

pub(super) fn new(
    initial_state: ElectionStateChange,
    observers: Vec<Arc<dyn LeadershipObserver>>,
) -> (ElectionStateChangeNotifier, ElectionStateChangeListener) {
    for observer in observers.iter() {
        observer.on_election_state_change(&initial_state);
    }
    let (snd, rcv) = watch::channel(initial_state);

    (
        ElectionStateChangeNotifier { snd, observers },
        ElectionStateChangeListener { rcv },
    )
}

pub(super) struct ElectionStateChangeNotifier {
    snd: watch::Sender<ElectionStateChange>,
    observers: Vec<Arc<dyn LeadershipObserver>>,
}

impl ElectionStateChangeNotifier {
    pub(super) fn notify_new_state(&self, change: ElectionStateChange) {
        for observer in self.observers.iter() {
            observer.on_election_state_change(&change);
        }
        // No receivers is fine.
        let _ = self.snd.send(change);
    }
}

/// ElectionStateChangeListener only ever yields the latest state. Intermediate transitions may be
/// skipped if the reader is slow.
#[derive(Clone)]
pub(crate) struct ElectionStateChangeListener {
    rcv: watch::Receiver<ElectionStateChange>,
}

impl ElectionStateChangeListener {
    pub(crate) async fn next(&mut self) -> Option<ElectionStateChange> {
        match self.rcv.changed().await {
            Ok(_) => Some(self.rcv.borrow().clone()),
            Err(_) => None,
        }
    }

    pub(crate) fn latest(&self) -> ElectionStateChange {
        self.rcv.borrow().clone()
    }
}
