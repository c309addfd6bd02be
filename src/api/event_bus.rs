use crate::replica::{ElectionStateChange, ElectionStateChangeListener, ElectionStateSnapshot, LeadershipObserver, Term};
use std::sync::Arc;

/// An event that happened, as observed by the local raft replica.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// An event of leader election or timeout. Consuming this event type is subtle. It doesn't queue
    /// intermediate events. If there are multiple events between when application awaits the next event,
    /// those events will be clobbered into only the most recent event.
    Election(ElectionEvent),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElectionEvent {
    pub term: Term,
    pub state: ElectionState,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ElectionState {
    Leader,
    Candidate,
    Follower(FollowerEventData),
    FollowerNoLeader,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FollowerEventData {
    pub leader_replica_id: String,
}

pub struct EventListener {
    election_state_change_listener: ElectionStateChangeListener,
}

impl EventListener {
    pub(crate) fn new(election_state_change_listener: ElectionStateChangeListener) -> Self {
        EventListener {
            election_state_change_listener,
        }
    }

    /// `next_event()` returns the next event that this local raft replica observes. None once the
    /// replica has shut down.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.election_state_change_listener
            .next()
            .await
            .map(|change| Event::Election(ElectionEvent::from(change)))
    }

    /// The most recent election state, without waiting.
    pub fn latest(&self) -> ElectionEvent {
        ElectionEvent::from(self.election_state_change_listener.latest())
    }
}

/// ElectionObserver sees every election state transition, in order, synchronously from the
/// replica's event loop. It must return quickly.
pub trait ElectionObserver: Send + Sync {
    fn on_election_event(&self, event: &ElectionEvent);
}

pub(crate) struct ElectionObserverAdapter(pub(crate) Arc<dyn ElectionObserver>);

impl LeadershipObserver for ElectionObserverAdapter {
    fn on_election_state_change(&self, change: &ElectionStateChange) {
        self.0.on_election_event(&ElectionEvent::from(change.clone()));
    }
}

// ------- Conversions --------

impl From<ElectionStateChange> for ElectionEvent {
    fn from(change: ElectionStateChange) -> Self {
        ElectionEvent {
            term: change.term,
            state: ElectionState::from(change.state),
        }
    }
}

impl From<ElectionStateSnapshot> for ElectionState {
    fn from(election_state: ElectionStateSnapshot) -> Self {
        match election_state {
            ElectionStateSnapshot::Leader => ElectionState::Leader,
            ElectionStateSnapshot::Candidate => ElectionState::Candidate,
            ElectionStateSnapshot::Follower(leader_id) => ElectionState::Follower(FollowerEventData {
                leader_replica_id: leader_id.into_inner(),
            }),
            ElectionStateSnapshot::FollowerNoLeader => ElectionState::FollowerNoLeader,
        }
    }
}
