use crate::actor::WeakActorClient;
use crate::commitlog::Index;
use crate::replica::election::leader_state::{LeaderStateTracker, PeerState};
use crate::replica::election::state_change_listener::{
    self, ElectionStateChange, ElectionStateChangeListener, ElectionStateChangeNotifier, ElectionStateSnapshot,
    LeadershipObserver,
};
use crate::replica::election::timers::{ElectionTimerHandle, HeartbeatTimerHandle};
use crate::replica::{ReplicaId, Term};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct ElectionConfig {
    pub my_replica_id: ReplicaId,
    pub leader_heartbeat_duration: Duration,
    pub follower_min_timeout: Duration,
    pub follower_max_timeout: Duration,
}

#[derive(Debug, PartialEq)]
pub(crate) enum CurrentLeader {
    Me,
    Other(ReplicaId),
    Unknown,
}

/// ElectionState is responsible for holding state specific to the stage in an election. Its
/// methods are responsible for "what" to do. It is NOT responsible for validating anything
/// specific to logs, terms, peers, etc. or knowing "when" to do something.
///
/// Every state owns the timers for its term, so a transition implicitly cancels the previous
/// state's timers.
pub(crate) struct ElectionState {
    state: State,
    // Term the current state was entered in. Only used for notifications.
    term: Term,
    config: ElectionConfig,
    actor_client: WeakActorClient,
    state_change_notifier: ElectionStateChangeNotifier,
}

impl ElectionState {
    /// `new_follower()` creates a new ElectionState instance that starts out as a follower in
    /// `term` with no known leader.
    pub(crate) fn new_follower(
        config: ElectionConfig,
        actor_client: WeakActorClient,
        term: Term,
        observers: Vec<Arc<dyn LeadershipObserver>>,
    ) -> (Self, ElectionStateChangeListener) {
        let initial_state = State::Follower(FollowerState::new(None, &config, actor_client.clone(), term));
        let (notifier, listener) = state_change_listener::new(
            ElectionStateChange {
                term,
                state: Self::current_state_impl(&initial_state),
            },
            observers,
        );

        let election_state = Self {
            state: initial_state,
            term,
            config,
            actor_client,
            state_change_notifier: notifier,
        };

        (election_state, listener)
    }

    pub(crate) fn transition_to_follower(&mut self, term: Term, new_leader: Option<ReplicaId>) {
        self.state = State::Follower(FollowerState::new(
            new_leader,
            &self.config,
            self.actor_client.clone(),
            term,
        ));
        self.term = term;
        self.notify_new_state();
    }

    pub(crate) fn transition_to_candidate_and_vote_for_self(&mut self, term: Term) {
        let mut cs = CandidateState::new(&self.config, self.actor_client.clone(), term);

        // Vote for self
        cs.add_received_vote(self.config.my_replica_id.clone());

        self.state = State::Candidate(cs);
        self.term = term;
        self.notify_new_state();
    }

    pub(crate) fn transition_to_leader(
        &mut self,
        term: Term,
        peer_ids: HashSet<ReplicaId>,
        latest_log_index: Option<Index>,
    ) {
        self.state = State::Leader(LeaderState::new(
            peer_ids,
            latest_log_index,
            self.config.leader_heartbeat_duration,
            self.actor_client.clone(),
            term,
        ));
        self.term = term;
        self.notify_new_state();
    }

    pub(crate) fn current_state(&self) -> ElectionStateSnapshot {
        Self::current_state_impl(&self.state)
    }

    fn current_state_impl(state: &State) -> ElectionStateSnapshot {
        match state {
            State::Leader(_) => ElectionStateSnapshot::Leader,
            State::Candidate(_) => ElectionStateSnapshot::Candidate,
            State::Follower(FollowerState { leader: None, .. }) => ElectionStateSnapshot::FollowerNoLeader,
            State::Follower(FollowerState {
                leader: Some(leader_id),
                ..
            }) => ElectionStateSnapshot::Follower(leader_id.clone()),
        }
    }

    pub(crate) fn current_leader(&self) -> CurrentLeader {
        match &self.state {
            State::Leader(_) => CurrentLeader::Me,
            State::Follower(FollowerState {
                leader: Some(leader_id),
                ..
            }) => CurrentLeader::Other(leader_id.clone()),
            State::Candidate(_) | State::Follower(FollowerState { leader: None, .. }) => CurrentLeader::Unknown,
        }
    }

    pub(crate) fn is_leader(&self) -> bool {
        matches!(self.state, State::Leader(_))
    }

    fn notify_new_state(&self) {
        self.state_change_notifier.notify_new_state(ElectionStateChange {
            term: self.term,
            state: Self::current_state_impl(&self.state),
        });
    }

    pub(crate) fn reset_timeout_if_follower(&self) {
        if let State::Follower(fs) = &self.state {
            fs.reset_timeout();
        }
    }

    /// A valid AppendEntries from `leader_id` arrived for our current `term`. A candidate steps
    /// down, a follower learns who leads. Callers must reject this as leader; two leaders in one
    /// term breaks election safety.
    pub(crate) fn observe_leader(&mut self, term: Term, leader_id: &ReplicaId) {
        match &mut self.state {
            State::Follower(fs) => {
                if fs.leader.is_some() {
                    return;
                }
                fs.leader.replace(leader_id.clone());
            }
            State::Candidate(_) => {}
            State::Leader(_) => return,
        }

        if let State::Candidate(_) = self.state {
            self.transition_to_follower(term, Some(leader_id.clone()));
        } else {
            self.notify_new_state();
        }
    }

    /// Return number of votes received if candidate, or None if no longer Candidate.
    pub(crate) fn add_vote_if_candidate(&mut self, vote_from: ReplicaId) -> Option<usize> {
        if let State::Candidate(cs) = &mut self.state {
            Some(cs.add_received_vote(vote_from))
        } else {
            None
        }
    }

    pub(crate) fn leader_state(&self) -> Option<&LeaderStateTracker> {
        if let State::Leader(ls) = &self.state {
            Some(&ls.tracker)
        } else {
            None
        }
    }

    pub(crate) fn leader_state_mut(&mut self) -> Option<&mut LeaderStateTracker> {
        if let State::Leader(ls) = &mut self.state {
            Some(&mut ls.tracker)
        } else {
            None
        }
    }
}

impl fmt::Debug for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Leader(_) => write!(f, "Leader(Term={:?})", self.term),
            State::Candidate(_) => write!(f, "Candidate(Term={:?})", self.term),
            State::Follower(FollowerState {
                leader: Some(leader_id),
                ..
            }) => write!(f, "Follower(Term={:?}, Leader={:?})", self.term, leader_id),
            State::Follower(FollowerState { leader: None, .. }) => {
                write!(f, "Follower(Term={:?}, Leader=None)", self.term)
            }
        }
    }
}

enum State {
    Leader(LeaderState),
    Candidate(CandidateState),
    Follower(FollowerState),
}

struct LeaderState {
    tracker: LeaderStateTracker,
}

struct CandidateState {
    received_votes_from: HashSet<ReplicaId>,
    _election_timer: ElectionTimerHandle,
}

struct FollowerState {
    leader: Option<ReplicaId>,
    election_timer: ElectionTimerHandle,
}

impl LeaderState {
    fn new(
        peer_ids: HashSet<ReplicaId>,
        latest_log_index: Option<Index>,
        heartbeat_duration: Duration,
        actor_client: WeakActorClient,
        term: Term,
    ) -> Self {
        let mut peer_state = HashMap::with_capacity(peer_ids.len());
        for peer_id in peer_ids {
            let heartbeat_timer =
                HeartbeatTimerHandle::spawn_timer_task(heartbeat_duration, actor_client.clone(), peer_id.clone(), term);
            peer_state.insert(peer_id, PeerState::new(heartbeat_timer, latest_log_index));
        }

        Self {
            tracker: LeaderStateTracker::new(peer_state),
        }
    }
}

impl CandidateState {
    fn new(config: &ElectionConfig, actor_client: WeakActorClient, term: Term) -> Self {
        Self {
            received_votes_from: HashSet::with_capacity(3),
            _election_timer: ElectionTimerHandle::spawn_timer_task(
                config.follower_min_timeout,
                config.follower_max_timeout,
                actor_client,
                term,
            ),
        }
    }

    /// `add_received_vote()` returns the number of unique votes we've received after adding the
    /// provided `vote_from`
    fn add_received_vote(&mut self, vote_from: ReplicaId) -> usize {
        self.received_votes_from.insert(vote_from);
        self.received_votes_from.len()
    }
}

impl FollowerState {
    fn new(leader: Option<ReplicaId>, config: &ElectionConfig, actor_client: WeakActorClient, term: Term) -> Self {
        Self {
            leader,
            election_timer: ElectionTimerHandle::spawn_timer_task(
                config.follower_min_timeout,
                config.follower_max_timeout,
                actor_client,
                term,
            ),
        }
    }

    fn reset_timeout(&self) {
        self.election_timer.reset_timeout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;

    fn create(observers: Vec<Arc<dyn LeadershipObserver>>) -> (ElectionState, ElectionStateChangeListener, ActorClient) {
        let (actor_client, _rx) = ActorClient::new(10);
        let config = ElectionConfig {
            my_replica_id: ReplicaId::new("me"),
            leader_heartbeat_duration: Duration::from_secs(60),
            follower_min_timeout: Duration::from_secs(600),
            follower_max_timeout: Duration::from_secs(700),
        };
        let (state, listener) = ElectionState::new_follower(config, actor_client.weak(), Term::new(0), observers);
        (state, listener, actor_client)
    }

    #[tokio::test]
    async fn candidate_steps_down_on_leader_contact() {
        let (mut state, listener, _client) = create(vec![]);
        state.transition_to_candidate_and_vote_for_self(Term::new(1));
        assert_eq!(state.current_leader(), CurrentLeader::Unknown);
        assert_eq!(state.add_vote_if_candidate(ReplicaId::new("me")), Some(1));
        assert_eq!(state.add_vote_if_candidate(ReplicaId::new("peer-1")), Some(2));

        state.observe_leader(Term::new(1), &ReplicaId::new("peer-2"));
        assert_eq!(state.current_leader(), CurrentLeader::Other(ReplicaId::new("peer-2")));
        assert_eq!(state.add_vote_if_candidate(ReplicaId::new("peer-3")), None);
        assert_eq!(
            listener.latest(),
            ElectionStateChange {
                term: Term::new(1),
                state: ElectionStateSnapshot::Follower(ReplicaId::new("peer-2")),
            }
        );
    }

    #[tokio::test]
    async fn follower_keeps_first_observed_leader() {
        let (mut state, _listener, _client) = create(vec![]);
        state.observe_leader(Term::new(0), &ReplicaId::new("a"));
        state.observe_leader(Term::new(0), &ReplicaId::new("b"));
        assert_eq!(state.current_state(), ElectionStateSnapshot::Follower(ReplicaId::new("a")));
    }

    #[tokio::test]
    async fn leader_state_exists_only_while_leader() {
        let (mut state, _listener, _client) = create(vec![]);
        assert!(state.leader_state().is_none());

        let peers = vec![ReplicaId::new("p1"), ReplicaId::new("p2")].into_iter().collect();
        state.transition_to_leader(Term::new(3), peers, Some(Index::new(4)));
        assert!(state.is_leader());
        assert_eq!(state.current_leader(), CurrentLeader::Me);
        assert_eq!(state.leader_state().map(|ls| ls.idle_peer_ids().len()), Some(2));

        state.transition_to_follower(Term::new(4), None);
        assert!(state.leader_state_mut().is_none());
        assert_eq!(format!("{:?}", state), "Follower(Term=4, Leader=None)");
    }
}
