#![allow(dead_code)]

use bytes::Bytes;
use raft_proxy::{
    RaftElectionEvent, RaftElectionObserver, RaftElectionState, RaftMemberInfo, RaftNode, RaftOptions, StateMachine,
    StateMachineOutput, Term,
};
use slog::Drain;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};

pub const HEARTBEAT: Duration = Duration::from_millis(20);
pub const MIN_TIMEOUT: Duration = Duration::from_millis(200);
pub const MAX_TIMEOUT: Duration = Duration::from_millis(400);

pub fn fast_options() -> RaftOptions {
    RaftOptions {
        leader_heartbeat_duration: Some(HEARTBEAT),
        follower_min_timeout: Some(MIN_TIMEOUT),
        follower_max_timeout: Some(MAX_TIMEOUT),
        leader_append_entries_timeout: Some(Duration::from_millis(100)),
        rpc_timeout: Some(Duration::from_millis(150)),
        ..RaftOptions::default()
    }
}

pub fn repl_id(i: usize) -> String {
    format!("replica-{}", i)
}

pub fn localhost(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub fn members(num_members: usize, raft_port_base: u16, app_port_base: u16) -> Vec<RaftMemberInfo> {
    (0..num_members)
        .map(|i| RaftMemberInfo {
            replica_id: repl_id(i),
            raft_addr: localhost(raft_port_base + i as u16),
            app_addr: localhost(app_port_base + i as u16),
        })
        .collect()
}

pub fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog::LevelFilter::new(drain, slog::Level::Info).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}

/// Echoes every command back, and remembers what it applied.
pub struct RecordingStateMachine {
    applied: Arc<Mutex<Vec<Bytes>>>,
}

impl RecordingStateMachine {
    pub fn new() -> (Self, Arc<Mutex<Vec<Bytes>>>) {
        let applied = Arc::new(Mutex::new(Vec::new()));
        (
            RecordingStateMachine {
                applied: applied.clone(),
            },
            applied,
        )
    }
}

impl StateMachine for RecordingStateMachine {
    fn apply(&mut self, command: Bytes) -> StateMachineOutput {
        self.applied.lock().unwrap().push(command.clone());
        StateMachineOutput::Data(command)
    }
}

/// Records every election transition of every node it's attached to.
#[derive(Clone, Default)]
pub struct ElectionRecorder {
    leaders_by_term: Arc<Mutex<HashMap<Term, HashSet<String>>>>,
}

pub struct ElectionRecorderHandle {
    replica_id: String,
    recorder: ElectionRecorder,
}

impl ElectionRecorder {
    pub fn observer(&self, replica_id: String) -> Arc<dyn RaftElectionObserver> {
        Arc::new(ElectionRecorderHandle {
            replica_id,
            recorder: self.clone(),
        })
    }

    /// Panics if any term ever had two leaders.
    pub fn assert_election_safety(&self) {
        for (term, leaders) in self.leaders_by_term.lock().unwrap().iter() {
            assert!(leaders.len() <= 1, "Term {:?} had multiple leaders: {:?}", term, leaders);
        }
    }

    pub fn leaders_after(&self, term: Term) -> HashSet<String> {
        self.leaders_by_term
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| **t > term)
            .flat_map(|(_, leaders)| leaders.iter().cloned())
            .collect()
    }
}

impl RaftElectionObserver for ElectionRecorderHandle {
    fn on_election_event(&self, event: &RaftElectionEvent) {
        if event.state == RaftElectionState::Leader {
            self.recorder
                .leaders_by_term
                .lock()
                .unwrap()
                .entry(event.term)
                .or_default()
                .insert(self.replica_id.clone());
        }
    }
}

/// The single leader among `indexes`, once every one of them agrees on it for the same term.
pub fn stable_leader(nodes: &[Option<RaftNode>], indexes: &[usize]) -> Option<(usize, Term)> {
    let states: Vec<(usize, RaftElectionEvent)> = indexes
        .iter()
        .filter_map(|i| nodes[*i].as_ref().map(|n| (*i, n.election_state())))
        .collect();

    let leaders: Vec<&(usize, RaftElectionEvent)> = states
        .iter()
        .filter(|(_, e)| e.state == RaftElectionState::Leader)
        .collect();
    if leaders.len() != 1 {
        return None;
    }
    let (leader, leader_event) = leaders[0];
    let leader_id = repl_id(*leader);

    let all_follow = states.iter().all(|(i, e)| {
        i == leader
            || (e.term == leader_event.term
                && matches!(&e.state, RaftElectionState::Follower(f) if f.leader_replica_id == leader_id))
    });
    if all_follow {
        Some((*leader, leader_event.term))
    } else {
        None
    }
}

pub async fn wait_for_stable_leader(
    nodes: &[Option<RaftNode>],
    indexes: &[usize],
    timeout: Duration,
) -> (usize, Term) {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(found) = stable_leader(nodes, indexes) {
            return found;
        }
        assert!(Instant::now() < deadline, "No stable leader among {:?} within {:?}", indexes, timeout);
        tokio::time::sleep(HEARTBEAT).await;
    }
}

/// Polls `condition` until it holds, or panics with `what` after `timeout`.
pub async fn eventually<F, Fut>(what: &str, timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return;
        }
        assert!(Instant::now() < deadline, "Timed out waiting for: {}", what);
        tokio::time::sleep(HEARTBEAT).await;
    }
}

pub fn has_applied(applied: &Arc<Mutex<Vec<Bytes>>>, data: &Bytes) -> bool {
    applied.lock().unwrap().contains(data)
}
