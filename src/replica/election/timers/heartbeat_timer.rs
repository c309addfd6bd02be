use crate::actor::WeakActorClient;
use crate::replica::election::timers::clock::{Clock, RealClock};
use crate::replica::election::timers::handoff::WakeTime;
use crate::replica::{HeartbeatTick, ReplicaId, Term};
use std::sync::{Arc, Weak};
use tokio::time::Duration;

/// HeartbeatTimerHandle is held by a leader, one per peer, for a single term.
pub(crate) struct HeartbeatTimerHandle<C: Clock = RealClock> {
    shared: Arc<Shared<C>>,
}

struct Shared<C: Clock> {
    heartbeat_duration: Duration,
    next_heartbeat_time: WakeTime,
    clock: C,
}

struct HeartbeatTimerTask<C: Clock> {
    weak_shared: Weak<Shared<C>>,
    next_heartbeat_time: WakeTime,
    actor_client: WeakActorClient,
    tick: HeartbeatTick,
    clock: C,
}

impl HeartbeatTimerHandle {
    pub(crate) fn spawn_timer_task(
        heartbeat_duration: Duration,
        actor_client: WeakActorClient,
        peer_id: ReplicaId,
        term: Term,
    ) -> Self {
        let (task, handle) = HeartbeatTimerTask::new(heartbeat_duration, actor_client, peer_id, term, RealClock);
        tokio::task::spawn(task.run());

        handle
    }
}

impl<C: Clock + Send + Sync + 'static> HeartbeatTimerHandle<C> {
    /// Postpone the next heartbeat, because we just sent this peer an AppendEntries.
    pub(crate) fn reset_heartbeat_timer(&self) {
        self.shared.reset_heartbeat_timer();
    }
}

impl<C: Clock> Shared<C> {
    fn reset_heartbeat_timer(&self) {
        self.next_heartbeat_time
            .replace(self.clock.now() + self.heartbeat_duration);
    }
}

impl<C: Clock> HeartbeatTimerTask<C> {
    fn new(
        heartbeat_duration: Duration,
        actor_client: WeakActorClient,
        peer_id: ReplicaId,
        term: Term,
        clock: C,
    ) -> (Self, HeartbeatTimerHandle<C>) {
        let wake_time = WakeTime::new();
        let shared = Arc::new(Shared {
            heartbeat_duration,
            next_heartbeat_time: wake_time.clone(),
            clock: clock.clone(),
        });

        let task = HeartbeatTimerTask {
            weak_shared: Arc::downgrade(&shared),
            next_heartbeat_time: wake_time,
            actor_client,
            tick: HeartbeatTick { peer_id, term },
            clock,
        };
        let handle = HeartbeatTimerHandle { shared };

        (task, handle)
    }

    async fn run(mut self) {
        // The wake time starts empty, so the first tick is published immediately. A newly
        // elected leader wants to assert itself to every peer ASAP.
        loop {
            match self.next_heartbeat_time.take() {
                Some(wake_time) => {
                    self.clock.sleep_until(wake_time).await;
                }
                None => {
                    let shared = match self.weak_shared.upgrade() {
                        Some(shared) => shared,
                        // No longer leader for this term.
                        None => return,
                    };

                    if self.actor_client.heartbeat_timer(self.tick.clone()).await.is_err() {
                        return;
                    }
                    shared.reset_heartbeat_timer();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::replica::election::timers::clock::mocked_clock;
    use crate::replica::election::timers::test_utils::TestUtilActor;

    fn expected_tick() -> HeartbeatTick {
        HeartbeatTick {
            peer_id: ReplicaId::new("peer-123"),
            term: Term::new(10),
        }
    }

    #[tokio::test]
    async fn heartbeat_timer_lifecycle() {
        // -- setup --
        let heartbeat = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (mock_clock, mut mock_clock_controller) = mocked_clock();

        // -- execute & verify --

        // 1. Spawn task, assert exactly one immediate event.
        let (timer_task, timer_handle) = HeartbeatTimerTask::new(
            heartbeat,
            strong_actor_client.weak(),
            expected_tick().peer_id,
            expected_tick().term,
            mock_clock,
        );
        let task_join_handle = tokio::task::spawn(timer_task.run());
        actor.assert_heartbeat_event(expected_tick()).await;
        actor.assert_no_event().await;

        // 2. One tick per heartbeat duration.
        for _ in 0..5 {
            mock_clock_controller.advance(heartbeat);
            actor.assert_heartbeat_event(expected_tick()).await;
            actor.assert_no_event().await;
        }

        // 3. A big leap still yields a single tick.
        mock_clock_controller.advance(heartbeat * 5);
        actor.assert_heartbeat_event(expected_tick()).await;
        actor.assert_no_event().await;

        // 4. Drop handle, task exits without sending more.
        drop(timer_handle);
        mock_clock_controller.advance(heartbeat);
        task_join_handle.await.unwrap();
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn heartbeat_timer_reset_postpones_tick() {
        // -- setup --
        let heartbeat = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (mock_clock, mut mock_clock_controller) = mocked_clock();

        let (timer_task, timer_handle) = HeartbeatTimerTask::new(
            heartbeat,
            strong_actor_client.weak(),
            expected_tick().peer_id,
            expected_tick().term,
            mock_clock,
        );
        tokio::task::spawn(timer_task.run());
        actor.assert_heartbeat_event(expected_tick()).await;

        // -- execute & verify --
        for _ in 0..5 {
            mock_clock_controller.advance(heartbeat / 2);
            timer_handle.reset_heartbeat_timer();
        }
        actor.assert_no_event().await;
        assert_eq!(mock_clock_controller.elapsed_time(), heartbeat * 5 / 2);

        // Due at T=3.5.
        mock_clock_controller.advance(heartbeat / 2);
        actor.assert_no_event().await;
        mock_clock_controller.advance(heartbeat / 2);
        actor.assert_heartbeat_event(expected_tick()).await;
    }
}
