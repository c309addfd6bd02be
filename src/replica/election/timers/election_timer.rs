use crate::actor::WeakActorClient;
use crate::replica::election::timers::clock::{Clock, RealClock};
use crate::replica::election::timers::handoff::{self, WakeTime};
use crate::replica::{ElectionTimeoutTick, Term};
use rand::Rng;
use std::ops::RangeInclusive;
use tokio::time::{Duration, Instant};

/// ElectionTimerHandle is held by a follower or candidate for a single term. Dropping it stops
/// the timer task.
pub(crate) struct ElectionTimerHandle<C: Clock = RealClock> {
    next_wake_time: WakeTime,
    timeout_range: RangeInclusive<Duration>,
    clock: C,
    _to_drop: handoff::Stopper,
}

struct ElectionTimerTask<C: Clock> {
    next_wake_time: WakeTime,
    actor_client: WeakActorClient,
    tick: ElectionTimeoutTick,
    clock: C,
    stop_check: handoff::StopCheck,
    // Static wait between consecutive timeouts delivered to the actor, while nothing resets us.
    timeout_backoff: Duration,
}

impl ElectionTimerHandle {
    pub(crate) fn spawn_timer_task(
        min_timeout: Duration,
        max_timeout: Duration,
        actor_client: WeakActorClient,
        term: Term,
    ) -> Self {
        let (task, handle) = ElectionTimerTask::new(min_timeout, max_timeout, actor_client, term, RealClock);
        tokio::task::spawn(task.run());

        handle
    }
}

impl<C: Clock + Send + Sync + 'static> ElectionTimerHandle<C> {
    /// Push the timeout back by a fresh random duration. Called on valid leader contact and on
    /// granting a vote.
    pub(crate) fn reset_timeout(&self) {
        self.next_wake_time.replace(self.random_wake_time());
    }

    fn random_wake_time(&self) -> Instant {
        let rand_timeout = rand::thread_rng().gen_range(self.timeout_range.clone());
        self.clock.now() + rand_timeout
    }
}

impl<C: Clock + Send + Sync + 'static> ElectionTimerTask<C> {
    fn new(
        min_timeout: Duration,
        max_timeout: Duration,
        actor_client: WeakActorClient,
        term: Term,
        clock: C,
    ) -> (Self, ElectionTimerHandle<C>) {
        let wake_time = WakeTime::new();
        let (stopper, stop_check) = handoff::stop_signal();

        let task = ElectionTimerTask {
            next_wake_time: wake_time.clone(),
            actor_client,
            tick: ElectionTimeoutTick { term },
            clock: clock.clone(),
            stop_check,
            timeout_backoff: min_timeout,
        };
        let handle = ElectionTimerHandle {
            next_wake_time: wake_time,
            timeout_range: RangeInclusive::new(min_timeout, max_timeout),
            clock,
            _to_drop: stopper,
        };

        // A wake time must be present when the task starts, otherwise it fires immediately.
        handle.reset_timeout();

        (task, handle)
    }

    async fn run(mut self) {
        loop {
            match self.next_wake_time.take() {
                Some(wake_time) => {
                    self.clock.sleep_until(wake_time).await;
                }
                None => {
                    // Slept through the deadline without a reset. Keep firing (with backoff)
                    // until the replica moves on, since it may ignore a timeout it races with.
                    if self.stop_check.should_stop() {
                        return;
                    }
                    if self.actor_client.election_timeout(self.tick).await.is_err() {
                        return;
                    }
                    self.clock.sleep(self.timeout_backoff).await;
                }
            }

            // Handle dropped: we're no longer follower/candidate in this term.
            if self.stop_check.should_stop() {
                return;
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

    #[tokio::test]
    async fn election_timer_reset_and_timeout() {
        // -- setup --
        let timeout = Duration::from_millis(100);
        let term = Term::new(4);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (mock_clock, mut mock_clock_controller) = mocked_clock();

        // -- execute & verify --

        // 1. Spawn task, assert there is no event in the queue.
        let (timer_task, timer_handle) =
            ElectionTimerTask::new(timeout, timeout, strong_actor_client.weak(), term, mock_clock);
        tokio::task::spawn(timer_task.run());
        actor.assert_no_event().await;

        // 2. Keep resetting before the deadline, assert no event.
        for _ in 0..5 {
            mock_clock_controller.advance(timeout / 2);
            timer_handle.reset_timeout();
        }
        actor.assert_no_event().await;
        assert_eq!(mock_clock_controller.elapsed_time(), timeout * 5 / 2);

        // 3. Last reset was at T=2.5, so nothing before T=3.5.
        let one_ns = Duration::from_nanos(1);
        mock_clock_controller.advance(timeout - one_ns);
        actor.assert_no_event().await;

        // 4. Timeout at exactly T=3.5, tagged with the term the timer was armed in.
        mock_clock_controller.advance(one_ns);
        actor.assert_election_timeout_event(term).await;
    }

    #[tokio::test]
    async fn election_timer_refires_after_backoff() {
        let timeout = Duration::from_millis(100);
        let term = Term::new(1);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (mock_clock, mut mock_clock_controller) = mocked_clock();

        let (timer_task, _timer_handle) =
            ElectionTimerTask::new(timeout, timeout, strong_actor_client.weak(), term, mock_clock);
        tokio::task::spawn(timer_task.run());

        mock_clock_controller.advance(timeout);
        actor.assert_election_timeout_event(term).await;

        // Replica ignored it (e.g. empty log). Next one comes after the backoff.
        mock_clock_controller.advance(timeout / 2);
        actor.assert_no_event().await;
        mock_clock_controller.advance(timeout / 2);
        actor.assert_election_timeout_event(term).await;
    }

    #[tokio::test]
    async fn election_timer_handle_drop() {
        // -- setup --
        let timeout = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (mock_clock, mut mock_clock_controller) = mocked_clock();

        // -- execute --
        let (timer_task, timer_handle) =
            ElectionTimerTask::new(timeout, timeout, strong_actor_client.weak(), Term::new(1), mock_clock);
        let task_join_handle = tokio::task::spawn(timer_task.run());
        drop(timer_handle);

        // -- verify --
        mock_clock_controller.advance(timeout * 2);
        task_join_handle.await.unwrap();
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn election_timer_exits_when_actor_is_gone() {
        let timeout = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let (mock_clock, mut mock_clock_controller) = mocked_clock();

        let (timer_task, _timer_handle) =
            ElectionTimerTask::new(timeout, timeout, strong_actor_client.weak(), Term::new(1), mock_clock);
        let task_join_handle = tokio::task::spawn(timer_task.run());
        drop(strong_actor_client);
        drop(rx);

        mock_clock_controller.advance(timeout);
        task_join_handle.await.unwrap();
    }
}
