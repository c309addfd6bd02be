//! Small primitives shared between a timer handle (held by the replica) and its spawned task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// WakeTime is the next deadline a handle has requested. The task takes it when it wakes up, so
/// an empty slot means "nobody pushed the deadline back while I slept".
#[derive(Clone, Default)]
pub(super) struct WakeTime {
    slot: Arc<Mutex<Option<Instant>>>,
}

impl WakeTime {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn replace(&self, wake_time: Instant) {
        self.slot
            .lock()
            .expect("WakeTime.replace() mutex guard poison")
            .replace(wake_time);
    }

    pub(super) fn take(&self) -> Option<Instant> {
        self.slot.lock().expect("WakeTime.take() mutex guard poison").take()
    }
}

/// Stopper flips the shared flag when dropped. Held by a timer handle.
pub(super) struct Stopper {
    stop_signal: Arc<AtomicBool>,
}

/// StopCheck is held by the timer task.
pub(super) struct StopCheck {
    stop_signal: Arc<AtomicBool>,
}

impl Drop for Stopper {
    fn drop(&mut self) {
        self.stop_signal.store(true, Ordering::Release);
    }
}

impl StopCheck {
    pub(super) fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::Acquire)
    }
}

pub(super) fn stop_signal() -> (Stopper, StopCheck) {
    let stop_signal = Arc::new(AtomicBool::new(false));

    let stopper = Stopper {
        stop_signal: stop_signal.clone(),
    };
    let stop_check = StopCheck { stop_signal };

    (stopper, stop_check)
}
