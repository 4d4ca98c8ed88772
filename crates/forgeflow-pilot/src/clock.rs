//! Time source and cancellation for the polling loops.
//!
//! The loops never call `Instant::now()` or `thread::sleep` directly, so
//! tests can drive them with a simulated clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often an interruptible sleep checks for cancellation.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// A shared stop flag, set from a signal handler or another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Source of the current time and of interruptible waits.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Wait for `duration`, returning early if `cancel` fires.
    ///
    /// Returns `false` when the wait was cut short by cancellation.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// Wall-clock time with sliced sleeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        // A wait too long to represent as an Instant lasts until cancelled.
        let deadline = Instant::now().checked_add(duration);
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            let slice = match deadline {
                Some(deadline) if now >= deadline => return true,
                Some(deadline) => (deadline - now).min(SLEEP_SLICE),
                None => SLEEP_SLICE,
            };
            std::thread::sleep(slice);
        }
    }
}
