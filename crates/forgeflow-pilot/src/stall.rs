//! Stall detection for a busy assistant.
//!
//! Tracks how long the assistant has stayed busy (`Processing` or `Unknown`)
//! without the loop making progress. The timer resets on edges only: when
//! the assistant becomes busy after being idle, when it leaves the busy
//! state, and after any action the loop performs. Seeing `Processing` again
//! on the next poll does not reset it; otherwise an assistant stuck on a
//! spinner would never time out.
//!
//! A long run of `Unknown` polls means the classifier itself is failing,
//! so it triggers recovery early.

use std::time::{Duration, Instant};

use crate::adapter::Classification;

/// Why a recovery is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallReason {
    /// Busy for longer than the stall timeout.
    Timeout { elapsed: Duration },
    /// Too many consecutive `Unknown` classifications.
    UnknownStreak { polls: u32 },
}

/// Outcome of recording one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallCheck {
    /// The assistant is idle; the loop will act on the prompt.
    Idle,
    /// Busy, but within limits.
    Waiting,
    /// Run the recovery sequence.
    Stalled(StallReason),
}

/// Edge-triggered stall timer.
pub struct StallTimer {
    timeout: Duration,
    max_unknown_polls: u32,
    last_reset: Instant,
    busy: bool,
    unknown_streak: u32,
}

impl StallTimer {
    /// `max_unknown_polls` of zero disables early recovery on `Unknown`.
    pub fn new(timeout: Duration, max_unknown_polls: u32, now: Instant) -> Self {
        Self {
            timeout,
            max_unknown_polls,
            last_reset: now,
            busy: false,
            unknown_streak: 0,
        }
    }

    /// Record the classification of a capture taken at `now`.
    pub fn observe(&mut self, state: &Classification, now: Instant) -> StallCheck {
        let busy = matches!(state, Classification::Processing | Classification::Unknown);

        if !busy {
            if self.busy {
                self.last_reset = now;
            }
            self.busy = false;
            self.unknown_streak = 0;
            return StallCheck::Idle;
        }

        if !self.busy {
            self.busy = true;
            self.last_reset = now;
        }

        if matches!(state, Classification::Unknown) {
            self.unknown_streak += 1;
        } else {
            self.unknown_streak = 0;
        }

        let elapsed = self.elapsed(now);
        if elapsed > self.timeout {
            return StallCheck::Stalled(StallReason::Timeout { elapsed });
        }
        if self.max_unknown_polls > 0 && self.unknown_streak > self.max_unknown_polls {
            return StallCheck::Stalled(StallReason::UnknownStreak {
                polls: self.unknown_streak,
            });
        }
        StallCheck::Waiting
    }

    /// Restart the timer after the loop acted on the session.
    pub fn reset(&mut self, now: Instant) {
        self.last_reset = now;
        self.unknown_streak = 0;
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_reset)
    }

    pub fn unknown_streak(&self) -> u32 {
        self.unknown_streak
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn continuous_processing_times_out_once() {
        let start = Instant::now();
        let mut timer = StallTimer::new(secs(5), 0, start);

        let mut stalls = 0;
        for t in 0..=6 {
            let now = start + secs(t);
            if let StallCheck::Stalled(reason) = timer.observe(&Classification::Processing, now) {
                assert_eq!(reason, StallReason::Timeout { elapsed: secs(6) });
                stalls += 1;
                timer.reset(now);
            }
        }
        assert_eq!(stalls, 1);
    }

    #[test]
    fn repeated_processing_does_not_reset() {
        let start = Instant::now();
        let mut timer = StallTimer::new(secs(5), 0, start);
        timer.observe(&Classification::Processing, start);
        timer.observe(&Classification::Processing, start + secs(3));
        assert_eq!(timer.elapsed(start + secs(4)), secs(4));
    }

    #[test]
    fn entering_busy_resets() {
        let start = Instant::now();
        let mut timer = StallTimer::new(secs(5), 0, start);
        assert_eq!(
            timer.observe(&Classification::AwaitingInput, start + secs(100)),
            StallCheck::Idle
        );
        assert_eq!(
            timer.observe(&Classification::Processing, start + secs(200)),
            StallCheck::Waiting
        );
        assert_eq!(timer.elapsed(start + secs(201)), secs(1));
    }

    #[test]
    fn leaving_busy_resets() {
        let start = Instant::now();
        let mut timer = StallTimer::new(secs(5), 0, start);
        timer.observe(&Classification::Processing, start);
        timer.observe(&Classification::AwaitingInput, start + secs(4));
        assert_eq!(timer.elapsed(start + secs(4)), Duration::ZERO);
    }

    #[test]
    fn processing_and_unknown_share_one_busy_period() {
        let start = Instant::now();
        let mut timer = StallTimer::new(secs(5), 0, start);
        timer.observe(&Classification::Processing, start);
        timer.observe(&Classification::Unknown, start + secs(3));
        assert!(matches!(
            timer.observe(&Classification::Processing, start + secs(6)),
            StallCheck::Stalled(StallReason::Timeout { .. })
        ));
    }

    #[test]
    fn unknown_streak_escalates_early() {
        let start = Instant::now();
        let mut timer = StallTimer::new(secs(1000), 3, start);
        for t in 0..3 {
            assert_eq!(
                timer.observe(&Classification::Unknown, start + secs(t)),
                StallCheck::Waiting
            );
        }
        assert_eq!(
            timer.observe(&Classification::Unknown, start + secs(3)),
            StallCheck::Stalled(StallReason::UnknownStreak { polls: 4 })
        );
        timer.reset(start + secs(3));
        assert_eq!(timer.unknown_streak(), 0);
    }

    #[test]
    fn processing_breaks_unknown_streak() {
        let start = Instant::now();
        let mut timer = StallTimer::new(secs(1000), 2, start);
        timer.observe(&Classification::Unknown, start);
        timer.observe(&Classification::Unknown, start);
        timer.observe(&Classification::Processing, start);
        assert_eq!(timer.unknown_streak(), 0);
        assert_eq!(timer.observe(&Classification::Unknown, start), StallCheck::Waiting);
    }
}
