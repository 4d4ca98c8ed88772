//! Shared helpers for integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use forgeflow_pilot::clock::{CancelToken, Clock};
use forgeflow_pilot::monitor::Notifier;
use forgeflow_pilot::session::SessionController;
use forgeflow_types::{ForgeflowError, PilotConfig};

/// A controller call recorded by [`FakeSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Capture,
    Text(String),
    Confirm,
    Cancel,
    Delete(u32),
}

/// Replays scripted screens and records every successful call.
///
/// The session counts as alive while unread screens remain.
pub struct FakeSession {
    screens: RefCell<VecDeque<String>>,
    calls: RefCell<Vec<Call>>,
    failing_captures: Cell<u32>,
    failing_sends: Cell<u32>,
    failing_liveness: Cell<u32>,
}

impl FakeSession {
    pub fn new<I, T>(screens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            screens: RefCell::new(screens.into_iter().map(Into::into).collect()),
            calls: RefCell::new(Vec::new()),
            failing_captures: Cell::new(0),
            failing_sends: Cell::new(0),
            failing_liveness: Cell::new(0),
        }
    }

    /// Fail the next `n` captures with a transient session error.
    pub fn fail_captures(self, n: u32) -> Self {
        self.failing_captures.set(n);
        self
    }

    /// Fail the next `n` input calls (text, Enter, cancel, delete) with a
    /// transient session error. Failed calls are not recorded.
    pub fn fail_sends(self, n: u32) -> Self {
        self.failing_sends.set(n);
        self
    }

    /// Fail the next `n` liveness checks with a transient session error.
    pub fn fail_liveness(self, n: u32) -> Self {
        self.failing_liveness.set(n);
        self
    }

    fn take_failure(counter: &Cell<u32>, message: &str) -> Result<(), ForgeflowError> {
        let failing = counter.get();
        if failing > 0 {
            counter.set(failing - 1);
            return Err(ForgeflowError::Session(message.into()));
        }
        Ok(())
    }

    fn input(&self, call: Call) -> Result<(), ForgeflowError> {
        Self::take_failure(&self.failing_sends, "pane busy")?;
        self.calls.borrow_mut().push(call);
        Ok(())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Recorded calls other than captures.
    pub fn inputs(&self) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| **c != Call::Capture)
            .cloned()
            .collect()
    }

    pub fn capture_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| **c == Call::Capture)
            .count()
    }
}

impl SessionController for FakeSession {
    fn capture(&self, _styled: bool) -> Result<String, ForgeflowError> {
        self.calls.borrow_mut().push(Call::Capture);
        Self::take_failure(&self.failing_captures, "can't find pane")?;
        self.screens
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| ForgeflowError::Session("no more screens".into()))
    }

    fn send_text(&self, text: &str) -> Result<(), ForgeflowError> {
        self.input(Call::Text(text.to_string()))
    }

    fn send_confirm(&self) -> Result<(), ForgeflowError> {
        self.input(Call::Confirm)
    }

    fn send_cancel(&self) -> Result<(), ForgeflowError> {
        self.input(Call::Cancel)
    }

    fn send_delete(&self, count: u32) -> Result<(), ForgeflowError> {
        self.input(Call::Delete(count))
    }

    fn is_alive(&self) -> Result<bool, ForgeflowError> {
        Self::take_failure(&self.failing_liveness, "server busy")?;
        Ok(!self.screens.borrow().is_empty())
    }
}

/// Simulated time: sleeping advances the clock instantly.
pub struct SimClock {
    base: Instant,
    offset: Cell<Duration>,
    sleeps: RefCell<Vec<Duration>>,
    cancel_at: Option<Duration>,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Cell::new(Duration::ZERO),
            sleeps: RefCell::new(Vec::new()),
            cancel_at: None,
        }
    }

    /// Fire the cancel token once simulated time reaches `at`.
    pub fn cancel_at(mut self, at: Duration) -> Self {
        self.cancel_at = Some(at);
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        self.sleeps.borrow_mut().push(duration);
        let offset = self.offset.get() + duration;
        self.offset.set(offset);
        if self.cancel_at.is_some_and(|at| offset >= at) {
            cancel.cancel();
            return false;
        }
        true
    }
}

/// Collects notifications instead of showing them.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: RefCell<Vec<(String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), ForgeflowError> {
        self.sent
            .borrow_mut()
            .push((title.to_string(), message.to_string()));
        Ok(())
    }
}

/// Loop settings with whole-second polls and no keystroke delays.
pub fn fast_config(poll_secs: f64, stall_secs: f64) -> PilotConfig {
    let mut config = PilotConfig {
        poll_interval_secs: poll_secs,
        stall_timeout_secs: stall_secs,
        settle_ms: 0,
        ..Default::default()
    };
    config.recovery.key_delay_ms = 0;
    config.retry.initial_backoff_ms = 10;
    config.retry.max_backoff_ms = 40;
    config
}
