//! The automation loop.
//!
//! Each iteration captures the screen, classifies it through the adapter,
//! decides what to do, acts, and sleeps for the poll interval:
//!
//! - pending text in the input box: press Enter only, without consulting the
//!   rule policy
//! - idle prompt: evaluate the rule policy and send its command, or stop
//! - processing / unknown: wait, and run the recovery sequence once the
//!   [`StallTimer`] says the assistant is stuck
//!
//! There is one action in flight at most. The next capture is taken only
//! after the previous action has been handed to the session. Cancellation is
//! observed at every sleep, and no controller call is started once it has
//! been seen. A controller call whose retries are cut short by cancellation
//! ends the run as [`Outcome::Cancelled`], not as an error.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use forgeflow_types::{ForgeflowError, PilotConfig};

use crate::adapter::{classify, Classification, CliAdapter};
use crate::clock::{CancelToken, Clock};
use crate::retry::with_retry;
use crate::rules::{Action, RulePolicy};
use crate::screen::ScreenCapture;
use crate::session::SessionController;
use crate::stall::{StallCheck, StallReason, StallTimer};

/// Longest command prefix written to the log.
const LOG_COMMAND_CHARS: usize = 120;

/// Why the loop stopped. Every variant is a normal exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A rule chose to terminate.
    PolicyTerminated,
    /// The assistant process is gone.
    ProcessExited,
    /// The cancel token fired.
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::PolicyTerminated => "rule policy requested termination",
            Outcome::ProcessExited => "assistant process exited",
            Outcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Counters collected during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutomationStats {
    /// Screens captured.
    pub polls: u64,
    /// Commands injected, including recovery continuations.
    pub commands_sent: u64,
    /// Enter presses for text already in the input box.
    pub confirms_sent: u64,
    /// Recovery sequences run.
    pub recoveries: u64,
    /// Captures classified as `Unknown`.
    pub unknown_polls: u64,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationReport {
    pub outcome: Outcome,
    pub stats: AutomationStats,
}

/// Whether the loop may keep going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Cancelled,
}

/// What one poll decided.
enum Step {
    Continue(Flow),
    Stop(Outcome),
}

/// Per-run state shared by the loop's steps.
struct Automation<'a, S: ?Sized, A: ?Sized, C: ?Sized> {
    session: &'a S,
    adapter: &'a mut A,
    config: &'a PilotConfig,
    clock: &'a C,
    cancel: &'a CancelToken,
    stats: AutomationStats,
}

impl<S, A, C> Automation<'_, S, A, C>
where
    S: SessionController + ?Sized,
    A: CliAdapter + ?Sized,
    C: Clock + ?Sized,
{
    fn retry<T>(
        &self,
        operation: &str,
        op: impl FnMut() -> Result<T, ForgeflowError>,
    ) -> Result<T, ForgeflowError> {
        with_retry(operation, &self.config.retry, self.clock, self.cancel, op)
    }

    fn pause(&self, duration: Duration) -> Flow {
        if self.clock.sleep(duration, self.cancel) {
            Flow::Continue
        } else {
            Flow::Cancelled
        }
    }

    fn capture(&self) -> Result<ScreenCapture, ForgeflowError> {
        let styled = self.adapter.wants_styled_capture();
        let raw = self.retry("capture", || self.session.capture(styled))?;
        Ok(ScreenCapture::new(raw, styled))
    }

    /// Inject `command`, wait for the input to settle, then press Enter.
    fn send_command(&mut self, command: &str) -> Result<Flow, ForgeflowError> {
        let command = self.adapter.rewrite_command(command);
        info!(
            command = %truncate(&command, LOG_COMMAND_CHARS),
            "sending command"
        );

        self.retry("send text", || self.session.send_text(&command))?;
        if self.pause(Duration::from_millis(self.config.settle_ms)) == Flow::Cancelled {
            return Ok(Flow::Cancelled);
        }
        self.retry("send confirm", || self.session.send_confirm())?;
        self.stats.commands_sent += 1;
        Ok(Flow::Continue)
    }

    fn confirm_pending(&mut self, pending: &str) -> Result<(), ForgeflowError> {
        info!(
            pending = %truncate(pending, LOG_COMMAND_CHARS),
            "input line already has text, sending Enter"
        );
        self.retry("send confirm", || self.session.send_confirm())?;
        self.stats.confirms_sent += 1;
        Ok(())
    }

    /// Cancel, clear the input line, and send the continuation command.
    ///
    /// Not verified here; the next capture shows whether it worked.
    fn recover(&mut self, reason: StallReason) -> Result<Flow, ForgeflowError> {
        match reason {
            StallReason::Timeout { elapsed } => warn!(
                elapsed_secs = elapsed.as_secs(),
                "assistant stalled, running recovery"
            ),
            StallReason::UnknownStreak { polls } => warn!(
                unknown_polls = polls,
                "screen unrecognized for too long, running recovery"
            ),
        }
        self.stats.recoveries += 1;

        let config = self.config;
        let recovery = &config.recovery;
        let key_delay = Duration::from_millis(recovery.key_delay_ms);

        self.retry("send cancel", || self.session.send_cancel())?;
        if self.pause(key_delay) == Flow::Cancelled {
            return Ok(Flow::Cancelled);
        }
        self.retry("send delete", || self.session.send_delete(recovery.delete_count))?;
        if self.pause(key_delay) == Flow::Cancelled {
            return Ok(Flow::Cancelled);
        }
        self.send_command(&recovery.continuation)
    }

    fn run(&mut self, policy: &RulePolicy) -> Result<Outcome, ForgeflowError> {
        let poll_interval = self.config.poll_interval();
        let mut stall = StallTimer::new(
            self.config.stall_timeout(),
            self.config.max_unknown_polls,
            self.clock.now(),
        );

        loop {
            let flow = match self.step(policy, &mut stall) {
                Ok(Step::Continue(flow)) => flow,
                Ok(Step::Stop(outcome)) => return Ok(outcome),
                // A retry cut short by cancellation hands back its last
                // transient error.
                Err(e) if e.is_transient() && self.cancel.is_cancelled() => {
                    debug!(error = %e, "controller call interrupted by cancellation");
                    return Ok(Outcome::Cancelled);
                }
                Err(e) => return Err(e),
            };

            if flow == Flow::Cancelled || self.pause(poll_interval) == Flow::Cancelled {
                return Ok(Outcome::Cancelled);
            }
        }
    }

    /// One poll: check liveness, capture, classify, act.
    fn step(
        &mut self,
        policy: &RulePolicy,
        stall: &mut StallTimer,
    ) -> Result<Step, ForgeflowError> {
        if self.cancel.is_cancelled() {
            return Ok(Step::Stop(Outcome::Cancelled));
        }
        if !self.retry("liveness check", || self.session.is_alive())? {
            info!("session process is gone");
            return Ok(Step::Stop(Outcome::ProcessExited));
        }

        let capture = self.capture()?;
        self.stats.polls += 1;
        let text = capture.classification_text();
        let state = classify(&*self.adapter, &text);
        debug!(state = state.label(), "classified capture");

        let check = stall.observe(&state, self.clock.now());
        let unknown = state == Classification::Unknown;
        let flow = match state {
            Classification::AwaitingInputWithText(pending) => {
                self.confirm_pending(&pending)?;
                stall.reset(self.clock.now());
                Flow::Continue
            }
            Classification::AwaitingInput => {
                // Rules match what a reader sees, never escape codes.
                let (action, description) = policy.evaluate(&capture.plain())?;
                if let Some(description) = description {
                    info!(rule = description, "rule matched");
                }
                match action {
                    Action::Terminate => {
                        info!("no more commands to execute, stopping");
                        return Ok(Step::Stop(Outcome::PolicyTerminated));
                    }
                    Action::Send(command) => {
                        let flow = self.send_command(command)?;
                        stall.reset(self.clock.now());
                        flow
                    }
                }
            }
            Classification::Processing | Classification::Unknown => {
                if unknown {
                    self.stats.unknown_polls += 1;
                    if !self.adapter.is_program_alive(&text) {
                        info!(adapter = self.adapter.name(), "assistant no longer on screen");
                        return Ok(Step::Stop(Outcome::ProcessExited));
                    }
                    info!(
                        streak = stall.unknown_streak(),
                        "screen not recognized, waiting"
                    );
                } else {
                    debug!(
                        elapsed_secs = stall.elapsed(self.clock.now()).as_secs(),
                        "assistant is processing, waiting"
                    );
                }

                match check {
                    StallCheck::Stalled(reason) => {
                        let flow = self.recover(reason)?;
                        stall.reset(self.clock.now());
                        flow
                    }
                    StallCheck::Idle | StallCheck::Waiting => Flow::Continue,
                }
            }
        };
        Ok(Step::Continue(flow))
    }
}

/// Drive `session` until the policy terminates, the assistant exits, or
/// `cancel` fires.
///
/// Only resource exhaustion (a controller call still failing after its
/// retries), a policy that matches nothing, and invalid configuration are
/// errors.
pub fn run<S, A, C>(
    session: &S,
    adapter: &mut A,
    policy: &RulePolicy,
    config: &PilotConfig,
    clock: &C,
    cancel: &CancelToken,
) -> Result<AutomationReport, ForgeflowError>
where
    S: SessionController + ?Sized,
    A: CliAdapter + ?Sized,
    C: Clock + ?Sized,
{
    config.validate()?;

    info!(
        adapter = adapter.name(),
        poll_interval_secs = config.poll_interval_secs,
        stall_timeout_secs = config.stall_timeout_secs,
        rules = policy.len(),
        "automation started"
    );

    let mut automation = Automation {
        session,
        adapter,
        config,
        clock,
        cancel,
        stats: AutomationStats::default(),
    };
    let outcome = automation.run(policy);
    let stats = automation.stats;

    match &outcome {
        Ok(outcome) => info!(
            %outcome,
            polls = stats.polls,
            commands = stats.commands_sent,
            recoveries = stats.recoveries,
            "automation finished"
        ),
        Err(e) => warn!(error = %e, polls = stats.polls, "automation failed"),
    }

    outcome.map(|outcome| AutomationReport { outcome, stats })
}

/// Truncate to at most `max` characters, marking the cut.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
