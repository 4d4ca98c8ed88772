//! Watch a session without driving it, and notify when a task finishes.
//!
//! Monitor mode never injects input. It tracks the processing marker and
//! sends one notification once the assistant has been idle for
//! [`NO_PROCESSING_THRESHOLD`] consecutive polls after a processing period.
//! Nothing is sent if processing was never seen, and the watch re-arms when
//! processing starts again.

use tracing::{debug, info, warn};

use forgeflow_types::{ForgeflowError, PilotConfig};

use crate::adapter::CliAdapter;
use crate::clock::{CancelToken, Clock};
use crate::retry::with_retry;
use crate::screen::ScreenCapture;
use crate::session::SessionController;

/// Consecutive non-processing polls that mean a task has finished.
pub const NO_PROCESSING_THRESHOLD: u32 = 3;

/// Notification title.
const NOTIFY_TITLE: &str = "ForgeFlow";

/// Delivers desktop (or other) notifications.
pub trait Notifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), ForgeflowError>;
}

/// A state change reported by [`TaskWatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The assistant started processing.
    Started,
    /// The assistant stopped processing long enough to call the task done.
    Finished,
}

/// Processing-edge tracker used by monitor mode.
#[derive(Debug, Default)]
pub struct TaskWatch {
    active: bool,
    idle_polls: u32,
}

impl TaskWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record whether the latest capture shows processing.
    pub fn observe(&mut self, processing: bool) -> Option<WatchEvent> {
        if processing {
            self.idle_polls = 0;
            if !self.active {
                self.active = true;
                return Some(WatchEvent::Started);
            }
            return None;
        }

        if !self.active {
            return None;
        }
        self.idle_polls += 1;
        if self.idle_polls >= NO_PROCESSING_THRESHOLD {
            self.active = false;
            self.idle_polls = 0;
            return Some(WatchEvent::Finished);
        }
        None
    }
}

/// Counters collected by [`run_monitor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub polls: u64,
    pub tasks_started: u64,
    pub notifications: u64,
}

/// Watch `session` until `cancel` fires or the session goes away.
///
/// `label` names the session in notification text. Notification failures
/// are logged and do not stop the watch.
pub fn run_monitor<S, A, C, N>(
    session: &S,
    adapter: &A,
    notifier: &N,
    label: &str,
    config: &PilotConfig,
    clock: &C,
    cancel: &CancelToken,
) -> Result<MonitorStats, ForgeflowError>
where
    S: SessionController + ?Sized,
    A: CliAdapter + ?Sized,
    C: Clock + ?Sized,
    N: Notifier + ?Sized,
{
    config.validate()?;
    let poll_interval = config.poll_interval();
    let styled = adapter.wants_styled_capture();
    let mut watch = TaskWatch::new();
    let mut stats = MonitorStats::default();

    info!(adapter = adapter.name(), session = label, "monitor mode started");

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let alive = match with_retry("liveness check", &config.retry, clock, cancel, || {
            session.is_alive()
        }) {
            Ok(alive) => alive,
            Err(_) if cancel.is_cancelled() => break,
            Err(e) => return Err(e),
        };
        if !alive {
            info!(session = label, "session is gone, stopping monitor");
            break;
        }

        let raw = match with_retry("capture", &config.retry, clock, cancel, || {
            session.capture(styled)
        }) {
            Ok(raw) => raw,
            Err(_) if cancel.is_cancelled() => break,
            Err(e) => return Err(e),
        };
        stats.polls += 1;

        let text = ScreenCapture::new(raw, styled).classification_text();
        match watch.observe(adapter.is_processing(&text)) {
            Some(WatchEvent::Started) => {
                stats.tasks_started += 1;
                info!("Task processing started");
            }
            Some(WatchEvent::Finished) => {
                info!(session = label, "task processing stopped, sending notification");
                let message = format!("Task finished in session {label}");
                match notifier.notify(NOTIFY_TITLE, &message) {
                    Ok(()) => stats.notifications += 1,
                    Err(e) => warn!(error = %e, "failed to send notification"),
                }
            }
            None => debug!("no change in processing state"),
        }

        if !clock.sleep(poll_interval, cancel) {
            break;
        }
    }

    info!(polls = stats.polls, notifications = stats.notifications, "monitor mode finished");
    Ok(stats)
}
