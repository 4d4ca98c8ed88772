//! Configuration types for a forgeflow run.
//!
//! [`ForgeflowConfig`] is the optional top-level file (`forgeflow.toml`).
//! Its `[pilot]` table is a [`PilotConfig`], which carries every tuning knob
//! of the automation loop. All fields have defaults so a partial file (or no
//! file at all) is valid.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ForgeflowError;

/// Default configuration file name.
pub const CONFIG_FILENAME: &str = "forgeflow.toml";

/// Default log file name.
pub const LOG_FILENAME: &str = "forgeflow.log";

/// Tuning parameters for the automation loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PilotConfig {
    /// Seconds to sleep between captures.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
    /// Seconds without progress before the recovery sequence runs.
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: f64,
    /// Consecutive `Unknown` classifications tolerated before recovering early.
    #[serde(default = "default_max_unknown_polls")]
    pub max_unknown_polls: u32,
    /// Command sent when no other rule matches.
    #[serde(default = "default_fallback_command")]
    pub fallback_command: String,
    /// Delay between injecting text and pressing Enter, in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Timeout-recovery sequence settings.
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Retry policy for session controller calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            stall_timeout_secs: default_stall_timeout_secs(),
            max_unknown_polls: default_max_unknown_polls(),
            fallback_command: default_fallback_command(),
            settle_ms: default_settle_ms(),
            recovery: RecoveryConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl PilotConfig {
    /// Reject values that would make the loop spin or never recover.
    pub fn validate(&self) -> Result<(), ForgeflowError> {
        // try_from_secs_f64 rejects negative, NaN, infinite and too-large values.
        if Duration::try_from_secs_f64(self.poll_interval_secs).is_err() {
            return Err(ForgeflowError::Config(format!(
                "poll_interval_secs must be a non-negative number of seconds in range, got {}",
                self.poll_interval_secs
            )));
        }
        match Duration::try_from_secs_f64(self.stall_timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => {}
            _ => {
                return Err(ForgeflowError::Config(format!(
                    "stall_timeout_secs must be a positive number of seconds in range, got {}",
                    self.stall_timeout_secs
                )))
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ForgeflowError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Poll interval as a `Duration`. Saturates for values `validate` rejects.
    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_secs).unwrap_or(Duration::MAX)
    }

    /// Stall timeout as a `Duration`. Saturates for values `validate` rejects.
    pub fn stall_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.stall_timeout_secs).unwrap_or(Duration::MAX)
    }
}

/// The cancel, clear-input, continue sequence used to unstick a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Number of deletion keystrokes sent after the cancel key.
    #[serde(default = "default_delete_count")]
    pub delete_count: u32,
    /// Command injected once the input box has been cleared.
    #[serde(default = "default_continuation")]
    pub continuation: String,
    /// Pause between the steps of the sequence, in milliseconds.
    #[serde(default = "default_key_delay_ms")]
    pub key_delay_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            delete_count: default_delete_count(),
            continuation: default_continuation(),
            key_delay_ms: default_key_delay_ms(),
        }
    }
}

/// Bounded retry with doubling backoff for controller calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before the second attempt, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for the doubling backoff, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Regex patterns for the configurable `generic` adapter.
///
/// Any pattern left unset falls back to the adapter's built-in default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdapterPatterns {
    /// Matches the idle prompt on the last non-blank line.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Matches a prompt line holding unsent text; capture group 1 is the text.
    #[serde(default)]
    pub pending: Option<String>,
    /// Matches any line while the assistant is working.
    #[serde(default)]
    pub processing: Option<String>,
    /// Matches any line proving the assistant program is still running.
    #[serde(default)]
    pub alive: Option<String>,
    /// Capture with escape sequences preserved.
    #[serde(default)]
    pub styled: bool,
}

/// Top-level configuration file, loaded from `forgeflow.toml`.
///
/// Command-line flags take precedence over every value here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeflowConfig {
    /// tmux session name.
    #[serde(default)]
    pub session: Option<String>,
    /// Working directory of the session.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// Command that starts the assistant inside the session.
    #[serde(default)]
    pub ai_cmd: Option<String>,
    /// Adapter key (`gemini`, `codex`, `claude_code`, `generic`).
    #[serde(default)]
    pub cli_type: Option<String>,
    /// Project name used to locate a project rule file.
    #[serde(default)]
    pub project: Option<String>,
    /// Built-in or custom task name.
    #[serde(default)]
    pub task: Option<String>,
    /// Log file path.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Log level directive (e.g. `info`, `debug`).
    #[serde(default)]
    pub log_level: Option<String>,
    /// Loop tuning.
    #[serde(default)]
    pub pilot: PilotConfig,
    /// Patterns for the `generic` adapter.
    #[serde(default)]
    pub adapter: AdapterPatterns,
}

impl ForgeflowConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ForgeflowError> {
        toml::from_str(content).map_err(|e| ForgeflowError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ForgeflowError> {
        toml::to_string_pretty(self).map_err(|e| ForgeflowError::Config(e.to_string()))
    }

    /// Read and parse a configuration file.
    pub fn load(path: &std::path::Path) -> Result<Self, ForgeflowError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ForgeflowError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }
}

/// Parameters for the built-in task rule sets, read from `{task}_config.json`.
///
/// Unknown keys are ignored so one file can serve several task flavours.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskConfig {
    /// Coverage percentage that ends the `improve_coverage` task.
    #[serde(default = "default_target_coverage")]
    pub target_coverage: u32,
    /// Checklist file the `task_planner` task works through.
    #[serde(default = "default_todo_file")]
    pub todo_file: String,
    /// Phrases that mean the current task is finished.
    #[serde(default = "default_completion_indicators")]
    pub task_completion_indicators: Vec<String>,
    /// Prompt sent after a task completes.
    #[serde(default = "default_next_task_prompt")]
    pub next_task_prompt: String,
    /// Overrides the `fix_tests` prompt sent when failures are on screen.
    #[serde(default)]
    pub fix_test_cases_prompt: Option<String>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            target_coverage: default_target_coverage(),
            todo_file: default_todo_file(),
            task_completion_indicators: default_completion_indicators(),
            next_task_prompt: default_next_task_prompt(),
            fix_test_cases_prompt: None,
        }
    }
}

impl TaskConfig {
    /// Parse a task configuration from JSON.
    pub fn from_json(content: &str) -> Result<Self, ForgeflowError> {
        serde_json::from_str(content).map_err(|e| ForgeflowError::Config(e.to_string()))
    }
}

fn default_poll_interval_secs() -> f64 {
    10.0
}

fn default_stall_timeout_secs() -> f64 {
    2000.0
}

fn default_max_unknown_polls() -> u32 {
    30
}

fn default_fallback_command() -> String {
    "continue".into()
}

fn default_settle_ms() -> u64 {
    100
}

fn default_delete_count() -> u32 {
    100
}

fn default_continuation() -> String {
    "continue".into()
}

fn default_key_delay_ms() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    5000
}

fn default_target_coverage() -> u32 {
    80
}

fn default_todo_file() -> String {
    "TODO.md".into()
}

fn default_completion_indicators() -> Vec<String> {
    vec![
        "task completed".into(),
        "task finished".into(),
        "done with task".into(),
        "finished task".into(),
    ]
}

fn default_next_task_prompt() -> String {
    "Please proceed with the next task in the TODO list.".into()
}
