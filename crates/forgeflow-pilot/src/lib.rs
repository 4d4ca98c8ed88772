//! Unattended driver for AI coding assistants running in tmux.
//!
//! Captures the assistant's screen, classifies it, and injects commands
//! chosen by an ordered rule policy. Detects stalls and runs a recovery
//! sequence to get the assistant moving again.
//!
//! # Architecture
//!
//! - [`ansi`]: escape-sequence parsing into styled segments
//! - [`screen::ScreenCapture`]: one captured screen and its plain-text views
//! - [`adapter::CliAdapter`]: trait for recognizing assistant states in captures
//! - [`adapters`]: built-in adapters for Gemini, Codex, Claude Code, and generic regex
//! - [`rules::RulePolicy`]: first-match-wins condition/action rules
//! - [`stall::StallTimer`]: processing and unknown-streak stall detection
//! - [`session::SessionController`]: trait for the terminal session
//! - [`tmux::TmuxController`]: tmux implementation of the session controller
//! - [`automation::run`]: main poll loop orchestrating all components
//! - [`monitor::run_monitor`]: read-only watch that notifies when tasks finish

pub mod adapter;
pub mod adapters;
pub mod ansi;
pub mod automation;
pub mod clock;
pub mod monitor;
pub mod retry;
pub mod rules;
pub mod screen;
pub mod session;
pub mod stall;
pub mod tmux;

pub use adapter::{classify, Classification, CliAdapter};
pub use adapters::{create_adapter, Adapter};
pub use automation::{run, AutomationReport, AutomationStats, Outcome};
pub use clock::{CancelToken, Clock, SystemClock};
pub use monitor::{run_monitor, MonitorStats, Notifier};
pub use rules::{Action, Predicate, Rule, RulePolicy};
pub use session::SessionController;
pub use tmux::TmuxController;
