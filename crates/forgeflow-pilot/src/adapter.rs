//! Classification adapter trait for recognizing assistant states in captures.
//!
//! Each terminal assistant (Gemini CLI, Codex, Claude Code, ...) draws its
//! own prompt, spinner and footer. An adapter knows those markers and
//! answers simple questions about one capture; [`classify`] combines the
//! answers into a single [`Classification`] for the automation loop.
//!
//! Adapter predicates never fail. A marker that cannot be found is simply
//! reported as absent.

/// The state of the assistant derived from one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Idle prompt with an empty input box.
    AwaitingInput,
    /// Idle prompt with unsent text already in the input box.
    AwaitingInputWithText(String),
    /// The assistant is working.
    Processing,
    /// None of the known markers were found.
    Unknown,
}

impl Classification {
    /// Whether the assistant is waiting on the user.
    pub fn is_idle(&self) -> bool {
        matches!(
            self,
            Classification::AwaitingInput | Classification::AwaitingInputWithText(_)
        )
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::AwaitingInput => "awaiting_input",
            Classification::AwaitingInputWithText(_) => "awaiting_input_with_text",
            Classification::Processing => "processing",
            Classification::Unknown => "unknown",
        }
    }
}

/// Trait for recognizing one assistant program's screen states.
///
/// All predicates receive the capture text selected by
/// [`wants_styled_capture`](CliAdapter::wants_styled_capture): escape
/// sequences included when it returns `true`, stripped otherwise.
pub trait CliAdapter: Send {
    /// Human-readable name for this adapter (e.g., "Gemini").
    fn name(&self) -> &str;

    /// The idle prompt is shown with an empty input box.
    fn is_awaiting_input(&self, text: &str) -> bool;

    /// The idle prompt holds unsent text. Returns that text.
    fn pending_input(&self, text: &str) -> Option<String>;

    /// The assistant is actively working.
    fn is_processing(&self, text: &str) -> bool;

    /// The assistant program is still running in the session.
    fn is_program_alive(&self, text: &str) -> bool;

    /// Request captures with escape sequences preserved.
    fn wants_styled_capture(&self) -> bool {
        false
    }

    /// Minimum window size `(columns, rows)` the assistant needs, if any.
    fn min_window_size(&self) -> Option<(u16, u16)> {
        None
    }

    /// Rewrite a command chosen by the rule policy just before it is sent.
    ///
    /// Called once per command actually injected, so implementations may
    /// keep state across calls. The default sends the command unchanged.
    fn rewrite_command(&mut self, command: &str) -> String {
        command.to_string()
    }
}

/// Classify a capture.
///
/// Priority is pending text, then empty prompt, then processing. Idle states
/// are only reported when the processing marker is absent from the same
/// capture, since several assistants keep drawing their input box while
/// they work.
pub fn classify<A: CliAdapter + ?Sized>(adapter: &A, text: &str) -> Classification {
    if adapter.is_processing(text) {
        return Classification::Processing;
    }
    if let Some(pending) = adapter.pending_input(text) {
        return Classification::AwaitingInputWithText(pending);
    }
    if adapter.is_awaiting_input(text) {
        return Classification::AwaitingInput;
    }
    Classification::Unknown
}
