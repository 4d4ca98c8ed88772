//! Session controller trait abstracting over the terminal multiplexer.
//!
//! The automation loop only ever talks to a `SessionController`, which keeps
//! tmux out of the loop's tests. Text and the confirmation keystroke are
//! separate primitives: text containing line breaks must never be taken as
//! several submissions.

use forgeflow_types::ForgeflowError;

/// Trait for a terminal session driven by the loop.
///
/// Failures that may clear up on their own (the server is briefly busy, the
/// pane is being redrawn) should be reported as
/// [`ForgeflowError::Session`]; the loop retries those.
pub trait SessionController {
    /// Current screen contents, with escape sequences kept when `styled`.
    fn capture(&self, styled: bool) -> Result<String, ForgeflowError>;

    /// Type `text` into the session without submitting it.
    fn send_text(&self, text: &str) -> Result<(), ForgeflowError>;

    /// Press the confirmation key (Enter).
    fn send_confirm(&self) -> Result<(), ForgeflowError>;

    /// Press the interrupt key.
    fn send_cancel(&self) -> Result<(), ForgeflowError>;

    /// Press the delete-backwards key `count` times.
    fn send_delete(&self, count: u32) -> Result<(), ForgeflowError>;

    /// Whether the process driven in the session still exists.
    ///
    /// `Ok(false)` means the session or its process is definitely gone. A
    /// check that could not be completed is an error, so the loop retries
    /// it instead of ending the run.
    fn is_alive(&self) -> Result<bool, ForgeflowError>;
}
