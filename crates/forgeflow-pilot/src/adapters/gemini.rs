//! Gemini CLI adapter.
//!
//! Gemini draws a bordered input box below the transcript:
//!
//! ```text
//! ⠏ Reading files... (esc to cancel, 12s)
//!
//! ╭──────────────────────────────────────────────╮
//! │ >   Type your message or @path/to/file       │
//! ╰──────────────────────────────────────────────╯
//! YOLO mode (ctrl + y to toggle)
//! ```
//!
//! The placeholder sentence means the box is empty. Any other text between
//! `│ >` and the closing border is unsent input. The box stays on screen
//! while a request runs, so the `(esc to cancel ...)` marker decides
//! whether the prompt is really idle.

use regex::Regex;

use crate::adapter::CliAdapter;

const PLACEHOLDER: &str = "Type your message or @";

/// Adapter for Google's Gemini CLI (and forks sharing its UI, such as Qwen Code).
pub struct GeminiAdapter {
    re_prompt: Regex,
    re_box: Regex,
    re_processing: Regex,
    re_yolo: Regex,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self {
            re_prompt: Regex::new(r">.*Type your message or @[\w/]+(?:\.\w+)?").unwrap(),
            re_box: Regex::new(r"│ > (.*?) │").unwrap(),
            re_processing: Regex::new(r"\(esc to cancel.*\)$").unwrap(),
            re_yolo: Regex::new(r"^YOLO mode \(ctrl \+ y to toggle\)").unwrap(),
        }
    }

    /// Text inside the input box, trimmed; `None` when no box is drawn.
    fn box_contents<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.re_box
            .captures_iter(text)
            .last()
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CliAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn is_awaiting_input(&self, text: &str) -> bool {
        if self.re_prompt.is_match(text) {
            return true;
        }
        matches!(self.box_contents(text), Some(""))
    }

    fn pending_input(&self, text: &str) -> Option<String> {
        let contents = self.box_contents(text)?;
        if contents.is_empty() || contents.starts_with(PLACEHOLDER) {
            return None;
        }
        Some(contents.to_string())
    }

    fn is_processing(&self, text: &str) -> bool {
        text.lines()
            .any(|line| self.re_processing.is_match(line.trim()))
    }

    fn is_program_alive(&self, text: &str) -> bool {
        text.lines().any(|line| self.re_yolo.is_match(line.trim()))
            || self.re_prompt.is_match(text)
            || self.box_contents(text).is_some()
            || self.is_processing(text)
    }
}
