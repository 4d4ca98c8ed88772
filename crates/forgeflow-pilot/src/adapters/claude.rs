//! Claude Code adapter.
//!
//! Claude Code keeps its input line at the bottom of the screen, either
//! boxed or between horizontal rules depending on the version:
//!
//! ```text
//! ╭────────────────────────────────────────╮
//! │ > Try "refactor parser.rs"             │
//! ╰────────────────────────────────────────╯
//!   ? for shortcuts
//! ```
//!
//! A request in flight shows a spinner line such as
//! `✻ Thinking… (12s · esc to interrupt)`.

use regex::Regex;

use crate::adapter::CliAdapter;

/// Adapter for Anthropic's Claude Code CLI.
pub struct ClaudeCodeAdapter {
    re_input: Regex,
    re_processing: Regex,
    re_footer: Regex,
}

impl ClaudeCodeAdapter {
    pub fn new() -> Self {
        Self {
            re_input: Regex::new(r"^\s*(?:│\s*)?>\s?(.*?)\s*(?:│\s*)?$").unwrap(),
            re_processing: Regex::new(r"(?i)esc to interrupt").unwrap(),
            re_footer: Regex::new(
                r"(?i)\? for shortcuts|accept edits on|bypass permissions on|plan mode on",
            )
            .unwrap(),
        }
    }

    /// Contents of the bottom-most input line, trimmed.
    fn input_line<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.lines()
            .rev()
            .find_map(|line| self.re_input.captures(line))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
    }
}

impl Default for ClaudeCodeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn is_placeholder(contents: &str) -> bool {
    contents.is_empty() || contents.starts_with("Try \"")
}

impl CliAdapter for ClaudeCodeAdapter {
    fn name(&self) -> &str {
        "ClaudeCode"
    }

    fn is_awaiting_input(&self, text: &str) -> bool {
        self.input_line(text).is_some_and(is_placeholder)
    }

    fn pending_input(&self, text: &str) -> Option<String> {
        self.input_line(text)
            .filter(|contents| !is_placeholder(contents))
            .map(str::to_string)
    }

    fn is_processing(&self, text: &str) -> bool {
        self.re_processing.is_match(text)
    }

    fn is_program_alive(&self, text: &str) -> bool {
        self.re_footer.is_match(text) || self.input_line(text).is_some() || self.is_processing(text)
    }
}
