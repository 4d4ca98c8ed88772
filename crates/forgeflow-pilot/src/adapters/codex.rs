//! Codex CLI adapter.
//!
//! Codex marks its composer with a left bar and prints a key-hint footer:
//!
//! ```text
//! ▌ Ask Codex to do anything
//!  ⏎ send   ⌃J newline   ⌃T transcript   ⌃C quit
//! ```
//!
//! While a turn runs the status line reads `• Working (12s • Esc to interrupt)`.
//! Codex also needs a wide window; narrower panes wrap the footer and hide
//! the markers.

use regex::Regex;

use crate::adapter::CliAdapter;

/// Consecutive `/compact` commands allowed before starting a new conversation.
const MAX_CONSECUTIVE_COMPACTS: u32 = 3;

/// Adapter for OpenAI's Codex CLI.
pub struct CodexAdapter {
    re_prompt: Regex,
    re_box: Regex,
    re_processing: Regex,
    re_footer: Regex,
    compact_count: u32,
}

impl CodexAdapter {
    pub fn new() -> Self {
        Self {
            re_prompt: Regex::new(r"(?m)^▌.*").unwrap(),
            re_box: Regex::new(r"│ > (.*?) │").unwrap(),
            re_processing: Regex::new(r"• Esc to interrupt\)").unwrap(),
            re_footer: Regex::new(r"^\s*⏎ send\s+⌃J newline\s+⌃T transcript\s+⌃C quit").unwrap(),
            compact_count: 0,
        }
    }

    /// Number of `/compact` commands sent in a row.
    pub fn compact_count(&self) -> u32 {
        self.compact_count
    }
}

impl Default for CodexAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CliAdapter for CodexAdapter {
    fn name(&self) -> &str {
        "Codex"
    }

    fn is_awaiting_input(&self, text: &str) -> bool {
        self.re_prompt.is_match(text)
    }

    fn pending_input(&self, text: &str) -> Option<String> {
        let caps = self.re_box.captures(text)?;
        let contents = caps.get(1)?.as_str().trim();
        (!contents.is_empty()).then(|| contents.to_string())
    }

    fn is_processing(&self, text: &str) -> bool {
        text.lines().any(|line| self.re_processing.is_match(line))
    }

    fn is_program_alive(&self, text: &str) -> bool {
        text.lines().any(|line| self.re_footer.is_match(line.trim()))
            || self.is_awaiting_input(text)
            || self.is_processing(text)
    }

    fn min_window_size(&self) -> Option<(u16, u16)> {
        Some((120, 40))
    }

    /// Compacting the same overflowing conversation over and over never
    /// converges, so the third `/compact` in a row becomes `/new`.
    fn rewrite_command(&mut self, command: &str) -> String {
        if command != "/compact" {
            self.compact_count = 0;
            return command.to_string();
        }

        self.compact_count += 1;
        if self.compact_count >= MAX_CONSECUTIVE_COMPACTS {
            self.compact_count = 0;
            tracing::info!("replacing repeated /compact with /new");
            return "/new".into();
        }
        command.to_string()
    }
}
