//! Regex-based generic adapter.
//!
//! Drives any line-oriented assistant from user-configured patterns in the
//! `[adapter]` table of `forgeflow.toml`. Prompt and pending-text patterns
//! are matched against the last non-blank line with escape codes removed
//! (trailing whitespace trimmed); processing and alive patterns against every
//! line as captured, so with `styled = true` they can match on color.
//!
//! With no configuration the adapter treats a bare `>` as the last line of
//! output as the idle prompt and text after `> ` as pending input.

use regex::Regex;

use forgeflow_types::{AdapterPatterns, ForgeflowError};

use crate::adapter::CliAdapter;
use crate::ansi::strip_ansi;
use crate::screen::last_non_blank_line;

const DEFAULT_PROMPT: &str = r"^>$";
const DEFAULT_PENDING: &str = r"^> (\S.*)$";

/// Adapter configured from [`AdapterPatterns`].
pub struct GenericAdapter {
    prompt: Regex,
    pending: Regex,
    processing: Option<Regex>,
    alive: Option<Regex>,
    styled: bool,
}

fn compile(field: &str, pattern: &str) -> Result<Regex, ForgeflowError> {
    Regex::new(pattern).map_err(|e| {
        ForgeflowError::Config(format!("invalid adapter.{field} pattern {pattern:?}: {e}"))
    })
}

impl GenericAdapter {
    /// Compile the configured patterns, falling back to the defaults.
    pub fn new(patterns: &AdapterPatterns) -> Result<Self, ForgeflowError> {
        let prompt = compile("prompt", patterns.prompt.as_deref().unwrap_or(DEFAULT_PROMPT))?;
        let pending = compile("pending", patterns.pending.as_deref().unwrap_or(DEFAULT_PENDING))?;
        let processing = patterns
            .processing
            .as_deref()
            .map(|p| compile("processing", p))
            .transpose()?;
        let alive = patterns
            .alive
            .as_deref()
            .map(|p| compile("alive", p))
            .transpose()?;

        Ok(Self {
            prompt,
            pending,
            processing,
            alive,
            styled: patterns.styled,
        })
    }

    fn any_line(re: &Regex, text: &str) -> bool {
        text.lines().any(|line| re.is_match(line))
    }

    /// The input line as the user sees it.
    fn input_line(&self, text: &str) -> Option<String> {
        if self.styled {
            last_non_blank_line(&strip_ansi(text)).map(str::to_string)
        } else {
            last_non_blank_line(text).map(str::to_string)
        }
    }
}

impl CliAdapter for GenericAdapter {
    fn name(&self) -> &str {
        "Generic"
    }

    fn is_awaiting_input(&self, text: &str) -> bool {
        self.input_line(text)
            .is_some_and(|line| self.prompt.is_match(&line))
    }

    fn pending_input(&self, text: &str) -> Option<String> {
        let line = self.input_line(text)?;
        let caps = self.pending.captures(&line)?;
        let pending = caps.get(1).or_else(|| caps.get(0))?.as_str().trim();
        (!pending.is_empty()).then(|| pending.to_string())
    }

    fn is_processing(&self, text: &str) -> bool {
        self.processing
            .as_ref()
            .is_some_and(|re| Self::any_line(re, text))
    }

    /// Without an `alive` pattern the program is assumed to be running and
    /// only the session controller's liveness check can end the loop.
    fn is_program_alive(&self, text: &str) -> bool {
        self.alive
            .as_ref()
            .map_or(true, |re| Self::any_line(re, text))
    }

    fn wants_styled_capture(&self) -> bool {
        self.styled
    }
}
