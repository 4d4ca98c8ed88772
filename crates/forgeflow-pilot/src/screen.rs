//! One polling snapshot of a terminal session.

use crate::ansi::{self, StyledSegment};

/// Text captured from the session at one instant.
///
/// `raw` is exactly what the controller returned. When `styled` is true it
/// still carries escape sequences (a `capture-pane -e` capture); otherwise
/// it is expected to be plain, though stripping is applied regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenCapture {
    pub raw: String,
    pub styled: bool,
}

impl ScreenCapture {
    pub fn new(raw: impl Into<String>, styled: bool) -> Self {
        Self {
            raw: raw.into(),
            styled,
        }
    }

    /// The capture with every escape sequence removed.
    pub fn plain(&self) -> String {
        ansi::strip_ansi(&self.raw)
    }

    pub fn segments(&self) -> Vec<StyledSegment> {
        ansi::parse_segments(&self.raw)
    }

    pub fn lines(&self) -> Vec<Vec<StyledSegment>> {
        ansi::split_lines(&self.segments())
    }

    /// The last line with visible content, trimmed of trailing whitespace.
    pub fn last_non_blank_line(&self) -> Option<String> {
        last_non_blank_line(&self.plain()).map(str::to_string)
    }

    /// Text handed to the adapter: raw when styled, plain otherwise.
    pub fn classification_text(&self) -> String {
        if self.styled {
            self.raw.clone()
        } else {
            self.plain()
        }
    }
}

/// The last line of `text` with visible content, trailing whitespace trimmed.
pub fn last_non_blank_line(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .last()
}
