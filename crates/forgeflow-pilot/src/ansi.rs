//! ANSI escape sequence handling for captured terminal text.
//!
//! Captures from `tmux capture-pane -e` interleave printable text with
//! escape sequences. Adapters match against either the plain text or a
//! styled view of it, so this module offers two projections of the same
//! input:
//!
//! - [`strip_ansi`]: plain text with every escape sequence removed
//! - [`parse_segments`]: runs of text tagged with the active SGR style
//!
//! Both are driven by one lexer, so concatenating the text of every segment
//! always reproduces `strip_ansi` exactly. Captured output is untrusted:
//! malformed or unknown sequences are consumed silently and never cause an
//! error.

const ESC: char = '\x1b';
const BEL: char = '\x07';
/// 8-bit Control Sequence Introducer.
const CSI_8BIT: char = '\u{9b}';

/// A terminal color in one of the four SGR encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// Standard palette, `30-37` / `40-47`. Index 0-7.
    Basic(u8),
    /// Bright palette, `90-97` / `100-107`. Index 0-7.
    Bright(u8),
    /// 256-color palette, `38;5;n` / `48;5;n`.
    Indexed(u8),
    /// 24-bit color, `38;2;r;g;b` / `48;2;r;g;b`.
    Rgb(u8, u8, u8),
}

impl Color {
    pub const BLACK: Color = Color::Basic(0);
    pub const RED: Color = Color::Basic(1);
    pub const GREEN: Color = Color::Basic(2);
    pub const YELLOW: Color = Color::Basic(3);
    pub const BLUE: Color = Color::Basic(4);
    pub const MAGENTA: Color = Color::Basic(5);
    pub const CYAN: Color = Color::Basic(6);
    pub const WHITE: Color = Color::Basic(7);
}

/// The SGR attribute set active for a run of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Style {
    pub bold: bool,
    pub dim: bool,
    pub italic: bool,
    pub underline: bool,
    pub blink: bool,
    pub inverse: bool,
    pub strike: bool,
    pub fg: Option<Color>,
    pub bg: Option<Color>,
}

impl Style {
    /// Whether no attribute or color is set.
    pub fn is_plain(&self) -> bool {
        *self == Style::default()
    }

    /// Apply one SGR parameter list (the `1;31` of `ESC[1;31m`).
    fn apply_sgr(&mut self, params: &[Option<u32>]) {
        // ESC[m is a reset.
        if params.is_empty() {
            *self = Style::default();
            return;
        }

        let mut i = 0;
        while i < params.len() {
            let Some(p) = params[i] else {
                i += 1;
                continue;
            };
            i += 1;

            match p {
                0 => *self = Style::default(),
                1 => self.bold = true,
                2 => self.dim = true,
                3 => self.italic = true,
                4 => self.underline = true,
                5 | 6 => self.blink = true,
                7 => self.inverse = true,
                9 => self.strike = true,
                22 => {
                    self.bold = false;
                    self.dim = false;
                }
                23 => self.italic = false,
                24 => self.underline = false,
                25 => self.blink = false,
                27 => self.inverse = false,
                29 => self.strike = false,
                30..=37 => self.fg = Some(Color::Basic((p - 30) as u8)),
                39 => self.fg = None,
                40..=47 => self.bg = Some(Color::Basic((p - 40) as u8)),
                49 => self.bg = None,
                90..=97 => self.fg = Some(Color::Bright((p - 90) as u8)),
                100..=107 => self.bg = Some(Color::Bright((p - 100) as u8)),
                38 | 48 => {
                    let (color, used) = extended_color(&params[i..]);
                    i += used;
                    if let Some(color) = color {
                        if p == 38 {
                            self.fg = Some(color);
                        } else {
                            self.bg = Some(color);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// Decode the tail of a `38`/`48` parameter. Returns the color (if valid)
/// and how many parameters were consumed.
fn extended_color(rest: &[Option<u32>]) -> (Option<Color>, usize) {
    let byte = |v: Option<&Option<u32>>| -> Option<u8> {
        v.copied().flatten().and_then(|n| u8::try_from(n).ok())
    };

    match rest.first().copied().flatten() {
        Some(5) => {
            if rest.len() < 2 {
                return (None, rest.len());
            }
            (byte(rest.get(1)).map(Color::Indexed), 2)
        }
        Some(2) => {
            if rest.len() < 4 {
                return (None, rest.len());
            }
            let rgb = byte(rest.get(1))
                .zip(byte(rest.get(2)))
                .zip(byte(rest.get(3)))
                .map(|((r, g), b)| Color::Rgb(r, g, b));
            (rgb, 4)
        }
        Some(_) => (None, 1),
        None => (None, rest.len().min(1)),
    }
}

/// A run of characters sharing one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSegment {
    pub text: String,
    pub style: Style,
}

impl StyledSegment {
    pub fn new(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// One lexical unit of captured text.
#[derive(Debug, PartialEq)]
enum Piece<'a> {
    /// Printable text (may include `\n` and `\t`).
    Text(&'a str),
    /// A complete SGR sequence; the parameter bytes between `[` and `m`.
    Sgr(&'a str),
    /// Anything consumed without contributing text.
    Skip,
}

/// Splits captured text into [`Piece`]s.
struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Consume a CSI body starting at `start` (just past the introducer).
    fn csi(&mut self, start: usize) -> Piece<'a> {
        let bytes = self.src.as_bytes();
        let mut i = start;
        // Parameter bytes 0x30-0x3F.
        while i < bytes.len() && (0x30..=0x3F).contains(&bytes[i]) {
            i += 1;
        }
        let params_end = i;
        // Intermediate bytes 0x20-0x2F.
        while i < bytes.len() && (0x20..=0x2F).contains(&bytes[i]) {
            i += 1;
        }
        let intermediates = i > params_end;
        // Final byte 0x40-0x7E; a missing or invalid final leaves the
        // following character to be lexed as text.
        let final_byte = bytes.get(i).copied().filter(|b| (0x40..=0x7E).contains(b));
        if final_byte.is_some() {
            i += 1;
        }
        self.pos = i;

        let params = &self.src[start..params_end];
        let is_sgr = final_byte == Some(b'm')
            && !intermediates
            && params.bytes().all(|b| b.is_ascii_digit() || b == b';');
        if is_sgr {
            Piece::Sgr(params)
        } else {
            Piece::Skip
        }
    }

    /// Consume a control string (OSC, DCS, APC, PM, SOS) up to its terminator.
    fn control_string(&mut self, start: usize) -> Piece<'a> {
        let rest = &self.src[start..];
        let mut chars = rest.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            if c == BEL {
                self.pos = start + idx + 1;
                return Piece::Skip;
            }
            if c == ESC {
                if let Some(&(_, '\\')) = chars.peek() {
                    self.pos = start + idx + 2;
                    return Piece::Skip;
                }
            }
        }
        // Unterminated: swallow the remainder.
        self.pos = self.src.len();
        Piece::Skip
    }

    fn escape(&mut self) -> Piece<'a> {
        let after = self.pos + ESC.len_utf8();
        let Some(next) = self.src[after..].chars().next() else {
            self.pos = after;
            return Piece::Skip;
        };

        match next {
            '[' => self.csi(after + 1),
            ']' | 'P' | '_' | '^' | 'X' => self.control_string(after + 1),
            // nF escapes: intermediates then a final byte, e.g. ESC ( B.
            '\x20'..='\x2f' => {
                let bytes = self.src.as_bytes();
                let mut i = after;
                while i < bytes.len() && (0x20..=0x2F).contains(&bytes[i]) {
                    i += 1;
                }
                if i < bytes.len() && (0x30..=0x7E).contains(&bytes[i]) {
                    i += 1;
                }
                self.pos = i;
                Piece::Skip
            }
            // Two-character escapes, e.g. ESC 7, ESC M.
            '\x30'..='\x7e' => {
                self.pos = after + 1;
                Piece::Skip
            }
            // Not an escape we know; drop the ESC alone.
            _ => {
                self.pos = after;
                Piece::Skip
            }
        }
    }

    fn text(&mut self) -> Piece<'a> {
        let start = self.pos;
        let end = self.src[start..]
            .char_indices()
            .find(|&(_, c)| !is_printable(c))
            .map(|(idx, _)| start + idx)
            .unwrap_or(self.src.len());
        self.pos = end;
        Piece::Text(&self.src[start..end])
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Piece<'a>;

    fn next(&mut self) -> Option<Piece<'a>> {
        let c = self.src[self.pos..].chars().next()?;
        let piece = match c {
            ESC => self.escape(),
            CSI_8BIT => self.csi(self.pos + CSI_8BIT.len_utf8()),
            c if is_printable(c) => self.text(),
            // Carriage returns, bells, backspaces and other C0/C1 controls.
            c => {
                self.pos += c.len_utf8();
                Piece::Skip
            }
        };
        Some(piece)
    }
}

/// Characters that survive stripping: everything except control characters,
/// with line feeds and tabs kept.
fn is_printable(c: char) -> bool {
    c == '\n' || c == '\t' || !c.is_control()
}

/// Strip escape sequences and non-printing controls from captured text.
///
/// Handles:
/// - CSI sequences: `ESC [ ... <final byte>` and bare 8-bit CSI (`U+009B`)
/// - OSC / DCS / APC / PM / SOS strings terminated by BEL or `ESC \`
/// - Two-character and charset-designation escapes (`ESC 7`, `ESC ( B`)
/// - Carriage returns and other control characters except `\n` and `\t`
///
/// Everything else is preserved in order.
pub fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for piece in Lexer::new(input) {
        if let Piece::Text(text) = piece {
            out.push_str(text);
        }
    }
    out
}

/// Parse captured text into styled segments in document order.
///
/// Adjacent text sharing a style is merged into one segment, and empty
/// segments are never produced.
pub fn parse_segments(input: &str) -> Vec<StyledSegment> {
    let mut segments: Vec<StyledSegment> = Vec::new();
    let mut style = Style::default();

    for piece in Lexer::new(input) {
        match piece {
            Piece::Text(text) => match segments.last_mut() {
                Some(last) if last.style == style => last.text.push_str(text),
                _ => segments.push(StyledSegment::new(text, style)),
            },
            Piece::Sgr(params) => {
                let params: Vec<Option<u32>> = if params.is_empty() {
                    Vec::new()
                } else {
                    params
                        .split(';')
                        .map(|p| if p.is_empty() { Some(0) } else { p.parse().ok() })
                        .collect()
                };
                style.apply_sgr(&params);
            }
            Piece::Skip => {}
        }
    }

    segments
}

/// Split styled segments into lines at embedded `\n` characters.
///
/// A segment spanning a line break becomes one segment per side, each with
/// the original style. The result always has one more entry than there are
/// line breaks; a line may be empty.
pub fn split_lines(segments: &[StyledSegment]) -> Vec<Vec<StyledSegment>> {
    let mut lines = Vec::new();
    let mut current: Vec<StyledSegment> = Vec::new();

    for seg in segments {
        let mut parts = seg.text.split('\n').peekable();
        while let Some(part) = parts.next() {
            if !part.is_empty() {
                current.push(StyledSegment::new(part, seg.style));
            }
            if parts.peek().is_some() {
                lines.push(std::mem::take(&mut current));
            }
        }
    }
    lines.push(current);
    lines
}

/// Concatenate the text of a run of segments.
pub fn segments_text(segments: &[StyledSegment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect()
}
