//! Source positions and error rendering for rnc-convert.
//!
//! Provides [`Span`], [`LineIndex`], and [`Snippet`] — the pieces the parser
//! and serializer use to turn a byte offset in compact-syntax source into a
//! human-readable location with the offending line and a caret marker.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

// ── Span ─────────────────────────────────────────────────────────────────

/// Byte span in the source input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Span {
    /// Byte offset of the first character (0-based).
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

impl Span {
    /// Create a span covering `[start, end)`.
    ///
    /// Panics if `end < start`.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(end >= start, "Span end ({end}) < start ({start})");
        Self { start, end }
    }

    /// Create a zero-width span at the given position.
    pub fn empty(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }
}

// ── LineIndex ────────────────────────────────────────────────────────────

/// Maps byte offsets in a source string to line and column positions.
///
/// Lines and columns are **0-indexed** internally. Add 1 when displaying
/// to users.
///
/// The index is built in O(n) time and each lookup is O(log n) via binary
/// search.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the start of each line.
    /// `line_starts[0]` is always 0.
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Build a `LineIndex` from source text.
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0usize];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Convert a byte offset to a 0-indexed `(line, column)` pair.
    ///
    /// If `offset` is past the end of the source, the last line is returned
    /// with an unclamped column.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next.saturating_sub(1),
        };
        let col = offset.saturating_sub(self.line_starts[line]);
        (line, col)
    }

    /// Byte offset of the start of the given 0-indexed line.
    ///
    /// Returns `None` if `line` is out of bounds.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }

    /// The text of the given 0-indexed line in `src`, without its trailing
    /// newline. Returns an empty string for out-of-bounds lines.
    ///
    /// `src` must be the same text the index was built from.
    pub fn line_text<'a>(&self, src: &'a str, line: usize) -> &'a str {
        let Some(start) = self.line_start(line) else {
            return "";
        };
        let end = self
            .line_start(line + 1)
            .map_or(src.len(), |next| next.saturating_sub(1));
        src.get(start..end).unwrap_or("").trim_end_matches('\r')
    }

    /// Total number of lines (at least 1, even for empty input).
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

// ── Snippet ──────────────────────────────────────────────────────────────

/// Width a tab expands to in rendered snippets.
const TAB_WIDTH: usize = 4;

/// A rendered view of one source line with a caret under the offending
/// column, suitable for direct terminal display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    /// The source line, tabs expanded, trailing whitespace stripped.
    pub line: String,
    /// Display column of the caret after tab expansion (0-based).
    pub caret: usize,
}

impl Snippet {
    /// Build a snippet for column `col` (0-based, in characters) of `line`.
    ///
    /// Tabs before the caret shift it by the expansion width so the marker
    /// stays under the right character. A column at or past the end of the
    /// line places the caret one past the last character.
    pub fn new(line: &str, col: usize) -> Self {
        let mut caret = 0usize;
        let mut chars_seen = 0usize;
        for ch in line.chars() {
            if chars_seen >= col {
                break;
            }
            caret += if ch == '\t' { TAB_WIDTH } else { 1 };
            chars_seen += 1;
        }
        let expanded: String = line
            .chars()
            .map(|ch| {
                if ch == '\t' {
                    " ".repeat(TAB_WIDTH)
                } else {
                    ch.to_string()
                }
            })
            .collect();
        Self {
            line: expanded.trim_end().to_string(),
            caret,
        }
    }
}

impl std::fmt::Display for Snippet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.line)?;
        write!(f, "{}^", " ".repeat(self.caret))
    }
}
