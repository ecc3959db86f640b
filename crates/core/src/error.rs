//! Error types for the conversion pipeline.
//!
//! Every failure is fatal: the converter produces either a complete XML
//! document or exactly one of the error kinds below. There is no partial
//! output and no warning level.

use rnc_convert_diagnostics::Snippet;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure during lexing, parsing, include resolution, or serialization.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A character in the source matched no lexical rule.
    #[error("lexical error: {0}")]
    Lexical(Box<SourceError>),
    /// The token sequence does not match any grammar production.
    #[error("syntax error: {0}")]
    Syntax(Box<SourceError>),
    /// Mixed composition operators at one unparenthesized level.
    #[error("ambiguous construct: {0}")]
    Ambiguity(Box<SourceError>),
    /// Include failure: unreadable target, cyclic inclusion, or a
    /// declaration mismatch between the included and including files.
    #[error("include error: {0}")]
    Include(Box<SourceError>),
    /// Use of an undeclared namespace or datatype-library prefix during
    /// serialization. Carries the referencing name; the AST has no source
    /// positions, so there is no snippet.
    #[error("{message}")]
    Resolution {
        /// The identifier whose prefix failed to resolve.
        name: String,
        /// Human-readable description.
        message: String,
    },
}

/// Position-carrying error payload: message, source location, and the
/// rendered offending line with a caret marker.
#[derive(Debug, Clone)]
pub struct SourceError {
    /// File (or URL) the source came from, when known.
    pub file: Option<String>,
    /// 0-based line of the offending position.
    pub line: usize,
    /// 0-based column of the offending position.
    pub col: usize,
    /// The offending source line rendered with a caret.
    pub snippet: Snippet,
    /// What went wrong.
    pub message: String,
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let file = self.file.as_deref().unwrap_or("(unknown)");
        writeln!(f, "{}", self.message)?;
        writeln!(f, "in {} [{}:{}]", file, self.line + 1, self.col + 1)?;
        write!(f, "{}", self.snippet)
    }
}
