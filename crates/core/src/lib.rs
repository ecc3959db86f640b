//! RNC conversion core library.
//!
//! Translates RELAX NG compact syntax (RNC) into the XML syntax (RNG).
//! The main entry points are [`parse_str`] / [`parse_with`] for parsing,
//! [`XmlSerializer`] for emission, and [`convert`] for the whole pipeline
//! in one call.

#![warn(missing_docs)]

/// AST node model shared by the parser and serializer.
pub mod ast;
/// The conversion error taxonomy.
pub mod error;
/// Tokenization of compact-syntax source.
pub mod lexer;
/// Recursive-descent grammar parser, including include resolution.
pub mod parser;
/// Include-location algebra, content fetching, and byte decoding.
pub mod resolve;
/// XML-syntax emission.
pub mod serialize;

// ── Convenience re-exports ──────────────────────────────────────────────────
// Flat imports for the most common entry points. The full module paths
// remain available for less common types.

// Parser
pub use parser::{Options, parse_str, parse_with};

// AST
pub use ast::{Node, NodeKind};

// Lexer
pub use lexer::{Keyword, LexicalError, TokKind, Token, tokenize};

// Include resolution
pub use resolve::{DecodeError, FsResolver, Resolver, decode};

// Serializer
pub use serialize::XmlSerializer;

// Errors
pub use error::{Error, Result, SourceError};

/// Convert compact-syntax text to XML-syntax text in one step, resolving
/// includes from the current directory.
pub fn convert(src: &str) -> Result<String> {
    XmlSerializer::new().to_xml(&parse_str(src)?)
}
