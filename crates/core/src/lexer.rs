//! RNC lexer — tokenizes compact-syntax source into a stream of borrowed
//! tokens.
//!
//! Single-hash comments are dropped here; double-hash documentation
//! comments survive as tokens because they become `documentation` nodes.
//! Bare identifiers that exactly match the reserved-word set are
//! reclassified as keyword tokens; qualified names and quoted identifiers
//! are never reclassified.

/// The fixed reserved-word set of the compact syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// `attribute`
    Attribute,
    /// `datatypes`
    Datatypes,
    /// `default`
    Default,
    /// `div`
    Div,
    /// `element`
    Element,
    /// `empty`
    Empty,
    /// `external`
    External,
    /// `grammar`
    Grammar,
    /// `include`
    Include,
    /// `inherit`
    Inherit,
    /// `list`
    List,
    /// `mixed`
    Mixed,
    /// `namespace`
    Namespace,
    /// `notAllowed`
    NotAllowed,
    /// `parent`
    Parent,
    /// `start`
    Start,
    /// `string`
    String,
    /// `text`
    Text,
    /// `token`
    Token,
}

impl Keyword {
    /// Reclassify an identifier, on an exact, case-sensitive match only.
    pub fn from_ident(s: &str) -> Option<Keyword> {
        Some(match s {
            "attribute" => Keyword::Attribute,
            "datatypes" => Keyword::Datatypes,
            "default" => Keyword::Default,
            "div" => Keyword::Div,
            "element" => Keyword::Element,
            "empty" => Keyword::Empty,
            "external" => Keyword::External,
            "grammar" => Keyword::Grammar,
            "include" => Keyword::Include,
            "inherit" => Keyword::Inherit,
            "list" => Keyword::List,
            "mixed" => Keyword::Mixed,
            "namespace" => Keyword::Namespace,
            "notAllowed" => Keyword::NotAllowed,
            "parent" => Keyword::Parent,
            "start" => Keyword::Start,
            "string" => Keyword::String,
            "text" => Keyword::Text,
            "token" => Keyword::Token,
            _ => return None,
        })
    }
}

/// Classification of a compact-syntax token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokKind {
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `|=` or `&=` (combine operators, matched before plain `=`).
    Combine,
    /// `=`
    Equal,
    /// `|`
    Pipe,
    /// `,`
    Comma,
    /// `&`
    Amp,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `+`
    Plus,
    /// `?`
    QMark,
    /// `~` (string-literal concatenation).
    Tilde,
    /// Qualified name: `prefix:local` or `prefix:*`.
    CName,
    /// Quoted identifier: `\name` (escapes a keyword).
    QuotedId,
    /// Plain identifier.
    Ident,
    /// An identifier reclassified as a reserved word.
    Keyword(Keyword),
    /// Quoted string literal; `text` includes the surrounding quotes.
    Literal,
    /// `## ...` documentation comment.
    Documentation,
}

/// A token that borrows its text directly from the source input.
///
/// `text` is always exactly `&input[start..end]`; the byte offsets are
/// stored alongside for position reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    /// The classification of this token.
    pub kind: TokKind,
    /// Borrowed slice of the source input for this token.
    pub text: &'a str,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

impl<'a> Token<'a> {
    /// The content of a `Literal` token, without the surrounding quotes.
    /// Borrows from the source input, not from the token.
    pub fn literal_value(&self) -> &'a str {
        self.text
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(self.text)
    }

    /// The content of a `Documentation` token, with the `##` marker and
    /// surrounding whitespace stripped.
    pub fn doc_text(&self) -> &'a str {
        self.text
            .trim_start_matches('#')
            .trim_start_matches(' ')
            .trim_end()
    }
}

/// A character that matched no lexical rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexicalError {
    /// Byte offset of the offending character.
    pub offset: usize,
    /// The character itself.
    pub ch: char,
}

fn is_name_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'_' | b'.' | b'-')
}

/// Tokenize compact-syntax input into a sequence of borrowed tokens.
///
/// Whitespace and single-hash comments are skipped; documentation
/// comments (`##`) are kept. The only failure is a character matching no
/// rule, reported with its byte offset.
///
/// All structural characters are ASCII; UTF-8 continuation bytes
/// (0x80–0xBF) never match any of the byte tests below, so byte-wise
/// scanning is safe and non-ASCII text is confined to literals and
/// comments, where it is skipped over without decoding.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, LexicalError> {
    fn push<'a>(
        toks: &mut Vec<Token<'a>>,
        input: &'a str,
        kind: TokKind,
        start: usize,
        end: usize,
    ) {
        toks.push(Token {
            kind,
            text: &input[start..end],
            start,
            end,
        });
    }

    let b = input.as_bytes();
    let mut toks = Vec::new();
    let mut i = 0usize;

    while i < b.len() {
        let c = b[i];
        let start = i;
        match c {
            _ if c.is_ascii_whitespace() => {
                i += 1;
            }
            b'(' | b')' | b'{' | b'}' | b'[' | b']' | b'=' | b',' | b'-' | b'*' | b'+'
            | b'?' | b'~' => {
                let kind = match c {
                    b'(' => TokKind::LParen,
                    b')' => TokKind::RParen,
                    b'{' => TokKind::LBrace,
                    b'}' => TokKind::RBrace,
                    b'[' => TokKind::LBracket,
                    b']' => TokKind::RBracket,
                    b'=' => TokKind::Equal,
                    b',' => TokKind::Comma,
                    b'-' => TokKind::Minus,
                    b'*' => TokKind::Star,
                    b'+' => TokKind::Plus,
                    b'?' => TokKind::QMark,
                    _ => TokKind::Tilde,
                };
                i += 1;
                push(&mut toks, input, kind, start, i);
            }
            // `|=` and `&=` take precedence over `|`, `&`, and `=`.
            b'|' | b'&' => {
                if i + 1 < b.len() && b[i + 1] == b'=' {
                    i += 2;
                    push(&mut toks, input, TokKind::Combine, start, i);
                } else {
                    i += 1;
                    let kind = if c == b'|' { TokKind::Pipe } else { TokKind::Amp };
                    push(&mut toks, input, kind, start, i);
                }
            }
            b'#' => {
                let doc = i + 1 < b.len() && b[i + 1] == b'#';
                while i < b.len() && b[i] != b'\n' {
                    i += 1;
                }
                if doc {
                    push(&mut toks, input, TokKind::Documentation, start, i);
                }
                // Single-hash comments are discarded here.
            }
            b'"' => {
                i += 1;
                while i < b.len() && b[i] != b'"' && b[i] != b'\n' {
                    i += 1;
                }
                if i >= b.len() || b[i] != b'"' {
                    return Err(LexicalError {
                        offset: start,
                        ch: '"',
                    });
                }
                i += 1;
                push(&mut toks, input, TokKind::Literal, start, i);
            }
            b'\\' => {
                i += 1;
                if i >= b.len() || !is_name_start(b[i]) {
                    return Err(LexicalError {
                        offset: start,
                        ch: '\\',
                    });
                }
                while i < b.len() && is_name_char(b[i]) {
                    i += 1;
                }
                push(&mut toks, input, TokKind::QuotedId, start, i);
            }
            _ if is_name_start(c) => {
                i += 1;
                while i < b.len() && is_name_char(b[i]) {
                    i += 1;
                }
                // Qualified names before plain identifiers: a colon only
                // extends the token when followed by a local name or `*`.
                if i + 1 < b.len() && b[i] == b':' && (is_name_start(b[i + 1]) || b[i + 1] == b'*')
                {
                    i += 1;
                    if b[i] == b'*' {
                        i += 1;
                    } else {
                        while i < b.len() && is_name_char(b[i]) {
                            i += 1;
                        }
                    }
                    push(&mut toks, input, TokKind::CName, start, i);
                } else {
                    let text = &input[start..i];
                    let kind = match Keyword::from_ident(text) {
                        Some(kw) => TokKind::Keyword(kw),
                        None => TokKind::Ident,
                    };
                    push(&mut toks, input, kind, start, i);
                }
            }
            _ => {
                let ch = input[start..].chars().next().unwrap_or('\u{fffd}');
                return Err(LexicalError { offset: start, ch });
            }
        }
    }
    Ok(toks)
}
