//! RNC grammar parser — converts the token stream into one root [`Node`].
//!
//! Deterministic recursive descent with the compact syntax's two
//! disambiguation rules built in: string-literal concatenation (`~`) is
//! left-associative, and composition operators (`,` `|` `&`, and `|`/`-`
//! in name classes) may not be mixed at one unparenthesized level —
//! mixing is an ambiguity error, never silently resolved.
//!
//! `include` directives re-enter the parser on the fetched unit, bounded
//! by a normalized-location stack for cycle detection. The included
//! unit's members are spliced into the including grammar in place; its
//! declarations are reconciled against (and adopted into) the including
//! document's preamble.

use std::collections::BTreeMap;

use rnc_convert_diagnostics::{LineIndex, Snippet};

use crate::ast::{Node, NodeKind};
use crate::error::{Error, Result, SourceError};
use crate::lexer::{self, Keyword, TokKind, Token};
use crate::resolve::{self, FsResolver, Resolver};

// ── Public API ───────────────────────────────────────────────────────────

/// How to parse: source origin and the content-fetch capability for
/// includes.
pub struct Options<'a> {
    /// Display name (path or URL) of the source, for error reporting.
    pub file: Option<&'a str>,
    /// Base directory or URL against which relative includes resolve.
    /// Defaults to the current directory.
    pub base: Option<&'a str>,
    /// Content retrieval for include targets.
    pub resolver: &'a dyn Resolver,
}

/// Parse compact-syntax text with includes resolved from the current
/// directory via the filesystem.
pub fn parse_str(src: &str) -> Result<Node> {
    parse_with(
        src,
        Options {
            file: None,
            base: None,
            resolver: &FsResolver,
        },
    )
}

/// Parse compact-syntax text with an explicit base location and fetch
/// capability.
pub fn parse_with(src: &str, opts: Options<'_>) -> Result<Node> {
    let mut stack = Vec::new();
    parse_unit(
        src,
        opts.file,
        opts.base.unwrap_or("."),
        opts.resolver,
        &mut stack,
    )
}

/// Parse one unit (the top document or an included one). Shared with the
/// include path so nested units report errors against their own source.
fn parse_unit(
    src: &str,
    file: Option<&str>,
    base: &str,
    resolver: &dyn Resolver,
    include_stack: &mut Vec<String>,
) -> Result<Node> {
    let index = LineIndex::new(src);
    let toks = match lexer::tokenize(src) {
        Ok(toks) => toks,
        Err(e) => {
            let (line, col) = index.line_col(e.offset);
            return Err(Error::Lexical(Box::new(SourceError {
                file: file.map(str::to_string),
                line,
                col,
                snippet: Snippet::new(index.line_text(src, line), col),
                message: format!("character `{}` matches no token rule", e.ch),
            })));
        }
    };
    Parser {
        src,
        file,
        base,
        resolver,
        include_stack,
        toks,
        pos: 0,
        index,
        decls: Vec::new(),
    }
    .parse_root()
}

// ── Parser implementation ────────────────────────────────────────────────

struct Parser<'a> {
    src: &'a str,
    file: Option<&'a str>,
    base: &'a str,
    resolver: &'a dyn Resolver,
    include_stack: &'a mut Vec<String>,
    toks: Vec<Token<'a>>,
    pos: usize,
    index: LineIndex,
    /// Preamble declarations, extended by adoption from included units.
    decls: Vec<Node>,
}

impl<'a> Parser<'a> {
    // ── Token navigation ────────────────────────────────────────────

    fn peek(&self) -> Option<&Token<'a>> {
        self.toks.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek2_kind(&self) -> Option<TokKind> {
        self.toks.get(self.pos + 1).map(|t| t.kind)
    }

    fn at(&self, kind: TokKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn bump(&mut self) -> Token<'a> {
        let t = self.toks[self.pos];
        self.pos += 1;
        t
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn expect(&mut self, kind: TokKind, what: &str) -> Result<Token<'a>> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            self.syntax_err(what)
        }
    }

    // ── Error construction ──────────────────────────────────────────

    fn source_error(&self, offset: usize, message: String) -> Box<SourceError> {
        let (line, col) = self.index.line_col(offset);
        Box::new(SourceError {
            file: self.file.map(str::to_string),
            line,
            col,
            snippet: Snippet::new(self.index.line_text(self.src, line), col),
            message,
        })
    }

    fn err_offset(&self) -> usize {
        self.peek().map_or(self.src.len(), |t| t.start)
    }

    fn syntax_err<T>(&self, what: &str) -> Result<T> {
        let message = match self.peek() {
            Some(t) => format!("{what}, found `{}`", t.text),
            None => format!("{what}, found end of input"),
        };
        Err(Error::Syntax(self.source_error(self.err_offset(), message)))
    }

    fn ambiguity_err<T>(&self, offset: usize, message: &str) -> Result<T> {
        Err(Error::Ambiguity(
            self.source_error(offset, message.to_string()),
        ))
    }

    fn include_err<T>(&self, offset: usize, message: String) -> Result<T> {
        Err(Error::Include(self.source_error(offset, message)))
    }

    // ── Root ────────────────────────────────────────────────────────

    fn parse_root(mut self) -> Result<Node> {
        self.parse_preamble()?;
        let body = self.parse_top_level_body()?;
        if !self.at_end() {
            return self.syntax_err("expected end of input");
        }
        let mut children = std::mem::take(&mut self.decls);
        children.extend(body);
        Ok(Node::with_children(NodeKind::Root, children))
    }

    fn parse_preamble(&mut self) -> Result<()> {
        loop {
            match self.peek_kind() {
                Some(TokKind::Keyword(Keyword::Default)) => {
                    self.bump();
                    self.expect(
                        TokKind::Keyword(Keyword::Namespace),
                        "expected `namespace` after `default`",
                    )?;
                    let prefix = if self.at(TokKind::Equal) {
                        None
                    } else {
                        Some(self.parse_name_token("expected a prefix or `=`")?)
                    };
                    self.expect(TokKind::Equal, "expected `=` in namespace declaration")?;
                    let uri = self.parse_strlit()?;
                    self.decls.push(Node::new(
                        NodeKind::DefaultNamespace,
                        prefix,
                        vec![Node::literal(uri)],
                    ));
                }
                Some(TokKind::Keyword(Keyword::Namespace)) => {
                    self.bump();
                    let prefix = self.parse_name_token("expected a namespace prefix")?;
                    self.expect(TokKind::Equal, "expected `=` in namespace declaration")?;
                    let uri = self.parse_strlit()?;
                    self.decls.push(Node::new(
                        NodeKind::Namespace,
                        Some(prefix),
                        vec![Node::literal(uri)],
                    ));
                }
                Some(TokKind::Keyword(Keyword::Datatypes)) => {
                    self.bump();
                    let prefix = self.parse_name_token("expected a datatypes prefix")?;
                    self.expect(TokKind::Equal, "expected `=` in datatypes declaration")?;
                    let uri = self.parse_strlit()?;
                    self.decls.push(Node::new(
                        NodeKind::Datatypes,
                        Some(prefix),
                        vec![Node::literal(uri)],
                    ));
                }
                _ => return Ok(()),
            }
        }
    }

    /// Top-level body: either a single element pattern (shorthand for
    /// `start = ...`), a single `grammar { ... }` block (spliced as if its
    /// members were top-level), or a member list.
    fn parse_top_level_body(&mut self) -> Result<Vec<Node>> {
        let annos = self.parse_annotations()?;
        match self.peek_kind() {
            Some(TokKind::Keyword(Keyword::Element)) => {
                let mut elem = self.parse_element_primary()?;
                if !self.at_end() {
                    return self.syntax_err("expected end of input after top-level element");
                }
                elem.children.splice(0..0, annos);
                let assign = Node::new(NodeKind::Assign, Some("=".into()), vec![elem]);
                Ok(vec![Node::new(
                    NodeKind::Define,
                    Some("start".into()),
                    vec![assign],
                )])
            }
            Some(TokKind::Keyword(Keyword::Grammar)) => {
                self.bump();
                self.expect(TokKind::LBrace, "expected `{` after `grammar`")?;
                let members = self.parse_grammar_content()?;
                self.expect(TokKind::RBrace, "expected `}` closing `grammar` block")?;
                if !self.at_end() {
                    return self.syntax_err("expected end of input after top-level grammar");
                }
                let mut out = annos;
                out.extend(members);
                Ok(out)
            }
            _ => {
                let mut out = self.parse_member_with(annos)?;
                while !self.at_end() {
                    out.extend(self.parse_member()?);
                }
                Ok(out)
            }
        }
    }

    // ── Grammar content ─────────────────────────────────────────────

    fn parse_grammar_content(&mut self) -> Result<Vec<Node>> {
        let mut members = Vec::new();
        while !self.at_end() && !self.at(TokKind::RBrace) {
            members.extend(self.parse_member()?);
        }
        Ok(members)
    }

    /// One grammar member. Returns a list because an include splices the
    /// included unit's members into this position.
    fn parse_member(&mut self) -> Result<Vec<Node>> {
        let annos = self.parse_annotations()?;
        self.parse_member_with(annos)
    }

    fn parse_member_with(&mut self, annos: Vec<Node>) -> Result<Vec<Node>> {
        // A bare qualified name followed by a bracket is a foreign
        // annotation element, not a definition.
        if self.at(TokKind::CName) && self.peek2_kind() == Some(TokKind::LBracket) {
            let name = self.bump().text.to_string();
            let mut children = annos;
            children.extend(self.parse_annotation_body()?);
            return Ok(vec![Node::new(NodeKind::Annotation, Some(name), children)]);
        }
        self.parse_component(annos)
    }

    fn parse_component(&mut self, annos: Vec<Node>) -> Result<Vec<Node>> {
        match self.peek_kind() {
            Some(TokKind::Keyword(Keyword::Div)) => {
                self.bump();
                self.expect(TokKind::LBrace, "expected `{` after `div`")?;
                let mut children = annos;
                children.extend(self.parse_grammar_content()?);
                self.expect(TokKind::RBrace, "expected `}` closing `div` block")?;
                Ok(vec![Node::with_children(NodeKind::Div, children)])
            }
            Some(TokKind::Keyword(Keyword::Include)) => {
                let mut members = self.parse_include()?;
                members.splice(0..0, annos);
                Ok(members)
            }
            Some(TokKind::Keyword(Keyword::Start)) => {
                self.bump();
                let assign = self.parse_definition()?;
                let mut children = annos;
                children.push(assign);
                Ok(vec![Node::new(
                    NodeKind::Define,
                    Some("start".into()),
                    children,
                )])
            }
            Some(TokKind::Ident | TokKind::QuotedId | TokKind::CName) => {
                let name = self.parse_identifier()?;
                let assign = self.parse_definition()?;
                let mut children = annos;
                children.push(assign);
                Ok(vec![Node::new(NodeKind::Define, Some(name), children)])
            }
            _ => self.syntax_err("expected a definition, `start`, `div`, or `include`"),
        }
    }

    fn parse_definition(&mut self) -> Result<Node> {
        let op = match self.peek_kind() {
            Some(TokKind::Equal | TokKind::Combine) => self.bump().text.to_string(),
            _ => return self.syntax_err("expected `=`, `|=`, or `&=`"),
        };
        let pattern = self.parse_pattern()?;
        Ok(Node::new(NodeKind::Assign, Some(op), vec![pattern]))
    }

    // ── Includes ────────────────────────────────────────────────────

    fn parse_include(&mut self) -> Result<Vec<Node>> {
        let directive = self.bump(); // the `include` keyword
        let location = self.parse_strlit()?;
        if self.at(TokKind::Keyword(Keyword::Inherit)) {
            // `inherit = prefix` is accepted; it carries no extra
            // semantics for the conversion itself.
            self.bump();
            self.expect(TokKind::Equal, "expected `=` after `inherit`")?;
            self.parse_name_token("expected a prefix after `inherit =`")?;
        }
        let overrides = if self.at(TokKind::LBrace) {
            self.bump();
            let body = self.parse_include_body()?;
            self.expect(TokKind::RBrace, "expected `}` closing include body")?;
            body
        } else {
            Vec::new()
        };

        let url = resolve::join_location(self.base, &location);
        let key = resolve::normalize_location(&url);
        if self.include_stack.contains(&key) {
            return self.include_err(directive.start, format!("cyclic include of `{url}`"));
        }
        let bytes = match self.resolver.fetch(&url) {
            Ok(bytes) => bytes,
            Err(e) => {
                return self.include_err(directive.start, format!("cannot read `{url}`: {e}"));
            }
        };
        let text = match resolve::decode(&bytes) {
            Ok(text) => text,
            Err(e) => {
                return self.include_err(directive.start, format!("cannot decode `{url}`: {e}"));
            }
        };

        self.include_stack.push(key);
        let sub = parse_unit(
            &text,
            Some(&url),
            &resolve::parent_location(&url),
            self.resolver,
            self.include_stack,
        );
        self.include_stack.pop();
        let sub = sub?;

        let mut members = Vec::new();
        for child in sub.children {
            if child.is_decl() {
                self.reconcile_decl(child, directive.start, &url)?;
            } else {
                members.push(child);
            }
        }
        let unmatched = apply_overrides(&mut members, overrides);
        members.extend(unmatched);
        Ok(members)
    }

    /// Check an included unit's declaration against the including
    /// document's. Same prefix, same URI: fine. Unknown: adopted.
    /// Conflicting: fatal.
    fn reconcile_decl(&mut self, decl: Node, offset: usize, url: &str) -> Result<()> {
        let existing = self.decls.iter().find(|d| {
            d.kind == decl.kind
                && (d.kind == NodeKind::DefaultNamespace || d.name == decl.name)
        });
        match existing {
            Some(ours) if ours.decl_uri() != decl.decl_uri() => {
                let what = match decl.kind {
                    NodeKind::Datatypes => "datatypes",
                    NodeKind::DefaultNamespace => "default namespace",
                    _ => "namespace",
                };
                let prefix = decl
                    .name
                    .as_deref()
                    .map_or_else(String::new, |p| format!(" `{p}`"));
                self.include_err(
                    offset,
                    format!(
                        "`{url}` declares {what}{prefix} as \"{}\" but the including file declares \"{}\"",
                        decl.decl_uri().unwrap_or_default(),
                        ours.decl_uri().unwrap_or_default(),
                    ),
                )
            }
            Some(_) => Ok(()),
            None => {
                self.decls.push(decl);
                Ok(())
            }
        }
    }

    /// Include override bodies allow definitions, `start`, and `div`
    /// blocks of those — but no nested `include` directives.
    fn parse_include_body(&mut self) -> Result<Vec<Node>> {
        let mut members = Vec::new();
        while !self.at_end() && !self.at(TokKind::RBrace) {
            let annos = self.parse_annotations()?;
            match self.peek_kind() {
                Some(TokKind::Keyword(Keyword::Div)) => {
                    self.bump();
                    self.expect(TokKind::LBrace, "expected `{` after `div`")?;
                    let mut children = annos;
                    children.extend(self.parse_include_body()?);
                    self.expect(TokKind::RBrace, "expected `}` closing `div` block")?;
                    members.push(Node::with_children(NodeKind::Div, children));
                }
                Some(TokKind::Keyword(Keyword::Start)) => {
                    self.bump();
                    let assign = self.parse_definition()?;
                    let mut children = annos;
                    children.push(assign);
                    members.push(Node::new(NodeKind::Define, Some("start".into()), children));
                }
                Some(TokKind::Ident | TokKind::QuotedId | TokKind::CName) => {
                    let name = self.parse_identifier()?;
                    let assign = self.parse_definition()?;
                    let mut children = annos;
                    children.push(assign);
                    members.push(Node::new(NodeKind::Define, Some(name), children));
                }
                _ => return self.syntax_err("expected a definition, `start`, or `div`"),
            }
        }
        Ok(members)
    }

    // ── Patterns ────────────────────────────────────────────────────

    /// A pattern: particles composed with exactly one of `|`, `,`, `&`.
    /// Same-operator chains flatten into a single n-ary node; mixing
    /// operators at one level is ambiguous and fatal.
    fn parse_pattern(&mut self) -> Result<Node> {
        let first = self.parse_particle()?;
        let op = match self.peek_kind() {
            Some(op @ (TokKind::Pipe | TokKind::Comma | TokKind::Amp)) => op,
            _ => return Ok(first),
        };
        let kind = match op {
            TokKind::Pipe => NodeKind::Choice,
            TokKind::Comma => NodeKind::Sequence,
            _ => NodeKind::Interleave,
        };
        let mut items = vec![first];
        while let Some(tok) = self.peek()
            && matches!(tok.kind, TokKind::Pipe | TokKind::Comma | TokKind::Amp)
        {
            if tok.kind != op {
                return self.ambiguity_err(
                    tok.start,
                    "cannot mix `|`, `,`, and `&` at one level; parenthesize to disambiguate",
                );
            }
            self.bump();
            items.push(self.parse_particle()?);
        }
        Ok(Node::with_children(kind, items))
    }

    /// A particle: an annotated primary with at most one quantifier, which
    /// binds to that primary alone.
    fn parse_particle(&mut self) -> Result<Node> {
        let primary = self.parse_annotated_primary()?;
        let kind = match self.peek_kind() {
            Some(TokKind::QMark) => NodeKind::Optional,
            Some(TokKind::Star) => NodeKind::ZeroOrMore,
            Some(TokKind::Plus) => NodeKind::OneOrMore,
            _ => return Ok(primary),
        };
        self.bump();
        Ok(Node::with_children(kind, vec![primary]))
    }

    fn parse_annotated_primary(&mut self) -> Result<Node> {
        let annos = self.parse_annotations()?;
        if self.at(TokKind::LParen) {
            if !annos.is_empty() {
                return self.syntax_err("annotations cannot precede a parenthesized pattern");
            }
            self.bump();
            let pattern = self.parse_pattern()?;
            self.expect(TokKind::RParen, "expected `)` closing group")?;
            return Ok(Node::with_children(NodeKind::Group, vec![pattern]));
        }
        let mut primary = self.parse_primary()?;
        primary.children.splice(0..0, annos);
        Ok(primary)
    }

    fn parse_primary(&mut self) -> Result<Node> {
        match self.peek_kind() {
            Some(TokKind::Keyword(Keyword::Element)) => self.parse_element_primary(),
            Some(TokKind::Keyword(Keyword::Attribute)) => {
                self.bump();
                let name_class = self.parse_name_class()?;
                self.expect(TokKind::LBrace, "expected `{` after attribute name")?;
                let pattern = self.parse_pattern()?;
                self.expect(TokKind::RBrace, "expected `}` closing attribute pattern")?;
                Ok(Node::with_children(
                    NodeKind::Attribute,
                    vec![name_class, pattern],
                ))
            }
            Some(TokKind::Keyword(Keyword::Mixed)) => {
                self.bump();
                Ok(Node::with_children(
                    NodeKind::Mixed,
                    vec![self.parse_braced_pattern()?],
                ))
            }
            Some(TokKind::Keyword(Keyword::List)) => {
                self.bump();
                Ok(Node::with_children(
                    NodeKind::List,
                    vec![self.parse_braced_pattern()?],
                ))
            }
            Some(TokKind::Keyword(Keyword::Grammar)) => {
                self.bump();
                self.expect(TokKind::LBrace, "expected `{` after `grammar`")?;
                let members = self.parse_grammar_content()?;
                self.expect(TokKind::RBrace, "expected `}` closing `grammar` block")?;
                Ok(Node::with_children(NodeKind::Grammar, members))
            }
            Some(TokKind::Keyword(Keyword::Parent)) => {
                self.bump();
                // References are plain identifiers, as in pattern
                // position, where a qualified name means a datatype.
                let name = match self.peek_kind() {
                    Some(TokKind::Ident) => self.bump().text.to_string(),
                    Some(TokKind::QuotedId) => {
                        self.bump().text.trim_start_matches('\\').to_string()
                    }
                    _ => return self.syntax_err("expected an identifier after `parent`"),
                };
                Ok(Node::named(NodeKind::Parent, name))
            }
            Some(TokKind::Keyword(Keyword::Empty)) => {
                self.bump();
                Ok(Node::leaf(NodeKind::Empty))
            }
            Some(TokKind::Keyword(Keyword::Text)) => {
                self.bump();
                Ok(Node::leaf(NodeKind::Text))
            }
            Some(TokKind::Keyword(Keyword::NotAllowed)) => {
                self.bump();
                Ok(Node::leaf(NodeKind::NotAllowed))
            }
            Some(TokKind::Keyword(Keyword::String | Keyword::Token)) => {
                let name = self.bump().text.to_string();
                self.parse_data_rest(name)
            }
            Some(TokKind::CName) => {
                let name = self.bump().text.to_string();
                self.parse_data_rest(name)
            }
            Some(TokKind::Literal) => {
                let text = self.parse_strlit()?;
                Ok(Node::named(NodeKind::Literal, text))
            }
            Some(TokKind::Ident | TokKind::QuotedId) => {
                let name = self.parse_identifier()?;
                Ok(Node::named(NodeKind::Ref, name))
            }
            _ => self.syntax_err("expected a pattern"),
        }
    }

    fn parse_element_primary(&mut self) -> Result<Node> {
        self.expect(TokKind::Keyword(Keyword::Element), "expected `element`")?;
        let name_class = self.parse_name_class()?;
        self.expect(TokKind::LBrace, "expected `{` after element name")?;
        let pattern = self.parse_pattern()?;
        self.expect(TokKind::RBrace, "expected `}` closing element pattern")?;
        Ok(Node::with_children(
            NodeKind::Element,
            vec![name_class, pattern],
        ))
    }

    fn parse_braced_pattern(&mut self) -> Result<Node> {
        self.expect(TokKind::LBrace, "expected `{`")?;
        let pattern = self.parse_pattern()?;
        self.expect(TokKind::RBrace, "expected `}`")?;
        Ok(pattern)
    }

    /// The rest of a datatype primary, after its name: a parameter block
    /// makes a data tag, a following literal makes a typed value, a bare
    /// name is a data tag without parameters.
    fn parse_data_rest(&mut self, name: String) -> Result<Node> {
        match self.peek_kind() {
            Some(TokKind::LBrace) => {
                self.bump();
                let params = self.parse_params()?;
                self.expect(TokKind::RBrace, "expected `}` closing parameter list")?;
                Ok(Node::new(NodeKind::DataTag, Some(name), params))
            }
            Some(TokKind::Literal) => {
                let text = self.parse_strlit()?;
                Ok(Node::new(
                    NodeKind::Literal,
                    Some(text),
                    vec![Node::named(NodeKind::LiteralType, name)],
                ))
            }
            _ => Ok(Node::named(NodeKind::DataTag, name)),
        }
    }

    fn parse_params(&mut self) -> Result<Vec<Node>> {
        let mut params = Vec::new();
        while !self.at_end() && !self.at(TokKind::RBrace) {
            let key = self.parse_name_token("expected a parameter name")?;
            self.expect(TokKind::Equal, "expected `=` after parameter name")?;
            let value = self.parse_strlit()?;
            params.push(Node::new(
                NodeKind::Param,
                Some(key),
                vec![Node::literal(value)],
            ));
        }
        Ok(params)
    }

    // ── Name classes ────────────────────────────────────────────────

    /// A name class: a simple class, a `|` union, or a `-` difference.
    /// Unions flatten; differences nest to the right (`a - b - c` is
    /// `a` except (`b` except `c`)). Mixing `|` and `-` at one level is
    /// ambiguous and fatal.
    fn parse_name_class(&mut self) -> Result<Node> {
        let first = self.parse_simple_name_class()?;
        match self.peek_kind() {
            Some(TokKind::Minus) => {
                let out = self.parse_except_chain(first)?;
                if let Some(tok) = self.peek()
                    && tok.kind == TokKind::Pipe
                {
                    return self.ambiguity_err(
                        tok.start,
                        "cannot mix `-` and `|` in a name class; parenthesize to disambiguate",
                    );
                }
                Ok(out)
            }
            Some(TokKind::Pipe) => {
                let mut items = vec![first];
                while self.at(TokKind::Pipe) {
                    self.bump();
                    items.push(self.parse_simple_name_class()?);
                }
                if let Some(tok) = self.peek()
                    && tok.kind == TokKind::Minus
                {
                    return self.ambiguity_err(
                        tok.start,
                        "cannot mix `|` and `-` in a name class; parenthesize to disambiguate",
                    );
                }
                Ok(Node::with_children(NodeKind::Choice, items))
            }
            _ => Ok(first),
        }
    }

    fn parse_except_chain(&mut self, mut base: Node) -> Result<Node> {
        // An exclusion attaches to a single name or wildcard; a
        // parenthesized choice has nowhere to carry it.
        if base.kind != NodeKind::Name {
            return self.syntax_err("expected a name or wildcard before `-`");
        }
        self.bump(); // the `-`
        let next = self.parse_simple_name_class()?;
        let excluded = if self.at(TokKind::Minus) {
            self.parse_except_chain(next)?
        } else {
            next
        };
        base.children
            .push(Node::with_children(NodeKind::Except, vec![excluded]));
        Ok(base)
    }

    fn parse_simple_name_class(&mut self) -> Result<Node> {
        match self.peek_kind() {
            Some(TokKind::Star) => {
                self.bump();
                Ok(Node::named(NodeKind::Name, "*"))
            }
            Some(TokKind::CName) => {
                let text = self.bump().text.to_string();
                Ok(Node::named(NodeKind::Name, text))
            }
            Some(TokKind::Ident | TokKind::Keyword(_)) => {
                let text = self.bump().text.to_string();
                Ok(Node::named(NodeKind::Name, text))
            }
            Some(TokKind::QuotedId) => {
                let text = self.bump().text.trim_start_matches('\\').to_string();
                Ok(Node::named(NodeKind::Name, text))
            }
            Some(TokKind::LParen) => {
                self.bump();
                let inner = self.parse_name_class()?;
                self.expect(TokKind::RParen, "expected `)` closing name class")?;
                Ok(inner)
            }
            _ => self.syntax_err("expected a name class"),
        }
    }

    // ── Annotations ─────────────────────────────────────────────────

    /// Leading documentation comments and an optional bracketed annotation
    /// block; the returned nodes are prepended to whatever follows.
    fn parse_annotations(&mut self) -> Result<Vec<Node>> {
        let mut out = Vec::new();
        let mut doc_lines: Vec<&str> = Vec::new();
        while let Some(tok) = self.peek()
            && tok.kind == TokKind::Documentation
        {
            doc_lines.push(tok.doc_text());
            self.bump();
        }
        if !doc_lines.is_empty() {
            out.push(Node::named(NodeKind::Documentation, doc_lines.join("\n")));
        }
        if self.at(TokKind::LBracket) {
            out.extend(self.parse_annotation_body()?);
        }
        Ok(out)
    }

    /// A bracketed annotation block: `key = "value"` attributes, nested
    /// `qname [ ... ]` elements, and bare literals.
    fn parse_annotation_body(&mut self) -> Result<Vec<Node>> {
        self.expect(TokKind::LBracket, "expected `[`")?;
        let mut items = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokKind::RBracket) => {
                    self.bump();
                    return Ok(items);
                }
                Some(TokKind::Literal) => {
                    let text = self.parse_strlit()?;
                    items.push(Node::literal(text));
                }
                Some(TokKind::CName) => {
                    let name = self.bump().text.to_string();
                    match self.peek_kind() {
                        Some(TokKind::Equal) => {
                            self.bump();
                            let value = self.parse_strlit()?;
                            items.push(Node::new(
                                NodeKind::AnnoAttr,
                                Some(name),
                                vec![Node::literal(value)],
                            ));
                        }
                        Some(TokKind::LBracket) => {
                            let children = self.parse_annotation_body()?;
                            items.push(Node::new(NodeKind::Annotation, Some(name), children));
                        }
                        _ => {
                            return self.syntax_err("expected `=` or `[` after annotation name");
                        }
                    }
                }
                Some(TokKind::Ident | TokKind::Keyword(_) | TokKind::QuotedId) => {
                    let key = self.parse_name_token("expected an annotation attribute name")?;
                    self.expect(TokKind::Equal, "expected `=` after annotation attribute")?;
                    let value = self.parse_strlit()?;
                    items.push(Node::new(
                        NodeKind::AnnoAttr,
                        Some(key),
                        vec![Node::literal(value)],
                    ));
                }
                _ => {
                    return self.syntax_err(
                        "expected an annotation attribute, element, literal, or `]`",
                    );
                }
            }
        }
    }

    // ── Small shared pieces ─────────────────────────────────────────

    /// A definition identifier: a plain, qualified, or quoted identifier.
    fn parse_identifier(&mut self) -> Result<String> {
        match self.peek_kind() {
            Some(TokKind::Ident | TokKind::CName) => Ok(self.bump().text.to_string()),
            Some(TokKind::QuotedId) => {
                Ok(self.bump().text.trim_start_matches('\\').to_string())
            }
            _ => self.syntax_err("expected an identifier"),
        }
    }

    /// An identifier or keyword usable as a name (prefixes, parameter
    /// keys, the `inherit` argument).
    fn parse_name_token(&mut self, what: &str) -> Result<String> {
        match self.peek_kind() {
            Some(TokKind::Ident | TokKind::Keyword(_)) => Ok(self.bump().text.to_string()),
            Some(TokKind::QuotedId) => {
                Ok(self.bump().text.trim_start_matches('\\').to_string())
            }
            _ => self.syntax_err(what),
        }
    }

    /// A string literal, with `~` concatenation applied left-to-right at
    /// parse time.
    fn parse_strlit(&mut self) -> Result<String> {
        let tok = self.expect(TokKind::Literal, "expected a string literal")?;
        let mut text = tok.literal_value().to_string();
        while self.at(TokKind::Tilde) {
            self.bump();
            let next = self.expect(TokKind::Literal, "expected a string literal after `~`")?;
            text.push_str(next.literal_value());
        }
        Ok(text)
    }
}

// ── Include overrides ────────────────────────────────────────────────────

/// Apply include-body overrides: definitions in the body replace
/// same-named definitions from the included unit (last writer wins among
/// the overrides); overrides matching nothing are appended.
fn apply_overrides(members: &mut [Node], overrides: Vec<Node>) -> Vec<Node> {
    let mut map: BTreeMap<String, Node> = BTreeMap::new();
    collect_defines(overrides, &mut map);
    let mut used = std::collections::BTreeSet::new();
    replace_defines(members, &map, &mut used);
    map.into_iter()
        .filter(|(name, _)| !used.contains(name))
        .map(|(_, node)| node)
        .collect()
}

fn collect_defines(nodes: Vec<Node>, map: &mut BTreeMap<String, Node>) {
    for node in nodes {
        match node.kind {
            NodeKind::Define => {
                if let Some(name) = node.name.clone() {
                    map.insert(name, node);
                }
            }
            NodeKind::Div => collect_defines(node.children, map),
            _ => {}
        }
    }
}

fn replace_defines(
    members: &mut [Node],
    map: &BTreeMap<String, Node>,
    used: &mut std::collections::BTreeSet<String>,
) {
    for member in members {
        match member.kind {
            NodeKind::Define => {
                if let Some(name) = member.name.as_deref()
                    && let Some(replacement) = map.get(name)
                {
                    used.insert(name.to_string());
                    *member = replacement.clone();
                }
            }
            NodeKind::Div => replace_defines(&mut member.children, map, used),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strlit_concat_is_applied_at_parse_time() {
        let root = parse_str("x = \"foo\" ~ \"bar\" ~ \"baz\"").unwrap();
        let define = &root.children[0];
        let assign = &define.children[0];
        let lit = &assign.children[0];
        assert_eq!(lit.kind, NodeKind::Literal);
        assert_eq!(lit.name.as_deref(), Some("foobarbaz"));
    }

    #[test]
    fn except_chain_nests_to_the_right() {
        let root = parse_str("start = element a - b - c { empty }").unwrap();
        let elem = &root.children[0].children[0].children[0];
        assert_eq!(elem.kind, NodeKind::Element);
        let a = &elem.children[0];
        assert_eq!(a.name.as_deref(), Some("a"));
        let except_b = &a.children[0];
        assert_eq!(except_b.kind, NodeKind::Except);
        let b = &except_b.children[0];
        assert_eq!(b.name.as_deref(), Some("b"));
        let except_c = &b.children[0];
        assert_eq!(except_c.kind, NodeKind::Except);
        assert_eq!(except_c.children[0].name.as_deref(), Some("c"));
    }

    #[test]
    fn mixed_particle_operators_are_ambiguous() {
        let err = parse_str("x = a, b | c").unwrap_err();
        assert!(matches!(err, Error::Ambiguity(_)), "got {err:?}");
    }

    #[test]
    fn mixed_name_class_operators_are_ambiguous() {
        let err = parse_str("start = element a | b - c { empty }").unwrap_err();
        assert!(matches!(err, Error::Ambiguity(_)), "got {err:?}");
    }

    #[test]
    fn exclusion_requires_a_name_or_wildcard_on_the_left() {
        // A parenthesized choice cannot carry an exclusion.
        let err = parse_str("start = element (a | b) - c { empty }").unwrap_err();
        assert!(matches!(err, Error::Syntax(_)), "got {err:?}");
        // The excluded side may still be parenthesized.
        assert!(parse_str("start = element a - (b | c) { empty }").is_ok());
    }

    #[test]
    fn parent_takes_a_plain_identifier_only() {
        let err = parse_str("x = grammar { start = parent a:b }").unwrap_err();
        assert!(matches!(err, Error::Syntax(_)), "got {err:?}");
        assert!(parse_str("x = grammar { start = parent \\list }").is_ok());
    }

    #[test]
    fn qualified_definition_names_accepted() {
        let root = parse_str(
            "datatypes xsd = \"http://www.w3.org/2001/XMLSchema-datatypes\"\na:int = xsd:integer",
        )
        .unwrap();
        let define = &root.children[1];
        assert_eq!(define.kind, NodeKind::Define);
        assert_eq!(define.name.as_deref(), Some("a:int"));
    }

    #[test]
    fn same_operator_chain_flattens() {
        let root = parse_str("x = a | b | c").unwrap();
        let choice = &root.children[0].children[0].children[0];
        assert_eq!(choice.kind, NodeKind::Choice);
        assert_eq!(choice.children.len(), 3);
    }

    #[test]
    fn quantifier_binds_to_preceding_primary_only() {
        let root = parse_str("x = a, b*").unwrap();
        let seq = &root.children[0].children[0].children[0];
        assert_eq!(seq.kind, NodeKind::Sequence);
        assert_eq!(seq.children[0].kind, NodeKind::Ref);
        assert_eq!(seq.children[1].kind, NodeKind::ZeroOrMore);
        assert_eq!(seq.children[1].children[0].kind, NodeKind::Ref);
    }

    #[test]
    fn top_level_element_becomes_start() {
        let root = parse_str("element root { text }").unwrap();
        assert_eq!(root.children.len(), 1);
        let define = &root.children[0];
        assert_eq!(define.kind, NodeKind::Define);
        assert_eq!(define.name.as_deref(), Some("start"));
        let assign = &define.children[0];
        assert_eq!(assign.name.as_deref(), Some("="));
        assert_eq!(assign.children[0].kind, NodeKind::Element);
    }

    #[test]
    fn top_level_grammar_is_spliced() {
        let root = parse_str("grammar { start = text \n other = empty }").unwrap();
        assert_eq!(root.children.len(), 2);
        assert!(root.children.iter().all(|c| c.kind == NodeKind::Define));
    }

    #[test]
    fn syntax_error_carries_position_and_line() {
        let err = parse_str("start =\n= text").unwrap_err();
        let Error::Syntax(src) = err else {
            panic!("expected syntax error");
        };
        assert_eq!(src.line, 1);
        assert_eq!(src.col, 0);
        assert_eq!(src.snippet.line, "= text");
    }

    #[test]
    fn combine_operators_recorded_on_assign() {
        let root = parse_str("a = text\na |= empty").unwrap();
        assert_eq!(root.children[1].children[0].name.as_deref(), Some("|="));
    }

    #[test]
    fn quoted_identifier_escapes_keyword() {
        let root = parse_str("\\list = text\nx = \\list").unwrap();
        assert_eq!(root.children[0].name.as_deref(), Some("list"));
        let reference = &root.children[1].children[0].children[0];
        assert_eq!(reference.kind, NodeKind::Ref);
        assert_eq!(reference.name.as_deref(), Some("list"));
    }

    #[test]
    fn annotations_attach_to_following_definition() {
        let root = parse_str("## doc line\nx = text").unwrap();
        let define = &root.children[0];
        assert_eq!(define.children[0].kind, NodeKind::Documentation);
        assert_eq!(define.children[0].name.as_deref(), Some("doc line"));
        assert_eq!(define.children[1].kind, NodeKind::Assign);
    }

    #[test]
    fn foreign_member_annotation() {
        let root = parse_str("x = text\ns:rule [ k = \"v\" ]").unwrap();
        let anno = &root.children[1];
        assert_eq!(anno.kind, NodeKind::Annotation);
        assert_eq!(anno.name.as_deref(), Some("s:rule"));
        assert_eq!(anno.children[0].kind, NodeKind::AnnoAttr);
    }

    #[test]
    fn typed_literal_carries_type_annotation() {
        let root = parse_str(
            "datatypes xsd = \"http://www.w3.org/2001/XMLSchema-datatypes\"\nx = xsd:integer \"42\"",
        )
        .unwrap();
        let lit = &root.children[1].children[0].children[0];
        assert_eq!(lit.kind, NodeKind::Literal);
        assert_eq!(lit.name.as_deref(), Some("42"));
        assert_eq!(lit.children[0].kind, NodeKind::LiteralType);
        assert_eq!(lit.children[0].name.as_deref(), Some("xsd:integer"));
    }

    #[test]
    fn data_params_parsed() {
        let root = parse_str(
            "datatypes xsd = \"http://www.w3.org/2001/XMLSchema-datatypes\"\nx = xsd:string { maxLength = \"16\" }",
        )
        .unwrap();
        let data = &root.children[1].children[0].children[0];
        assert_eq!(data.kind, NodeKind::DataTag);
        assert_eq!(data.name.as_deref(), Some("xsd:string"));
        let param = &data.children[0];
        assert_eq!(param.kind, NodeKind::Param);
        assert_eq!(param.name.as_deref(), Some("maxLength"));
        assert_eq!(param.children[0].name.as_deref(), Some("16"));
    }

    #[test]
    fn empty_input_is_a_syntax_error() {
        assert!(matches!(parse_str(""), Err(Error::Syntax(_))));
    }
}
