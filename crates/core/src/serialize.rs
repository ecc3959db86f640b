//! XML-syntax emission.
//!
//! A first pass over the root's direct children collects the namespace and
//! datatype-library declarations into transient maps; a depth-first walk
//! then renders the member tree into indented lines, tracking which
//! declarations were actually referenced. The root `<grammar>` open tag is
//! assembled last from that usage record, so unreferenced declarations
//! leave no trace and the attribute set is independent of declaration
//! order.
//!
//! Output is deterministic: identical input trees produce byte-identical
//! text.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{Node, NodeKind};
use crate::error::{Error, Result};

/// The RELAX NG structure namespace.
const RNG_NS: &str = "http://relaxng.org/ns/structure/1.0";
/// Namespace for `a:documentation` elements.
const ANNO_NS: &str = "http://relaxng.org/ns/compatibility/annotations/1.0";
/// The implicit default datatype library.
const XSD_TYPES: &str = "http://www.w3.org/2001/XMLSchema-datatypes";
/// Predeclared binding of the `xml` prefix.
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

// ── Public surface ───────────────────────────────────────────────────────

/// Renders a parsed schema tree as XML-syntax text.
#[derive(Debug, Clone)]
pub struct XmlSerializer {
    indent: String,
}

impl Default for XmlSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlSerializer {
    /// Serializer with the default two-space indent unit.
    pub fn new() -> Self {
        Self::with_indent("  ")
    }

    /// Serializer with an explicit indent unit.
    pub fn with_indent(indent: &str) -> Self {
        Self {
            indent: indent.to_string(),
        }
    }

    /// Render a root node as a complete XML document. The text starts with
    /// an XML declaration and ends at the closing `</grammar>` with no
    /// trailing newline.
    pub fn to_xml(&self, root: &Node) -> Result<String> {
        let mut walker = Walker::new(&self.indent);
        for child in &root.children {
            walker.declare(child);
        }
        for child in &root.children {
            if !child.is_decl() {
                walker.visit(child, 1)?;
            }
        }
        Ok(walker.finish())
    }
}

// ── Walker ───────────────────────────────────────────────────────────────

/// Whether a plain (unprefixed) name sits on an element or an attribute.
/// Elements take the declared default namespace; attributes always default
/// to the empty namespace.
#[derive(Clone, Copy, PartialEq, Eq)]
enum NameCtx {
    Element,
    Attribute,
}

struct Walker<'a> {
    indent: &'a str,
    /// Declared default namespace URI, if any.
    default_ns: Option<&'a str>,
    /// `namespace prefix = "uri"` bindings (plus the predeclared `xml`).
    ns: BTreeMap<&'a str, &'a str>,
    /// `datatypes prefix = "uri"` bindings (plus the predeclared `xsd`).
    types: BTreeMap<&'a str, &'a str>,
    /// Namespace prefixes actually referenced during the walk.
    used_ns: BTreeSet<&'a str>,
    /// Whether any documentation element was emitted.
    used_docs: bool,
    /// Whether any data tag or typed value was emitted.
    used_types: bool,
    lines: Vec<String>,
}

impl<'a> Walker<'a> {
    fn new(indent: &'a str) -> Self {
        let mut ns = BTreeMap::new();
        ns.insert("xml", XML_NS);
        let mut types = BTreeMap::new();
        types.insert("xsd", XSD_TYPES);
        Self {
            indent,
            default_ns: None,
            ns,
            types,
            used_ns: BTreeSet::new(),
            used_docs: false,
            used_types: false,
            lines: Vec::new(),
        }
    }

    fn declare(&mut self, node: &'a Node) {
        let Some(uri) = node.decl_uri() else { return };
        match node.kind {
            NodeKind::DefaultNamespace => {
                self.default_ns = Some(uri);
                // `default namespace p = "uri"` also binds the prefix.
                if let Some(prefix) = node.name.as_deref() {
                    self.ns.insert(prefix, uri);
                }
            }
            NodeKind::Namespace => {
                if let Some(prefix) = node.name.as_deref() {
                    self.ns.insert(prefix, uri);
                }
            }
            NodeKind::Datatypes => {
                if let Some(prefix) = node.name.as_deref() {
                    self.types.insert(prefix, uri);
                }
            }
            _ => {}
        }
    }

    /// The document bound `a` to something other than the annotations
    /// namespace, so documentation elements need a local override.
    fn anno_prefix_taken(&self) -> bool {
        self.ns.get("a").is_some_and(|uri| *uri != ANNO_NS)
    }

    fn finish(self) -> String {
        let mut xmlns: BTreeMap<String, &str> = BTreeMap::new();
        for prefix in &self.used_ns {
            if let Some(uri) = self.ns.get(prefix).copied() {
                xmlns.insert((*prefix).to_string(), uri);
            }
        }
        if self.used_docs && !self.anno_prefix_taken() {
            xmlns.insert("a".to_string(), ANNO_NS);
        }
        let mut open = format!("<grammar xmlns=\"{RNG_NS}\"");
        for (prefix, uri) in &xmlns {
            open.push_str(&format!(" xmlns:{prefix}=\"{}\"", escape_attr(uri)));
        }
        if self.used_types {
            open.push_str(&format!(" datatypeLibrary=\"{XSD_TYPES}\""));
        }
        if let Some(uri) = self.default_ns {
            open.push_str(&format!(" ns=\"{}\"", escape_attr(uri)));
        }
        open.push('>');

        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&open);
        for line in &self.lines {
            out.push('\n');
            out.push_str(line);
        }
        out.push_str("\n</grammar>");
        out
    }

    // ── Line plumbing ───────────────────────────────────────────────

    fn push(&mut self, depth: usize, text: impl Into<String>) {
        self.lines
            .push(format!("{}{}", self.indent.repeat(depth), text.into()));
    }

    // ── Prefix resolution ───────────────────────────────────────────

    fn resolve_ns(&mut self, prefix: &'a str, full: &str) -> Result<&'a str> {
        match self.ns.get(prefix).copied() {
            Some(uri) => {
                self.used_ns.insert(prefix);
                Ok(uri)
            }
            None => Err(Error::Resolution {
                name: full.to_string(),
                message: format!("undeclared namespace prefix `{prefix}` in `{full}`"),
            }),
        }
    }

    fn resolve_type(&mut self, prefix: &str, full: &str) -> Result<&'a str> {
        match self.types.get(prefix).copied() {
            Some(uri) => Ok(uri),
            None => Err(Error::Resolution {
                name: full.to_string(),
                message: format!("undeclared datatype prefix `{prefix}` in `{full}`"),
            }),
        }
    }

    /// Attributes for the enclosing tag derived from annotation-attribute
    /// children; prefixed keys must resolve.
    fn foreign_attrs(&mut self, children: &'a [Node]) -> Result<Vec<(String, String)>> {
        let mut attrs = Vec::new();
        for child in children {
            if child.kind != NodeKind::AnnoAttr {
                continue;
            }
            let Some(key) = child.name.as_deref() else { continue };
            if let Some((prefix, _)) = key.split_once(':') {
                self.resolve_ns(prefix, key)?;
            }
            let value = child
                .children
                .first()
                .and_then(|v| v.name.as_deref())
                .unwrap_or("");
            attrs.push((key.to_string(), value.to_string()));
        }
        Ok(attrs)
    }

    // ── Tree walk ───────────────────────────────────────────────────

    fn visit(&mut self, node: &'a Node, depth: usize) -> Result<()> {
        match node.kind {
            NodeKind::Define => self.emit_define(node, depth),
            // Assignment wrappers, parenthesized groups, and `,` sequences
            // are transparent: XML-syntax content models are implicit
            // groups, so the children stand on their own.
            NodeKind::Assign | NodeKind::Group | NodeKind::Sequence => {
                for child in &node.children {
                    self.visit(child, depth)?;
                }
                Ok(())
            }
            NodeKind::Choice => self.emit_container(node, "choice", depth),
            NodeKind::Interleave => self.emit_container(node, "interleave", depth),
            NodeKind::Optional => self.emit_container(node, "optional", depth),
            NodeKind::ZeroOrMore => self.emit_container(node, "zeroOrMore", depth),
            NodeKind::OneOrMore => self.emit_container(node, "oneOrMore", depth),
            NodeKind::Mixed => self.emit_container(node, "mixed", depth),
            NodeKind::List => self.emit_container(node, "list", depth),
            NodeKind::Div => self.emit_container(node, "div", depth),
            NodeKind::Grammar => self.emit_container(node, "grammar", depth),
            NodeKind::Element => self.emit_named_pattern(node, "element", NameCtx::Element, depth),
            NodeKind::Attribute => {
                self.emit_named_pattern(node, "attribute", NameCtx::Attribute, depth)
            }
            NodeKind::Ref => self.emit_reference(node, "ref", depth),
            NodeKind::Parent => self.emit_reference(node, "parent", depth),
            NodeKind::Empty => self.emit_nullary(node, "empty", depth),
            NodeKind::Text => self.emit_nullary(node, "text", depth),
            NodeKind::NotAllowed => self.emit_nullary(node, "notAllowed", depth),
            NodeKind::Literal => self.emit_value(node, depth),
            NodeKind::DataTag => self.emit_data(node, depth),
            NodeKind::Param => self.emit_param(node, depth),
            NodeKind::Documentation => self.emit_documentation(node, depth),
            NodeKind::Annotation => self.emit_annotation(node, depth),
            // Declarations are consumed up front; annotation attributes by
            // their enclosing tag; the rest never appears in pattern
            // position.
            _ => Ok(()),
        }
    }

    fn emit_define(&mut self, node: &'a Node, depth: usize) -> Result<()> {
        let mut attrs = Vec::new();
        let is_start = node.name.as_deref() == Some("start");
        if !is_start && let Some(name) = node.name.as_deref() {
            attrs.push(("name".to_string(), name.to_string()));
        }
        let combine = node
            .children
            .iter()
            .find(|c| c.kind == NodeKind::Assign)
            .and_then(|a| a.name.as_deref());
        match combine {
            Some("|=") => attrs.push(("combine".to_string(), "choice".to_string())),
            Some("&=") => attrs.push(("combine".to_string(), "interleave".to_string())),
            _ => {}
        }
        attrs.extend(self.foreign_attrs(&node.children)?);
        let tag = if is_start { "start" } else { "define" };
        self.push(depth, open_tag(tag, &attrs));
        for child in &node.children {
            if child.kind != NodeKind::AnnoAttr {
                self.visit(child, depth + 1)?;
            }
        }
        self.push(depth, format!("</{tag}>"));
        Ok(())
    }

    fn emit_container(&mut self, node: &'a Node, tag: &str, depth: usize) -> Result<()> {
        let attrs = self.foreign_attrs(&node.children)?;
        if node
            .children
            .iter()
            .all(|c| c.kind == NodeKind::AnnoAttr)
        {
            self.push(depth, self_closing(tag, &attrs));
            return Ok(());
        }
        self.push(depth, open_tag(tag, &attrs));
        for child in &node.children {
            if child.kind != NodeKind::AnnoAttr {
                self.visit(child, depth + 1)?;
            }
        }
        self.push(depth, format!("</{tag}>"));
        Ok(())
    }

    /// `element`/`attribute`: annotations, then exactly one name-class
    /// subtree, then the content pattern.
    fn emit_named_pattern(
        &mut self,
        node: &'a Node,
        tag: &str,
        ctx: NameCtx,
        depth: usize,
    ) -> Result<()> {
        let attrs = self.foreign_attrs(&node.children)?;
        self.push(depth, open_tag(tag, &attrs));
        let mut saw_name_class = false;
        for child in &node.children {
            match child.kind {
                NodeKind::AnnoAttr => {}
                NodeKind::Documentation | NodeKind::Annotation => {
                    self.visit(child, depth + 1)?;
                }
                _ if !saw_name_class => {
                    saw_name_class = true;
                    self.emit_name_class(child, ctx, depth + 1)?;
                }
                _ => self.visit(child, depth + 1)?,
            }
        }
        self.push(depth, format!("</{tag}>"));
        Ok(())
    }

    // ── Name classes ────────────────────────────────────────────────

    fn emit_name_class(&mut self, node: &'a Node, ctx: NameCtx, depth: usize) -> Result<()> {
        match node.kind {
            NodeKind::Choice => {
                self.push(depth, "<choice>");
                for child in &node.children {
                    self.emit_name_class(child, ctx, depth + 1)?;
                }
                self.push(depth, "</choice>");
                Ok(())
            }
            NodeKind::Name => self.emit_name(node, ctx, depth),
            // A parenthesized class reduces to its content at parse time,
            // so nothing else reaches here.
            _ => Ok(()),
        }
    }

    fn emit_name(&mut self, node: &'a Node, ctx: NameCtx, depth: usize) -> Result<()> {
        let name = node.name.as_deref().unwrap_or("");
        let excepts: Vec<&Node> = node
            .children
            .iter()
            .filter(|c| c.kind == NodeKind::Except)
            .collect();

        if name == "*" {
            return self.emit_wildcard(node, "<anyName>", "</anyName>", "<anyName/>", depth, ctx);
        }
        if let Some(prefix) = name.strip_suffix(":*") {
            let uri = self.resolve_ns(prefix, name)?;
            let open = format!("<nsName ns=\"{}\">", escape_attr(uri));
            let closed = format!("<nsName ns=\"{}\"/>", escape_attr(uri));
            return self.emit_wildcard(node, &open, "</nsName>", &closed, depth, ctx);
        }

        let (ns, local) = match name.split_once(':') {
            Some((prefix, local)) => (self.resolve_ns(prefix, name)?, local),
            None => match ctx {
                NameCtx::Element => (self.default_ns.unwrap_or(""), name),
                NameCtx::Attribute => ("", name),
            },
        };
        if excepts.is_empty() {
            self.push(
                depth,
                format!(
                    "<name ns=\"{}\">{}</name>",
                    escape_attr(ns),
                    escape_text(local)
                ),
            );
        } else {
            self.push(depth, format!("<name ns=\"{}\">", escape_attr(ns)));
            self.push(depth + 1, escape_text(local));
            for except in excepts {
                self.emit_except(except, ctx, depth + 1)?;
            }
            self.push(depth, "</name>");
        }
        Ok(())
    }

    fn emit_wildcard(
        &mut self,
        node: &'a Node,
        open: &str,
        close: &str,
        self_closed: &str,
        depth: usize,
        ctx: NameCtx,
    ) -> Result<()> {
        let excepts: Vec<&'a Node> = node
            .children
            .iter()
            .filter(|c| c.kind == NodeKind::Except)
            .collect();
        if excepts.is_empty() {
            self.push(depth, self_closed);
            return Ok(());
        }
        self.push(depth, open);
        for except in excepts {
            self.emit_except(except, ctx, depth + 1)?;
        }
        self.push(depth, close);
        Ok(())
    }

    fn emit_except(&mut self, node: &'a Node, ctx: NameCtx, depth: usize) -> Result<()> {
        self.push(depth, "<except>");
        for child in &node.children {
            self.emit_name_class(child, ctx, depth + 1)?;
        }
        self.push(depth, "</except>");
        Ok(())
    }

    // ── Leaves ──────────────────────────────────────────────────────

    fn emit_reference(&mut self, node: &'a Node, tag: &str, depth: usize) -> Result<()> {
        let mut attrs = vec![(
            "name".to_string(),
            node.name.clone().unwrap_or_default(),
        )];
        attrs.extend(self.foreign_attrs(&node.children)?);
        let content: Vec<&'a Node> = node
            .children
            .iter()
            .filter(|c| c.kind != NodeKind::AnnoAttr)
            .collect();
        if content.is_empty() {
            self.push(depth, self_closing(tag, &attrs));
        } else {
            self.push(depth, open_tag(tag, &attrs));
            for child in content {
                self.visit(child, depth + 1)?;
            }
            self.push(depth, format!("</{tag}>"));
        }
        Ok(())
    }

    fn emit_nullary(&mut self, node: &'a Node, tag: &str, depth: usize) -> Result<()> {
        let attrs = self.foreign_attrs(&node.children)?;
        let content: Vec<&'a Node> = node
            .children
            .iter()
            .filter(|c| c.kind != NodeKind::AnnoAttr)
            .collect();
        if content.is_empty() {
            self.push(depth, self_closing(tag, &attrs));
        } else {
            self.push(depth, open_tag(tag, &attrs));
            for child in content {
                self.visit(child, depth + 1)?;
            }
            self.push(depth, format!("</{tag}>"));
        }
        Ok(())
    }

    /// `<value>`, optionally typed. The type attribute resolves through
    /// the datatypes map; the library attribute appears only when the
    /// resolved URI is not the implicit XML Schema default.
    fn emit_value(&mut self, node: &'a Node, depth: usize) -> Result<()> {
        let mut attrs = Vec::new();
        if let Some(ty) = node
            .children
            .iter()
            .find(|c| c.kind == NodeKind::LiteralType)
            .and_then(|c| c.name.as_deref())
        {
            self.used_types = true;
            match ty.split_once(':') {
                Some((prefix, local)) => {
                    let uri = self.resolve_type(prefix, ty)?;
                    attrs.push(("type".to_string(), local.to_string()));
                    if uri != XSD_TYPES {
                        attrs.push(("datatypeLibrary".to_string(), uri.to_string()));
                    }
                }
                None => attrs.push(("type".to_string(), ty.to_string())),
            }
        }
        attrs.extend(self.foreign_attrs(&node.children)?);
        let text = node.name.as_deref().unwrap_or("");
        let annos: Vec<&'a Node> = node
            .children
            .iter()
            .filter(|c| matches!(c.kind, NodeKind::Documentation | NodeKind::Annotation))
            .collect();
        if annos.is_empty() {
            self.push(
                depth,
                format!(
                    "{}{}</value>",
                    open_tag("value", &attrs),
                    escape_text(text)
                ),
            );
        } else {
            // Annotations force the multi-line form; the text gets its
            // own line after them.
            self.push(depth, open_tag("value", &attrs));
            for child in annos {
                self.visit(child, depth + 1)?;
            }
            self.push(depth + 1, escape_text(text));
            self.push(depth, "</value>");
        }
        Ok(())
    }

    fn emit_data(&mut self, node: &'a Node, depth: usize) -> Result<()> {
        let name = node.name.as_deref().unwrap_or("");
        self.used_types = true;
        let mut attrs = Vec::new();
        match name.split_once(':') {
            Some((prefix, local)) => {
                let uri = self.resolve_type(prefix, name)?;
                attrs.push(("type".to_string(), local.to_string()));
                if uri != XSD_TYPES {
                    attrs.push(("datatypeLibrary".to_string(), uri.to_string()));
                }
            }
            // `string` and `token` are built-ins with no library.
            None => attrs.push(("type".to_string(), name.to_string())),
        }
        attrs.extend(self.foreign_attrs(&node.children)?);
        let content: Vec<&'a Node> = node
            .children
            .iter()
            .filter(|c| c.kind != NodeKind::AnnoAttr)
            .collect();
        if content.is_empty() {
            self.push(depth, self_closing("data", &attrs));
        } else {
            self.push(depth, open_tag("data", &attrs));
            for child in content {
                self.visit(child, depth + 1)?;
            }
            self.push(depth, "</data>");
        }
        Ok(())
    }

    fn emit_param(&mut self, node: &'a Node, depth: usize) -> Result<()> {
        let name = node.name.clone().unwrap_or_default();
        let value = node
            .children
            .first()
            .and_then(|c| c.name.as_deref())
            .unwrap_or("");
        self.push(
            depth,
            format!(
                "{}{}</param>",
                open_tag("param", &[("name".to_string(), name)]),
                escape_text(value)
            ),
        );
        Ok(())
    }

    // ── Annotations ─────────────────────────────────────────────────

    fn emit_documentation(&mut self, node: &'a Node, depth: usize) -> Result<()> {
        self.used_docs = true;
        // A document that binds `a` itself forces a local override so its
        // own binding stays intact.
        let attrs = if self.anno_prefix_taken() {
            format!(" xmlns:a=\"{ANNO_NS}\"")
        } else {
            String::new()
        };
        let text = escape_text(node.name.as_deref().unwrap_or(""));
        self.push(
            depth,
            format!("<a:documentation{attrs}>{text}</a:documentation>"),
        );
        Ok(())
    }

    /// A foreign annotation element, named by its qualified name, with
    /// annotation attributes on the tag and literal or nested annotation
    /// children as content.
    fn emit_annotation(&mut self, node: &'a Node, depth: usize) -> Result<()> {
        let name = node.name.as_deref().unwrap_or("");
        if let Some((prefix, _)) = name.split_once(':') {
            self.resolve_ns(prefix, name)?;
        }
        let attrs = self.foreign_attrs(&node.children)?;
        let content: Vec<&'a Node> = node
            .children
            .iter()
            .filter(|c| c.kind != NodeKind::AnnoAttr)
            .collect();
        if content.is_empty() {
            self.push(depth, self_closing(name, &attrs));
            return Ok(());
        }
        self.push(depth, open_tag(name, &attrs));
        for child in content {
            match child.kind {
                NodeKind::Literal => {
                    let text = child.name.as_deref().unwrap_or("");
                    self.push(depth + 1, escape_text(text));
                }
                _ => self.visit(child, depth + 1)?,
            }
        }
        self.push(depth, format!("</{name}>"));
        Ok(())
    }
}

// ── Text helpers ─────────────────────────────────────────────────────────

fn open_tag(name: &str, attrs: &[(String, String)]) -> String {
    let mut out = format!("<{name}");
    for (key, value) in attrs {
        out.push_str(&format!(" {key}=\"{}\"", escape_attr(value)));
    }
    out.push('>');
    out
}

fn self_closing(name: &str, attrs: &[(String, String)]) -> String {
    let mut out = open_tag(name, attrs);
    out.pop();
    out.push_str("/>");
    out
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
