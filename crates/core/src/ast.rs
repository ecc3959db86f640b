//! AST node model.
//!
//! Every syntactic construct is one [`Node`]: a kind tag, an optional name,
//! and an ordered list of child nodes. `children` is never conceptually
//! absent — a node without substructure has an empty list. Declaration
//! URIs, parameter values, and annotation attribute values are stored as
//! `Literal` children so that a child is always a `Node`.

use serde::{Deserialize, Serialize};

/// The closed set of syntactic constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// Document root; children are declarations followed by members.
    Root,
    /// Named definition (`name = pattern`); `start` is the reserved name.
    Define,
    /// Definition operator wrapper; `name` holds `=`, `|=`, or `&=`.
    Assign,
    /// `grammar { ... }` block.
    Grammar,
    /// `div { ... }` block.
    Div,
    /// Element pattern; children are one name class then the content.
    Element,
    /// Attribute pattern; children are one name class then the content.
    Attribute,
    /// `|` composition (patterns or name classes).
    Choice,
    /// `,` composition.
    Sequence,
    /// `&` composition.
    Interleave,
    /// Parenthesized pattern.
    Group,
    /// `?` quantifier.
    Optional,
    /// `*` quantifier.
    ZeroOrMore,
    /// `+` quantifier.
    OneOrMore,
    /// A name or name-class atom: plain, `prefix:local`, `prefix:*`, `*`.
    Name,
    /// Reference to a definition; resolution is the consumer's concern.
    Ref,
    /// Reference into the parent grammar's scope.
    Parent,
    /// `notAllowed`.
    NotAllowed,
    /// `empty`.
    Empty,
    /// `text`.
    Text,
    /// `mixed { ... }`.
    Mixed,
    /// `list { ... }`.
    List,
    /// String value; `name` holds the (already concatenated) text.
    Literal,
    /// Explicit datatype annotation on a literal; `name` holds the type.
    LiteralType,
    /// Typed data pattern; `name` holds `string`, `token`, or a qualified
    /// name; children are `Param` nodes.
    DataTag,
    /// Datatype parameter; `name` holds the key, children one `Literal`.
    Param,
    /// Name-class set difference.
    Except,
    /// `default namespace [prefix] = "uri"`.
    DefaultNamespace,
    /// `namespace prefix = "uri"`.
    Namespace,
    /// `datatypes prefix = "uri"`.
    Datatypes,
    /// Foreign-namespace annotation element; `name` is its qualified name.
    Annotation,
    /// Annotation attribute; `name` holds the key, children one `Literal`.
    AnnoAttr,
    /// `##` documentation; `name` holds the text, one source line per line.
    Documentation,
}

/// A node in the schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Which construct this node represents.
    pub kind: NodeKind,
    /// Identifier, operator, or text payload, depending on `kind`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    /// Ordered substructure; empty when the node is a leaf.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<Node>,
}

impl Node {
    /// Create a node with a name and children.
    pub fn new(kind: NodeKind, name: Option<String>, children: Vec<Node>) -> Self {
        Self {
            kind,
            name,
            children,
        }
    }

    /// A nameless, childless node.
    pub fn leaf(kind: NodeKind) -> Self {
        Self::new(kind, None, Vec::new())
    }

    /// A named node without children.
    pub fn named(kind: NodeKind, name: impl Into<String>) -> Self {
        Self::new(kind, Some(name.into()), Vec::new())
    }

    /// A nameless node wrapping children.
    pub fn with_children(kind: NodeKind, children: Vec<Node>) -> Self {
        Self::new(kind, None, children)
    }

    /// A `Literal` node carrying text.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::named(NodeKind::Literal, text)
    }

    /// Whether this node is a namespace or datatype-library declaration.
    pub fn is_decl(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::DefaultNamespace | NodeKind::Namespace | NodeKind::Datatypes
        )
    }

    /// The URI of a declaration node (its first `Literal` child).
    pub fn decl_uri(&self) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.kind == NodeKind::Literal)
            .and_then(|c| c.name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decl_helpers() {
        let ns = Node::new(
            NodeKind::Namespace,
            Some("a".into()),
            vec![Node::literal("urn:a")],
        );
        assert!(ns.is_decl());
        assert_eq!(ns.decl_uri(), Some("urn:a"));
        assert!(!Node::leaf(NodeKind::Text).is_decl());
        assert_eq!(Node::leaf(NodeKind::Text).decl_uri(), None);
    }

    #[test]
    fn serde_omits_empty_fields() {
        let n = Node::leaf(NodeKind::Empty);
        let json = serde_json::to_string(&n).unwrap();
        assert!(!json.contains("name"));
        assert!(!json.contains("children"));
    }
}
