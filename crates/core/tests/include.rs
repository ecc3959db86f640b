//! Include-resolution tests, driven by an in-memory resolver so no test
//! touches the filesystem.

use std::collections::HashMap;
use std::io;

use rnc_convert_core::{
    Error, Node, NodeKind, Options, XmlSerializer, parse_with,
    resolve::{Resolver, normalize_location},
};

/// Unit store keyed by normalized location.
struct MapResolver(HashMap<String, Vec<u8>>);

impl MapResolver {
    fn new(units: &[(&str, &str)]) -> Self {
        Self(
            units
                .iter()
                .map(|(loc, text)| (loc.to_string(), text.as_bytes().to_vec()))
                .collect(),
        )
    }
}

impl Resolver for MapResolver {
    fn fetch(&self, location: &str) -> io::Result<Vec<u8>> {
        self.0
            .get(&normalize_location(location))
            .cloned()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no unit at {location}"))
            })
    }
}

fn parse(src: &str, resolver: &MapResolver) -> Result<Node, Error> {
    parse_with(
        src,
        Options {
            file: Some("main.rnc"),
            base: Some("."),
            resolver,
        },
    )
}

fn define_names(root: &Node) -> Vec<&str> {
    root.children
        .iter()
        .filter(|c| c.kind == NodeKind::Define)
        .filter_map(|c| c.name.as_deref())
        .collect()
}

#[test]
fn included_members_are_spliced_in_place() {
    let resolver = MapResolver::new(&[("lib.rnc", "a = text\nb = empty")]);
    let root = parse("start = element r { a, b }\ninclude \"lib.rnc\"\nc = text", &resolver)
        .unwrap();
    assert_eq!(define_names(&root), vec!["start", "a", "b", "c"]);
}

#[test]
fn missing_include_carries_the_directive_position() {
    let resolver = MapResolver::new(&[]);
    let err = parse("start = text\ninclude \"nowhere.rnc\"", &resolver).unwrap_err();
    let Error::Include(src) = err else {
        panic!("expected include error");
    };
    assert_eq!((src.line, src.col), (1, 0));
    assert!(src.message.contains("nowhere.rnc"), "{}", src.message);
    assert_eq!(src.file.as_deref(), Some("main.rnc"));
}

#[test]
fn cyclic_include_is_detected() {
    let resolver = MapResolver::new(&[
        ("a.rnc", "include \"b.rnc\"\nx = text"),
        ("b.rnc", "include \"a.rnc\"\ny = text"),
    ]);
    let err = parse("include \"a.rnc\"\nstart = x", &resolver).unwrap_err();
    let Error::Include(src) = err else {
        panic!("expected include error");
    };
    assert!(src.message.contains("cyclic"), "{}", src.message);
}

#[test]
fn self_include_is_cyclic() {
    let resolver = MapResolver::new(&[("a.rnc", "include \"a.rnc\"\nx = text")]);
    let err = parse("include \"a.rnc\"\nstart = x", &resolver).unwrap_err();
    assert!(matches!(err, Error::Include(_)), "{err:?}");
}

#[test]
fn sequential_repeat_includes_are_legal() {
    let resolver = MapResolver::new(&[("lib.rnc", "a = text")]);
    let root = parse(
        "include \"lib.rnc\"\ninclude \"lib.rnc\"\nstart = a",
        &resolver,
    )
    .unwrap();
    assert_eq!(define_names(&root), vec!["a", "a", "start"]);
}

#[test]
fn nested_includes_resolve_against_their_own_base() {
    let resolver = MapResolver::new(&[
        ("sub/outer.rnc", "include \"inner.rnc\"\nmid = inner"),
        ("sub/inner.rnc", "inner = text"),
    ]);
    let root = parse("include \"sub/outer.rnc\"\nstart = mid", &resolver).unwrap();
    assert_eq!(define_names(&root), vec!["inner", "mid", "start"]);
}

#[test]
fn conflicting_namespace_declarations_are_an_include_error() {
    let resolver = MapResolver::new(&[("lib.rnc", "namespace a = \"urn:b\"\nx = text")]);
    let err = parse(
        "namespace a = \"urn:a\"\ninclude \"lib.rnc\"\nstart = x",
        &resolver,
    )
    .unwrap_err();
    let Error::Include(src) = err else {
        panic!("expected include error");
    };
    assert!(src.message.contains("urn:a"), "{}", src.message);
    assert!(src.message.contains("urn:b"), "{}", src.message);
}

#[test]
fn conflicting_default_namespace_is_an_include_error() {
    let resolver =
        MapResolver::new(&[("lib.rnc", "default namespace = \"urn:b\"\nx = text")]);
    let err = parse(
        "default namespace = \"urn:a\"\ninclude \"lib.rnc\"\nstart = x",
        &resolver,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Include(_)), "{err:?}");
}

#[test]
fn matching_declarations_pass() {
    let resolver = MapResolver::new(&[("lib.rnc", "namespace a = \"urn:a\"\nx = text")]);
    let root = parse(
        "namespace a = \"urn:a\"\ninclude \"lib.rnc\"\nstart = element a:r { x }",
        &resolver,
    )
    .unwrap();
    assert_eq!(define_names(&root), vec!["x", "start"]);
}

#[test]
fn unknown_declarations_are_adopted_from_the_included_unit() {
    let resolver = MapResolver::new(&[(
        "lib.rnc",
        "namespace q = \"urn:q\"\nitem = element q:item { text }",
    )]);
    let root = parse("include \"lib.rnc\"\nstart = item", &resolver).unwrap();
    let out = XmlSerializer::new().to_xml(&root).unwrap();
    assert!(out.contains("xmlns:q=\"urn:q\""), "{out}");
    assert!(out.contains("<name ns=\"urn:q\">item</name>"), "{out}");
}

#[test]
fn override_replaces_same_named_definitions() {
    let resolver = MapResolver::new(&[(
        "lib.rnc",
        "a = text\nb = empty\nstart = element r { a, b }",
    )]);
    let root = parse(
        "include \"lib.rnc\" { a = notAllowed }",
        &resolver,
    )
    .unwrap();
    let a = root
        .children
        .iter()
        .find(|c| c.kind == NodeKind::Define && c.name.as_deref() == Some("a"))
        .expect("definition of a");
    let pattern = &a.children[0].children[0];
    assert_eq!(pattern.kind, NodeKind::NotAllowed);
}

#[test]
fn override_last_writer_wins() {
    let resolver = MapResolver::new(&[("lib.rnc", "a = text\nstart = a")]);
    let root = parse(
        "include \"lib.rnc\" { a = empty\na = notAllowed }",
        &resolver,
    )
    .unwrap();
    let a = root
        .children
        .iter()
        .find(|c| c.kind == NodeKind::Define && c.name.as_deref() == Some("a"))
        .expect("definition of a");
    assert_eq!(a.children[0].children[0].kind, NodeKind::NotAllowed);
}

#[test]
fn unmatched_overrides_are_appended() {
    let resolver = MapResolver::new(&[("lib.rnc", "a = text")]);
    let root = parse(
        "include \"lib.rnc\" { extra = empty }\nstart = element r { a, extra }",
        &resolver,
    )
    .unwrap();
    assert_eq!(define_names(&root), vec!["a", "extra", "start"]);
}

#[test]
fn overrides_reach_into_div_blocks() {
    let resolver =
        MapResolver::new(&[("lib.rnc", "div { a = text }\nstart = a")]);
    let root = parse("include \"lib.rnc\" { a = empty }", &resolver).unwrap();
    let div = root
        .children
        .iter()
        .find(|c| c.kind == NodeKind::Div)
        .expect("div block");
    let a = &div.children[0];
    assert_eq!(a.name.as_deref(), Some("a"));
    assert_eq!(a.children[0].children[0].kind, NodeKind::Empty);
}

#[test]
fn inherit_clause_is_accepted() {
    let resolver = MapResolver::new(&[("lib.rnc", "a = text")]);
    let root = parse(
        "namespace n = \"urn:n\"\ninclude \"lib.rnc\" inherit = n\nstart = a",
        &resolver,
    )
    .unwrap();
    assert_eq!(define_names(&root), vec!["a", "start"]);
}

#[test]
fn utf16_included_units_are_decoded() {
    let mut bytes = vec![0xFE, 0xFF];
    for unit in "a = text".encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    let mut units = HashMap::new();
    units.insert("lib.rnc".to_string(), bytes);
    let resolver = MapResolver(units);
    let root = parse("include \"lib.rnc\"\nstart = a", &resolver).unwrap();
    assert_eq!(define_names(&root), vec!["a", "start"]);
}

#[test]
fn errors_inside_included_units_name_the_included_file() {
    let resolver = MapResolver::new(&[("lib.rnc", "a = =")]);
    let err = parse("include \"lib.rnc\"\nstart = a", &resolver).unwrap_err();
    let Error::Syntax(src) = err else {
        panic!("expected syntax error, got {err:?}");
    };
    assert!(
        src.file.as_deref().is_some_and(|f| f.contains("lib.rnc")),
        "{:?}",
        src.file
    );
}
