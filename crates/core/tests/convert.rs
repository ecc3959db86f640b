//! End-to-end conversion tests: compact-syntax text in, XML-syntax text
//! out, covering the documented output guarantees.

use rnc_convert_core::{Error, convert};

fn xml(src: &str) -> String {
    convert(src).expect("conversion should succeed")
}

#[test]
fn output_is_deterministic_across_runs() {
    let src = "namespace b = \"urn:b\"\nnamespace z = \"urn:z\"\n\
               start = element z:doc { element b:item { text }* }";
    let first = xml(src);
    for _ in 0..3 {
        assert_eq!(xml(src), first);
    }
}

#[test]
fn document_shell() {
    let out = xml("start = empty");
    let mut lines = out.lines();
    assert_eq!(
        lines.next(),
        Some("<?xml version=\"1.0\" encoding=\"UTF-8\"?>")
    );
    assert!(
        lines
            .next()
            .is_some_and(|l| l.starts_with("<grammar xmlns=\"http://relaxng.org/ns/structure/1.0\""))
    );
    assert!(out.ends_with("</grammar>"));
    assert!(!out.ends_with('\n'));
}

#[test]
fn default_namespace_round_trip() {
    let out = xml("default namespace = \"urn:x\"\nstart = element root { text }");
    assert!(out.contains(" ns=\"urn:x\">"), "{out}");
    let flat: String = out
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("");
    assert!(
        flat.contains("<start><element><name ns=\"urn:x\">root</name><text/></element></start>"),
        "{flat}"
    );
}

#[test]
fn quantifier_wrappers_are_exact() {
    let out = xml("x = id*\ny = id+\nz = id?\nw = id");
    assert!(out.contains("<zeroOrMore>"), "{out}");
    assert!(out.contains("<oneOrMore>"), "{out}");
    assert!(out.contains("<optional>"), "{out}");
    // The bare reference gets no wrapper at all.
    let flat: String = out.lines().map(str::trim).collect::<Vec<_>>().join("");
    assert!(
        flat.contains("<define name=\"w\"><ref name=\"id\"/></define>"),
        "{flat}"
    );
}

#[test]
fn mixed_composition_operators_raise_ambiguity() {
    let err = convert("x = a, b | c").unwrap_err();
    assert!(matches!(err, Error::Ambiguity(_)), "{err:?}");
    let rendered = err.to_string();
    assert!(rendered.contains("ambiguous"), "{rendered}");
    assert!(rendered.contains('^'), "caret rendering expected: {rendered}");
}

#[test]
fn datatype_library_resolved_through_prefix_binding() {
    let out = xml(
        "datatypes d = \"http://www.w3.org/2001/XMLSchema-datatypes\"\nint = d:integer",
    );
    // Prefix text is irrelevant; the binding decides the library.
    assert!(out.contains("<data type=\"integer\"/>"), "{out}");
    assert!(
        out.contains("datatypeLibrary=\"http://www.w3.org/2001/XMLSchema-datatypes\""),
        "{out}"
    );
}

#[test]
fn grammar_attributes_sorted_regardless_of_declaration_order() {
    let out = xml(
        "namespace z = \"urn:z\"\nnamespace m = \"urn:m\"\nnamespace b = \"urn:b\"\n\
         start = element z:a { element m:b { element b:c { empty } } }",
    );
    let b = out.find("xmlns:b").expect("xmlns:b");
    let m = out.find("xmlns:m").expect("xmlns:m");
    let z = out.find("xmlns:z").expect("xmlns:z");
    assert!(b < m && m < z, "{out}");
}

#[test]
fn nested_grammar_block() {
    let out = xml("start = element doc { grammar { start = text } }");
    let flat: String = out.lines().map(str::trim).collect::<Vec<_>>().join("");
    assert!(flat.contains("<grammar><start><text/></start></grammar>"), "{flat}");
}

#[test]
fn mixed_and_list_patterns() {
    let out = xml("x = mixed { element em { text }* }\ny = list { string }");
    assert!(out.contains("<mixed>"), "{out}");
    assert!(out.contains("<list>"), "{out}");
}

#[test]
fn div_groups_definitions() {
    let out = xml("div { a = text\nb = empty }\nstart = element r { a, b }");
    let flat: String = out.lines().map(str::trim).collect::<Vec<_>>().join("");
    assert!(
        flat.contains("<div><define name=\"a\"><text/></define><define name=\"b\"><empty/></define></div>"),
        "{flat}"
    );
}

#[test]
fn parent_references() {
    let out = xml("start = element doc { grammar { start = parent outer } }\nouter = text");
    assert!(out.contains("<parent name=\"outer\"/>"), "{out}");
}

#[test]
fn documentation_survives_with_annotation_namespace() {
    let out = xml("## A schema.\n## Second line.\nstart = element r { empty }");
    assert!(
        out.contains("xmlns:a=\"http://relaxng.org/ns/compatibility/annotations/1.0\""),
        "{out}"
    );
    assert!(
        out.contains("<a:documentation>A schema.\nSecond line.</a:documentation>"),
        "{out}"
    );
}

#[test]
fn lexical_error_reports_offending_character() {
    let err = convert("x = @").unwrap_err();
    let Error::Lexical(src) = err else {
        panic!("expected lexical error");
    };
    assert!(src.message.contains('@'), "{}", src.message);
    assert_eq!((src.line, src.col), (0, 4));
}

#[test]
fn syntax_error_renders_source_line_and_caret() {
    let err = convert("start = element { text }").unwrap_err();
    let Error::Syntax(src) = err else {
        panic!("expected syntax error");
    };
    let rendered = src.to_string();
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines[2], "start = element { text }");
    assert_eq!(lines[3], "                ^");
}
