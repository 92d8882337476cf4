//! Cross-engine properties: determinism, span invariants, boundaries and
//! the nesting guard.

use pretty_assertions::assert_eq;
use quill_parser::{
    parse_eel, parse_fusion, parse_fusion_with, parse_runescript, ErrorKind, Node, ParseOptions,
    ParseResult,
};

const FUSION: &str = r#"namespace: Fusion = Neos.Fusion
include: resource://Neos.Fusion/Private/Fusion/Root.fusion

// page rendering
prototype(Vendor.Site:Page) < prototype(Neos.Neos:Page) {
    @context.title = ${q(node).property('title') || 'Untitled'}
    body = afx`
        <main class="page" {...props.attributes}>
            <h1 @if={title}>{title}</h1>
            <Vendor.Site:Teaser items={items.filter((i) => i.visible)} />
            <!-- footer -->
        </main>
    `
    meta.'data-id' = 42
    meta.stale >
}
"#;

const RUNESCRIPT: &str = r#"// shop helpers
[proc,buy](obj $item, int $count)(boolean)
def_int $price = oc_cost($item);
if ($count < 1 | $price = -1) {
    mes("You can't buy <oc_name($item)>.");
    return(false);
} else if (inv_total(inv, coins) < calc($price * $count)) return(false);
switch_int ($count) {
    case 1 : ~buy_one($item);
    case default : $total, %spent = calc($price * $count), calc(%spent + $price);
}
return(true);

[opheld1,_]
@done;
"#;

fn tree(result: ParseResult) -> Node {
    result
        .into_result()
        .unwrap_or_else(|errors| panic!("parse failed: {errors:?}"))
}

/// Every child lies inside its parent and siblings appear in source order.
fn assert_spans(node: &Node, source: &str) {
    assert!(node.span.start <= node.span.end, "{}: inverted span", node.kind.name());
    assert!(node.span.end <= source.len(), "{}: span past end of source", node.kind.name());
    let mut previous_end = node.span.start;
    for child in &node.children {
        assert!(
            node.span.contains(&child.span),
            "{} {:?} does not contain {} {:?}",
            node.kind.name(),
            node.span,
            child.kind.name(),
            child.span
        );
        assert!(
            child.span.start >= previous_end,
            "{} starts before its previous sibling ends",
            child.kind.name()
        );
        previous_end = child.span.end;
        assert_spans(child, source);
    }
}

// =============================================================================
// Determinism and spans
// =============================================================================

#[test]
fn test_fusion_parse_is_deterministic() {
    let first = serde_json::to_string(&tree(parse_fusion(FUSION))).unwrap();
    let second = serde_json::to_string(&tree(parse_fusion(FUSION))).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_runescript_parse_is_deterministic() {
    let first = tree(parse_runescript(RUNESCRIPT)).to_sexp();
    let second = tree(parse_runescript(RUNESCRIPT)).to_sexp();
    assert_eq!(first, second);
}

#[test]
fn test_fusion_spans_nest() {
    let root = tree(parse_fusion(FUSION));
    assert_eq!(root.span.end, FUSION.len());
    assert_spans(&root, FUSION);
}

#[test]
fn test_runescript_spans_nest() {
    let root = tree(parse_runescript(RUNESCRIPT));
    assert_eq!(root.children.len(), 2);
    assert_spans(&root, RUNESCRIPT);
}

#[test]
fn test_eel_spans_nest() {
    let source = "a.b(c, [1, 2])[0] ? {k: (x) => x * 2} : !d && e != 'f'";
    assert_spans(&tree(parse_eel(source)), source);
}

#[test]
fn test_leaf_text_matches_source() {
    let root = tree(parse_fusion(FUSION));
    let dsl = root
        .walk()
        .into_iter()
        .find(|n| n.kind.name() == "dsl_identifier")
        .unwrap();
    assert_eq!(dsl.text(FUSION), "afx");
    let path_part = root
        .walk()
        .into_iter()
        .find(|n| n.kind.name() == "path_part")
        .unwrap();
    assert_eq!(path_part.text(FUSION), path_part.value.as_deref().unwrap());
}

// =============================================================================
// Expressions
// =============================================================================

#[test]
fn test_times_binds_tighter_than_plus() {
    assert_eq!(
        tree(parse_eel("1 + 2 * 3")).to_sexp(),
        r#"(binary_expression "+" left: (number "1") right: (binary_expression "*" left: (number "2") right: (number "3")))"#
    );
}

#[test]
fn test_ternary_is_right_associative() {
    let root = tree(parse_eel("a ? b : c ? d : e"));
    assert_eq!(root.kind.name(), "ternary_expression");
    assert_eq!(root.field("condition").unwrap().to_sexp(), tree(parse_eel("a")).to_sexp());
    assert_eq!(root.field("alternative").unwrap().kind.name(), "ternary_expression");
}

#[test]
fn test_arrow_body_takes_whole_expression() {
    let root = tree(parse_eel("() => 1 + 2"));
    assert_eq!(root.kind.name(), "arrow_function");
    assert_eq!(root.field("body").unwrap().value.as_deref(), Some("+"));
}

#[test]
fn test_string_escape() {
    let root = tree(parse_eel("\"a\\\"b\""));
    assert_eq!(root.kind.name(), "string");
    assert_eq!(root.value.as_deref(), Some("a\"b"));
}

// =============================================================================
// AFX
// =============================================================================

#[test]
fn test_afx_tags_match() {
    assert!(parse_fusion("prop = afx`<a><b></b></a>`").is_ok());

    let source = "prop = afx`<a><b></a>`";
    let result = parse_fusion(source);
    let err = &result.errors()[0];
    assert_eq!(err.kind, ErrorKind::MismatchedClosingTag);
    assert_eq!(&source[err.span.start..err.span.end], "</a>");
    assert!(err.related.iter().any(|s| &source[s.start..s.end] == "<a>"));
}

// =============================================================================
// RuneScript
// =============================================================================

#[test]
fn test_dangling_else() {
    let source = "[proc,x]\nif ($c1 = 1) if ($c2 = 1) $s = 1; else $s = 2;";
    let root = tree(parse_runescript(source));
    let outer = root.children[0].field("statement").unwrap();
    assert!(outer.field("alternative").is_none());
    assert!(outer.field("consequence").unwrap().field("alternative").is_some());
}

// =============================================================================
// Boundaries
// =============================================================================

#[test]
fn test_empty_inputs() {
    let program = tree(parse_fusion(""));
    assert_eq!(program.kind.name(), "program");
    assert!(program.children.is_empty());

    let file = tree(parse_runescript(""));
    assert!(file.children.is_empty());
}

#[test]
fn test_fusion_nesting_guard() {
    let deep = format!("{}{}", "a {\n".repeat(1000), "}\n".repeat(1000));
    let result = parse_fusion(&deep);
    assert!(result.is_fatal());
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].kind, ErrorKind::NestingTooDeep);

    let shallow = format!("{}{}", "a {\n".repeat(100), "}\n".repeat(100));
    assert!(parse_fusion(&shallow).is_ok());

    let options = ParseOptions {
        max_depth: 10,
        ..ParseOptions::default()
    };
    let result = parse_fusion_with(&shallow, &options);
    assert_eq!(result.errors()[0].kind, ErrorKind::NestingTooDeep);
    assert_eq!(result.errors()[0].span.line, 11);
}

#[test]
fn test_nesting_guard_counts_embedded_languages() {
    let options = ParseOptions {
        max_depth: 8,
        ..ParseOptions::default()
    };
    let source = "a { b { c = ${[[[[[[1]]]]]]} } }";
    let result = parse_fusion_with(source, &options);
    assert_eq!(result.errors()[0].kind, ErrorKind::NestingTooDeep);
}

#[test]
fn test_errors_render_with_caret() {
    let source = "a = 1\nb.c\n";
    let result = parse_fusion(source);
    let rendered = quill_parser::render_errors("Root.fusion", source, result.errors());
    assert!(rendered.starts_with("error[unexpected token]: Expected"));
    assert!(rendered.contains("--> Root.fusion:3:1"));
}
