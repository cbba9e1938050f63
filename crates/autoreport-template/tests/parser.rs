use std::fs;

use autoreport_model::FieldPath;
use autoreport_template::{
    Document, Group, GroupKind, RegionKind, RegionTree, Run, SyntaxProblem, load_template,
    parse_template,
};
use proptest::prelude::*;

fn parse_lines(text: &str) -> RegionTree {
    parse_template(&Document::from_lines(text)).expect("template parses")
}

fn problems(text: &str) -> Vec<SyntaxProblem> {
    parse_template(&Document::from_lines(text))
        .expect_err("template should fail")
        .issues
        .into_iter()
        .map(|issue| issue.problem)
        .collect()
}

fn marker_names(tree: &RegionTree) -> Vec<String> {
    tree.markers()
        .into_iter()
        .filter_map(|id| tree.marker_name(id).map(str::to_string))
        .collect()
}

#[test]
fn inline_repeat_inside_paragraph() {
    let tree = parse_lines("Dear {{Name}}, you ordered {{#Items}}{{Product}} x{{Qty}}{{/Items}}");
    assert_eq!(marker_names(&tree), vec!["Items"]);

    let repeat = tree.markers()[0];
    let parent = tree.parent(repeat).expect("repeat has a parent");
    assert!(matches!(
        tree.kind(parent),
        RegionKind::Group { shell, .. } if shell.kind == GroupKind::Paragraph
    ));
    let inside: Vec<FieldPath> = tree
        .children(repeat)
        .iter()
        .filter_map(|id| match tree.kind(*id) {
            RegionKind::Placeholder { field, .. } => Some(field.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(inside, vec![FieldPath::column("Product"), FieldPath::column("Qty")]);
    assert_eq!(tree.placeholders().len(), 3);
}

#[test]
fn block_markers_span_paragraphs() {
    let tree = parse_lines("Header\n{{#Items}}\n- {{Product}}\n{{^Items}}\nNo items\n{{/Items}}\nFooter");
    let repeat = tree.markers()[0];
    assert_eq!(tree.parent(repeat), Some(tree.root()));
    assert_eq!(tree.children(repeat).len(), 1);
    assert_eq!(tree.fallback(repeat).map(<[_]>::len), Some(1));
    // Header, repeat, footer.
    assert_eq!(tree.children(tree.root()).len(), 3);

    let fallback_paragraph = tree.fallback(repeat).expect("fallback")[0];
    assert!(tree.enclosing_markers(fallback_paragraph).is_empty());
}

#[test]
fn nested_regions_keep_single_parents() {
    let tree = parse_lines(
        "{{#Customers}}\n{{Name}}\n{{?Vip}}VIP{{/Vip}}\n{{#Orders}}\n{{Orders.Total}}\n{{/Orders}}\n{{/Customers}}",
    );
    assert_eq!(marker_names(&tree), vec!["Customers", "Vip", "Orders"]);
    for id in tree.preorder().into_iter().skip(1) {
        let parent = tree.parent(id).expect("non-root node has a parent");
        let listed = tree.children(parent).contains(&id) || tree.in_fallback(parent, id);
        assert!(listed, "{id} is not listed by its parent");
    }
    let total = *tree.placeholders().last().expect("placeholder");
    let scopes: Vec<_> = tree
        .enclosing_markers(total)
        .into_iter()
        .filter_map(|id| tree.marker_name(id))
        .collect();
    assert_eq!(scopes, vec!["Orders", "Customers"]);
}

#[test]
fn table_row_repeat_collapses() {
    let row = Group::new(GroupKind::Row)
        .with_group(Group::new(GroupKind::Cell).with_group(Group::paragraph("{{#Items}}{{Product}}")))
        .with_group(Group::new(GroupKind::Cell).with_group(Group::paragraph("{{Qty}}{{/Items}}")));
    let table = Group::new(GroupKind::Table)
        .with_group(Group::new(GroupKind::Row).with_group(Group::paragraph("Product")))
        .with_group(row);
    let document = Document::new(Group::new(GroupKind::Document).with_group(table));

    let tree = parse_template(&document).expect("parses");
    let repeat = tree.markers()[0];
    let table_id = tree.parent(repeat).expect("table");
    assert!(matches!(
        tree.kind(table_id),
        RegionKind::Group { shell, .. } if shell.kind == GroupKind::Table
    ));
    let template_row = tree.children(repeat)[0];
    assert!(matches!(
        tree.kind(template_row),
        RegionKind::Group { shell, .. } if shell.kind == GroupKind::Row
    ));
    assert_eq!(tree.placeholders().len(), 2);
}

#[test]
fn table_row_repeat_collapses_across_split_runs() {
    let first = Group::new(GroupKind::Paragraph)
        .with_run(Run::new("{{#It").with_style("bold"))
        .with_run(Run::new("ems}}{{Product}}"));
    let second = Group::new(GroupKind::Paragraph)
        .with_run(Run::new("x{{/Ite"))
        .with_run(Run::new("ms}}"));
    let row = Group::new(GroupKind::Row)
        .with_group(Group::new(GroupKind::Cell).with_group(first))
        .with_group(Group::new(GroupKind::Cell).with_group(second));
    let table = Group::new(GroupKind::Table).with_group(row);
    let document = Document::new(Group::new(GroupKind::Document).with_group(table));

    let tree = parse_template(&document).expect("parses");
    let repeat = tree.markers()[0];
    assert!(matches!(tree.kind(repeat), RegionKind::Repeat { marker, .. } if marker == "Items"));
    let template_row = tree.children(repeat)[0];
    assert!(matches!(
        tree.kind(template_row),
        RegionKind::Group { shell, .. } if shell.kind == GroupKind::Row
    ));
    assert_eq!(tree.placeholders().len(), 1);
    let statics: Vec<String> = tree
        .preorder()
        .into_iter()
        .filter_map(|id| match tree.kind(id) {
            RegionKind::Static { text, .. } if !text.is_empty() => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(statics, vec!["x".to_string()]);
}

#[test]
fn collects_every_syntax_problem() {
    let found = problems("{{#A}}{{/B}}\n{{/C}}\n{{^D}}\n{{}}\ntext {{open\n{{#E}}");
    assert!(found.contains(&SyntaxProblem::MismatchedClose {
        open: "A".to_string(),
        close: "B".to_string()
    }));
    assert!(found.contains(&SyntaxProblem::Unopened { marker: "C".to_string() }));
    assert!(found.contains(&SyntaxProblem::FallbackOutsideRepeat { marker: "D".to_string() }));
    assert!(found.iter().any(|p| matches!(p, SyntaxProblem::MalformedToken { .. })));
    assert!(found.iter().any(|p| matches!(p, SyntaxProblem::Unterminated { .. })));
    assert!(found.contains(&SyntaxProblem::Unclosed { marker: "E".to_string() }));
}

#[test]
fn fallback_must_belong_to_innermost_repeat() {
    let found = problems("{{#Outer}}{{?Flag}}{{^Outer}}{{/Flag}}{{/Outer}}");
    assert_eq!(
        found,
        vec![SyntaxProblem::FallbackOutsideRepeat { marker: "Outer".to_string() }]
    );
}

#[test]
fn static_runs_keep_style_and_origin() {
    let paragraph = Group::new(GroupKind::Paragraph)
        .with_run(Run::new("Plain ").with_style("normal"))
        .with_run(Run::new("bold").with_style("bold"));
    let document = Document::new(Group::new(GroupKind::Document).with_group(paragraph));
    let tree = parse_template(&document).expect("parses");
    let statics: Vec<(String, Option<String>, usize)> = tree
        .preorder()
        .into_iter()
        .filter_map(|id| match tree.kind(id) {
            RegionKind::Static { text, style, origin } => {
                Some((text.clone(), style.clone(), origin.0))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        statics,
        vec![
            ("Plain ".to_string(), Some("normal".to_string()), 0),
            ("bold".to_string(), Some("bold".to_string()), 1),
        ]
    );
}

#[test]
fn loads_xml_and_text_templates() {
    let dir = tempfile::tempdir().expect("temp dir");
    let xml = dir.path().join("letter.xml");
    fs::write(
        &xml,
        "<document><paragraph><run>Hello {{Name}}</run></paragraph></document>",
    )
    .expect("write xml");
    let text = dir.path().join("letter.txt");
    fs::write(&text, "Hello {{Name}}\nBye").expect("write text");

    let from_xml = parse_template(&load_template(&xml).expect("load xml")).expect("parse xml");
    let from_text = parse_template(&load_template(&text).expect("load text")).expect("parse text");
    assert_eq!(from_xml.placeholders().len(), 1);
    assert_eq!(from_text.placeholders().len(), 1);
    assert_eq!(from_text.children(from_text.root()).len(), 2);
}

proptest! {
    #[test]
    fn plain_text_never_produces_regions(text in "[A-Za-z0-9 ,.!]{0,40}") {
        let tree = parse_lines(&text);
        prop_assert!(tree.markers().is_empty());
        prop_assert!(tree.placeholders().is_empty());
    }

    #[test]
    fn balanced_nesting_parses(depth in 1usize..6) {
        let mut text = String::new();
        for level in 0..depth {
            text.push_str(&format!("{{{{#R{level}}}}}"));
        }
        text.push_str("{{Value}}");
        for level in (0..depth).rev() {
            text.push_str(&format!("{{{{/R{level}}}}}"));
        }
        let tree = parse_lines(&text);
        prop_assert_eq!(tree.markers().len(), depth);
        let value = tree.placeholders()[0];
        prop_assert_eq!(tree.enclosing_markers(value).len(), depth);
    }
}
