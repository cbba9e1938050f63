use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use autoreport_merge::{OutputGroup, OutputNode, OutputText, OutputTree};
use autoreport_report::{
    OutputAssembler, OutputFormat, TextAssembler, XmlAssembler, sha256_hex,
};
use autoreport_template::{GroupKind, parse_xml_document};

fn text(value: &str, style: Option<&str>) -> OutputNode {
    OutputNode::Text(OutputText {
        text: value.to_string(),
        style: style.map(str::to_string),
    })
}

fn group(kind: GroupKind, children: Vec<OutputNode>) -> OutputGroup {
    OutputGroup {
        kind,
        attributes: BTreeMap::new(),
        children,
    }
}

fn sample() -> OutputTree {
    let mut table = group(
        GroupKind::Table,
        vec![OutputNode::Group(group(
            GroupKind::Row,
            vec![
                OutputNode::Group(group(
                    GroupKind::Cell,
                    vec![OutputNode::Group(group(
                        GroupKind::Paragraph,
                        vec![text("A", None)],
                    ))],
                )),
                OutputNode::Group(group(
                    GroupKind::Cell,
                    vec![OutputNode::Group(group(
                        GroupKind::Paragraph,
                        vec![text("B & C", None)],
                    ))],
                )),
            ],
        ))],
    );
    table.attributes.insert("border".into(), "1".into());
    OutputTree {
        root: group(
            GroupKind::Document,
            vec![
                OutputNode::Group(group(
                    GroupKind::Paragraph,
                    vec![text("Hello ", None), text("World", Some("strong"))],
                )),
                OutputNode::Group(table),
            ],
        ),
    }
}

fn render(assembler: &dyn OutputAssembler, tree: &OutputTree) -> String {
    let mut buffer = Vec::new();
    assembler.write(tree, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

#[test]
fn text_output_lays_out_lines_and_cells() {
    let output = render(&TextAssembler, &sample());
    assert_eq!(output, "Hello World\nA\tB & C\n");
}

#[test]
fn xml_output_keeps_structure_and_styles() {
    let output = render(&XmlAssembler::new(), &sample());
    insta::assert_snapshot!(
        output.trim_end(),
        @r#"<?xml version="1.0" encoding="UTF-8"?><document><paragraph><run>Hello </run><run style="strong">World</run></paragraph><table border="1"><row><cell><paragraph><run>A</run></paragraph></cell><cell><paragraph><run>B &amp; C</run></paragraph></cell></row></table></document>"#
    );
}

#[test]
fn xml_output_loads_back_as_a_template() {
    let output = render(&XmlAssembler::new(), &sample());
    let document = parse_xml_document(&output, Path::new("out.xml")).unwrap();
    assert_eq!(document.root.text(), "Hello WorldAB & C");
    assert_eq!(document.root.children.len(), 2);
}

#[test]
fn json_output_tags_nodes() {
    let output = render(OutputFormat::Json.assembler().as_ref(), &sample());
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(value["root"]["kind"], "document");
    let paragraph = &value["root"]["children"][0];
    assert_eq!(paragraph["node"], "group");
    assert_eq!(paragraph["children"][1]["node"], "text");
    assert_eq!(paragraph["children"][1]["style"], "strong");
    assert!(paragraph["children"][0].get("style").is_none());
    assert_eq!(value["root"]["children"][1]["attributes"]["border"], "1");
}

#[test]
fn assemble_writes_file_and_digest() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("nested").join("report.txt");
    let written = TextAssembler.assemble(&sample(), &destination).unwrap();

    let bytes = fs::read(&destination).unwrap();
    assert_eq!(written.path, destination);
    assert_eq!(written.bytes, bytes.len());
    assert_eq!(written.sha256, sha256_hex(&bytes));
    assert_eq!(String::from_utf8(bytes).unwrap(), "Hello World\nA\tB & C\n");
}

#[test]
fn parses_format_names() {
    assert_eq!("XML".parse::<OutputFormat>().unwrap(), OutputFormat::Xml);
    assert_eq!("txt".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
    assert!("pdf".parse::<OutputFormat>().is_err());
    assert_eq!(OutputFormat::Json.assembler().extension(), "json");
    assert_eq!(OutputFormat::default().to_string(), "text");
}
