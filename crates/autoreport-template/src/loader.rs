//! Template document loaders.
//!
//! The XML form uses `<document>` as its root, `<paragraph>`, `<table>`,
//! `<row>` and `<cell>` as containers and `<run style="...">` for text. Any
//! other element becomes a generic group that is reproduced as-is. Plain text
//! templates become one paragraph per line.

use std::fs;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use crate::document::{DocNode, Document, Group, GroupKind, Run};
use crate::error::LoadError;

/// Loads a template, choosing the format from the file extension.
pub fn load_template(path: &Path) -> Result<Document, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_xml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
    if is_xml {
        parse_xml_document(&text, path)
    } else {
        Ok(Document::from_lines(&text))
    }
}

enum Open {
    Group(Group),
    Run(Run),
}

/// Parses the XML document form. `path` is only used in errors.
pub fn parse_xml_document(text: &str, path: &Path) -> Result<Document, LoadError> {
    let xml_error = |message: String| LoadError::Xml {
        path: path.to_path_buf(),
        message,
    };
    let structure = |element: &str, reason: &str| LoadError::Structure {
        path: path.to_path_buf(),
        element: element.to_string(),
        reason: reason.to_string(),
    };

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);
    let mut stack: Vec<Open> = Vec::new();
    let mut root: Option<Group> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| xml_error(format!("at byte {}: {err}", reader.error_position())))?;
        match event {
            Event::Start(start) => {
                let open = open_element(&start, &stack).map_err(|(element, reason)| {
                    structure(&element, reason)
                })?;
                stack.push(open);
            }
            Event::Empty(start) => {
                let open = open_element(&start, &stack).map_err(|(element, reason)| {
                    structure(&element, reason)
                })?;
                close_element(open, &mut stack, &mut root)
                    .map_err(|(element, reason)| structure(&element, reason))?;
            }
            Event::End(_) => {
                let Some(open) = stack.pop() else {
                    return Err(xml_error("unbalanced end tag".to_string()));
                };
                close_element(open, &mut stack, &mut root)
                    .map_err(|(element, reason)| structure(&element, reason))?;
            }
            Event::Text(content) => {
                let raw = std::str::from_utf8(&content)
                    .map_err(|err| xml_error(err.to_string()))?;
                let unescaped = unescape(raw).map_err(|err| xml_error(err.to_string()))?;
                push_text(&mut stack, &unescaped);
            }
            Event::CData(content) => {
                let raw = std::str::from_utf8(&content)
                    .map_err(|err| xml_error(err.to_string()))?;
                push_text(&mut stack, raw);
            }
            Event::GeneralRef(reference) => {
                let name = std::str::from_utf8(&reference)
                    .map_err(|err| xml_error(err.to_string()))?;
                let entity = format!("&{name};");
                let resolved = unescape(&entity).map_err(|err| xml_error(err.to_string()))?;
                push_text(&mut stack, &resolved);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(xml_error("unexpected end of document".to_string()));
    }
    let root = root.ok_or_else(|| structure("document", "missing root element"))?;
    Ok(Document::new(root))
}

fn open_element(start: &BytesStart<'_>, stack: &[Open]) -> Result<Open, (String, &'static str)> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    if matches!(stack.last(), Some(Open::Run(_))) {
        return Err((name, "runs cannot contain elements"));
    }
    if stack.is_empty() && name != "document" {
        return Err((name, "the root element must be <document>"));
    }
    let mut style = None;
    let mut group = Group::new(GroupKind::from_tag(&name));
    for attribute in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attribute.value).into_owned();
        let value = unescape(&raw).map(|v| v.into_owned()).unwrap_or(raw);
        if name == "run" && key == "style" {
            style = Some(value);
        } else {
            group.attributes.insert(key, value);
        }
    }
    if name == "run" {
        let mut run = Run::new("");
        run.style = style;
        return Ok(Open::Run(run));
    }
    Ok(Open::Group(group))
}

fn close_element(
    open: Open,
    stack: &mut [Open],
    root: &mut Option<Group>,
) -> Result<(), (String, &'static str)> {
    let node = match open {
        Open::Group(group) => DocNode::Group(group),
        Open::Run(run) => DocNode::Run(run),
    };
    match stack.last_mut() {
        Some(Open::Group(parent)) => {
            parent.children.push(node);
            Ok(())
        }
        Some(Open::Run(_)) => Err(("run".to_string(), "runs cannot contain elements")),
        None => match node {
            DocNode::Group(group) if root.is_none() => {
                *root = Some(group);
                Ok(())
            }
            _ => Err(("document".to_string(), "only one root element is allowed")),
        },
    }
}

/// Appends text to the open run, or wraps stray non-blank text in a run.
fn push_text(stack: &mut [Open], text: &str) {
    match stack.last_mut() {
        Some(Open::Run(run)) => {
            let mut joined = run.text().to_string();
            joined.push_str(text);
            run.set_text(joined);
        }
        Some(Open::Group(group)) if !text.trim().is_empty() => {
            group.children.push(DocNode::Run(Run::new(text.trim())));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xml_structure() {
        let xml = r#"<?xml version="1.0"?>
<document title="Letter">
  <paragraph><run style="bold">Dear </run><run>{{Name}} &amp; co</run></paragraph>
  <table><row><cell><paragraph><run>x</run></paragraph></cell></row></table>
  <section/>
</document>"#;
        let document = parse_xml_document(xml, Path::new("letter.xml")).unwrap();
        assert_eq!(document.root.kind, GroupKind::Document);
        assert_eq!(document.root.attributes["title"], "Letter");
        assert_eq!(document.root.children.len(), 3);
        let DocNode::Group(paragraph) = &document.root.children[0] else {
            panic!("expected paragraph");
        };
        let runs: Vec<&Run> = paragraph.runs().collect();
        assert_eq!(runs[0].style.as_deref(), Some("bold"));
        assert_eq!(runs[1].text(), "{{Name}} & co");
        let DocNode::Group(section) = &document.root.children[2] else {
            panic!("expected section");
        };
        assert_eq!(section.kind, GroupKind::Other("section".to_string()));
    }

    #[test]
    fn rejects_elements_inside_runs() {
        let xml = "<document><paragraph><run><b/></run></paragraph></document>";
        let err = parse_xml_document(xml, Path::new("bad.xml")).unwrap_err();
        assert!(matches!(err, LoadError::Structure { .. }));
    }

    #[test]
    fn rejects_foreign_root() {
        let err = parse_xml_document("<html/>", Path::new("bad.xml")).unwrap_err();
        assert!(err.to_string().contains("<document>"));
    }
}
