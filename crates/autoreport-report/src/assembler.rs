//! Serializers from an [`OutputTree`] to concrete documents.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use tracing::debug;

use autoreport_merge::{OutputGroup, OutputNode, OutputTree};

use crate::digest::sha256_hex;
use crate::error::{AssemblyError, Result};

/// A report written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenReport {
    pub path: PathBuf,
    pub bytes: usize,
    pub sha256: String,
}

pub trait OutputAssembler: Send + Sync {
    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    fn write(&self, tree: &OutputTree, writer: &mut dyn Write) -> Result<()>;

    /// Writes `tree` to `destination`, creating parent directories.
    fn assemble(&self, tree: &OutputTree, destination: &Path) -> Result<WrittenReport> {
        let mut buffer = Vec::new();
        self.write(tree, &mut buffer)?;
        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| AssemblyError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(destination, &buffer).map_err(|source| AssemblyError::Io {
            path: destination.to_path_buf(),
            source,
        })?;
        let report = WrittenReport {
            path: destination.to_path_buf(),
            bytes: buffer.len(),
            sha256: sha256_hex(&buffer),
        };
        debug!(path = %report.path.display(), bytes = report.bytes, "report written");
        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Xml,
    Json,
}

impl OutputFormat {
    pub fn assembler(self) -> Box<dyn OutputAssembler> {
        match self {
            Self::Text => Box::new(TextAssembler),
            Self::Xml => Box::new(XmlAssembler::new()),
            Self::Json => Box::new(JsonAssembler),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Xml => "xml",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = AssemblyError;

    fn from_str(text: &str) -> Result<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "xml" => Ok(Self::Xml),
            "json" => Ok(Self::Json),
            _ => Err(AssemblyError::UnknownFormat(text.to_string())),
        }
    }
}

/// Plain text, one line per paragraph or table row.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextAssembler;

impl OutputAssembler for TextAssembler {
    fn extension(&self) -> &'static str {
        "txt"
    }

    fn write(&self, tree: &OutputTree, writer: &mut dyn Write) -> Result<()> {
        writer.write_all(tree.text().as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// The XML form read by the template loader: groups as elements, text as
/// `<run>` elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlAssembler {
    indent: Option<usize>,
}

impl XmlAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indents elements. Whitespace between runs then becomes part of the
    /// document, so this is meant for inspection.
    #[must_use]
    pub fn with_indent(mut self, width: usize) -> Self {
        self.indent = Some(width);
        self
    }
}

fn xml_error(err: impl fmt::Display) -> AssemblyError {
    AssemblyError::Xml {
        message: err.to_string(),
    }
}

fn write_group<W: Write>(xml: &mut Writer<W>, group: &OutputGroup) -> Result<()> {
    let tag = group.kind.tag();
    let mut start = BytesStart::new(tag);
    for (name, value) in &group.attributes {
        start.push_attribute((name.as_str(), value.as_str()));
    }
    if group.children.is_empty() {
        xml.write_event(Event::Empty(start)).map_err(xml_error)?;
        return Ok(());
    }
    xml.write_event(Event::Start(start)).map_err(xml_error)?;
    for child in &group.children {
        match child {
            OutputNode::Group(inner) => write_group(xml, inner)?,
            OutputNode::Text(text) => {
                let mut run = BytesStart::new("run");
                if let Some(style) = &text.style {
                    run.push_attribute(("style", style.as_str()));
                }
                xml.write_event(Event::Start(run)).map_err(xml_error)?;
                xml.write_event(Event::Text(BytesText::new(&text.text)))
                    .map_err(xml_error)?;
                xml.write_event(Event::End(BytesEnd::new("run")))
                    .map_err(xml_error)?;
            }
        }
    }
    xml.write_event(Event::End(BytesEnd::new(tag)))
        .map_err(xml_error)?;
    Ok(())
}

impl OutputAssembler for XmlAssembler {
    fn extension(&self) -> &'static str {
        "xml"
    }

    fn write(&self, tree: &OutputTree, writer: &mut dyn Write) -> Result<()> {
        let mut xml = match self.indent {
            Some(width) => Writer::new_with_indent(writer, b' ', width),
            None => Writer::new(writer),
        };
        xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        write_group(&mut xml, &tree.root)?;
        xml.into_inner().write_all(b"\n")?;
        Ok(())
    }
}

/// The output tree as pretty-printed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAssembler;

impl OutputAssembler for JsonAssembler {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn write(&self, tree: &OutputTree, writer: &mut dyn Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *writer, tree)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}
