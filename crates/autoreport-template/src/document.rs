//! Abstract document model shared by loaders, the parser and assemblers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Document,
    Paragraph,
    Table,
    Row,
    Cell,
    Other(String),
}

impl GroupKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "document" => Self::Document,
            "paragraph" | "p" => Self::Paragraph,
            "table" => Self::Table,
            "row" | "tr" => Self::Row,
            "cell" | "td" => Self::Cell,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Document => "document",
            Self::Paragraph => "paragraph",
            Self::Table => "table",
            Self::Row => "row",
            Self::Cell => "cell",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A run of text sharing one style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    text: String,
    pub style: Option<String>,
}

impl Run {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: None,
        }
    }

    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocNode {
    Group(Group),
    Run(Run),
}

/// A structural container: document, paragraph, table, row, cell or other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub kind: GroupKind,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<DocNode>,
}

impl Group {
    pub fn new(kind: GroupKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// A paragraph holding a single unstyled run.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(GroupKind::Paragraph).with_run(Run::new(text))
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_run(mut self, run: Run) -> Self {
        self.children.push(DocNode::Run(run));
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: Group) -> Self {
        self.children.push(DocNode::Group(group));
        self
    }

    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.children.iter().filter_map(|child| match child {
            DocNode::Run(run) => Some(run),
            DocNode::Group(_) => None,
        })
    }

    /// Concatenated text of every run in this group and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(group: &Group, out: &mut String) {
    for child in &group.children {
        match child {
            DocNode::Run(run) => out.push_str(run.text()),
            DocNode::Group(inner) => collect_text(inner, out),
        }
    }
}

/// A template or output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub root: Group,
}

impl Document {
    pub fn new(root: Group) -> Self {
        Self { root }
    }

    /// A document with one paragraph per line of `text`.
    pub fn from_lines(text: &str) -> Self {
        let mut root = Group::new(GroupKind::Document);
        for line in text.lines() {
            root.children.push(DocNode::Group(Group::paragraph(line)));
        }
        Self { root }
    }
}
