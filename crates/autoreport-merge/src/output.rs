//! The concrete tree a merge produces.

use std::collections::BTreeMap;

use serde::Serialize;

use autoreport_template::{GroupKind, RunOrigin, Shell};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputText {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputGroup {
    pub kind: GroupKind,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<OutputNode>,
}

impl OutputGroup {
    fn from_shell(shell: &Shell) -> Self {
        Self {
            kind: shell.kind.clone(),
            attributes: shell.attributes.clone(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum OutputNode {
    Group(OutputGroup),
    Text(OutputText),
}

/// Merged document: only text and structural groups remain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputTree {
    pub root: OutputGroup,
}

impl OutputTree {
    /// Plain text: one line per paragraph or table row, cells separated by
    /// tabs.
    pub fn text(&self) -> String {
        let mut out = String::new();
        write_text(&self.root, &mut out);
        out.truncate(out.trim_end_matches('\n').len());
        out
    }
}

fn write_text(group: &OutputGroup, out: &mut String) {
    let mut first_cell = true;
    let mut first_paragraph = true;
    for child in &group.children {
        match child {
            OutputNode::Text(text) => out.push_str(&text.text),
            OutputNode::Group(inner) => {
                if inner.kind == GroupKind::Cell {
                    if !first_cell {
                        out.push('\t');
                    }
                    first_cell = false;
                }
                let in_cell = group.kind == GroupKind::Cell;
                if in_cell && inner.kind == GroupKind::Paragraph {
                    if !first_paragraph {
                        out.push(' ');
                    }
                    first_paragraph = false;
                }
                write_text(inner, out);
                let ends_line = matches!(inner.kind, GroupKind::Paragraph | GroupKind::Row);
                if ends_line && !in_cell {
                    out.push('\n');
                }
            }
        }
    }
}

/// Builds an [`OutputTree`], joining adjacent text that came from the same
/// template run so a substituted run stays one run.
#[derive(Debug)]
pub(crate) struct OutputBuilder {
    stack: Vec<(OutputGroup, Option<RunOrigin>)>,
}

impl OutputBuilder {
    pub(crate) fn new(root: &Shell) -> Self {
        Self {
            stack: vec![(OutputGroup::from_shell(root), None)],
        }
    }

    pub(crate) fn open(&mut self, shell: &Shell) {
        if let Some((_, last_origin)) = self.stack.last_mut() {
            *last_origin = None;
        }
        self.stack.push((OutputGroup::from_shell(shell), None));
    }

    pub(crate) fn close(&mut self) {
        if self.stack.len() < 2 {
            return;
        }
        if let Some((group, _)) = self.stack.pop()
            && let Some((parent, _)) = self.stack.last_mut()
        {
            parent.children.push(OutputNode::Group(group));
        }
    }

    pub(crate) fn push_text(&mut self, text: &str, style: Option<&str>, origin: RunOrigin) {
        if text.is_empty() {
            return;
        }
        let Some((group, last_origin)) = self.stack.last_mut() else {
            return;
        };
        if *last_origin == Some(origin)
            && let Some(OutputNode::Text(run)) = group.children.last_mut()
        {
            run.text.push_str(text);
            return;
        }
        group.children.push(OutputNode::Text(OutputText {
            text: text.to_string(),
            style: style.map(str::to_string),
        }));
        *last_origin = Some(origin);
    }

    pub(crate) fn finish(mut self) -> OutputTree {
        while self.stack.len() > 1 {
            self.close();
        }
        let root = self
            .stack
            .pop()
            .map(|(group, _)| group)
            .unwrap_or_else(|| OutputGroup::from_shell(&document_shell()));
        OutputTree { root }
    }
}

pub(crate) fn document_shell() -> Shell {
    Shell {
        kind: GroupKind::Document,
        attributes: BTreeMap::new(),
    }
}
