//! Template parser: document tree to region tree.
//!
//! Tokens use double braces. `{{Name}}`, `{{Scope.Name}}` and
//! `{{Name|spec}}` are placeholders; `{{#X}}`/`{{/X}}` delimit a repeat,
//! `{{?X}}`/`{{/X}}` a conditional, and `{{^X}}` starts the fallback content
//! of the open repeat `X`.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use autoreport_model::{FieldPath, is_valid_name};

use crate::document::{DocNode, Document, Group, GroupKind, Run};
use crate::error::{SyntaxIssue, SyntaxProblem, TemplateSyntaxError};
use crate::region::{MarkerKind, RegionId, RegionKind, RegionTree, RegionTreeBuilder, RunOrigin, Shell};

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("Invalid token regex"));

/// A token after its braces are removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Placeholder {
        name: String,
        field: FieldPath,
        format: Option<String>,
    },
    Open(MarkerKind, String),
    Close(String),
    Fallback(String),
}

/// Parses the text between `{{` and `}}`.
pub fn parse_token(content: &str) -> Result<Token, SyntaxProblem> {
    let malformed = |reason: &str| SyntaxProblem::MalformedToken {
        token: content.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(malformed("empty token"));
    }
    let mut chars = trimmed.chars();
    let sigil = chars.next();
    let marker_name = || {
        let name = chars.as_str().trim();
        if name.is_empty() {
            Err(malformed("missing marker name"))
        } else if !is_valid_name(name) {
            Err(malformed("illegal characters in marker name"))
        } else {
            Ok(name.to_string())
        }
    };
    match sigil {
        Some('#') => marker_name().map(|name| Token::Open(MarkerKind::Repeat, name)),
        Some('?') => marker_name().map(|name| Token::Open(MarkerKind::Conditional, name)),
        Some('/') => marker_name().map(Token::Close),
        Some('^') => marker_name().map(Token::Fallback),
        _ => {
            let (path, format) = match trimmed.split_once('|') {
                Some((path, format)) => {
                    let format = format.trim();
                    if format.is_empty() {
                        return Err(malformed("empty format specifier"));
                    }
                    (path.trim(), Some(format.to_string()))
                }
                None => (trimmed, None),
            };
            let field: FieldPath = path
                .parse()
                .map_err(|_| malformed("illegal characters in field name"))?;
            Ok(Token::Placeholder {
                name: path.to_string(),
                field,
                format,
            })
        }
    }
}

/// Parses a document into a region tree, reporting every syntax problem.
pub fn parse_template(document: &Document) -> Result<RegionTree, TemplateSyntaxError> {
    let mut parser = Parser::default();
    let path = document.root.kind.tag().to_string();
    let items = parser.parse_children(&document.root, &path);
    let children = parser.assemble(items);
    let root = parser.builder.add(
        RegionKind::Group {
            shell: shell_of(&document.root),
            children,
        },
        path,
    );
    if !parser.issues.is_empty() {
        return Err(TemplateSyntaxError {
            issues: parser.issues,
        });
    }
    let tree = parser.builder.finish(root);
    debug!(
        nodes = tree.len(),
        markers = tree.markers().len(),
        placeholders = tree.placeholders().len(),
        "template parsed"
    );
    Ok(tree)
}

fn shell_of(group: &Group) -> Shell {
    Shell {
        kind: group.kind.clone(),
        attributes: group.attributes.clone(),
    }
}

/// Parsed child content waiting for marker assembly.
#[derive(Debug)]
enum Item {
    Node(RegionId),
    Open {
        kind: MarkerKind,
        name: String,
        location: String,
    },
    Close {
        name: String,
        location: String,
    },
    Fallback {
        name: String,
        location: String,
    },
}

impl Item {
    fn from_marker(token: Token, location: &str) -> Option<Self> {
        let location = location.to_string();
        match token {
            Token::Open(kind, name) => Some(Self::Open {
                kind,
                name,
                location,
            }),
            Token::Close(name) => Some(Self::Close { name, location }),
            Token::Fallback(name) => Some(Self::Fallback { name, location }),
            Token::Placeholder { .. } => None,
        }
    }
}

/// An open marker on the assembly stack.
struct Frame {
    kind: MarkerKind,
    name: String,
    location: String,
    children: Vec<RegionId>,
    fallback: Option<Vec<RegionId>>,
}

impl Frame {
    fn target(&mut self) -> &mut Vec<RegionId> {
        match &mut self.fallback {
            Some(fallback) => fallback,
            None => &mut self.children,
        }
    }
}

/// A token found while scanning a table row, with where it sits.
struct RowToken {
    cell: usize,
    pieces: Vec<(Vec<usize>, Range<usize>)>,
    content: String,
}

#[derive(Default)]
struct Parser {
    builder: RegionTreeBuilder,
    issues: Vec<SyntaxIssue>,
    next_origin: usize,
}

impl Parser {
    fn issue(&mut self, location: &str, problem: SyntaxProblem) {
        self.issues.push(SyntaxIssue {
            location: location.to_string(),
            problem,
        });
    }

    fn parse_children(&mut self, group: &Group, path: &str) -> Vec<Item> {
        let mut items = Vec::new();
        let mut pending: Vec<&Run> = Vec::new();
        let mut ordinals: BTreeMap<String, usize> = BTreeMap::new();
        for child in &group.children {
            match child {
                DocNode::Run(run) => pending.push(run),
                DocNode::Group(inner) => {
                    if !pending.is_empty() {
                        let runs = std::mem::take(&mut pending);
                        self.scan_runs(&runs, path, &mut items);
                    }
                    let ordinal = ordinals.entry(inner.kind.tag().to_string()).or_default();
                    let child_path = format!("{path}/{}[{ordinal}]", inner.kind.tag());
                    *ordinal += 1;
                    let item = self.parse_group(inner, &child_path);
                    items.push(item);
                }
            }
        }
        if !pending.is_empty() {
            self.scan_runs(&pending, path, &mut items);
        }
        items
    }

    fn parse_group(&mut self, group: &Group, path: &str) -> Item {
        if group.kind == GroupKind::Paragraph {
            if let Some(item) = block_marker(group, path) {
                return item;
            }
        }
        if group.kind == GroupKind::Row {
            if let Some(id) = self.collapsed_row(group, path) {
                return Item::Node(id);
            }
        }
        let items = self.parse_children(group, path);
        let children = self.assemble(items);
        Item::Node(self.builder.add(
            RegionKind::Group {
                shell: shell_of(group),
                children,
            },
            path,
        ))
    }

    /// Scans consecutive runs as one text so tokens may span run boundaries.
    fn scan_runs(&mut self, runs: &[&Run], path: &str, items: &mut Vec<Item>) {
        let mut text = String::new();
        let mut spans = Vec::with_capacity(runs.len());
        let mut origins = Vec::with_capacity(runs.len());
        for run in runs {
            let start = text.len();
            text.push_str(run.text());
            spans.push(start..text.len());
            origins.push(RunOrigin(self.next_origin));
            self.next_origin += 1;
        }

        if !text.contains("{{") {
            for (run, origin) in runs.iter().zip(&origins) {
                let id = self.builder.add(
                    RegionKind::Static {
                        text: run.text().to_string(),
                        style: run.style.clone(),
                        origin: *origin,
                    },
                    path,
                );
                items.push(Item::Node(id));
            }
            return;
        }

        let mut cursor = 0;
        for captures in TOKEN.captures_iter(&text) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let content = captures.get(1).map_or("", |m| m.as_str());
            self.push_statics(runs, &spans, &origins, &text, cursor..whole.start(), path, items);
            cursor = whole.end();

            let run_index = run_at(&spans, whole.start());
            match parse_token(content) {
                Ok(Token::Placeholder {
                    name,
                    field,
                    format,
                }) => {
                    let id = self.builder.add(
                        RegionKind::Placeholder {
                            name,
                            field,
                            format,
                            style: runs[run_index].style.clone(),
                            origin: origins[run_index],
                        },
                        path,
                    );
                    items.push(Item::Node(id));
                }
                Ok(marker) => items.extend(Item::from_marker(marker, path)),
                Err(problem) => self.issue(path, problem),
            }
        }
        if let Some(offset) = text[cursor..].find("{{") {
            let snippet: String = text[cursor + offset..].chars().take(24).collect();
            self.issue(path, SyntaxProblem::Unterminated { text: snippet });
        }
        self.push_statics(runs, &spans, &origins, &text, cursor..text.len(), path, items);
    }

    #[allow(clippy::too_many_arguments)]
    fn push_statics(
        &mut self,
        runs: &[&Run],
        spans: &[Range<usize>],
        origins: &[RunOrigin],
        text: &str,
        segment: Range<usize>,
        path: &str,
        items: &mut Vec<Item>,
    ) {
        if segment.is_empty() {
            return;
        }
        for (index, span) in spans.iter().enumerate() {
            let start = span.start.max(segment.start);
            let end = span.end.min(segment.end);
            if start >= end {
                continue;
            }
            let id = self.builder.add(
                RegionKind::Static {
                    text: text[start..end].to_string(),
                    style: runs[index].style.clone(),
                    origin: origins[index],
                },
                path,
            );
            items.push(Item::Node(id));
        }
    }

    /// Builds regions from items, matching open and close markers.
    fn assemble(&mut self, items: Vec<Item>) -> Vec<RegionId> {
        let mut top = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        for item in items {
            match item {
                Item::Node(id) => match stack.last_mut() {
                    Some(frame) => frame.target().push(id),
                    None => top.push(id),
                },
                Item::Open {
                    kind,
                    name,
                    location,
                } => stack.push(Frame {
                    kind,
                    name,
                    location,
                    children: Vec::new(),
                    fallback: None,
                }),
                Item::Close { name, location } => {
                    let Some(frame) = stack.pop() else {
                        self.issue(&location, SyntaxProblem::Unopened { marker: name });
                        continue;
                    };
                    if frame.name != name {
                        self.issue(
                            &location,
                            SyntaxProblem::MismatchedClose {
                                open: frame.name,
                                close: name,
                            },
                        );
                        continue;
                    }
                    let kind = match frame.kind {
                        MarkerKind::Repeat => RegionKind::Repeat {
                            marker: frame.name,
                            children: frame.children,
                            fallback: frame.fallback,
                        },
                        MarkerKind::Conditional => RegionKind::Conditional {
                            marker: frame.name,
                            children: frame.children,
                        },
                    };
                    let id = self.builder.add(kind, frame.location);
                    match stack.last_mut() {
                        Some(parent) => parent.target().push(id),
                        None => top.push(id),
                    }
                }
                Item::Fallback { name, location } => match stack.last_mut() {
                    Some(frame) if frame.kind == MarkerKind::Repeat && frame.name == name => {
                        if frame.fallback.is_some() {
                            self.issue(&location, SyntaxProblem::DuplicateFallback { marker: name });
                        } else {
                            frame.fallback = Some(Vec::new());
                        }
                    }
                    _ => self.issue(&location, SyntaxProblem::FallbackOutsideRepeat { marker: name }),
                },
            }
        }
        for frame in stack {
            self.issue(&frame.location, SyntaxProblem::Unclosed { marker: frame.name });
        }
        top
    }

    /// Collapses a row whose first token opens a repeat and whose last token
    /// closes it in another cell into a repeat of the row.
    fn collapsed_row(&mut self, row: &Group, path: &str) -> Option<RegionId> {
        let mut tokens = Vec::new();
        for (cell, child) in row.children.iter().enumerate() {
            if let DocNode::Group(group) = child {
                collect_row_tokens(group, cell, &mut vec![cell], &mut tokens);
            }
        }
        let first = tokens.first()?;
        let last = tokens.last()?;
        let Ok(Token::Open(MarkerKind::Repeat, name)) = parse_token(&first.content) else {
            return None;
        };
        let Ok(Token::Close(close)) = parse_token(&last.content) else {
            return None;
        };
        if close != name || first.cell == last.cell {
            return None;
        }

        let mut stripped = row.clone();
        for (run_path, range) in last.pieces.iter().chain(&first.pieces) {
            remove_range(&mut stripped, run_path, range.clone());
        }

        let items = self.parse_children(&stripped, path);
        let children = self.assemble(items);
        let template_row = self.builder.add(
            RegionKind::Group {
                shell: shell_of(row),
                children,
            },
            path,
        );
        Some(self.builder.add(
            RegionKind::Repeat {
                marker: name,
                children: vec![template_row],
                fallback: None,
            },
            path,
        ))
    }
}

/// A paragraph whose whole text is one marker token.
fn block_marker(paragraph: &Group, path: &str) -> Option<Item> {
    if paragraph
        .children
        .iter()
        .any(|child| matches!(child, DocNode::Group(_)))
    {
        return None;
    }
    let text = paragraph.text();
    let trimmed = text.trim();
    let captures = TOKEN.captures(trimmed)?;
    let whole = captures.get(0)?;
    if whole.start() != 0 || whole.end() != trimmed.len() {
        return None;
    }
    let token = parse_token(captures.get(1)?.as_str()).ok()?;
    Item::from_marker(token, path)
}

fn run_at(spans: &[Range<usize>], offset: usize) -> usize {
    spans
        .iter()
        .position(|span| span.contains(&offset))
        .unwrap_or(spans.len().saturating_sub(1))
}

fn collect_row_tokens(group: &Group, cell: usize, path: &mut Vec<usize>, out: &mut Vec<RowToken>) {
    let mut pending: Vec<(Vec<usize>, &Run)> = Vec::new();
    for (index, child) in group.children.iter().enumerate() {
        path.push(index);
        match child {
            DocNode::Run(run) => pending.push((path.clone(), run)),
            DocNode::Group(inner) => {
                scan_row_runs(&std::mem::take(&mut pending), cell, out);
                collect_row_tokens(inner, cell, path, out);
            }
        }
        path.pop();
    }
    scan_row_runs(&pending, cell, out);
}

/// Finds tokens in consecutive runs joined as one text, keeping the slice of
/// each run a token covers.
fn scan_row_runs(runs: &[(Vec<usize>, &Run)], cell: usize, out: &mut Vec<RowToken>) {
    if runs.is_empty() {
        return;
    }
    let mut text = String::new();
    let mut spans = Vec::with_capacity(runs.len());
    for (_, run) in runs {
        let start = text.len();
        text.push_str(run.text());
        spans.push(start..text.len());
    }
    for captures in TOKEN.captures_iter(&text) {
        let (Some(whole), Some(content)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let pieces = runs
            .iter()
            .zip(&spans)
            .filter_map(|((run_path, _), span)| {
                let start = span.start.max(whole.start());
                let end = span.end.min(whole.end());
                (start < end).then(|| (run_path.clone(), start - span.start..end - span.start))
            })
            .collect();
        out.push(RowToken {
            cell,
            pieces,
            content: content.as_str().to_string(),
        });
    }
}

fn remove_range(row: &mut Group, run_path: &[usize], range: Range<usize>) {
    let mut group = row;
    let Some((last, parents)) = run_path.split_last() else {
        return;
    };
    for index in parents {
        match group.children.get_mut(*index) {
            Some(DocNode::Group(inner)) => group = inner,
            _ => return,
        }
    }
    if let Some(DocNode::Run(run)) = group.children.get_mut(*last) {
        let mut text = run.text().to_string();
        text.replace_range(range, "");
        run.set_text(text);
    }
}
