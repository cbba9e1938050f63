//! The region tree produced by the template parser.
//!
//! Nodes live in an arena and are addressed by [`RegionId`]. Every node except
//! the root has exactly one parent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use autoreport_model::FieldPath;

use crate::document::GroupKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(usize);

impl RegionId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordinal of the template run (in document order) a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunOrigin(pub usize);

/// The structural container a `Group` region reproduces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shell {
    pub kind: GroupKind,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Repeat,
    Conditional,
}

impl MarkerKind {
    pub const fn sigil(self) -> char {
        match self {
            Self::Repeat => '#',
            Self::Conditional => '?',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegionKind {
    Static {
        text: String,
        style: Option<String>,
        origin: RunOrigin,
    },
    Placeholder {
        /// Token name as written, e.g. `Items.Qty`.
        name: String,
        field: FieldPath,
        format: Option<String>,
        style: Option<String>,
        origin: RunOrigin,
    },
    Repeat {
        marker: String,
        children: Vec<RegionId>,
        /// Content shown once when the repeat has no rows.
        fallback: Option<Vec<RegionId>>,
    },
    Conditional {
        marker: String,
        children: Vec<RegionId>,
    },
    Group {
        shell: Shell,
        children: Vec<RegionId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionNode {
    pub kind: RegionKind,
    pub parent: Option<RegionId>,
    /// Template location, e.g. `document/paragraph[2]`.
    pub location: String,
}

impl RegionNode {
    pub fn marker(&self) -> Option<(MarkerKind, &str)> {
        match &self.kind {
            RegionKind::Repeat { marker, .. } => Some((MarkerKind::Repeat, marker)),
            RegionKind::Conditional { marker, .. } => Some((MarkerKind::Conditional, marker)),
            _ => None,
        }
    }

    pub fn is_repeat(&self) -> bool {
        matches!(self.kind, RegionKind::Repeat { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionTree {
    nodes: Vec<RegionNode>,
    root: RegionId,
}

impl RegionTree {
    pub fn root(&self) -> RegionId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: RegionId) -> &RegionNode {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: RegionId) -> &RegionKind {
        &self.node(id).kind
    }

    pub fn parent(&self, id: RegionId) -> Option<RegionId> {
        self.node(id).parent
    }

    /// Main children of a container node; empty for leaves.
    pub fn children(&self, id: RegionId) -> &[RegionId] {
        match self.kind(id) {
            RegionKind::Repeat { children, .. }
            | RegionKind::Conditional { children, .. }
            | RegionKind::Group { children, .. } => children,
            RegionKind::Static { .. } | RegionKind::Placeholder { .. } => &[],
        }
    }

    pub fn fallback(&self, id: RegionId) -> Option<&[RegionId]> {
        match self.kind(id) {
            RegionKind::Repeat { fallback, .. } => fallback.as_deref(),
            _ => None,
        }
    }

    /// Whether `child` sits in the fallback content of `repeat`.
    pub fn in_fallback(&self, repeat: RegionId, child: RegionId) -> bool {
        self.fallback(repeat)
            .is_some_and(|fallback| fallback.contains(&child))
    }

    /// Ancestors of `id`, innermost first.
    pub fn ancestors(&self, id: RegionId) -> impl Iterator<Item = RegionId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// Marker ancestors whose row scope is active at `id`, innermost first.
    ///
    /// A repeat does not provide a row to its own fallback content.
    pub fn enclosing_markers(&self, id: RegionId) -> Vec<RegionId> {
        let mut markers = Vec::new();
        let mut child = id;
        for ancestor in self.ancestors(id) {
            let node = self.node(ancestor);
            if node.marker().is_some() && !self.in_fallback(ancestor, child) {
                markers.push(ancestor);
            }
            child = ancestor;
        }
        markers
    }

    /// Every node reachable from the root, in document order.
    pub fn preorder(&self) -> Vec<RegionId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            let fallback = self.fallback(id).unwrap_or(&[]);
            for child in fallback.iter().rev() {
                stack.push(*child);
            }
            for child in self.children(id).iter().rev() {
                stack.push(*child);
            }
        }
        order
    }

    /// Repeat and conditional nodes in document order.
    pub fn markers(&self) -> Vec<RegionId> {
        self.preorder()
            .into_iter()
            .filter(|id| self.node(*id).marker().is_some())
            .collect()
    }

    pub fn placeholders(&self) -> Vec<RegionId> {
        self.preorder()
            .into_iter()
            .filter(|id| matches!(self.kind(*id), RegionKind::Placeholder { .. }))
            .collect()
    }

    pub fn marker_name(&self, id: RegionId) -> Option<&str> {
        self.node(id).marker().map(|(_, name)| name)
    }
}

/// Arena builder used by the parser.
#[derive(Debug, Default)]
pub(crate) struct RegionTreeBuilder {
    nodes: Vec<RegionNode>,
}

impl RegionTreeBuilder {
    pub(crate) fn add(&mut self, kind: RegionKind, location: impl Into<String>) -> RegionId {
        let id = RegionId(self.nodes.len());
        self.nodes.push(RegionNode {
            kind,
            parent: None,
            location: location.into(),
        });
        id
    }

    /// Links parents from the root down and returns the finished tree.
    pub(crate) fn finish(mut self, root: RegionId) -> RegionTree {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let children: Vec<RegionId> = match &self.nodes[id.0].kind {
                RegionKind::Repeat {
                    children, fallback, ..
                } => children
                    .iter()
                    .chain(fallback.iter().flatten())
                    .copied()
                    .collect(),
                RegionKind::Conditional { children, .. } | RegionKind::Group { children, .. } => {
                    children.clone()
                }
                RegionKind::Static { .. } | RegionKind::Placeholder { .. } => Vec::new(),
            };
            for child in children {
                self.nodes[child.0].parent = Some(id);
                stack.push(child);
            }
        }
        RegionTree {
            nodes: self.nodes,
            root,
        }
    }
}
