//! The validated execution plan handed to the merge engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use autoreport_format::FormatSpec;
use autoreport_model::{DataSourceDef, FieldPath};
use autoreport_template::{RegionId, RegionTree};

use crate::predicate::Predicate;

/// Where a field's value comes from at merge time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTarget {
    /// The current row of the marker region with this id.
    Scope(RegionId),
    /// The first row of a source outside the enclosing chain.
    Root(String),
    /// The innermost active scope whose data carries the column. Used when
    /// the enclosing sources declare no schema.
    Innermost,
    /// The generation timestamp of the run.
    GeneratedAt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub target: FieldTarget,
    pub column: String,
}

impl FieldRef {
    pub fn new(target: FieldTarget, column: impl Into<String>) -> Self {
        Self {
            target,
            column: column.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderBinding {
    pub name: String,
    pub field: FieldRef,
    pub format: FormatSpec,
    /// Tried in order before `format`; the first whose predicate holds wins.
    pub conditional_formats: Vec<ConditionalFormat>,
    /// Text used when the value is missing or null.
    pub default: Option<String>,
}

/// A format applied only while its predicate holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalFormat {
    pub predicate: CompiledPredicate,
    pub format: FormatSpec,
}

/// A correlation parameter read from the ancestor row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationParameter {
    pub name: String,
    pub field: FieldRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub ancestor: RegionId,
    pub parameters: Vec<CorrelationParameter>,
}

/// A predicate with every field it reads resolved to a target.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    pub expression: Predicate,
    pub fields: BTreeMap<FieldPath, FieldRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepeatBinding {
    pub marker: String,
    pub source: String,
    pub correlation: Option<Correlation>,
    /// Optional row filter, evaluated with the candidate row in scope.
    pub filter: Option<CompiledPredicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBinding {
    pub marker: String,
    /// Source whose first row is pushed as this region's scope.
    pub source: Option<String>,
    pub predicate: CompiledPredicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeBinding {
    Placeholder(PlaceholderBinding),
    Repeat(RepeatBinding),
    Conditional(ConditionalBinding),
}

/// Region tree plus the resolved binding of every placeholder and marker.
///
/// Immutable once built and shared read-only across batch workers.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    tree: Arc<RegionTree>,
    bindings: BTreeMap<RegionId, NodeBinding>,
    sources: BTreeMap<String, DataSourceDef>,
    prefetch: Vec<String>,
}

impl ExecutionPlan {
    pub(crate) fn new(
        tree: Arc<RegionTree>,
        bindings: BTreeMap<RegionId, NodeBinding>,
        sources: BTreeMap<String, DataSourceDef>,
        prefetch: Vec<String>,
    ) -> Self {
        Self {
            tree,
            bindings,
            sources,
            prefetch,
        }
    }

    pub fn tree(&self) -> &RegionTree {
        &self.tree
    }

    pub fn binding(&self, id: RegionId) -> Option<&NodeBinding> {
        self.bindings.get(&id)
    }

    pub fn placeholder(&self, id: RegionId) -> Option<&PlaceholderBinding> {
        match self.bindings.get(&id) {
            Some(NodeBinding::Placeholder(binding)) => Some(binding),
            _ => None,
        }
    }

    pub fn repeat(&self, id: RegionId) -> Option<&RepeatBinding> {
        match self.bindings.get(&id) {
            Some(NodeBinding::Repeat(binding)) => Some(binding),
            _ => None,
        }
    }

    pub fn conditional(&self, id: RegionId) -> Option<&ConditionalBinding> {
        match self.bindings.get(&id) {
            Some(NodeBinding::Conditional(binding)) => Some(binding),
            _ => None,
        }
    }

    /// Sources referenced by the plan, keyed by declared name.
    pub fn sources(&self) -> &BTreeMap<String, DataSourceDef> {
        &self.sources
    }

    pub fn source(&self, name: &str) -> Option<&DataSourceDef> {
        self.sources.get(name)
    }

    /// Uncorrelated sources in first-use order, outer regions first.
    pub fn prefetch_order(&self) -> &[String] {
        &self.prefetch
    }

    /// Source whose rows the marker region at `id` puts in scope.
    pub fn scope_source(&self, id: RegionId) -> Option<&str> {
        match self.bindings.get(&id)? {
            NodeBinding::Repeat(binding) => Some(&binding.source),
            NodeBinding::Conditional(binding) => binding.source.as_deref(),
            NodeBinding::Placeholder(_) => None,
        }
    }
}
