//! Row scopes active during a merge.
//!
//! Scopes form an immutable chain on the call stack: entering a repeat row
//! links a new scope to its parent, and leaving the row drops it.

use autoreport_model::{Dataset, Value};
use autoreport_template::RegionId;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RowScope<'s> {
    region: RegionId,
    dataset: &'s Dataset,
    row: usize,
    parent: Option<&'s RowScope<'s>>,
}

impl<'s> RowScope<'s> {
    pub(crate) fn new(
        parent: Option<&'s RowScope<'s>>,
        region: RegionId,
        dataset: &'s Dataset,
        row: usize,
    ) -> Self {
        Self {
            region,
            dataset,
            row,
            parent,
        }
    }

    /// This scope and its ancestors, innermost first.
    pub(crate) fn chain(&'s self) -> impl Iterator<Item = &'s RowScope<'s>> {
        std::iter::successors(Some(self), |scope| scope.parent)
    }

    pub(crate) fn value(&self, column: &str) -> Option<Value> {
        self.dataset.value(self.row, column).cloned()
    }

    /// Value of `column` in the innermost scope opened by `region`.
    pub(crate) fn value_in(&'s self, region: RegionId, column: &str) -> Option<Value> {
        self.chain()
            .find(|scope| scope.region == region)
            .and_then(|scope| scope.value(column))
    }

    /// Value of `column` in the innermost scope whose rows carry it.
    pub(crate) fn innermost(&'s self, column: &str) -> Option<Value> {
        self.chain()
            .find(|scope| scope.dataset.schema().contains(column))
            .and_then(|scope| scope.value(column))
    }
}
