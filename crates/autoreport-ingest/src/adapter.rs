//! The data source adapter boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use autoreport_model::{DataSourceDef, Dataset, Parameters, SourceKind};

use crate::error::DataSourceError;

/// Connection slot checked out from a [`crate::HandlePool`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceHandle {
    id: usize,
}

impl SourceHandle {
    pub(crate) fn new(id: usize) -> Self {
        Self { id }
    }

    pub fn id(&self) -> usize {
        self.id
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.id)
    }
}

/// Executes a declared data source and returns its rows.
///
/// Adapters are shared across worker threads. `parameters` is empty for
/// non-correlated sources.
pub trait DataSourceAdapter: Send + Sync {
    fn execute(
        &self,
        handle: &SourceHandle,
        source: &DataSourceDef,
        parameters: &Parameters,
    ) -> Result<Dataset, DataSourceError>;
}

/// Adapters keyed by the source kind they execute.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<SourceKind, Arc<dyn DataSourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: SourceKind, adapter: Arc<dyn DataSourceAdapter>) {
        self.adapters.insert(kind, adapter);
    }

    #[must_use]
    pub fn with_adapter(mut self, kind: SourceKind, adapter: Arc<dyn DataSourceAdapter>) -> Self {
        self.register(kind, adapter);
        self
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn DataSourceAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    /// The adapter for `source`, or `ConnectionFailed` when none is registered.
    pub fn adapter_for(
        &self,
        source: &DataSourceDef,
    ) -> Result<Arc<dyn DataSourceAdapter>, DataSourceError> {
        self.get(source.kind)
            .ok_or_else(|| DataSourceError::ConnectionFailed {
                source_name: source.name.clone(),
                message: format!("no driver registered for {} sources", source.kind),
            })
    }

    pub fn kinds(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.adapters.keys().copied()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Keeps the rows whose column named by each parameter equals its value.
///
/// Used by adapters that cannot push parameters into a statement.
pub fn filter_by_parameters(
    mut dataset: Dataset,
    source: &DataSourceDef,
    parameters: &Parameters,
) -> Result<Dataset, DataSourceError> {
    if parameters.is_empty() {
        return Ok(dataset);
    }
    let mut filters = Vec::with_capacity(parameters.len());
    for (name, value) in parameters {
        let index = dataset.schema().index_of(name).ok_or_else(|| {
            DataSourceError::SchemaMismatch {
                source_name: source.name.clone(),
                message: format!("parameter '{name}' does not name a column"),
            }
        })?;
        filters.push((index, value));
    }
    dataset.retain_rows(|_, row| {
        filters.iter().all(|(index, expected)| {
            row.get(*index)
                .is_some_and(|actual| actual.loosely_equals(expected))
        })
    });
    Ok(dataset)
}
