//! Data sources served from datasets held in memory.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use autoreport_model::{DataSourceDef, Dataset, Parameters};

use crate::adapter::{DataSourceAdapter, SourceHandle, filter_by_parameters};
use crate::error::DataSourceError;

/// Serves datasets registered by source name.
///
/// Counts every execution, which makes it the adapter of choice for checking
/// how often a merge fetches each source.
#[derive(Debug, Default)]
pub struct InMemoryAdapter {
    datasets: BTreeMap<String, Dataset>,
    failures: BTreeMap<String, String>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
    fetches_by_source: Mutex<BTreeMap<String, usize>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dataset(mut self, source: impl Into<String>, dataset: Dataset) -> Self {
        self.datasets.insert(source.into(), dataset);
        self
    }

    /// Makes every execution of `source` fail with `QueryFailed`.
    #[must_use]
    pub fn with_failure(mut self, source: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(source.into(), message.into());
        self
    }

    /// Sleeps before answering, to exercise timeouts.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fetch_count_for(&self, source: &str) -> usize {
        self.fetches_by_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .copied()
            .unwrap_or(0)
    }

    fn record_fetch(&self, source: &str) {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        *self
            .fetches_by_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(source.to_string())
            .or_default() += 1;
    }
}

impl DataSourceAdapter for InMemoryAdapter {
    fn execute(
        &self,
        _handle: &SourceHandle,
        source: &DataSourceDef,
        parameters: &Parameters,
    ) -> Result<Dataset, DataSourceError> {
        self.record_fetch(&source.name);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if let Some(message) = self.failures.get(&source.name) {
            return Err(DataSourceError::QueryFailed {
                source_name: source.name.clone(),
                message: message.clone(),
            });
        }
        let dataset = self
            .datasets
            .get(&source.name)
            .cloned()
            .ok_or_else(|| DataSourceError::ConnectionFailed {
                source_name: source.name.clone(),
                message: "no dataset registered".to_string(),
            })?;
        filter_by_parameters(dataset, source, parameters)
    }
}
