//! Runs data sources for merges: adapter lookup, handle checkout, timeouts
//! and the shared cache of uncorrelated datasets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use autoreport_ingest::{AdapterRegistry, DataSourceError, HandlePool, SourceHandle};
use autoreport_model::{DataSourceDef, Dataset, Parameters};

use crate::options::DEFAULT_SOURCE_TIMEOUT_MS;

type CachedFetch = Arc<OnceLock<Result<Arc<Dataset>, DataSourceError>>>;

/// Shared by every merge of a run.
#[derive(Debug)]
pub struct SourceExecutor {
    registry: AdapterRegistry,
    pool: HandlePool,
    timeout: Duration,
    cache: Mutex<HashMap<String, CachedFetch>>,
    executions: AtomicUsize,
}

impl SourceExecutor {
    pub fn new(registry: AdapterRegistry, pool: HandlePool) -> Self {
        Self {
            registry,
            pool,
            timeout: Duration::from_millis(DEFAULT_SOURCE_TIMEOUT_MS),
            cache: Mutex::new(HashMap::new()),
            executions: AtomicUsize::new(0),
        }
    }

    /// Bounds each call, including the wait for a free handle.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn pool(&self) -> &HandlePool {
        &self.pool
    }

    /// Adapter calls made so far, cached or not.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// Rows of an uncorrelated source, fetched at most once per executor.
    ///
    /// Concurrent callers for the same source wait for the first fetch. A
    /// failed fetch is remembered too, so every merge of the run sees it.
    pub fn fetch_shared(&self, source: &DataSourceDef) -> Result<Arc<Dataset>, DataSourceError> {
        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(cache.entry(source.name.clone()).or_default())
        };
        cell.get_or_init(|| self.execute(source, &Parameters::new()).map(Arc::new))
            .clone()
    }

    /// Rows of a correlated source for one set of parameters, never cached.
    pub fn fetch(
        &self,
        source: &DataSourceDef,
        parameters: &Parameters,
    ) -> Result<Arc<Dataset>, DataSourceError> {
        self.execute(source, parameters).map(Arc::new)
    }

    /// Drops cached datasets so the next run sees fresh data.
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn execute(
        &self,
        source: &DataSourceDef,
        parameters: &Parameters,
    ) -> Result<Dataset, DataSourceError> {
        let adapter = self.registry.adapter_for(source)?;
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let timed_out = || DataSourceError::Timeout {
            source_name: source.name.clone(),
            timeout_ms,
        };

        let started = Instant::now();
        let guard = self.pool.checkout(self.timeout).ok_or_else(|| {
            warn!(source = %source.name, "no source handle became free in time");
            timed_out()
        })?;
        self.executions.fetch_add(1, Ordering::SeqCst);

        let handle = SourceHandle::clone(&guard);
        let definition = source.clone();
        let owned_parameters = parameters.clone();
        let (sender, receiver) = mpsc::channel();
        thread::Builder::new()
            .name(format!("source-{}", source.name))
            .spawn(move || {
                let result = adapter.execute(&handle, &definition, &owned_parameters);
                // The receiver is gone when the caller already timed out.
                let _ = sender.send(result);
            })
            .map_err(|err| DataSourceError::ConnectionFailed {
                source_name: source.name.clone(),
                message: format!("failed to start source call: {err}"),
            })?;

        let remaining = self.timeout.saturating_sub(started.elapsed());
        let result = match receiver.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(source = %source.name, timeout_ms, "source call timed out");
                Err(timed_out())
            }
            Err(RecvTimeoutError::Disconnected) => Err(DataSourceError::QueryFailed {
                source_name: source.name.clone(),
                message: "source call ended without a result".to_string(),
            }),
        };
        drop(guard);

        match &result {
            Ok(dataset) => debug!(
                source = %source.name,
                rows = dataset.len(),
                parameters = parameters.len(),
                duration_ms = started.elapsed().as_millis(),
                "source fetched"
            ),
            Err(err) => debug!(source = %source.name, error = %err, "source failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoreport_ingest::InMemoryAdapter;
    use autoreport_model::{Column, ColumnType, Schema, SourceKind, Value};

    fn executor(adapter: InMemoryAdapter, handles: usize) -> (SourceExecutor, Arc<InMemoryAdapter>) {
        let adapter = Arc::new(adapter);
        let registry = AdapterRegistry::new().with_adapter(SourceKind::Query, adapter.clone());
        (SourceExecutor::new(registry, HandlePool::new(handles)), adapter)
    }

    fn rows() -> Dataset {
        let schema = Schema::new(vec![Column::new("Id", ColumnType::Number)]).unwrap();
        Dataset::from_rows(schema, vec![vec![Value::Number(1.0)], vec![Value::Number(2.0)]])
            .unwrap()
    }

    #[test]
    fn shared_fetches_run_once() {
        let (executor, adapter) = executor(InMemoryAdapter::new().with_dataset("Rows", rows()), 1);
        let source = DataSourceDef::new("Rows", SourceKind::Query, "select");
        let first = executor.fetch_shared(&source).unwrap();
        let second = executor.fetch_shared(&source).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(adapter.fetch_count(), 1);
        assert_eq!(executor.pool().available(), 1);

        executor.clear_cache();
        executor.fetch_shared(&source).unwrap();
        assert_eq!(adapter.fetch_count(), 2);
    }

    #[test]
    fn slow_sources_time_out_and_release_the_handle() {
        let (executor, _) = executor(
            InMemoryAdapter::new()
                .with_dataset("Rows", rows())
                .with_delay(Duration::from_millis(300)),
            1,
        );
        let executor = executor.with_timeout(Duration::from_millis(20));
        let source = DataSourceDef::new("Rows", SourceKind::Query, "select");
        let err = executor.fetch(&source, &Parameters::new()).unwrap_err();
        assert!(matches!(err, DataSourceError::Timeout { timeout_ms: 20, .. }));
        assert_eq!(executor.pool().available(), 1);
    }

    #[test]
    fn unregistered_kinds_fail_to_connect() {
        let (executor, _) = executor(InMemoryAdapter::new(), 1);
        let source = DataSourceDef::new("Sheet", SourceKind::Range, "a.csv");
        assert!(matches!(
            executor.fetch_shared(&source),
            Err(DataSourceError::ConnectionFailed { .. })
        ));
    }
}
