//! Merge and batch configuration.

use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Default timeout for one data source call.
pub const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Text substituted for placeholders whose field cannot be found.
    pub missing_marker: String,
    pub source_timeout_ms: u64,
    /// Value of the `@now` pseudo-column. Taken from the clock once per run
    /// when unset.
    pub generated_at: Option<NaiveDateTime>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            missing_marker: String::new(),
            source_timeout_ms: DEFAULT_SOURCE_TIMEOUT_MS,
            generated_at: None,
        }
    }
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_missing_marker(mut self, marker: impl Into<String>) -> Self {
        self.missing_marker = marker.into();
        self
    }

    #[must_use]
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_generated_at(mut self, generated_at: NaiveDateTime) -> Self {
        self.generated_at = Some(generated_at);
        self
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    /// Number of worker threads; zero means one per available core.
    pub jobs: usize,
}

impl BatchOptions {
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Worker count for `job_count` jobs.
    pub fn workers(&self, job_count: usize) -> usize {
        let requested = if self.jobs == 0 {
            thread::available_parallelism().map_or(1, NonZeroUsize::get)
        } else {
            self.jobs
        };
        requested.min(job_count).max(1)
    }
}
