//! Runs independent merges on a scoped worker pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use tracing::{debug, info, info_span};

use crate::cancel::CancelToken;
use crate::engine::{MergeEngine, MergeOutcome, RecordScope};
use crate::error::MergeError;
use crate::options::BatchOptions;

/// One report to produce.
#[derive(Debug, Clone)]
pub struct MergeJob {
    pub label: String,
    pub record: Option<RecordScope>,
}

impl MergeJob {
    pub fn single(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            record: None,
        }
    }

    /// One job per record, labelled `<source> #<n>` from 1.
    pub fn per_record(records: Vec<RecordScope>) -> Vec<Self> {
        records
            .into_iter()
            .map(|record| Self {
                label: format!("{} #{}", record.source, record.row + 1),
                record: Some(record),
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct JobResult {
    pub index: usize,
    pub job: MergeJob,
    pub outcome: Result<MergeOutcome, MergeError>,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Whether the job never started because the batch was cancelled.
    pub fn was_skipped(&self) -> bool {
        matches!(self.outcome, Err(MergeError::Cancelled))
    }
}

/// Merges every job, returning results in job order whatever order they
/// finish in. A failed job does not stop the others.
///
/// `on_finished` runs on the worker thread as each job completes.
pub fn run_batch<F>(
    engine: &MergeEngine<'_>,
    jobs: Vec<MergeJob>,
    options: &BatchOptions,
    cancel: &CancelToken,
    on_finished: F,
) -> Vec<JobResult>
where
    F: Fn(&JobResult) + Sync,
{
    let workers = options.workers(jobs.len());
    let _span = info_span!("batch", jobs = jobs.len(), workers).entered();
    let start = Instant::now();

    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<JobResult>>> = Mutex::new((0..jobs.len()).map(|_| None).collect());
    thread::scope(|scope| {
        for worker in 0..workers {
            let (jobs, next, slots, on_finished) = (&jobs, &next, &slots, &on_finished);
            scope.spawn(move || {
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(job) = jobs.get(index) else {
                        break;
                    };
                    let outcome = if cancel.is_cancelled() {
                        Err(MergeError::Cancelled)
                    } else {
                        engine.merge_record(job.record.as_ref(), cancel)
                    };
                    debug!(worker, job = %job.label, ok = outcome.is_ok(), "job finished");
                    let result = JobResult {
                        index,
                        job: job.clone(),
                        outcome,
                    };
                    on_finished(&result);
                    slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(result);
                }
            });
        }
    });

    let results: Vec<JobResult> = slots
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_iter()
        .flatten()
        .collect();
    let failed = results.iter().filter(|result| !result.is_success()).count();
    info!(
        succeeded = results.len() - failed,
        failed,
        duration_ms = start.elapsed().as_millis(),
        "batch complete"
    );
    results
}
