//! The stages behind each command, independent of terminal output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, info_span, warn};

use autoreport_bind::{ExecutionPlan, resolve};
use autoreport_ingest::{AdapterRegistry, CsvRangeAdapter, HandlePool, load_binding_workbook};
use autoreport_merge::{
    BatchOptions, CancelToken, JobResult, MergeEngine, MergeError, MergeJob, MergeOptions,
    MergeWarning, SourceExecutor, run_batch,
};
use autoreport_model::{
    BindingSpec, Diagnostic, DiagnosticReport, Parameters, SourceKind,
};
use autoreport_report::{DEFAULT_PATTERN, OutputFormat, OutputNamer, UniqueNames};
use autoreport_template::{Document, TemplateSyntaxError, load_template, parse_template};

use crate::logging::redact_value;

/// A template and binding workbook, loaded but not yet checked.
#[derive(Debug)]
pub struct Inputs {
    pub document: Document,
    pub spec: BindingSpec,
}

pub fn load_inputs(template: &Path, bindings: &Path) -> Result<Inputs> {
    let _span = info_span!("load").entered();
    let document =
        load_template(template).with_context(|| format!("load template {}", template.display()))?;
    let spec = load_binding_workbook(bindings)
        .with_context(|| format!("load binding workbook {}", bindings.display()))?;
    Ok(Inputs { document, spec })
}

#[derive(Debug)]
pub struct CheckOutcome {
    pub report: DiagnosticReport,
    /// Present when the template parsed and every binding resolved.
    pub plan: Option<ExecutionPlan>,
}

fn syntax_diagnostics(err: &TemplateSyntaxError) -> Vec<Diagnostic> {
    err.issues
        .iter()
        .map(|issue| {
            Diagnostic::error("template-syntax", issue.problem.to_string())
                .with_location(issue.location.clone())
        })
        .collect()
}

/// Parses the template and resolves the bindings, collecting every problem.
pub fn check(inputs: &Inputs, subject: &str) -> CheckOutcome {
    let span = info_span!("check", duration_ms = tracing::field::Empty);
    let _guard = span.enter();
    let start = Instant::now();
    let mut report = DiagnosticReport::new(subject);

    let plan = match parse_template(&inputs.document) {
        Err(err) => {
            report.extend(syntax_diagnostics(&err));
            None
        }
        Ok(tree) => match resolve(tree, &inputs.spec) {
            Ok(plan) => Some(plan),
            Err(errors) => {
                report.extend(errors.to_diagnostics());
                None
            }
        },
    };
    span.record("duration_ms", start.elapsed().as_millis());
    info!(
        errors = report.error_count(),
        warnings = report.warning_count(),
        "check complete"
    );
    CheckOutcome { report, plan }
}

/// Adapters available to the CLI. Query sources have no bundled driver.
pub fn build_registry(workbook: &Path, today: NaiveDate) -> AdapterRegistry {
    AdapterRegistry::new().with_adapter(
        SourceKind::Range,
        Arc::new(CsvRangeAdapter::new(workbook).with_today(today)),
    )
}

#[derive(Debug, Clone)]
pub struct GenerateSettings {
    pub template: PathBuf,
    pub bindings: PathBuf,
    /// Output path pattern; the file name part is expanded per report.
    pub output: String,
    pub format: OutputFormat,
    pub per_record: Option<String>,
    pub merge: MergeOptions,
    pub batch: BatchOptions,
    pub dry_run: bool,
    pub today: NaiveDate,
    pub show_progress: bool,
    /// Stops the batch at the next region boundary once cancelled. The CLI
    /// never cancels it; interrupts end the process.
    pub cancel: CancelToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStatus {
    Written,
    /// Merged but not written (dry run).
    Merged,
    Failed(String),
    /// Never started because the batch was cancelled.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub label: String,
    pub path: Option<PathBuf>,
    pub bytes: Option<usize>,
    pub sha256: Option<String>,
    pub status: ReportStatus,
    pub diagnostics: DiagnosticReport,
}

impl ReportSummary {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            path: None,
            bytes: None,
            sha256: None,
            status: ReportStatus::Skipped,
            diagnostics: DiagnosticReport::new(label),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, ReportStatus::Failed(_) | ReportStatus::Skipped)
    }
}

#[derive(Debug)]
pub struct GenerateResult {
    /// Template and binding problems. When it has errors nothing was merged.
    pub problems: DiagnosticReport,
    pub reports: Vec<ReportSummary>,
    pub dry_run: bool,
}

impl GenerateResult {
    pub fn failed_count(&self) -> usize {
        self.reports.iter().filter(|report| report.is_failure()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.reports
            .iter()
            .map(|report| report.diagnostics.warning_count())
            .sum()
    }

    pub fn has_errors(&self) -> bool {
        self.problems.has_errors() || self.failed_count() > 0
    }
}

/// Splits an output pattern into its directory and file-name pattern.
pub fn split_output_pattern(pattern: &str) -> (PathBuf, String) {
    if pattern.is_empty() || pattern.ends_with(['/', '\\']) {
        return (PathBuf::from(pattern), DEFAULT_PATTERN.to_string());
    }
    let path = Path::new(pattern);
    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_PATTERN.to_string());
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    (dir, file)
}

/// Merge warnings folded by code and message, with occurrence counts.
fn fold_warnings(warnings: &[MergeWarning]) -> Vec<Diagnostic> {
    let mut folded: BTreeMap<(String, String), (Diagnostic, u64)> = BTreeMap::new();
    for warning in warnings {
        let diagnostic = warning.to_diagnostic();
        let key = (diagnostic.code.clone(), diagnostic.message.clone());
        folded.entry(key).or_insert((diagnostic, 0)).1 += 1;
    }
    folded
        .into_values()
        .map(|(diagnostic, count)| {
            if count > 1 {
                diagnostic.with_count(count)
            } else {
                diagnostic
            }
        })
        .collect()
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible || len < 2 {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} reports ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

pub fn generate(settings: &GenerateSettings) -> Result<GenerateResult> {
    let span = info_span!("generate", duration_ms = tracing::field::Empty);
    let _guard = span.enter();
    let start = Instant::now();

    let inputs = load_inputs(&settings.template, &settings.bindings)?;
    let subject = settings.template.display().to_string();
    let checked = check(&inputs, &subject);
    let Some(plan) = checked.plan else {
        return Ok(GenerateResult {
            problems: checked.report,
            reports: Vec::new(),
            dry_run: settings.dry_run,
        });
    };

    let registry = build_registry(&settings.bindings, settings.today);
    let pool = HandlePool::new(settings.batch.workers(usize::MAX));
    let executor = SourceExecutor::new(registry, pool).with_timeout(settings.merge.source_timeout());
    let engine = MergeEngine::new(&plan, &executor, settings.merge.clone());

    let jobs = match &settings.per_record {
        Some(source) => {
            let records = engine
                .records(source)
                .with_context(|| format!("read records of source '{source}'"))?;
            if records.is_empty() {
                warn!(source = %source, "per-record source has no rows");
            }
            MergeJob::per_record(records)
        }
        None => vec![MergeJob::single("report")],
    };

    let progress = progress_bar(jobs.len(), settings.show_progress);
    let results = run_batch(&engine, jobs, &settings.batch, &settings.cancel, |_| {
        progress.inc(1);
    });
    progress.finish_and_clear();

    let reports = write_reports(settings, results);
    span.record("duration_ms", start.elapsed().as_millis());
    Ok(GenerateResult {
        problems: checked.report,
        reports,
        dry_run: settings.dry_run,
    })
}

fn write_reports(settings: &GenerateSettings, results: Vec<JobResult>) -> Vec<ReportSummary> {
    let _span = info_span!("write", reports = results.len()).entered();
    let (dir, file_pattern) = split_output_pattern(&settings.output);
    let namer = OutputNamer::new(file_pattern, settings.today);
    let assembler = settings.format.assembler();
    let mut names = UniqueNames::new();

    let mut summaries = Vec::with_capacity(results.len());
    for result in results {
        let mut summary = ReportSummary::new(&result.job.label);
        let outcome = match result.outcome {
            Ok(outcome) => outcome,
            Err(MergeError::Cancelled) => {
                summaries.push(summary);
                continue;
            }
            Err(err) => {
                error!(report = %result.job.label, kind = err.kind(), "{err}");
                summary
                    .diagnostics
                    .push(Diagnostic::error(err.kind(), err.to_string()));
                summary.status = ReportStatus::Failed(err.to_string());
                summaries.push(summary);
                continue;
            }
        };
        summary.diagnostics.extend(fold_warnings(&outcome.warnings));

        let name = match namer.name(result.job.record.as_ref(), result.index) {
            Ok(name) => names.claim(&name),
            Err(err) => {
                summary
                    .diagnostics
                    .push(Diagnostic::error("output-name", err.to_string()));
                summary.status = ReportStatus::Failed(err.to_string());
                summaries.push(summary);
                continue;
            }
        };
        let mut file_name = name;
        if Path::new(&file_name).extension().is_none() {
            file_name.push('.');
            file_name.push_str(assembler.extension());
        }
        let path = dir.join(&file_name);
        debug!(report = %result.job.label, file = %redact_value(&file_name), "report named");

        if settings.dry_run {
            summary.path = Some(path);
            summary.status = ReportStatus::Merged;
        } else {
            match assembler.assemble(&outcome.tree, &path) {
                Ok(written) => {
                    summary.path = Some(written.path);
                    summary.bytes = Some(written.bytes);
                    summary.sha256 = Some(written.sha256);
                    summary.status = ReportStatus::Written;
                }
                Err(err) => {
                    error!(report = %result.job.label, "{err}");
                    summary
                        .diagnostics
                        .push(Diagnostic::error("write-failed", err.to_string()));
                    summary.status = ReportStatus::Failed(err.to_string());
                }
            }
        }
        summaries.push(summary);
    }
    summaries
}

/// One declared source, optionally probed.
#[derive(Debug, Clone)]
pub struct SourceRow {
    pub name: String,
    pub kind: SourceKind,
    pub statement: String,
    pub columns: Option<String>,
    /// Whether an adapter is registered for the kind.
    pub has_driver: bool,
    /// Row count or error, when probed.
    pub probe: Option<Result<usize, String>>,
}

pub fn list_sources(
    bindings: &Path,
    probe: bool,
    timeout: Duration,
    today: NaiveDate,
) -> Result<Vec<SourceRow>> {
    let spec = load_binding_workbook(bindings)
        .with_context(|| format!("load binding workbook {}", bindings.display()))?;
    let registry = build_registry(bindings, today);
    let kinds: Vec<SourceKind> = registry.kinds().collect();
    let executor = SourceExecutor::new(registry, HandlePool::new(1)).with_timeout(timeout);

    let mut rows = Vec::new();
    for source in spec.sources() {
        let probe = probe.then(|| {
            executor
                .fetch(source, &Parameters::new())
                .map(|dataset| dataset.len())
                .map_err(|err| format!("{}: {err}", err.kind()))
        });
        rows.push(SourceRow {
            name: source.name.clone(),
            kind: source.kind,
            statement: source.statement.clone(),
            columns: source
                .schema
                .as_ref()
                .map(|schema| schema.names().collect::<Vec<_>>().join(", ")),
            has_driver: kinds.contains(&source.kind),
            probe,
        });
    }
    Ok(rows)
}
