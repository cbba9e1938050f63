use std::io::{self, IsTerminal};
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use tracing::info_span;

use autoreport_cli::config::resolve_config;
use autoreport_cli::pipeline::{
    GenerateResult, GenerateSettings, SourceRow, check, generate, list_sources, load_inputs,
};
use autoreport_merge::{BatchOptions, CancelToken, DEFAULT_SOURCE_TIMEOUT_MS};
use autoreport_model::DiagnosticReport;
use autoreport_report::DEFAULT_PATTERN;

use crate::cli::{CheckArgs, GenerateArgs, SourcesArgs};

pub fn run_generate(args: &GenerateArgs) -> Result<GenerateResult> {
    let file = resolve_config(args.config.as_deref(), &args.bindings)?;

    let mut merge = file.merge.options;
    if let Some(marker) = &args.missing_marker {
        merge.missing_marker.clone_from(marker);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        merge.source_timeout_ms = timeout_ms;
    }
    let jobs = args.jobs.or(file.merge.jobs).unwrap_or(0);
    let settings = GenerateSettings {
        template: args.template.clone(),
        bindings: args.bindings.clone(),
        output: args
            .output
            .clone()
            .or(file.output.pattern)
            .unwrap_or_else(|| DEFAULT_PATTERN.to_string()),
        format: args
            .format
            .map(Into::into)
            .or(file.output.format)
            .unwrap_or_default(),
        per_record: args.per_record.clone(),
        merge,
        batch: BatchOptions::default().with_jobs(jobs),
        dry_run: args.dry_run,
        today: Local::now().date_naive(),
        show_progress: io::stderr().is_terminal(),
        cancel: CancelToken::new(),
    };
    generate(&settings)
}

pub fn run_check(args: &CheckArgs) -> Result<DiagnosticReport> {
    let inputs = load_inputs(&args.template, &args.bindings)?;
    let subject = args.template.display().to_string();
    Ok(check(&inputs, &subject).report)
}

pub fn run_sources(args: &SourcesArgs) -> Result<Vec<SourceRow>> {
    let _span = info_span!("sources", probe = args.probe).entered();
    let timeout = Duration::from_millis(args.timeout_ms.unwrap_or(DEFAULT_SOURCE_TIMEOUT_MS));
    list_sources(
        &args.bindings,
        args.probe,
        timeout,
        Local::now().date_naive(),
    )
}
