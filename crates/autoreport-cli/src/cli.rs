//! CLI argument definitions for the report generator.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

use autoreport_report::OutputFormat;

#[derive(Parser)]
#[command(
    name = "autoreport",
    version,
    about = "Merge tabular data into document templates",
    long_about = "Merge tabular data into document templates.\n\n\
                  A binding workbook (Sources.csv + Bindings.csv) declares the data sources\n\
                  and maps every template placeholder and region marker to them."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow data values (record fields, report names) in log output.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Merge the data into the template and write the reports.
    Generate(GenerateArgs),

    /// Parse the template and resolve the bindings without touching data.
    Check(CheckArgs),

    /// List the data sources declared by a binding workbook.
    Sources(SourcesArgs),
}

#[derive(Parser)]
pub struct GenerateArgs {
    /// Template document (.xml, or plain text with one paragraph per line).
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    /// Binding workbook directory holding Sources.csv and Bindings.csv.
    #[arg(value_name = "BINDINGS")]
    pub bindings: PathBuf,

    /// Output path pattern, e.g. `out/invoice_{CustomerId}_{year}{month}{day}`.
    ///
    /// The file name may use `{index}`, date fill-ins and, with
    /// `--per-record`, the record's columns. The format's extension is added
    /// when the name has none.
    #[arg(value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Produce one report per row of this source.
    #[arg(long = "per-record", value_name = "SOURCE")]
    pub per_record: Option<String>,

    /// Number of reports merged in parallel (0 = one per core).
    #[arg(long = "jobs", short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Output format.
    #[arg(long = "format", value_enum)]
    pub format: Option<FormatArg>,

    /// Timeout for each data source call, in milliseconds.
    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Text written in place of placeholders whose field is missing.
    #[arg(long = "missing-marker", value_name = "TEXT")]
    pub missing_marker: Option<String>,

    /// Merge and report without writing output files.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Configuration file (default: $AUTOREPORT_CONFIG, then
    /// autoreport.toml in the binding workbook).
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Parser)]
pub struct CheckArgs {
    /// Template document.
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    /// Binding workbook directory.
    #[arg(value_name = "BINDINGS")]
    pub bindings: PathBuf,
}

#[derive(Parser)]
pub struct SourcesArgs {
    /// Binding workbook directory.
    #[arg(value_name = "BINDINGS")]
    pub bindings: PathBuf,

    /// Execute each source and report its row count.
    #[arg(long = "probe")]
    pub probe: bool,

    /// Timeout for each probe, in milliseconds.
    #[arg(long = "timeout-ms", value_name = "MS")]
    pub timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Text,
    Xml,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Text => Self::Text,
            FormatArg::Xml => Self::Xml,
            FormatArg::Json => Self::Json,
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
