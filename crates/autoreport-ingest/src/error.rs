//! Error types for data source execution and workbook loading.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single data source execution.
///
/// Fatal to the report being generated, never to the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataSourceError {
    /// The source could not be reached (missing file, no driver, no handle).
    #[error("cannot connect to data source '{source_name}': {message}")]
    ConnectionFailed {
        source_name: String,
        message: String,
    },

    /// The source was reached but the statement failed.
    #[error("data source '{source_name}' failed: {message}")]
    QueryFailed {
        source_name: String,
        message: String,
    },

    /// The call did not finish within the allowed time.
    #[error("data source '{source_name}' timed out after {timeout_ms} ms")]
    Timeout {
        source_name: String,
        timeout_ms: u64,
    },

    /// The result does not match the declared schema.
    #[error("data source '{source_name}' does not match its declared schema: {message}")]
    SchemaMismatch {
        source_name: String,
        message: String,
    },
}

impl DataSourceError {
    pub fn source_name(&self) -> &str {
        match self {
            Self::ConnectionFailed { source_name, .. }
            | Self::QueryFailed { source_name, .. }
            | Self::Timeout { source_name, .. }
            | Self::SchemaMismatch { source_name, .. } => source_name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "connection-failed",
            Self::QueryFailed { .. } => "query-failed",
            Self::Timeout { .. } => "timeout",
            Self::SchemaMismatch { .. } => "schema-mismatch",
        }
    }
}

/// Errors raised while loading the binding workbook.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("binding workbook directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("workbook file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse CSV {path}: {message}")]
    CsvParse { path: PathBuf, message: String },

    #[error("required column '{column}' not found in {path}")]
    MissingColumn { column: String, path: PathBuf },

    #[error("invalid {field} value '{value}' in {path} line {line}: {message}")]
    InvalidValue {
        field: String,
        value: String,
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("data source '{name}' is declared more than once in {path} (line {line})")]
    DuplicateSource {
        name: String,
        path: PathBuf,
        line: usize,
    },
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Problems expanding a `{fill-in}` pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unknown fill-in '{{{0}}}'")]
    UnknownFillIn(String),

    #[error("unterminated '{{' in pattern '{0}'")]
    Unterminated(String),
}
