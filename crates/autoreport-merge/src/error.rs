use thiserror::Error;

use autoreport_ingest::DataSourceError;
use autoreport_model::Diagnostic;

/// A failure that stops one merge.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error("merge cancelled")]
    Cancelled,

    #[error("source '{0}' is not part of the plan")]
    UnknownSource(String),
}

impl MergeError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataSource(err) => err.kind(),
            Self::Cancelled => "cancelled",
            Self::UnknownSource(_) => "unknown-source",
        }
    }
}

/// A recoverable problem met while merging; the report is still produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeWarning {
    #[error("placeholder '{placeholder}' at {location}: field '{column}' not found")]
    MissingField {
        placeholder: String,
        column: String,
        location: String,
    },

    #[error("placeholder '{placeholder}' at {location}: {message}")]
    Format {
        placeholder: String,
        message: String,
        location: String,
    },
}

impl MergeWarning {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing-field",
            Self::Format { .. } => "format",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let location = match self {
            Self::MissingField { location, .. } | Self::Format { location, .. } => location,
        };
        Diagnostic::warning(self.code(), self.to_string()).with_location(location.clone())
    }
}
