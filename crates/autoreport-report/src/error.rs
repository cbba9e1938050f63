use std::path::PathBuf;

use thiserror::Error;

use autoreport_ingest::PatternError;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output: {0}")]
    Write(#[from] std::io::Error),

    #[error("failed to encode XML: {message}")]
    Xml { message: String },

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid output pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: PatternError,
    },

    #[error("output pattern '{pattern}' produced an empty file name")]
    EmptyName { pattern: String },

    #[error("unknown output format '{0}' (expected text, xml or json)")]
    UnknownFormat(String),
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
