use thiserror::Error;

use crate::schema::ColumnType;
use crate::value::ValueType;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("row has {actual} values but the schema has {expected} columns")]
    RowLength { expected: usize, actual: usize },

    #[error("column '{column}' expects {expected} values, got {actual}")]
    TypeMismatch {
        column: String,
        expected: ColumnType,
        actual: ValueType,
    },

    #[error("cannot read '{raw}' as {data_type}")]
    Coercion { raw: String, data_type: ColumnType },

    #[error("duplicate column '{column}' in schema")]
    DuplicateColumn { column: String },

    #[error("invalid column declaration '{declaration}': {reason}")]
    InvalidColumn {
        declaration: String,
        reason: String,
    },

    #[error("unknown column type '{0}'")]
    UnknownColumnType(String),

    #[error("unknown data source kind '{0}' (expected query or range)")]
    UnknownSourceKind(String),

    #[error("data source '{0}' is declared more than once")]
    DuplicateSource(String),

    #[error("invalid parameter binding '{text}': expected Name=Field")]
    InvalidParameter { text: String },

    #[error("invalid field path '{0}'")]
    InvalidFieldPath(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
