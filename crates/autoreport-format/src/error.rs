use thiserror::Error;

use autoreport_model::ValueType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("invalid format specifier '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("format specifier '{spec}' does not apply to {value_type} values")]
    Incompatible { spec: String, value_type: ValueType },

    #[error("date pattern '{pattern}' cannot render this value")]
    Render { pattern: String },
}

pub type Result<T> = std::result::Result<T, FormatError>;
