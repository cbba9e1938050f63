pub mod binding;
pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod schema;
pub mod source;
pub mod value;

pub use binding::{
    BindingEntry, BindingSpec, FieldPath, GENERATED_AT_FIELD, ParameterBinding, is_valid_name,
    parse_parameters,
};
pub use dataset::{Dataset, Row};
pub use diagnostics::{Diagnostic, DiagnosticReport, Severity};
pub use error::{ModelError, Result};
pub use schema::{Column, ColumnType, Schema};
pub use source::{DataSourceDef, Parameters, SourceKind};
pub use value::{
    DEFAULT_DATE_PATTERN, DEFAULT_DATETIME_PATTERN, Value, ValueType, format_number,
};
