//! Data source definitions as declared in the binding workbook.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::schema::Schema;
use crate::value::Value;

/// Named parameters passed to a correlated data source execution.
pub type Parameters = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A statement executed by a query driver.
    Query,
    /// A reference to a block of cells in a spreadsheet or CSV file.
    Range,
}

impl SourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Range => "range",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "query" | "sql" => Ok(Self::Query),
            "range" | "file" | "sheet" => Ok(Self::Range),
            other => Err(ModelError::UnknownSourceKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceDef {
    pub name: String,
    pub kind: SourceKind,
    /// Query text or range reference, interpreted by the adapter for `kind`.
    pub statement: String,
    /// Expected columns; `None` when the workbook does not declare them.
    #[serde(default)]
    pub schema: Option<Schema>,
}

impl DataSourceDef {
    pub fn new(name: impl Into<String>, kind: SourceKind, statement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            statement: statement.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Whether the declared schema has the column. Undeclared schemas answer
    /// `None` because nothing can be known before execution.
    pub fn declares_column(&self, column: &str) -> Option<bool> {
        self.schema.as_ref().map(|schema| schema.contains(column))
    }
}
