//! Column schemas and raw-text coercion.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::value::{Value, ValueType};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Declared type of a dataset column.
///
/// `Auto` only appears in declared schemas; data sources resolve it by
/// inference when they load rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Auto,
    Text,
    Number,
    Date,
    DateTime,
    Boolean,
}

impl ColumnType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Boolean => "boolean",
        }
    }

    /// Whether a value of `value_type` may be stored in a column of this type.
    pub fn accepts(self, value_type: ValueType) -> bool {
        match (self, value_type) {
            (_, ValueType::Null) | (Self::Auto, _) => true,
            (Self::Text, ValueType::Text)
            | (Self::Number, ValueType::Number)
            | (Self::Date, ValueType::Date)
            | (Self::DateTime, ValueType::DateTime)
            | (Self::Boolean, ValueType::Boolean) => true,
            _ => false,
        }
    }

    /// Converts raw source text into a typed value. Blank text is null.
    pub fn coerce(self, raw: &str) -> Result<Value> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        let failed = || ModelError::Coercion {
            raw: raw.to_string(),
            data_type: self,
        };
        match self {
            Self::Text => Ok(Value::Text(raw.to_string())),
            Self::Number => parse_number(trimmed).map(Value::Number).ok_or_else(failed),
            Self::Date => parse_date(trimmed).map(Value::Date).ok_or_else(failed),
            Self::DateTime => parse_datetime(trimmed)
                .map(Value::DateTime)
                .ok_or_else(failed),
            Self::Boolean => parse_boolean(trimmed).map(Value::Boolean).ok_or_else(failed),
            Self::Auto => Ok(Self::infer([raw]).coerce(raw).unwrap_or(Value::Text(raw.to_string()))),
        }
    }

    /// Infers the narrowest column type that reads every non-blank value.
    ///
    /// Order of preference: number, boolean, date, date-time, text. A column
    /// with no non-blank values is text.
    pub fn infer<'a, I>(values: I) -> ColumnType
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut number = true;
        let mut boolean = true;
        let mut date = true;
        let mut datetime = true;
        let mut seen = false;
        for raw in values {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            seen = true;
            number &= trimmed.parse::<f64>().is_ok_and(f64::is_finite);
            boolean &= matches!(trimmed.to_ascii_lowercase().as_str(), "true" | "false");
            date &= parse_date(trimmed).is_some();
            datetime &= parse_datetime(trimmed).is_some();
            if !(number || boolean || date || datetime) {
                return ColumnType::Text;
            }
        }
        if !seen {
            ColumnType::Text
        } else if number {
            ColumnType::Number
        } else if boolean {
            ColumnType::Boolean
        } else if date {
            ColumnType::Date
        } else if datetime {
            ColumnType::DateTime
        } else {
            ColumnType::Text
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "text" | "string" | "char" => Ok(Self::Text),
            "number" | "num" | "numeric" => Ok(Self::Number),
            "date" => Ok(Self::Date),
            "datetime" | "timestamp" => Ok(Self::DateTime),
            "boolean" | "bool" => Ok(Self::Boolean),
            other => Err(ModelError::UnknownColumnType(other.to_string())),
        }
    }
}

fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value.chars().filter(|ch| *ch != ',').collect();
    cleaned.parse::<f64>().ok().filter(|parsed| parsed.is_finite())
}

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

pub(crate) fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

fn parse_boolean(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered column list shared by every row of a dataset.
///
/// Column lookup is exact first, then ASCII case-insensitive, matching how
/// spreadsheet authors tend to type field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        for (idx, column) in columns.iter().enumerate() {
            if columns[..idx]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(ModelError::DuplicateColumn {
                    column: column.name.clone(),
                });
            }
        }
        Ok(Self { columns })
    }

    /// Parses a declaration such as `Product:text; Qty:number; Note`.
    ///
    /// Columns without a type are `auto`.
    pub fn parse_declaration(declaration: &str) -> Result<Self> {
        let mut columns = Vec::new();
        for part in declaration.split([';', ',']) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, data_type) = match part.split_once(':') {
                Some((name, data_type)) => (name.trim(), data_type.parse::<ColumnType>()?),
                None => (part, ColumnType::Auto),
            };
            if name.is_empty() {
                return Err(ModelError::InvalidColumn {
                    declaration: part.to_string(),
                    reason: "missing column name".to_string(),
                });
            }
            columns.push(Column::new(name, data_type));
        }
        Self::new(columns)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|column| column.name.eq_ignore_ascii_case(name))
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index_of(name).map(|idx| &self.columns[idx])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_numbers_before_text() {
        assert_eq!(ColumnType::infer(["1", "2.5", ""]), ColumnType::Number);
        assert_eq!(ColumnType::infer(["1", "two"]), ColumnType::Text);
        assert_eq!(ColumnType::infer(["TRUE", "false"]), ColumnType::Boolean);
        assert_eq!(ColumnType::infer(["2024-01-15"]), ColumnType::Date);
        assert_eq!(
            ColumnType::infer(["2024-01-15T08:30:00"]),
            ColumnType::DateTime
        );
        assert_eq!(ColumnType::infer(["", " "]), ColumnType::Text);
    }

    #[test]
    fn coerces_grouped_numbers() {
        assert_eq!(
            ColumnType::Number.coerce("1,234.5").unwrap(),
            Value::Number(1234.5)
        );
        assert_eq!(ColumnType::Number.coerce("  ").unwrap(), Value::Null);
        assert!(ColumnType::Number.coerce("abc").is_err());
    }

    #[test]
    fn parses_schema_declaration() {
        let schema = Schema::parse_declaration("Product:text; Qty:number; Note").unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.column("qty").unwrap().data_type, ColumnType::Number);
        assert_eq!(schema.column("Note").unwrap().data_type, ColumnType::Auto);
    }

    #[test]
    fn rejects_duplicate_columns() {
        let err = Schema::parse_declaration("A;a").unwrap_err();
        assert!(matches!(err, ModelError::DuplicateColumn { .. }));
    }
}
