//! Typed cell values carried by datasets and substituted into templates.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Default rendering pattern for [`Value::Date`].
pub const DEFAULT_DATE_PATTERN: &str = "%Y-%m-%d";
/// Default rendering pattern for [`Value::DateTime`].
pub const DEFAULT_DATETIME_PATTERN: &str = "%Y-%m-%d %H:%M:%S";

/// A single typed value from a data source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Boolean(bool),
    Null,
}

/// The type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Text,
    Number,
    Date,
    DateTime,
    Boolean,
    Null,
}

impl ValueType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Text(_) => ValueType::Text,
            Self::Number(_) => ValueType::Number,
            Self::Date(_) => ValueType::Date,
            Self::DateTime(_) => ValueType::DateTime,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Null => ValueType::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => {
                let parsed = text.trim().parse::<f64>().ok()?;
                parsed.is_finite().then_some(parsed)
            }
            _ => None,
        }
    }

    /// Truthiness used by bare predicate operands.
    ///
    /// Null, `false`, zero and blank text are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Boolean(value) => *value,
            Self::Number(value) => *value != 0.0,
            Self::Text(text) => !text.trim().is_empty(),
            Self::Date(_) | Self::DateTime(_) => true,
        }
    }

    /// Compares two values for predicate evaluation.
    ///
    /// Numbers compare numerically (text that parses as a number is promoted),
    /// dates compare chronologically (a date equals midnight of that day, and
    /// text in the default date or datetime pattern is promoted), text compares lexically and booleans compare `false < true`. Null only
    /// equals null and is unordered against everything else. Returns `None`
    /// when the pair has no meaningful order.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Text(left), Self::Text(right)) => Some(left.cmp(right)),
            (Self::Boolean(left), Self::Boolean(right)) => Some(left.cmp(right)),
            (Self::Date(left), Self::Date(right)) => Some(left.cmp(right)),
            (Self::DateTime(left), Self::DateTime(right)) => Some(left.cmp(right)),
            (Self::Date(left), Self::DateTime(right)) => {
                left.and_hms_opt(0, 0, 0).map(|left| left.cmp(right))
            }
            (Self::DateTime(left), Self::Date(right)) => {
                right.and_hms_opt(0, 0, 0).map(|right| left.cmp(&right))
            }
            (Self::Date(_) | Self::DateTime(_), Self::Text(text)) => {
                self.compare(&parse_temporal(text)?)
            }
            (Self::Text(text), Self::Date(_) | Self::DateTime(_)) => {
                parse_temporal(text)?.compare(other)
            }
            _ => {
                let left = self.as_f64()?;
                let right = other.as_f64()?;
                left.partial_cmp(&right)
            }
        }
    }

    /// Equality as used by `=` in predicates; unordered pairs are unequal.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

/// Reads text written in the default date or datetime pattern.
fn parse_temporal(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, DEFAULT_DATE_PATTERN) {
        return Some(Value::Date(date));
    }
    NaiveDateTime::parse_from_str(text, DEFAULT_DATETIME_PATTERN)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(Value::DateTime)
}

/// Renders a number without a trailing `.0` and without negative zero.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{value}")
}

impl fmt::Display for Value {
    /// The default string form used when no format specifier applies.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(value) => f.write_str(&format_number(*value)),
            Self::Date(date) => write!(f, "{}", date.format(DEFAULT_DATE_PATTERN)),
            Self::DateTime(value) => write!(f, "{}", value.format(DEFAULT_DATETIME_PATTERN)),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Null => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
