//! The binding specification: what each template token is bound to.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::source::DataSourceDef;

/// Pseudo-column that yields the generation timestamp of the current run.
pub const GENERATED_AT_FIELD: &str = "@now";

/// Whether `name` can be used as a marker, scope or field name.
///
/// Names start with a letter or `_` and continue with letters, digits, `_`
/// or `-`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '-')
}

/// A reference to a column, optionally qualified by the scope that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldPath {
    pub scope: Option<String>,
    pub column: String,
}

impl FieldPath {
    pub fn column(column: impl Into<String>) -> Self {
        Self {
            scope: None,
            column: column.into(),
        }
    }

    pub fn scoped(scope: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            column: column.into(),
        }
    }

    pub fn is_generated_at(&self) -> bool {
        self.column.eq_ignore_ascii_case(GENERATED_AT_FIELD)
    }
}

impl FromStr for FieldPath {
    type Err = ModelError;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        let invalid = || ModelError::InvalidFieldPath(text.to_string());
        if text.eq_ignore_ascii_case(GENERATED_AT_FIELD) {
            return Ok(Self::column(GENERATED_AT_FIELD));
        }
        match text.split_once('.') {
            Some((scope, column)) => {
                let scope = scope.trim();
                let column = column.trim();
                let column_ok =
                    is_valid_name(column) || column.eq_ignore_ascii_case(GENERATED_AT_FIELD);
                if !is_valid_name(scope) || !column_ok {
                    return Err(invalid());
                }
                Ok(Self::scoped(scope, column))
            }
            None if is_valid_name(text) => Ok(Self::column(text)),
            None => Err(invalid()),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{scope}.{}", self.column),
            None => f.write_str(&self.column),
        }
    }
}

/// One `Param=FieldPath` pair of a correlated repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterBinding {
    pub name: String,
    pub field: FieldPath,
}

/// Parses `OrderId=Orders.Id; Region=Region`.
pub fn parse_parameters(text: &str) -> Result<Vec<ParameterBinding>> {
    let mut parameters = Vec::new();
    for part in text.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((name, field)) = part.split_once('=') else {
            return Err(ModelError::InvalidParameter {
                text: part.to_string(),
            });
        };
        let name = name.trim();
        if !is_valid_name(name) {
            return Err(ModelError::InvalidParameter {
                text: part.to_string(),
            });
        }
        parameters.push(ParameterBinding {
            name: name.to_string(),
            field: field.parse()?,
        });
    }
    Ok(parameters)
}

/// One row of the binding specification.
///
/// Rows with a `field` bind placeholders; rows without one describe markers
/// (repeat or conditional regions).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BindingEntry {
    pub name: String,
    pub source: Option<String>,
    pub field: Option<FieldPath>,
    pub format: Option<String>,
    pub predicate: Option<String>,
    pub correlate: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterBinding>,
    pub default: Option<String>,
    /// 1-based line in the workbook, when loaded from one.
    pub line: Option<usize>,
}

impl BindingEntry {
    pub fn placeholder(name: impl Into<String>, field: FieldPath) -> Self {
        Self {
            name: name.into(),
            field: Some(field),
            ..Self::default()
        }
    }

    pub fn marker(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    #[must_use]
    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    #[must_use]
    pub fn with_correlation(
        mut self,
        ancestor: impl Into<String>,
        parameters: Vec<ParameterBinding>,
    ) -> Self {
        self.correlate = Some(ancestor.into());
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    #[must_use]
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn is_marker(&self) -> bool {
        self.field.is_none()
    }

    /// Workbook location for messages, e.g. `Bindings.csv line 4`.
    pub fn location(&self) -> String {
        match self.line {
            Some(line) => format!("line {line}"),
            None => "-".to_string(),
        }
    }
}

/// Binding entries plus the data sources they refer to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingSpec {
    entries: Vec<BindingEntry>,
    sources: BTreeMap<String, DataSourceDef>,
}

impl BindingSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a data source. Names are unique ignoring ASCII case.
    pub fn add_source(&mut self, source: DataSourceDef) -> Result<()> {
        if self.source(&source.name).is_some() {
            return Err(ModelError::DuplicateSource(source.name));
        }
        self.sources.insert(source.name.clone(), source);
        Ok(())
    }

    pub fn add_entry(&mut self, entry: BindingEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn with_entry(mut self, entry: BindingEntry) -> Self {
        self.add_entry(entry);
        self
    }

    pub fn with_source(mut self, source: DataSourceDef) -> Result<Self> {
        self.add_source(source)?;
        Ok(self)
    }

    pub fn entries(&self) -> &[BindingEntry] {
        &self.entries
    }

    /// Entries whose name matches exactly, else ignoring ASCII case.
    pub fn entries_named<'a>(&'a self, name: &str) -> Vec<&'a BindingEntry> {
        let exact: Vec<_> = self.entries.iter().filter(|e| e.name == name).collect();
        if !exact.is_empty() {
            return exact;
        }
        self.entries
            .iter()
            .filter(|e| e.name.eq_ignore_ascii_case(name))
            .collect()
    }

    pub fn sources(&self) -> impl Iterator<Item = &DataSourceDef> {
        self.sources.values()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn source(&self, name: &str) -> Option<&DataSourceDef> {
        self.sources.get(name).or_else(|| {
            self.sources
                .values()
                .find(|source| source.name.eq_ignore_ascii_case(name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;

    #[test]
    fn parses_field_paths() {
        assert_eq!("Qty".parse::<FieldPath>().unwrap(), FieldPath::column("Qty"));
        assert_eq!(
            "Items.Qty".parse::<FieldPath>().unwrap(),
            FieldPath::scoped("Items", "Qty")
        );
        assert!("@now".parse::<FieldPath>().unwrap().is_generated_at());
        assert!("".parse::<FieldPath>().is_err());
        assert!("Items.".parse::<FieldPath>().is_err());
        assert!("9lives".parse::<FieldPath>().is_err());
    }

    #[test]
    fn parses_parameter_lists() {
        let params = parse_parameters("OrderId=Orders.Id; Region = Region ;").unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "OrderId");
        assert_eq!(params[0].field, FieldPath::scoped("Orders", "Id"));
        assert_eq!(params[1].field, FieldPath::column("Region"));
        assert!(parse_parameters("OrderId").is_err());
    }

    #[test]
    fn duplicate_sources_are_rejected() {
        let mut spec = BindingSpec::new();
        spec.add_source(DataSourceDef::new("Items", SourceKind::Range, "items.csv"))
            .unwrap();
        let err = spec
            .add_source(DataSourceDef::new("items", SourceKind::Range, "other.csv"))
            .unwrap_err();
        assert_eq!(err, ModelError::DuplicateSource("items".to_string()));
        assert!(spec.source("ITEMS").is_some());
    }
}
