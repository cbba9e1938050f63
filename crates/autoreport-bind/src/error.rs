use std::fmt;

use thiserror::Error;

use autoreport_model::Diagnostic;

/// One problem found while resolving a template against its bindings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindingError {
    #[error("{kind} '{name}' at {location} has no binding{}", suggestion_suffix(.suggestion))]
    UnresolvedReference {
        kind: &'static str,
        name: String,
        location: String,
        suggestion: Option<String>,
    },

    #[error("binding '{name}' ({location}) is not used by the template")]
    UnusedBinding { name: String, location: String },

    #[error("binding '{name}' is declared more than once")]
    DuplicateBinding { name: String },

    #[error("marker '{name}' appears more than once in the same scope (at {location})")]
    DuplicateMarker { name: String, location: String },

    #[error("'{name}' at {location} refers to undefined source '{source_name}'")]
    UndefinedSource {
        name: String,
        source_name: String,
        location: String,
    },

    #[error("'{name}' at {location} refers to unknown scope '{scope}'")]
    UnknownScope {
        name: String,
        scope: String,
        location: String,
    },

    #[error("'{name}' at {location}: source '{source_name}' has no column '{column}'{}", suggestion_suffix(.suggestion))]
    FieldNotInScope {
        name: String,
        column: String,
        source_name: String,
        location: String,
        suggestion: Option<String>,
    },

    #[error("placeholder '{name}' at {location} has no data source in scope")]
    NoSourceInScope { name: String, location: String },

    #[error("conditional '{marker}' at {location} has no predicate")]
    MissingPredicate { marker: String, location: String },

    #[error("invalid predicate for '{marker}': {message}")]
    InvalidPredicate { marker: String, message: String },

    #[error("invalid format for '{name}': {message}")]
    InvalidFormat { name: String, message: String },

    #[error("invalid correlation for '{marker}': {reason}")]
    InvalidCorrelation { marker: String, reason: String },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|candidate| format!(" (did you mean '{candidate}'?)"))
        .unwrap_or_default()
}

impl BindingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnresolvedReference { .. } => "unresolved-reference",
            Self::UnusedBinding { .. } => "unused-binding",
            Self::DuplicateBinding { .. } => "duplicate-binding",
            Self::DuplicateMarker { .. } => "duplicate-marker",
            Self::UndefinedSource { .. } => "undefined-source",
            Self::UnknownScope { .. } => "unknown-scope",
            Self::FieldNotInScope { .. } => "scope-error",
            Self::NoSourceInScope { .. } => "no-source",
            Self::MissingPredicate { .. } => "missing-predicate",
            Self::InvalidPredicate { .. } => "invalid-predicate",
            Self::InvalidFormat { .. } => "invalid-format",
            Self::InvalidCorrelation { .. } => "invalid-correlation",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.code(), self.to_string());
        match self {
            Self::UnresolvedReference { location, .. }
            | Self::UnusedBinding { location, .. }
            | Self::DuplicateMarker { location, .. }
            | Self::UndefinedSource { location, .. }
            | Self::UnknownScope { location, .. }
            | Self::FieldNotInScope { location, .. }
            | Self::NoSourceInScope { location, .. }
            | Self::MissingPredicate { location, .. } => diagnostic.with_location(location.clone()),
            _ => diagnostic,
        }
    }
}

/// Every binding problem of one resolution pass, in template order.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct BindingErrors {
    pub errors: Vec<BindingError>,
}

impl BindingErrors {
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindingError> {
        self.errors.iter()
    }

    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        self.errors.iter().map(BindingError::to_diagnostic).collect()
    }
}

impl fmt::Display for BindingErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} binding error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}
