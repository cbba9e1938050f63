use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// One syntax problem found while parsing a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxProblem {
    #[error("malformed token '{{{{{token}}}}}': {reason}")]
    MalformedToken { token: String, reason: String },

    #[error("unterminated '{{{{' before '{text}'")]
    Unterminated { text: String },

    #[error("'{{{{/{close}}}}}' closes '{open}' which is still open")]
    MismatchedClose { open: String, close: String },

    #[error("region '{marker}' is never closed")]
    Unclosed { marker: String },

    #[error("'{{{{/{marker}}}}}' has no matching open marker")]
    Unopened { marker: String },

    #[error("fallback '{{{{^{marker}}}}}' is not inside an open repeat '{marker}'")]
    FallbackOutsideRepeat { marker: String },

    #[error("repeat '{marker}' has more than one fallback")]
    DuplicateFallback { marker: String },
}

/// A located syntax problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub location: String,
    pub problem: SyntaxProblem,
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.problem)
    }
}

/// Every syntax problem of one template. Parsing is all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct TemplateSyntaxError {
    pub issues: Vec<SyntaxIssue>,
}

impl fmt::Display for TemplateSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template has {} syntax problem(s)", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n  {issue}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid XML in template {path}: {message}")]
    Xml { path: PathBuf, message: String },

    #[error("unexpected element <{element}> in {path}: {reason}")]
    Structure {
        path: PathBuf,
        element: String,
        reason: String,
    },
}
