//! Format specifier grammar.
//!
//! A specifier is a `;`-separated list of clauses:
//!
//! - numeric modifiers, which may be written together: `$`, `€`, `£`, `%`,
//!   `MK`, `,` (thousands separators), `+-` (explicit plus) and `.N`
//!   (precision), e.g. `$,.2`
//! - `date=PATTERN` with a strftime pattern
//! - `upper` / `lower`
//! - `bool=YES/NO`
//! - `default=TEXT` for null values

use std::fmt;
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Case {
    Upper,
    Lower,
}

/// Numeric rendering options built from modifier characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericFormat {
    pub currency: Option<char>,
    pub percent: bool,
    /// Scale by thousands or millions and append `K`/`M`.
    pub thousands_millions: bool,
    pub grouping: bool,
    pub explicit_sign: bool,
    pub precision: Option<usize>,
}

impl NumericFormat {
    fn parse(clause: &str, spec: &str) -> Result<Self> {
        let invalid = |reason: String| FormatError::InvalidSpec {
            spec: spec.to_string(),
            reason,
        };
        let mut numeric = Self::default();
        let mut chars = clause.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '$' | '€' | '£' => {
                    if numeric.currency.replace(ch).is_some() {
                        return Err(invalid("more than one currency symbol".to_string()));
                    }
                }
                '%' => numeric.percent = true,
                ',' => numeric.grouping = true,
                'M' if chars.peek() == Some(&'K') => {
                    chars.next();
                    numeric.thousands_millions = true;
                }
                '+' if chars.peek() == Some(&'-') => {
                    chars.next();
                    numeric.explicit_sign = true;
                }
                '.' => {
                    let mut digits = String::new();
                    while let Some(digit) = chars.next_if(char::is_ascii_digit) {
                        digits.push(digit);
                    }
                    let precision = digits
                        .parse::<usize>()
                        .map_err(|_| invalid("'.' must be followed by a precision".to_string()))?;
                    if precision > 12 {
                        return Err(invalid(format!("precision {precision} is too large")));
                    }
                    numeric.precision = Some(precision);
                }
                ' ' => {}
                other => return Err(invalid(format!("unknown modifier '{other}'"))),
            }
        }
        if numeric.percent && numeric.thousands_millions {
            return Err(invalid("'%' and 'MK' cannot be combined".to_string()));
        }
        Ok(numeric)
    }
}

/// A compiled format specifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSpec {
    source: String,
    pub numeric: Option<NumericFormat>,
    pub date_pattern: Option<String>,
    pub case: Option<Case>,
    pub bool_labels: Option<(String, String)>,
    pub default: Option<String>,
}

impl FormatSpec {
    /// The empty specifier: default string forms for every value.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = |reason: &str| FormatError::InvalidSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };
        let mut parsed = Self {
            source: spec.trim().to_string(),
            ..Self::default()
        };
        for clause in spec.split(';') {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            let lowered = clause.to_ascii_lowercase();
            if let Some(pattern) = strip_key(clause, "date=") {
                if pattern.is_empty() {
                    return Err(invalid("empty date pattern"));
                }
                if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                    return Err(invalid("invalid date pattern"));
                }
                parsed.date_pattern = Some(pattern.to_string());
            } else if let Some(labels) = strip_key(clause, "bool=") {
                let (yes, no) = labels
                    .split_once('/')
                    .ok_or_else(|| invalid("bool= expects TRUE/FALSE labels"))?;
                parsed.bool_labels = Some((yes.trim().to_string(), no.trim().to_string()));
            } else if let Some(text) = strip_key(clause, "default=") {
                parsed.default = Some(text.to_string());
            } else if lowered == "upper" {
                parsed.case = Some(Case::Upper);
            } else if lowered == "lower" {
                parsed.case = Some(Case::Lower);
            } else {
                if parsed.numeric.is_some() {
                    return Err(invalid("numeric modifiers must be written in one clause"));
                }
                parsed.numeric = Some(NumericFormat::parse(clause, spec)?);
            }
        }
        Ok(parsed)
    }

    pub fn is_empty(&self) -> bool {
        self.numeric.is_none()
            && self.date_pattern.is_none()
            && self.case.is_none()
            && self.bool_labels.is_none()
            && self.default.is_none()
    }

    /// The specifier text as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Strips a case-insensitive `key=` prefix, keeping the value's case.
fn strip_key<'a>(clause: &'a str, key: &str) -> Option<&'a str> {
    let head = clause.get(..key.len())?;
    head.eq_ignore_ascii_case(key)
        .then(|| clause[key.len()..].trim())
}

impl FromStr for FormatSpec {
    type Err = FormatError;

    fn from_str(spec: &str) -> Result<Self> {
        Self::parse(spec)
    }
}

impl fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
