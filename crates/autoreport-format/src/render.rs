//! Rendering values with a compiled specifier.

use std::fmt::Write as _;

use autoreport_model::{Value, ValueType, format_number};

use crate::error::{FormatError, Result};
use crate::spec::{Case, FormatSpec, NumericFormat};

/// Renders `value` with `spec`.
///
/// Null renders as the `default=` text, else the empty string. A clause that
/// does not apply to the value's type is an error; callers fall back to the
/// value's default string form.
pub fn format_value(value: &Value, spec: &FormatSpec) -> Result<String> {
    let incompatible = |value_type: ValueType| FormatError::Incompatible {
        spec: spec.as_str().to_string(),
        value_type,
    };
    let rendered = match value {
        Value::Null => spec.default.clone().unwrap_or_default(),
        Value::Number(number) => {
            if spec.date_pattern.is_some() || spec.bool_labels.is_some() {
                return Err(incompatible(ValueType::Number));
            }
            match &spec.numeric {
                Some(numeric) => format_numeric(*number, numeric),
                None => format_number(*number),
            }
        }
        Value::Date(date) => {
            if spec.numeric.is_some() || spec.bool_labels.is_some() {
                return Err(incompatible(ValueType::Date));
            }
            match &spec.date_pattern {
                Some(pattern) => render_pattern(pattern, date.format(pattern))?,
                None => value.to_string(),
            }
        }
        Value::DateTime(datetime) => {
            if spec.numeric.is_some() || spec.bool_labels.is_some() {
                return Err(incompatible(ValueType::DateTime));
            }
            match &spec.date_pattern {
                Some(pattern) => render_pattern(pattern, datetime.format(pattern))?,
                None => value.to_string(),
            }
        }
        Value::Boolean(flag) => {
            if spec.numeric.is_some() || spec.date_pattern.is_some() {
                return Err(incompatible(ValueType::Boolean));
            }
            match &spec.bool_labels {
                Some((yes, no)) => if *flag { yes.clone() } else { no.clone() },
                None => value.to_string(),
            }
        }
        Value::Text(text) => {
            if spec.numeric.is_some() || spec.date_pattern.is_some() || spec.bool_labels.is_some()
            {
                return Err(incompatible(ValueType::Text));
            }
            text.clone()
        }
    };
    Ok(match spec.case {
        Some(Case::Upper) => rendered.to_uppercase(),
        Some(Case::Lower) => rendered.to_lowercase(),
        None => rendered,
    })
}

/// Writes a chrono delayed format without panicking on unsupported fields.
fn render_pattern<T: std::fmt::Display>(pattern: &str, formatted: T) -> Result<String> {
    let mut out = String::new();
    write!(out, "{formatted}").map_err(|_| FormatError::Render {
        pattern: pattern.to_string(),
    })?;
    Ok(out)
}

/// Applies numeric modifiers, following the rules of the modifier strings:
/// `MK` scales by 1e6 when |v| ≥ 1e6 and by 1e3 otherwise, `%` multiplies by
/// 100, default precision is 1 for `M` and `%`, 0 for `K` and 2 for currency.
pub fn format_numeric(value: f64, numeric: &NumericFormat) -> String {
    let millions = value.abs() >= 1e6;
    let scaled = if numeric.thousands_millions {
        if millions { value / 1e6 } else { value / 1e3 }
    } else if numeric.percent {
        value * 100.0
    } else {
        value
    };

    let default_precision = if numeric.thousands_millions {
        Some(if millions { 1 } else { 0 })
    } else if numeric.percent {
        Some(1)
    } else if numeric.currency.is_some() {
        Some(2)
    } else {
        None
    };

    let magnitude = match numeric.precision.or(default_precision) {
        Some(precision) => format!("{:.*}", precision, scaled.abs()),
        None => format_number(scaled.abs()),
    };
    let negative = scaled < 0.0 && magnitude.chars().any(|ch| matches!(ch, '1'..='9'));
    let magnitude = if numeric.grouping {
        group_thousands(&magnitude)
    } else {
        magnitude
    };

    let mut out = String::with_capacity(magnitude.len() + 4);
    if negative {
        out.push('-');
    } else if numeric.explicit_sign {
        out.push('+');
    }
    if let Some(symbol) = numeric.currency {
        out.push(symbol);
    }
    out.push_str(&magnitude);
    if numeric.percent {
        out.push('%');
    }
    if numeric.thousands_millions {
        out.push(if millions { 'M' } else { 'K' });
    }
    out
}

/// Inserts `,` between groups of three integer digits.
fn group_thousands(digits: &str) -> String {
    let (integer, fraction) = match digits.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (digits, None),
    };
    let mut grouped = String::with_capacity(digits.len() + integer.len() / 3);
    for (idx, ch) in integer.chars().enumerate() {
        if idx > 0 && (integer.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(fraction) = fraction {
        grouped.push('.');
        grouped.push_str(fraction);
    }
    grouped
}
