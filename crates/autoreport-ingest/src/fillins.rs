//! Date fill-ins for file and output name patterns.
//!
//! A pattern such as `sales_{yesterdaymonth}{yesterday}.csv` is expanded with
//! values derived from one reference date. Four bases are available: today,
//! tomorrow, yesterday and the coming Saturday (`weekending`).

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::error::PatternError;

/// Builds every date fill-in for `today`. Keys are lowercase.
pub fn date_fill_ins(today: NaiveDate) -> BTreeMap<String, String> {
    let mut fill_ins = BTreeMap::new();
    let bases = [
        ("", Some(today)),
        ("tomorrow", today.checked_add_days(Days::new(1))),
        ("yesterday", today.checked_sub_days(Days::new(1))),
        ("weekending", next_saturday(today)),
    ];
    for (prefix, base) in bases {
        let Some(base) = base else {
            continue;
        };
        let day_key = if prefix.is_empty() { "day" } else { prefix };
        fill_ins.insert(day_key.to_string(), format!("{:02}", base.day()));

        let name_prefix = if prefix.is_empty() { "today" } else { prefix };
        let long = base.format("%A").to_string();
        let short = base.format("%a").to_string();
        fill_ins.insert(format!("{name_prefix}nameupper"), long.clone());
        fill_ins.insert(format!("{name_prefix}namelower"), long.to_lowercase());
        fill_ins.insert(format!("{name_prefix}nametruncupper"), short.clone());
        fill_ins.insert(format!("{name_prefix}nametrunclower"), short.to_lowercase());

        fill_ins.insert(format!("{prefix}month"), format!("{:02}", base.month()));
        let year = format!("{:04}", base.year());
        fill_ins.insert(format!("{prefix}truncyear"), year[year.len() - 2..].to_string());
        fill_ins.insert(format!("{prefix}year"), year);
    }
    fill_ins
}

/// The first Saturday strictly after `date`.
fn next_saturday(date: NaiveDate) -> Option<NaiveDate> {
    let current = date.weekday().num_days_from_monday();
    let saturday = Weekday::Sat.num_days_from_monday();
    let ahead = match (saturday + 7 - current) % 7 {
        0 => 7,
        days => days,
    };
    date.checked_add_days(Days::new(u64::from(ahead)))
}

/// Expands every `{name}` in `pattern` through `lookup`.
///
/// `{{` and `}}` produce literal braces.
pub fn expand_pattern<F>(pattern: &str, mut lookup: F) -> Result<String, PatternError>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(PatternError::Unterminated(pattern.to_string()));
                }
                let name = name.trim();
                let value =
                    lookup(name).ok_or_else(|| PatternError::UnknownFillIn(name.to_string()))?;
                out.push_str(&value);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Expands a pattern that may only use date fill-ins.
pub fn expand_date_pattern(pattern: &str, today: NaiveDate) -> Result<String, PatternError> {
    if !pattern.contains('{') {
        return Ok(pattern.to_string());
    }
    let fill_ins = date_fill_ins(today);
    expand_pattern(pattern, |name| {
        fill_ins.get(&name.to_ascii_lowercase()).cloned()
    })
}
