//! File names for generated reports.
//!
//! A pattern such as `invoice_{CustomerId}_{year}{month}{day}` expands with
//! `{index}` (1-based job number), the date fill-ins and, when merging per
//! record, the record's columns. Record columns win over date fill-ins of the
//! same name.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use autoreport_ingest::{date_fill_ins, expand_pattern};
use autoreport_merge::RecordScope;

use crate::error::{AssemblyError, Result};

pub const DEFAULT_PATTERN: &str = "report_{index}";

const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Debug, Clone)]
pub struct OutputNamer {
    pattern: String,
    fill_ins: BTreeMap<String, String>,
}

impl Default for OutputNamer {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN, chrono::Local::now().date_naive())
    }
}

impl OutputNamer {
    pub fn new(pattern: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            pattern: pattern.into(),
            fill_ins: date_fill_ins(today),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Name for job `index` (0-based), without extension.
    pub fn name(&self, record: Option<&RecordScope>, index: usize) -> Result<String> {
        let expanded = expand_pattern(&self.pattern, |key| {
            if key.eq_ignore_ascii_case("index") {
                return Some((index + 1).to_string());
            }
            if let Some(value) = record.and_then(|record| record.value(key)) {
                return Some(value.to_string());
            }
            self.fill_ins.get(&key.to_ascii_lowercase()).cloned()
        })
        .map_err(|source| AssemblyError::Pattern {
            pattern: self.pattern.clone(),
            source,
        })?;

        let name = sanitize(&expanded);
        if name.is_empty() {
            return Err(AssemblyError::EmptyName {
                pattern: self.pattern.clone(),
            });
        }
        Ok(name)
    }
}

/// Replaces characters that are not allowed in file names.
pub fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|ch| {
            if RESERVED.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect()
}

/// Hands out unique names by suffixing repeats with `_2`, `_3`, ...
///
/// Comparison is case-insensitive so names stay distinct on case-folding
/// file systems.
#[derive(Debug, Default)]
pub struct UniqueNames {
    seen: HashMap<String, usize>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        loop {
            let key = candidate.to_lowercase();
            let count = self.seen.entry(key).or_insert(0);
            *count += 1;
            if *count == 1 {
                return candidate;
            }
            candidate = format!("{name}_{count}");
        }
    }
}
