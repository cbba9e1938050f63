//! CSV-backed `range` data sources.
//!
//! A range statement names a CSV file, optionally followed by an A1-style
//! block: `sales_{month}.csv!B2:E40`. The first row of the block is the
//! header row.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use csv::ReaderBuilder;
use tracing::debug;

use autoreport_model::{
    Column, ColumnType, DataSourceDef, Dataset, Parameters, Schema, Value,
};

use crate::adapter::{DataSourceAdapter, SourceHandle, filter_by_parameters};
use crate::error::DataSourceError;
use crate::fillins::expand_date_pattern;

/// A zero-based cell position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    /// Parses an A1-style reference such as `B17` or `AF86`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let split = text.find(|ch: char| ch.is_ascii_digit())?;
        let (letters, digits) = text.split_at(split);
        if letters.is_empty() || !letters.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return None;
        }
        let mut col = 0usize;
        for ch in letters.chars() {
            let digit = (ch.to_ascii_uppercase() as u8 - b'A') as usize + 1;
            col = col.checked_mul(26)?.checked_add(digit)?;
        }
        let row: usize = digits.parse().ok()?;
        if row == 0 {
            return None;
        }
        Some(Self {
            row: row - 1,
            col: col - 1,
        })
    }
}

/// The parsed form of a range statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRef {
    pub path: String,
    pub start: Option<CellRef>,
    pub end: Option<CellRef>,
}

impl RangeRef {
    pub fn parse(statement: &str) -> Result<Self, String> {
        let statement = statement.trim();
        let Some((path, block)) = statement.rsplit_once('!') else {
            return Ok(Self {
                path: statement.to_string(),
                start: None,
                end: None,
            });
        };
        let (start, end) = match block.split_once(':') {
            Some((start, end)) => (start, Some(end)),
            None => (block, None),
        };
        let start = CellRef::parse(start).ok_or_else(|| format!("invalid cell '{start}'"))?;
        let end = match end {
            Some(end) => {
                let end = CellRef::parse(end).ok_or_else(|| format!("invalid cell '{end}'"))?;
                if end.row < start.row || end.col < start.col {
                    return Err(format!("range {block} is reversed"));
                }
                Some(end)
            }
            None => None,
        };
        Ok(Self {
            path: path.trim().to_string(),
            start: Some(start),
            end,
        })
    }

    fn contains_row(&self, row: usize) -> bool {
        let after_start = self.start.is_none_or(|start| row >= start.row);
        let before_end = self.end.is_none_or(|end| row <= end.row);
        after_start && before_end
    }

    fn columns(&self, width: usize) -> std::ops::Range<usize> {
        let first = self.start.map_or(0, |start| start.col);
        let last = self.end.map_or(width, |end| (end.col + 1).min(width));
        first.min(last)..last
    }
}

/// Reads range sources from CSV files under a base directory.
#[derive(Debug, Clone)]
pub struct CsvRangeAdapter {
    base_dir: PathBuf,
    today: NaiveDate,
}

impl CsvRangeAdapter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            today: Local::now().date_naive(),
        }
    }

    /// Fixes the date used for `{fill-in}` expansion.
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolves the file a statement refers to, after date fill-ins.
    pub fn resolve_path(&self, source: &DataSourceDef) -> Result<(PathBuf, RangeRef), DataSourceError> {
        let range = RangeRef::parse(&source.statement).map_err(|message| {
            DataSourceError::QueryFailed {
                source_name: source.name.clone(),
                message,
            }
        })?;
        let expanded = expand_date_pattern(&range.path, self.today).map_err(|err| {
            DataSourceError::QueryFailed {
                source_name: source.name.clone(),
                message: err.to_string(),
            }
        })?;
        let path = Path::new(&expanded);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        Ok((path, range))
    }

    fn read_block(
        &self,
        source: &DataSourceDef,
        path: &Path,
        range: &RangeRef,
    ) -> Result<Vec<Vec<String>>, DataSourceError> {
        if !path.is_file() {
            return Err(DataSourceError::ConnectionFailed {
                source_name: source.name.clone(),
                message: format!("file not found: {}", path.display()),
            });
        }
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|err| DataSourceError::ConnectionFailed {
                source_name: source.name.clone(),
                message: format!("{}: {err}", path.display()),
            })?;
        let mut block = Vec::new();
        for (row_index, record) in reader.records().enumerate() {
            let record = record.map_err(|err| DataSourceError::QueryFailed {
                source_name: source.name.clone(),
                message: format!("{}: {err}", path.display()),
            })?;
            if !range.contains_row(row_index) {
                continue;
            }
            let cells: Vec<String> = record.iter().map(normalize_cell).collect();
            let columns = range.columns(cells.len());
            let row: Vec<String> = cells[columns].to_vec();
            if row.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            block.push(row);
        }
        Ok(block)
    }
}

fn normalize_cell(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').to_string()
}

impl DataSourceAdapter for CsvRangeAdapter {
    fn execute(
        &self,
        _handle: &SourceHandle,
        source: &DataSourceDef,
        parameters: &Parameters,
    ) -> Result<Dataset, DataSourceError> {
        let (path, range) = self.resolve_path(source)?;
        let mut block = self.read_block(source, &path, &range)?.into_iter();
        let Some(headers) = block.next() else {
            return Err(DataSourceError::SchemaMismatch {
                source_name: source.name.clone(),
                message: format!("no header row in {}", path.display()),
            });
        };
        let records: Vec<Vec<String>> = block.collect();
        let dataset = build_dataset(source, &headers, &records)?;
        debug!(
            source = %source.name,
            path = %path.display(),
            rows = dataset.len(),
            "range source loaded"
        );
        filter_by_parameters(dataset, source, parameters)
    }
}

/// Types raw records by the declared schema, or by inference when none is
/// declared.
fn build_dataset(
    source: &DataSourceDef,
    headers: &[String],
    records: &[Vec<String>],
) -> Result<Dataset, DataSourceError> {
    let mismatch = |message: String| DataSourceError::SchemaMismatch {
        source_name: source.name.clone(),
        message,
    };
    let header_schema = Schema::new(
        headers
            .iter()
            .map(|header| Column::new(header.clone(), ColumnType::Auto))
            .collect(),
    )
    .map_err(|err| mismatch(err.to_string()))?;

    let selected: Vec<(usize, Column)> = match &source.schema {
        Some(declared) => declared
            .columns()
            .iter()
            .map(|column| {
                header_schema
                    .index_of(&column.name)
                    .map(|idx| (idx, column.clone()))
                    .ok_or_else(|| mismatch(format!("column '{}' not found", column.name)))
            })
            .collect::<Result<_, _>>()?,
        None => header_schema
            .columns()
            .iter()
            .cloned()
            .enumerate()
            .collect(),
    };

    let mut columns = Vec::with_capacity(selected.len());
    for (idx, column) in &selected {
        let data_type = match column.data_type {
            ColumnType::Auto => {
                ColumnType::infer(records.iter().map(|record| cell(record, *idx)))
            }
            declared => declared,
        };
        columns.push(Column::new(column.name.clone(), data_type));
    }
    let schema = Schema::new(columns.clone()).map_err(|err| mismatch(err.to_string()))?;

    let mut dataset = Dataset::new(schema);
    for (row_number, record) in records.iter().enumerate() {
        let mut values: Vec<Value> = Vec::with_capacity(columns.len());
        for ((idx, _), column) in selected.iter().zip(&columns) {
            let value = column.data_type.coerce(cell(record, *idx)).map_err(|err| {
                mismatch(format!("row {}, column '{}': {err}", row_number + 2, column.name))
            })?;
            values.push(value);
        }
        dataset
            .push_row(values)
            .map_err(|err| mismatch(err.to_string()))?;
    }
    Ok(dataset)
}

fn cell(record: &[String], idx: usize) -> &str {
    record.get(idx).map_or("", String::as_str)
}
