//! Loading the binding workbook.
//!
//! A workbook is a directory holding `Bindings.csv` and `Sources.csv`.
//! Header names are matched ignoring case, unknown columns are ignored and
//! blank rows are skipped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, info};

use autoreport_model::{
    BindingEntry, BindingSpec, DataSourceDef, FieldPath, Schema, SourceKind, parse_parameters,
};

use crate::error::{IngestError, Result};

pub const BINDINGS_FILE: &str = "Bindings.csv";
pub const SOURCES_FILE: &str = "Sources.csv";

/// Column positions keyed by upper-cased header name.
#[derive(Debug, Clone)]
struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    fn new(headers: &StringRecord) -> Self {
        let mut positions = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            let key = header.trim().trim_matches('\u{feff}').to_ascii_uppercase();
            positions.entry(key).or_insert(idx);
        }
        Self { positions }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(&name.to_ascii_uppercase()).copied()
    }

    fn require(&self, name: &str, path: &Path) -> Result<usize> {
        self.position(name).ok_or_else(|| IngestError::MissingColumn {
            column: name.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// A non-blank cell of a record, if the column exists.
fn cell(record: &StringRecord, index: Option<usize>) -> Option<String> {
    let value = record.get(index?)?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn read_records(path: &Path) -> Result<(HeaderIndex, Vec<(usize, StringRecord)>)> {
    if !path.is_file() {
        return Err(IngestError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|err| csv_error(path, &err))?;
    let headers = HeaderIndex::new(reader.headers().map_err(|err| csv_error(path, &err))?);
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| csv_error(path, &err))?;
        if record.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        let line = record
            .position()
            .map_or(0, |position| position.line() as usize);
        records.push((line, record));
    }
    Ok((headers, records))
}

fn csv_error(path: &Path, err: &csv::Error) -> IngestError {
    if let csv::ErrorKind::Io(io) = err.kind() {
        return IngestError::FileRead {
            path: path.to_path_buf(),
            source: std::io::Error::new(io.kind(), io.to_string()),
        };
    }
    IngestError::CsvParse {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn invalid(path: &Path, line: usize, field: &str, value: &str, message: String) -> IngestError {
    IngestError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        path: path.to_path_buf(),
        line,
        message,
    }
}

/// Reads `Sources.csv` (`Name, Kind, Statement`, optional `Columns`).
pub fn load_sources(path: &Path) -> Result<Vec<DataSourceDef>> {
    let (headers, records) = read_records(path)?;
    let name_idx = headers.require("Name", path)?;
    let kind_idx = headers.require("Kind", path)?;
    let statement_idx = headers.require("Statement", path)?;
    let columns_idx = headers.position("Columns");

    let mut sources: Vec<DataSourceDef> = Vec::with_capacity(records.len());
    for (line, record) in records {
        let name = cell(&record, Some(name_idx))
            .ok_or_else(|| invalid(path, line, "Name", "", "name is required".to_string()))?;
        if sources.iter().any(|s| s.name.eq_ignore_ascii_case(&name)) {
            return Err(IngestError::DuplicateSource {
                name,
                path: path.to_path_buf(),
                line,
            });
        }
        let kind_text = cell(&record, Some(kind_idx)).unwrap_or_default();
        let kind: SourceKind = kind_text
            .parse()
            .map_err(|err: autoreport_model::ModelError| {
                invalid(path, line, "Kind", &kind_text, err.to_string())
            })?;
        let statement = cell(&record, Some(statement_idx)).ok_or_else(|| {
            invalid(path, line, "Statement", "", "statement is required".to_string())
        })?;
        let mut source = DataSourceDef::new(name, kind, statement);
        if let Some(columns) = cell(&record, columns_idx) {
            let schema = Schema::parse_declaration(&columns)
                .map_err(|err| invalid(path, line, "Columns", &columns, err.to_string()))?;
            source = source.with_schema(schema);
        }
        sources.push(source);
    }
    Ok(sources)
}

/// Reads `Bindings.csv` (`Name, Source, Field, Format, Predicate`, optional
/// `Correlate, Parameters, Default`).
pub fn load_bindings(path: &Path) -> Result<Vec<BindingEntry>> {
    let (headers, records) = read_records(path)?;
    let name_idx = headers.require("Name", path)?;
    let source_idx = headers.position("Source");
    let field_idx = headers.position("Field");
    let format_idx = headers.position("Format");
    let predicate_idx = headers.position("Predicate");
    let correlate_idx = headers.position("Correlate");
    let parameters_idx = headers.position("Parameters");
    let default_idx = headers.position("Default");

    let mut entries = Vec::with_capacity(records.len());
    for (line, record) in records {
        let name = cell(&record, Some(name_idx))
            .ok_or_else(|| invalid(path, line, "Name", "", "name is required".to_string()))?;
        let field = match cell(&record, field_idx) {
            Some(text) => Some(
                text.parse::<FieldPath>()
                    .map_err(|err| invalid(path, line, "Field", &text, err.to_string()))?,
            ),
            None => None,
        };
        let parameters = match cell(&record, parameters_idx) {
            Some(text) => parse_parameters(&text)
                .map_err(|err| invalid(path, line, "Parameters", &text, err.to_string()))?,
            None => Vec::new(),
        };
        entries.push(BindingEntry {
            name,
            source: cell(&record, source_idx),
            field,
            format: cell(&record, format_idx),
            predicate: cell(&record, predicate_idx),
            correlate: cell(&record, correlate_idx),
            parameters,
            default: cell(&record, default_idx),
            line: Some(line),
        });
    }
    Ok(entries)
}

/// Loads a binding workbook directory into a [`BindingSpec`].
pub fn load_binding_workbook(dir: &Path) -> Result<BindingSpec> {
    if !dir.is_dir() {
        return Err(IngestError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }
    let sources_path = dir.join(SOURCES_FILE);
    let bindings_path = dir.join(BINDINGS_FILE);

    let mut spec = BindingSpec::new();
    for source in load_sources(&sources_path)? {
        debug!(source = %source.name, kind = %source.kind, "declared data source");
        spec.add_source(source)
            .map_err(|err| IngestError::CsvParse {
                path: sources_path.clone(),
                message: err.to_string(),
            })?;
    }
    for entry in load_bindings(&bindings_path)? {
        spec.add_entry(entry);
    }
    info!(
        workbook = %dir.display(),
        sources = spec.source_count(),
        entries = spec.entries().len(),
        "binding workbook loaded"
    );
    Ok(spec)
}

/// The workbook files for a directory, in load order.
pub fn workbook_files(dir: &Path) -> [PathBuf; 2] {
    [dir.join(SOURCES_FILE), dir.join(BINDINGS_FILE)]
}
