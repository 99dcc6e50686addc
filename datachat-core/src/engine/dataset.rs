//! Dataset references and loading.
//!
//! A dataset is a single CSV or Excel file described by the artifact layer's
//! config document (`{"files": [{file_name, file_type, file_schema, rows}]}`).
//! Only `files[0]` is read.  Column names are normalized the same way for
//! the declared schema and for the live header row, so the two always line
//! up.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::table::{Table, Value};

/// Normalized column name → declared type.
pub type Schema = BTreeMap<String, String>;

/// Lower-case a column name and replace spaces with underscores.
pub fn normalize_column_name(name: &str) -> String {
    name.replace(' ', "_").to_lowercase()
}

pub fn normalize_schema<'a, I>(schema: I) -> Schema
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    schema
        .into_iter()
        .map(|(k, v)| (normalize_column_name(k), v.clone()))
        .collect()
}

// ── Config document ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default)]
    pub files: Vec<DatasetFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFile {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_schema: BTreeMap<String, String>,
    #[serde(default)]
    pub rows: Option<u64>,
}

/// Supported file kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FileKind {
    Csv,
    Xls,
    Xlsx,
}

/// Everything the pipeline knows about the dataset a prompt targets.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRef {
    pub artifact_version_id: Option<Uuid>,
    /// Storage URI; `file://` and `volume://` prefixes are accepted.
    pub uri: String,
    pub config: DatasetConfig,
}

impl DatasetRef {
    pub fn primary_file(&self) -> Option<&DatasetFile> {
        self.config.files.first()
    }

    /// Normalized schema of the primary file (empty when no file is declared).
    pub fn schema(&self) -> Schema {
        self.primary_file()
            .map(|f| normalize_schema(&f.file_schema))
            .unwrap_or_default()
    }

    /// Declared file kind, falling back to the URI extension.
    pub fn file_kind(&self) -> Result<FileKind, DatasetError> {
        let declared = self
            .primary_file()
            .map(|f| f.file_type.trim())
            .filter(|t| !t.is_empty());
        let raw = match declared {
            Some(t) => t.to_owned(),
            None => Path::new(&self.uri)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_owned(),
        };
        raw.parse()
            .map_err(|_| DatasetError::UnsupportedKind(raw.clone()))
    }

    pub fn local_path(&self) -> Result<PathBuf, DatasetError> {
        resolve_path(&self.uri)
    }
}

/// Strip a `volume://` or `file://` prefix and collapse doubled slashes.
pub fn resolve_path(uri: &str) -> Result<PathBuf, DatasetError> {
    if uri.trim().is_empty() {
        return Err(DatasetError::EmptyUri);
    }
    let stripped = ["volume://", "file://"]
        .iter()
        .find_map(|prefix| uri.strip_prefix(prefix))
        .map(|rest| rest.replace("//", "/"));
    Ok(PathBuf::from(stripped.unwrap_or_else(|| uri.to_owned())))
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Dataset loading failures.  All of them are permanent.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset path is empty")]
    EmptyUri,

    #[error("unsupported '{0}' file type")]
    UnsupportedKind(String),

    #[error("dataset '{0}' has no rows")]
    Empty(String),

    #[error("workbook '{0}' has no worksheet")]
    NoWorksheet(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Excel(#[from] calamine::Error),

    #[error("loader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// A dataset snapshot in memory with normalized column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub kind: FileKind,
    pub table: Table,
}

impl Dataset {
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.table.column_names()
    }

    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }
}

/// Load the dataset a [`DatasetRef`] points to.
///
/// File I/O runs on the blocking pool.  A dataset with a header but no data
/// rows is rejected.
pub async fn load(dataset: &DatasetRef) -> Result<Dataset, DatasetError> {
    let kind = dataset.file_kind()?;
    let path = dataset.local_path()?;
    let shown = path.display().to_string();

    let table = tokio::task::spawn_blocking(move || match kind {
        FileKind::Csv => read_csv(&path),
        FileKind::Xls | FileKind::Xlsx => read_workbook(&path),
    })
    .await??;

    if table.is_empty() {
        return Err(DatasetError::Empty(shown));
    }
    debug!(path = %shown, %kind, rows = table.row_count(), "dataset loaded");
    Ok(Dataset { kind, table })
}

const CSV_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Pick the candidate delimiter that occurs most often in the header line.
fn sniff_delimiter(header: &str) -> u8 {
    CSV_DELIMITERS
        .iter()
        .copied()
        .map(|d| (d, header.bytes().filter(|b| *b == d).count()))
        .filter(|(_, n)| *n > 0)
        .max_by_key(|(_, n)| *n)
        .map_or(b',', |(d, _)| d)
}

fn read_csv(path: &Path) -> Result<Table, DatasetError> {
    let raw = std::fs::read_to_string(path)?;
    let text = raw.strip_prefix('\u{feff}').unwrap_or(&raw);
    let delimiter = sniff_delimiter(text.lines().next().unwrap_or_default());

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(normalize_column_name)
        .collect();
    let mut table = Table::with_columns(headers);

    for record in reader.records() {
        let record = record?;
        table.push_row(
            record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::Text(cell.to_owned())
                    }
                })
                .collect(),
        );
    }
    Ok(table)
}

fn read_workbook(path: &Path) -> Result<Table, DatasetError> {
    let mut workbook = calamine::open_workbook_auto(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| DatasetError::NoWorksheet(path.display().to_string()))?;
    let range = workbook.worksheet_range(&sheet)?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };
    let mut table = Table::with_columns(
        header
            .iter()
            .map(|cell| normalize_column_name(&cell.to_string())),
    );
    for row in rows {
        table.push_row(row.iter().map(cell_value).collect());
    }
    Ok(table)
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => Value::Real(*f),
        Data::Bool(b) => Value::Int(i64::from(*b)),
        Data::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}
