//! # Record Source
//!
//! Reads the first sheet of an `.xlsx`/`.xls` workbook into an ordered list of
//! flat records. The header row supplies the record keys verbatim; no case or
//! whitespace normalization is applied, so template field names must match the
//! spreadsheet headers exactly.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use log::{debug, info};

use crate::error::DiplomaError;

/// Mime types accepted as spreadsheet input
pub const ACCEPTED_MIME_TYPES: [&str; 2] = [
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
];

/// Key used for header cells that are empty
const EMPTY_HEADER: &str = "__EMPTY";

/// One spreadsheet row: column name to optional cell text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(BTreeMap<String, Option<String>>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell text for `column`; `None` when the column is missing or the cell is empty.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(|value| value.as_deref())
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Option<String>) {
        self.0.insert(column.into(), value);
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        )
    }
}

/// Records read from one uploaded spreadsheet
#[derive(Debug, Clone, Default)]
pub struct RecordSource {
    pub file_name: Option<String>,
    pub records: Vec<Record>,
}

impl RecordSource {
    /// Reads a spreadsheet file after checking its type by extension.
    pub fn from_path(path: &Path) -> Result<Self, DiplomaError> {
        check_spreadsheet_type(path)?;

        let bytes = std::fs::read(path)
            .map_err(|e| DiplomaError::InputParse(format!("{}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        Self::from_bytes(bytes, file_name)
    }

    /// Parses workbook bytes. An empty first sheet yields zero records.
    pub fn from_bytes(bytes: Vec<u8>, file_name: Option<String>) -> Result<Self, DiplomaError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| DiplomaError::InputParse(e.to_string()))?;

        let records = match workbook.sheet_names().first().cloned() {
            Some(sheet) => {
                let range = workbook
                    .worksheet_range(&sheet)
                    .map_err(|e| DiplomaError::InputParse(format!("sheet '{}': {}", sheet, e)))?;
                debug!("Reading sheet '{}' ({:?})", sheet, range.get_size());
                records_from_rows(range.rows())
            }
            None => Vec::new(),
        };

        info!("Read {} records", records.len());
        Ok(Self { file_name, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Rejects files whose extension does not map to an accepted spreadsheet mime type.
pub fn check_spreadsheet_type(path: &Path) -> Result<(), DiplomaError> {
    let accepted = mime_guess::from_path(path)
        .iter()
        .any(|mime| ACCEPTED_MIME_TYPES.contains(&mime.essence_str()));

    if accepted {
        Ok(())
    } else {
        Err(DiplomaError::UnsupportedInput(path.display().to_string()))
    }
}

/// Converts sheet rows into records, using the first row as headers.
pub fn records_from_rows<'a, I>(mut rows: I) -> Vec<Record>
where
    I: Iterator<Item = &'a [Data]>,
{
    let headers = match rows.next() {
        Some(header_row) => header_keys(header_row),
        None => return Vec::new(),
    };

    rows.filter_map(|row| {
        let mut record = Record::new();
        for (key, cell) in headers.iter().zip(row) {
            if let Some(value) = cell_text(cell) {
                record.insert(key.clone(), Some(value));
            }
        }
        // Blank rows are skipped entirely
        (!record.is_empty()).then_some(record)
    })
    .collect()
}

/// Header keys with empty cells named `__EMPTY`, `__EMPTY_1`, ... and
/// repeated names suffixed `_1`, `_2`, ... Every key is unique, even when a
/// suffixed name also appears literally in the header row.
fn header_keys(row: &[Data]) -> Vec<String> {
    let mut used: BTreeSet<String> = BTreeSet::new();

    row.iter()
        .map(|cell| {
            let base = cell_text(cell).unwrap_or_else(|| EMPTY_HEADER.to_string());
            let mut key = base.clone();
            let mut suffix = 0;
            while used.contains(&key) {
                suffix += 1;
                key = format!("{}_{}", base, suffix);
            }
            used.insert(key.clone());
            key
        })
        .collect()
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
