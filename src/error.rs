//! # Error Types
//!
//! Fatal errors surface as [`DiplomaError`] and stop the action that raised
//! them. Per-row problems during a batch are [`RenderError`]s wrapped in a
//! [`RowFailure`] and collected into the batch summary instead.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Main error type for diplomaker operations
#[derive(Error, Debug)]
pub enum DiplomaError {
    /// Spreadsheet bytes could not be read as a workbook
    #[error("Failed to parse spreadsheet: {0}")]
    InputParse(String),

    /// Input file is not one of the accepted spreadsheet types
    #[error("Unsupported input file '{0}': only .xlsx and .xls files are accepted")]
    UnsupportedInput(String),

    /// "Generate all" was requested with zero records
    #[error("No data available. Please provide a spreadsheet with at least one row.")]
    EmptyBatch,

    /// A configured font could not be fetched; no font set is available
    #[error("Failed to load font '{label}': {message}")]
    FontLoad { label: String, message: String },

    #[error("Field '{0}' already exists in the template")]
    DuplicateFieldName(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Invalid date format: {0}")]
    Date(String),

    /// Template layout or background could not be loaded
    #[error("Failed to load template: {0}")]
    Template(String),
}

/// Failure of a single row inside a batch
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("renderer failed: {0}")]
    Render(String),

    #[error("renderer did not finish within {0:?}")]
    Timeout(Duration),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Step of the per-row loop in which a row failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStage {
    Rendering,
    Delivering,
}

impl fmt::Display for RowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RowStage::Rendering => "rendering",
            RowStage::Delivering => "delivering",
        };
        f.write_str(name)
    }
}

/// A row that was skipped, with its 1-based row number
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Row {row} failed while {stage}: {error}")]
pub struct RowFailure {
    pub row: usize,
    pub stage: RowStage,
    pub error: RenderError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_failure_message_names_row_and_stage() {
        let failure = RowFailure {
            row: 2,
            stage: RowStage::Rendering,
            error: RenderError::Render("bad glyph".to_string()),
        };
        assert_eq!(
            failure.to_string(),
            "Row 2 failed while rendering: renderer failed: bad glyph"
        );
    }

    #[test]
    fn test_font_load_message() {
        let err = DiplomaError::FontLoad {
            label: "andalus".to_string(),
            message: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to load font 'andalus': not found");
    }
}
