//! Error types for crosstab deck synchronization.
//!
//! Per-shape problems (unknown tables, grid mismatches, unreadable alt text)
//! are reported as [`Issue`](crate::validate::Issue) values, not errors. The
//! variants here are the failures that stop a whole load/save/export call.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading data, reading decks or writing them.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open, read or write a file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// A crosstab table violates the rectangular-grid or unique-column rules.
    #[error("Invalid table '{title}': {reason}")]
    InvalidTable { title: String, reason: String },

    /// Two tables in one dataset share a title.
    #[error("Duplicate table title in dataset: {0}")]
    DuplicateTable(String),

    /// The mapping template file is malformed.
    #[error("Template error: {0}")]
    TemplateError(String),

    /// The crosstab source could not be turned into a dataset.
    #[error("Dataset load error: {0}")]
    DatasetLoadError(String),

    /// The file format is not supported or could not be detected.
    #[error("Unsupported or unrecognized file format: {0}")]
    UnsupportedFormat(String),

    /// Failed to interpret the PPTX package structure.
    #[error("PPTX parsing error: {0}")]
    PptxParseError(String),

    /// ZIP archive error (for PPTX).
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing or writing error (for PPTX).
    #[error("XML parsing error: {0}")]
    XmlError(String),

    /// A JSON settings file could not be read or written.
    #[error("JSON error: {0}")]
    JsonError(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err.to_string())
    }
}
