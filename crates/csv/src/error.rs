//! CSV source errors

use thiserror::Error;

pub type CsvResult<T> = std::result::Result<T, CsvError>;

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// No block in the sheet looked like a crosstab.
    #[error("No crosstab tables found in '{sheet}'")]
    NoTables { sheet: String },

    #[error("Core error: {0}")]
    Core(#[from] xtab_core::Error),
}

impl From<CsvError> for xtab_core::Error {
    fn from(err: CsvError) -> Self {
        match err {
            CsvError::Io(e) => xtab_core::Error::IoError(e),
            CsvError::Core(e) => e,
            other => xtab_core::Error::DatasetLoadError(other.to_string()),
        }
    }
}
