//! CSV source for crosstab datasets.
//!
//! Splits a sheet of stacked crosstab tables into titled
//! [`CrosstabTable`](xtab_core::CrosstabTable)s.

pub mod error;
pub mod reader;

pub use error::{CsvError, CsvResult};
pub use reader::CrosstabReader;

use std::path::Path;
use xtab_core::CrosstabDataset;

/// Read a crosstab CSV file into a dataset.
pub fn read_file<P: AsRef<Path>>(path: P) -> CsvResult<CrosstabDataset> {
    CrosstabReader::read_file(path)
}
