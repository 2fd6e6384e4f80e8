//! Crosstab model: named tables of row/column labels and cell values.
//!
//! A dataset is produced by an external source (CSV blocks, JSON) and stays
//! read-only for the duration of one export or update.

use crate::error::{Error, Result};
use crate::mapping::ExcludeRows;
use crate::normalize::{labels_match, normalize_label, position_of, TOTAL_LABELS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A single crosstab cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Numeric value (percentage, count, mean).
    Number(f64),
    /// Non-numeric content such as significance letters.
    Text(String),
    /// Blank cell.
    #[default]
    Empty,
}

impl CellValue {
    /// Numeric value, if this cell holds one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{:.1}", n),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Empty => Ok(()),
        }
    }
}

/// Serialized shape of a table, checked before it becomes a [`CrosstabTable`].
#[derive(Deserialize)]
struct RawTable {
    #[serde(default)]
    id: Option<String>,
    title: String,
    rows: Vec<String>,
    columns: Vec<String>,
    cells: Vec<Vec<CellValue>>,
    #[serde(default)]
    question_text: Option<String>,
    #[serde(default)]
    base_text: Option<String>,
}

impl TryFrom<RawTable> for CrosstabTable {
    type Error = Error;

    fn try_from(raw: RawTable) -> Result<Self> {
        let mut table = CrosstabTable::new(raw.title, raw.rows, raw.columns, raw.cells)?;
        table.id = raw.id;
        table.question_text = raw.question_text;
        table.base_text = raw.base_text;
        Ok(table)
    }
}

/// One crosstab: answer categories down the side, segments across the top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct CrosstabTable {
    /// Source identifier, e.g. `Sheet1#2`.
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    title: String,
    rows: Vec<String>,
    columns: Vec<String>,
    cells: Vec<Vec<CellValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    question_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_text: Option<String>,
}

impl CrosstabTable {
    /// Create a table, checking that the grid is `rows × columns` and that
    /// column labels are unique.
    pub fn new(
        title: impl Into<String>,
        rows: Vec<String>,
        columns: Vec<String>,
        cells: Vec<Vec<CellValue>>,
    ) -> Result<Self> {
        let title = title.into();
        let invalid = |reason: String| Error::InvalidTable {
            title: title.clone(),
            reason,
        };

        if cells.len() != rows.len() {
            return Err(invalid(format!(
                "{} row labels but {} rows of cells",
                rows.len(),
                cells.len()
            )));
        }
        if let Some((idx, row)) = cells
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(invalid(format!(
                "row {} ('{}') has {} cells, expected {}",
                idx + 1,
                rows[idx],
                row.len(),
                columns.len()
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(invalid(format!("duplicate column label '{}'", dup)));
        }

        Ok(Self {
            id: None,
            title,
            rows,
            columns,
            cells,
            question_text: None,
            base_text: None,
        })
    }

    /// Set the source identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the question wording shown above the visual.
    pub fn with_question_text(mut self, text: impl Into<String>) -> Self {
        self.question_text = Some(text.into());
        self
    }

    /// Set the base (sample size) description.
    pub fn with_base_text(mut self, text: impl Into<String>) -> Self {
        self.base_text = Some(text.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn question_text(&self) -> Option<&str> {
        self.question_text.as_deref()
    }

    pub fn base_text(&self) -> Option<&str> {
        self.base_text.as_deref()
    }

    /// Cell at (row, column) indices.
    pub fn cell(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.cells.get(row).and_then(|r| r.get(column))
    }

    /// Index of a column by label (exact, then normalized).
    pub fn column_index(&self, label: &str) -> Option<usize> {
        position_of(&self.columns, label)
    }

    /// Index of the column standing in for "Total".
    ///
    /// The first column labelled total/overall/all, otherwise the first column.
    pub fn total_column(&self) -> Option<usize> {
        TOTAL_LABELS
            .iter()
            .find_map(|wanted| {
                self.columns
                    .iter()
                    .position(|c| normalize_label(c) == *wanted)
            })
            .or(if self.columns.is_empty() { None } else { Some(0) })
    }

    /// Resolve the single column a chart plots.
    ///
    /// A literal column match wins; a total-like name falls back to
    /// [`total_column`](Self::total_column).
    pub fn chart_column(&self, label: &str) -> Option<usize> {
        self.column_index(label).or_else(|| {
            if crate::normalize::is_total_label(label) {
                self.total_column()
            } else {
                None
            }
        })
    }

    /// Indices of the rows that survive `exclude`, in table order.
    pub fn filtered_rows(&self, exclude: &ExcludeRows) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, label)| !exclude.matches(label))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Question wording: the explicit question text, or the title.
    pub fn question(&self) -> &str {
        self.question_text.as_deref().unwrap_or(&self.title)
    }

    /// Base description: the explicit base text, or one derived from the
    /// first `Base…` row at the total column.
    pub fn base_description(&self) -> String {
        if let Some(text) = &self.base_text {
            return text.clone();
        }

        let count = self
            .rows
            .iter()
            .position(|label| normalize_label(label).starts_with("base"))
            .zip(self.total_column())
            .and_then(|(row, col)| self.cell(row, col))
            .and_then(CellValue::as_number);

        match count {
            Some(n) => format!("Base: Total respondents. {} complete surveys.", n.round() as i64),
            None => "Base: Total respondents.".to_string(),
        }
    }
}

/// Serialized shape of a dataset, checked for unique titles.
#[derive(Deserialize)]
struct RawDataset {
    tables: Vec<CrosstabTable>,
}

impl TryFrom<RawDataset> for CrosstabDataset {
    type Error = Error;

    fn try_from(raw: RawDataset) -> Result<Self> {
        CrosstabDataset::new(raw.tables)
    }
}

/// Ordered collection of crosstab tables with unique titles.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawDataset")]
pub struct CrosstabDataset {
    tables: Vec<CrosstabTable>,
}

impl CrosstabDataset {
    /// Create a dataset, rejecting duplicate titles.
    pub fn new(tables: Vec<CrosstabTable>) -> Result<Self> {
        let mut seen = HashSet::new();
        for table in &tables {
            if !seen.insert(table.title.as_str()) {
                return Err(Error::DuplicateTable(table.title.clone()));
            }
        }
        Ok(Self { tables })
    }

    /// Parse a dataset from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::DatasetLoadError(e.to_string()))
    }

    /// Serialize the dataset to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::DatasetLoadError(e.to_string()))
    }

    pub fn tables(&self) -> &[CrosstabTable] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Look up a table by title (exact, then normalized).
    pub fn table(&self, title: &str) -> Option<&CrosstabTable> {
        self.tables
            .iter()
            .find(|t| t.title == title)
            .or_else(|| self.tables.iter().find(|t| labels_match(&t.title, title)))
    }
}
