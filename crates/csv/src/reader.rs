//! Crosstab CSV reader
//!
//! A crosstab export stacks tables vertically on one sheet. Tables are split
//! on fully empty rows; within a block the header is the first of the first
//! few rows with at least two values, the title is the first non-empty row
//! above it and the row labels are in the first column.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use xtab_core::{CellValue, CrosstabDataset, CrosstabTable};

/// Fewest non-empty cells a block needs to count as a table.
pub const MIN_CELLS: usize = 10;

/// How many leading rows of a block may hold the header.
const HEADER_SCAN: usize = 5;

type Grid = Vec<Vec<String>>;

/// Reads crosstab tables out of one CSV sheet.
pub struct CrosstabReader {
    sheet: String,
}

impl CrosstabReader {
    /// `sheet` names the tables' ids and fallback titles.
    pub fn new(sheet: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
        }
    }

    /// Read a CSV file into a dataset; the sheet is named after the file stem.
    pub fn read_file<P: AsRef<Path>>(path: P) -> CsvResult<CrosstabDataset> {
        let path = path.as_ref();
        let sheet = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Sheet1".to_string());
        let file = File::open(path)?;
        Self::new(sheet).read_dataset(file)
    }

    /// Read every table of the sheet into a dataset.
    pub fn read_dataset<R: Read>(&self, reader: R) -> CsvResult<CrosstabDataset> {
        let tables = self.read(reader)?;
        if tables.is_empty() {
            return Err(CsvError::NoTables {
                sheet: self.sheet.clone(),
            });
        }
        Ok(CrosstabDataset::new(tables)?)
    }

    /// Read every table of the sheet, in sheet order.
    pub fn read<R: Read>(&self, reader: R) -> CsvResult<Vec<CrosstabTable>> {
        let grid = read_grid(reader)?;
        let mut titles = HashSet::new();
        let mut tables = Vec::new();

        for (index, block) in blocks(&grid).into_iter().enumerate() {
            let number = index + 1;
            let block = strip_edges(block);
            if block.len() < 2 || block[0].len() < 2 {
                continue;
            }
            if let Some(table) = self.table_from_block(&block, number, &mut titles)? {
                log::debug!(
                    "Found table '{}' ({} rows, {} columns)",
                    table.title(),
                    table.rows().len(),
                    table.columns().len()
                );
                tables.push(table);
            }
        }

        log::info!("Read {} tables from '{}'", tables.len(), self.sheet);
        Ok(tables)
    }

    fn table_from_block(
        &self,
        block: &[Vec<String>],
        number: usize,
        titles: &mut HashSet<String>,
    ) -> CsvResult<Option<CrosstabTable>> {
        let header_idx = (0..block.len().min(HEADER_SCAN))
            .find(|&r| filled(&block[r]) >= 2)
            .unwrap_or(0);

        let mut above = block[..header_idx]
            .iter()
            .filter_map(|row| row.iter().find(|cell| !cell.is_empty()).cloned());
        let title = above
            .next()
            .unwrap_or_else(|| format!("{} table {}", self.sheet, number));
        let question = above.next();

        let header = &block[header_idx];
        let body = &block[header_idx + 1..];
        if body.is_empty() {
            log::debug!("Skipping block {} of '{}': no rows under the header", number, self.sheet);
            return Ok(None);
        }

        let columns = unique(
            header[1..]
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    if label.is_empty() {
                        format!("Column {}", i + 1)
                    } else {
                        label.clone()
                    }
                })
                .collect(),
            &mut HashSet::new(),
        );
        let rows = body.iter().map(|row| row[0].clone()).collect();
        let cells = body
            .iter()
            .map(|row| row[1..].iter().map(|cell| parse_cell(cell)).collect())
            .collect();

        let title = unique(vec![title], titles).remove(0);
        let mut table = CrosstabTable::new(title, rows, columns, cells)?
            .with_id(format!("{}#{}", self.sheet, number));
        if let Some(question) = question {
            table = table.with_question_text(question);
        }
        Ok(Some(table))
    }
}

/// All records, trimmed, with blank lines kept as empty rows.
fn read_grid<R: Read>(mut reader: R) -> CsvResult<Grid> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut grid = Vec::new();
    let mut record = csv::StringRecord::new();
    let mut previous_end: Option<usize> = None;
    while csv_reader.read_record(&mut record)? {
        // the csv parser drops blank lines; they still separate tables
        if let Some(end) = previous_end {
            if blank_line_after(text.as_bytes(), end) {
                grid.push(Vec::new());
            }
        }
        previous_end = Some(csv_reader.position().byte() as usize);
        grid.push(record.iter().map(|f| f.trim().to_string()).collect());
    }
    Ok(grid)
}

/// Whether an empty line follows the record ending at byte `end`.
///
/// The reader's position may fall on either side of the record's terminator,
/// or between the two bytes of a CRLF. Breaks inside quoted fields sit
/// before `end` and are never looked at.
fn blank_line_after(text: &[u8], end: usize) -> bool {
    let end = end.min(text.len());
    let mut rest = &text[end..];
    match text[..end].last() {
        Some(b'\r') => {
            if rest.first() == Some(&b'\n') {
                rest = &rest[1..];
            }
        }
        Some(b'\n') => {}
        _ => rest = skip_line_break(rest),
    }
    matches!(rest.first(), Some(b'\r' | b'\n'))
}

fn skip_line_break(rest: &[u8]) -> &[u8] {
    if rest.starts_with(b"\r\n") {
        &rest[2..]
    } else if matches!(rest.first(), Some(b'\r' | b'\n')) {
        &rest[1..]
    } else {
        rest
    }
}

fn filled(row: &[String]) -> usize {
    row.iter().filter(|cell| !cell.is_empty()).count()
}

/// Runs of non-empty rows that hold enough values to be a table.
fn blocks(grid: &Grid) -> Vec<&[Vec<String>]> {
    let mut blocks = Vec::new();
    let mut start = None;
    for i in 0..=grid.len() {
        let empty = grid.get(i).map_or(true, |row| filled(row) == 0);
        match (start, empty) {
            (None, false) => start = Some(i),
            (Some(s), true) => {
                let block = &grid[s..i];
                let cells: usize = block.iter().map(|row| filled(row)).sum();
                if cells >= MIN_CELLS && block.len() >= 2 {
                    blocks.push(block);
                }
                start = None;
            }
            _ => {}
        }
    }
    blocks
}

/// Pad the block to a rectangle and drop empty edge columns.
fn strip_edges(block: &[Vec<String>]) -> Grid {
    let width = block.iter().map(Vec::len).max().unwrap_or(0);
    let used = |c: usize| block.iter().any(|row| row.get(c).map_or(false, |v| !v.is_empty()));
    let Some(first) = (0..width).find(|&c| used(c)) else {
        return Vec::new();
    };
    let last = (0..width).rev().find(|&c| used(c)).unwrap_or(first);

    block
        .iter()
        .map(|row| {
            (first..=last)
                .map(|c| row.get(c).cloned().unwrap_or_default())
                .collect()
        })
        .collect()
}

/// Suffix repeats with ` (2)`, ` (3)` and so on.
fn unique(labels: Vec<String>, seen: &mut HashSet<String>) -> Vec<String> {
    labels
        .into_iter()
        .map(|label| {
            let mut candidate = label.clone();
            let mut n = 1;
            while !seen.insert(candidate.clone()) {
                n += 1;
                candidate = format!("{} ({})", label, n);
            }
            candidate
        })
        .collect()
}

/// Numbers (thousands separators and a trailing `%` allowed), blanks and text.
fn parse_cell(field: &str) -> CellValue {
    if field.is_empty() {
        return CellValue::Empty;
    }
    let number = field.strip_suffix('%').unwrap_or(field).replace(',', "");
    match number.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => CellValue::Number(n),
        _ => CellValue::Text(field.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHEET: &str = "\
Q Age
How old are you?
,Male,Female,Total
Base,480,520,1000
18-24,40,35,37.4
25-34,60,65,62.6

Q Gender
,Total,Share,
Base,1000,100%,
Male,480,48%,
Female,520,52%,
";

    fn read(text: &str) -> Vec<CrosstabTable> {
        CrosstabReader::new("Sheet1").read(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_blocks_split_on_blank_lines() {
        let tables = read(SHEET);
        let titles: Vec<&str> = tables.iter().map(|t| t.title()).collect();
        assert_eq!(titles, vec!["Q Age", "Q Gender"]);

        let age = &tables[0];
        assert_eq!(age.id(), Some("Sheet1#1"));
        assert_eq!(age.question_text(), Some("How old are you?"));
        assert_eq!(age.columns(), ["Male", "Female", "Total"]);
        assert_eq!(age.rows(), ["Base", "18-24", "25-34"]);
        assert_eq!(age.cell(1, 2), Some(&CellValue::Number(37.4)));

        let gender = &tables[1];
        assert_eq!(gender.id(), Some("Sheet1#2"));
        assert_eq!(gender.question_text(), None);
        // trailing empty column dropped
        assert_eq!(gender.columns(), ["Total", "Share"]);
        assert_eq!(gender.cell(1, 1), Some(&CellValue::Number(48.0)));
    }

    #[test]
    fn test_blocks_split_on_empty_records() {
        let text = SHEET.replace("\n\nQ Gender", "\n,,,\nQ Gender");
        assert_eq!(read(&text).len(), 2);
    }

    #[test]
    fn test_small_blocks_skipped_and_fallback_title() {
        let text = "\
Note,only
a,few

,North,South
Sales,10,20
Costs,5,7
Margin,5,13
";
        let tables = read(text);
        assert_eq!(tables.len(), 1);
        // numbering counts qualifying blocks only
        assert_eq!(tables[0].title(), "Sheet1 table 1");
        assert_eq!(tables[0].rows(), ["Sales", "Costs", "Margin"]);
    }

    #[test]
    fn test_quoted_line_breaks_do_not_split_tables() {
        let text = "\
\"Q Income
(household, before tax)\"
,Male,Female,Total
Base,480,520,1000
\"Under
$25k\",40,35,37.4
$25k+,60,65,62.6
\r
Q Gender\r
,Total,Share\r
Base,1000,100%\r
Male,480,48%\r
Female,520,52%\r
";
        let tables = read(text);
        let titles: Vec<&str> = tables.iter().map(|t| t.title()).collect();
        assert_eq!(titles, vec!["Q Income\n(household, before tax)", "Q Gender"]);
        assert_eq!(tables[0].rows(), ["Base", "Under\n$25k", "$25k+"]);
        assert_eq!(tables[1].rows(), ["Base", "Male", "Female"]);
    }

    #[test]
    fn test_blank_line_detection() {
        let text = b"a,b\n\nc,d\r\ne,f\r\n\r\ng";
        assert!(blank_line_after(text, 3));
        assert!(blank_line_after(text, 4));
        assert!(!blank_line_after(text, 8));
        assert!(!blank_line_after(text, 9));
        assert!(!blank_line_after(text, 10));
        assert!(blank_line_after(text, 13));
        assert!(blank_line_after(text, 14));
        assert!(!blank_line_after(text, text.len()));
    }

    #[test]
    fn test_cell_values() {
        assert_eq!(parse_cell(""), CellValue::Empty);
        assert_eq!(parse_cell("45%"), CellValue::Number(45.0));
        assert_eq!(parse_cell("1,250"), CellValue::Number(1250.0));
        assert_eq!(parse_cell("n/a"), CellValue::Text("n/a".to_string()));
        assert_eq!(parse_cell("NaN"), CellValue::Text("NaN".to_string()));
    }

    #[test]
    fn test_duplicate_titles_and_labels() {
        let block = "\
Q Region
,North,,North
Base,100,200,300
A,1,2,3
B,4,5,6
";
        let text = format!("{}\n{}", block, block);
        let tables = read(&text);
        assert_eq!(tables[0].title(), "Q Region");
        assert_eq!(tables[1].title(), "Q Region (2)");
        assert_eq!(tables[0].columns(), ["North", "Column 2", "North (2)"]);
    }

    #[test]
    fn test_no_tables() {
        let err = CrosstabReader::new("Empty")
            .read_dataset("a,b\nc,d\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, CsvError::NoTables { ref sheet } if sheet == "Empty"));
    }
}
