//! Validation of mapping records against a dataset and the shapes they sit on.
//!
//! Checks are independent and accumulate; nothing here mutates the deck.

use crate::codec::ParseError;
use crate::dataset::CrosstabDataset;
use crate::deck::{Deck, ShapeKind};
use crate::mapping::{MappingKind, MappingRecord, Selector, ShapeKey};
use crate::reconcile;
use crate::resolve::{resolve_alt_text, UnmappedReason};
use thiserror::Error;

/// A per-shape problem. Never fatal to a batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Issue {
    #[error("table '{0}' not found in dataset")]
    UnknownTable(String),

    #[error("column '{column}' not found in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("excluding rows [{exclusions}] leaves no rows in table '{table}'")]
    EmptyAfterExclusion { table: String, exclusions: String },

    #[error("{record} mapping is attached to a {shape} shape")]
    KindMismatch { record: MappingKind, shape: ShapeKind },

    #[error(
        "table shape is {actual_rows}x{actual_columns} but the data needs {expected_rows}x{expected_columns}"
    )]
    GridMismatch {
        expected_rows: usize,
        expected_columns: usize,
        actual_rows: usize,
        actual_columns: usize,
    },

    #[error("chart has no data series to refresh")]
    MissingSeries,

    #[error("unreadable mapping: {0}")]
    Parse(ParseError),
}

impl Issue {
    /// Short machine-friendly name of the issue kind.
    pub fn code(&self) -> &'static str {
        match self {
            Issue::UnknownTable(_) => "UnknownTable",
            Issue::UnknownColumn { .. } => "UnknownColumn",
            Issue::EmptyAfterExclusion { .. } => "EmptyAfterExclusion",
            Issue::KindMismatch { .. } => "KindMismatch",
            Issue::GridMismatch { .. } => "GridMismatch",
            Issue::MissingSeries => "MissingSeries",
            Issue::Parse(_) => "ParseError",
        }
    }
}

/// Shape kind a record of `kind` must sit on.
pub fn expected_shape_kind(kind: MappingKind) -> ShapeKind {
    match kind {
        MappingKind::Chart => ShapeKind::Chart,
        MappingKind::Table => ShapeKind::Table,
        MappingKind::QuestionText | MappingKind::BaseText => ShapeKind::Text,
    }
}

/// Check a record against the dataset.
pub fn validate(record: &MappingRecord, dataset: &CrosstabDataset) -> Vec<Issue> {
    let mut issues = Vec::new();
    let Some(table) = dataset.table(&record.table_title) else {
        issues.push(Issue::UnknownTable(record.table_title.clone()));
        return issues;
    };

    match &record.selector {
        Selector::Column(column) => {
            if table.chart_column(column).is_none() {
                issues.push(Issue::UnknownColumn {
                    table: table.title().to_string(),
                    column: column.clone(),
                });
            }
        }
        Selector::Columns(columns) => {
            for column in columns {
                if table.column_index(column).is_none() {
                    issues.push(Issue::UnknownColumn {
                        table: table.title().to_string(),
                        column: column.clone(),
                    });
                }
            }
        }
        Selector::AllColumns | Selector::Unset => {}
    }

    if matches!(record.kind, MappingKind::Chart | MappingKind::Table)
        && table.filtered_rows(&record.exclude_rows).is_empty()
    {
        issues.push(Issue::EmptyAfterExclusion {
            table: table.title().to_string(),
            exclusions: record.exclude_rows.to_string(),
        });
    }

    issues
}

/// Check a record against the dataset and the kind of shape carrying it.
pub fn validate_for_shape(
    record: &MappingRecord,
    shape_kind: ShapeKind,
    dataset: &CrosstabDataset,
) -> Vec<Issue> {
    let mut issues = validate(record, dataset);
    if expected_shape_kind(record.kind) != shape_kind {
        issues.push(Issue::KindMismatch {
            record: record.kind,
            shape: shape_kind,
        });
    }
    issues
}

/// A problem found on one shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeFinding {
    pub key: ShapeKey,
    pub name: String,
    pub issue: Issue,
}

/// Summary of validating every mapped shape of a deck.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub total_shapes: usize,
    /// Shapes whose alt text carries a mapping, readable or not.
    pub mapped: usize,
    pub valid: usize,
    pub invalid: usize,
    pub findings: Vec<ShapeFinding>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Validate every shape of `deck` that carries a mapping.
///
/// Besides the record checks this also reports the grid and series problems
/// an update would hit, without changing anything.
pub fn validate_deck(deck: &Deck, dataset: &CrosstabDataset) -> ValidationReport {
    let mut report = ValidationReport {
        total_shapes: deck.shape_count(),
        ..ValidationReport::default()
    };

    for (key, shape) in deck.shapes() {
        let issues = match resolve_alt_text(shape.alt_text.as_deref()) {
            Ok(record) => {
                let mut issues = validate_for_shape(&record, shape.kind(), dataset);
                if issues.is_empty() {
                    if let Err(planned) = reconcile::plan(&record, shape, dataset) {
                        issues.extend(planned);
                    }
                }
                issues
            }
            Err(UnmappedReason::Invalid(err)) => vec![Issue::Parse(err)],
            Err(_) => continue,
        };

        report.mapped += 1;
        if issues.is_empty() {
            report.valid += 1;
        } else {
            report.invalid += 1;
            report
                .findings
                .extend(issues.into_iter().map(|issue| ShapeFinding {
                    key,
                    name: shape.name.clone(),
                    issue,
                }));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::dataset;
    use crate::dataset::CrosstabDataset;
    use crate::deck::{Shape, ShapeContent, TableGrid, TextBody};
    use crate::mapping::ExcludeRows;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unknown_table_is_the_only_issue() {
        let data = CrosstabDataset::new(vec![crate::dataset::fixtures::gender_table()]).unwrap();
        let record = MappingRecord::chart("Q Age", "Nonexistent")
            .with_exclude_rows(ExcludeRows::parse("18, 25, base, mean"));
        assert_eq!(validate(&record, &data), vec![Issue::UnknownTable("Q Age".into())]);
    }

    #[test]
    fn test_unknown_columns_accumulate() {
        let record = MappingRecord::table_with_columns("Q Age", ["Male", "Other", "Unknown"]);
        let messages: Vec<String> = validate(&record, &dataset())
            .iter()
            .map(|i| i.to_string())
            .collect();
        assert_eq!(
            messages,
            vec![
                "column 'Other' not found in table 'Q Age'",
                "column 'Unknown' not found in table 'Q Age'"
            ]
        );
    }

    #[test]
    fn test_wildcard_and_total_always_resolve() {
        assert!(validate(&MappingRecord::table("Q Age"), &dataset()).is_empty());
        assert!(validate(&MappingRecord::chart("Q Gender", "Total"), &dataset()).is_empty());
    }

    #[test]
    fn test_empty_after_exclusion() {
        let record = MappingRecord::chart("Q Age", "Total")
            .with_exclude_rows(ExcludeRows::parse("base, 18, 25, mean"));
        let issues = validate(&record, &dataset());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code(), "EmptyAfterExclusion");

        // text mappings do not plot rows, so exclusions do not matter
        let record = MappingRecord::base_text("Q Age")
            .with_exclude_rows(ExcludeRows::parse("base, 18, 25, mean"));
        assert!(validate(&record, &dataset()).is_empty());
    }

    #[test]
    fn test_kind_mismatch_accumulates_with_other_issues() {
        let record = MappingRecord::chart("Q Age", "Other");
        let issues = validate_for_shape(&record, ShapeKind::Table, &dataset());
        let codes: Vec<&str> = issues.iter().map(Issue::code).collect();
        assert_eq!(codes, vec!["UnknownColumn", "KindMismatch"]);
    }

    #[test]
    fn test_validate_deck_counts() {
        let mut deck = Deck::new();
        let slide = deck.add_slide();
        slide.push(
            Shape::new("Question", ShapeContent::Text(TextBody::default()))
                .with_alt_text("type: question_text\ntable_title: Q Age"),
        );
        slide.push(
            Shape::new("Table", ShapeContent::Table(TableGrid::default()))
                .with_alt_text("type: table\ntable_title: Q Age\ncolumns: *"),
        );
        slide.push(
            Shape::new("Chart", ShapeContent::Text(TextBody::default()))
                .with_alt_text("type: chart\ntable_title: Q Region"),
        );
        slide.push(
            Shape::new("Broken", ShapeContent::Other).with_alt_text("type: banner\ntable_title: X"),
        );
        slide.push(Shape::new("Logo", ShapeContent::Other));

        let report = validate_deck(&deck, &dataset());
        assert_eq!(report.total_shapes, 5);
        assert_eq!(report.mapped, 4);
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 3);
        let codes: Vec<(String, &str)> = report
            .findings
            .iter()
            .map(|f| (f.key.to_string(), f.issue.code()))
            .collect();
        assert_eq!(
            codes,
            vec![
                ("1:2".to_string(), "GridMismatch"),
                ("1:3".to_string(), "UnknownTable"),
                ("1:3".to_string(), "KindMismatch"),
                ("1:4".to_string(), "ParseError"),
            ]
        );
    }
}
