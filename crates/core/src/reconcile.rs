//! Reconciliation: rewriting mapped shapes from the current dataset.
//!
//! Content for a shape is planned first and written second, so a shape is
//! either fully refreshed or left exactly as it was. Only data parts change:
//! chart caches, cell text and run text. Formatting is never touched.

use crate::dataset::{CellValue, CrosstabDataset, CrosstabTable};
use crate::deck::{Deck, Shape, ShapeContent, TextBody};
use crate::mapping::{MappingKind, MappingRecord, Selector, ShapeKey};
use crate::resolve::{resolve, Resolution, ResolvedShape, Unmapped};
use crate::validate::{validate_for_shape, Issue};
use thiserror::Error;

/// New content for one shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentUpdate {
    Chart {
        categories: Vec<String>,
        series_name: String,
        values: Vec<Option<f64>>,
    },
    /// Full grid of new cell text; `None` leaves a cell alone.
    Table { cells: Vec<Vec<Option<String>>> },
    Text(String),
}

impl ContentUpdate {
    /// Write the planned content into `content`. Returns whether anything
    /// changed.
    pub fn apply(&self, content: &mut ShapeContent) -> bool {
        match (self, content) {
            (
                ContentUpdate::Chart {
                    categories,
                    series_name,
                    values,
                },
                ShapeContent::Chart(chart),
            ) => {
                let Some(series) = chart.series.first_mut() else {
                    return false;
                };
                let changed = chart.categories != *categories
                    || series.name != *series_name
                    || series.values != *values;
                chart.categories = categories.clone();
                series.name = series_name.clone();
                series.values = values.clone();
                changed
            }
            (ContentUpdate::Table { cells }, ShapeContent::Table(grid)) => {
                let mut changed = false;
                for (r, row) in cells.iter().enumerate() {
                    for (c, text) in row.iter().enumerate() {
                        let (Some(text), Some(cell)) = (text, grid.cell_mut(r, c)) else {
                            continue;
                        };
                        changed |= write_text(cell, text);
                    }
                }
                changed
            }
            (ContentUpdate::Text(text), ShapeContent::Text(body)) => write_text(body, text),
            _ => false,
        }
    }
}

fn write_text(body: &mut TextBody, text: &str) -> bool {
    if body.text() == text {
        return false;
    }
    body.set_text(text);
    true
}

/// Text a question/base record puts into its shape.
fn text_for(kind: MappingKind, table: &CrosstabTable) -> String {
    match kind {
        MappingKind::BaseText => table.base_description(),
        _ => table.question().to_string(),
    }
}

/// Plan the content `record` puts into `shape`, without writing anything.
pub fn plan(
    record: &MappingRecord,
    shape: &Shape,
    dataset: &CrosstabDataset,
) -> Result<ContentUpdate, Vec<Issue>> {
    let issues = validate_for_shape(record, shape.kind(), dataset);
    if !issues.is_empty() {
        return Err(issues);
    }
    let table = dataset
        .table(&record.table_title)
        .ok_or_else(|| vec![Issue::UnknownTable(record.table_title.clone())])?;
    let rows = table.filtered_rows(&record.exclude_rows);

    match &shape.content {
        ShapeContent::Chart(chart) if record.kind == MappingKind::Chart => {
            if chart.series.is_empty() {
                return Err(vec![Issue::MissingSeries]);
            }
            let column = match &record.selector {
                Selector::Column(label) => table.chart_column(label),
                _ => table.total_column(),
            }
            .ok_or_else(|| {
                vec![Issue::UnknownColumn {
                    table: table.title().to_string(),
                    column: record.selected_columns().join(", "),
                }]
            })?;

            Ok(ContentUpdate::Chart {
                categories: rows.iter().map(|&r| table.rows()[r].clone()).collect(),
                series_name: table.columns()[column].clone(),
                values: rows
                    .iter()
                    .map(|&r| table.cell(r, column).and_then(CellValue::as_number))
                    .collect(),
            })
        }
        ShapeContent::Table(grid) if record.kind == MappingKind::Table => {
            let columns: Vec<usize> = match &record.selector {
                Selector::Columns(labels) => labels
                    .iter()
                    .filter_map(|label| table.column_index(label))
                    .collect(),
                _ => (0..table.columns().len()).collect(),
            };

            let expected_rows = rows.len() + 1;
            let expected_columns = columns.len() + 1;
            if grid.row_count() != expected_rows
                || grid.rows.iter().any(|row| row.len() != expected_columns)
            {
                return Err(vec![Issue::GridMismatch {
                    expected_rows,
                    expected_columns,
                    actual_rows: grid.row_count(),
                    actual_columns: grid.column_count(),
                }]);
            }

            let mut cells = Vec::with_capacity(expected_rows);
            let mut header = vec![None];
            header.extend(columns.iter().map(|&c| Some(table.columns()[c].clone())));
            cells.push(header);
            for &r in &rows {
                let mut line = vec![Some(table.rows()[r].clone())];
                line.extend(columns.iter().map(|&c| {
                    Some(table.cell(r, c).map(CellValue::to_string).unwrap_or_default())
                }));
                cells.push(line);
            }
            Ok(ContentUpdate::Table { cells })
        }
        ShapeContent::Text(_) if record.kind.is_text() => {
            Ok(ContentUpdate::Text(text_for(record.kind, table)))
        }
        _ => Err(vec![Issue::KindMismatch {
            record: record.kind,
            shape: shape.kind(),
        }]),
    }
}

/// Non-fatal oddities met during a pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Warning {
    #[error("{owner}: companion '{target}' not found on slide {}", .owner.slide)]
    BindingNotFound { owner: ShapeKey, target: String },

    #[error("{owner}: companion '{target}' ({companion}) is a {kind} shape, not text")]
    BindingNotText {
        owner: ShapeKey,
        target: String,
        companion: ShapeKey,
        kind: crate::deck::ShapeKind,
    },

    #[error("{key}: chart has {count} series, only the first is refreshed")]
    ExtraSeries { key: ShapeKey, count: usize },
}

/// A shape left untouched because of one or more issues.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeFailure {
    pub key: ShapeKey,
    pub name: String,
    pub issues: Vec<Issue>,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Shapes refreshed from the data (whether or not the content differed).
    pub updated: Vec<ShapeKey>,
    /// Of `updated`, the shapes whose content actually changed.
    pub changed: Vec<ShapeKey>,
    /// Shapes skipped because `auto_update` is off.
    pub preserved: Vec<ShapeKey>,
    pub failed: Vec<ShapeFailure>,
    pub unmapped: Vec<Unmapped>,
    /// Text shapes refreshed through a chart or table binding.
    pub companions: Vec<ShapeKey>,
    pub warnings: Vec<Warning>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.warnings.is_empty()
    }
}

/// Refreshes every mapped shape of a deck from one dataset.
pub struct Reconciler<'a> {
    dataset: &'a CrosstabDataset,
}

impl<'a> Reconciler<'a> {
    pub fn new(dataset: &'a CrosstabDataset) -> Self {
        Self { dataset }
    }

    /// Resolve and refresh `deck` in place.
    pub fn reconcile(&self, deck: &mut Deck) -> ReconcileReport {
        let resolution = resolve(deck);
        self.reconcile_resolved(deck, &resolution)
    }

    /// Refresh `deck` using a resolution computed from it.
    pub fn reconcile_resolved(&self, deck: &mut Deck, resolution: &Resolution) -> ReconcileReport {
        let mut report = ReconcileReport {
            unmapped: resolution.unmapped.clone(),
            ..ReconcileReport::default()
        };

        for resolved in &resolution.mapped {
            let key = resolved.key;
            let record = &resolved.record;
            if !record.auto_update {
                log::debug!("{} '{}': auto_update off, preserved", key, resolved.name);
                report.preserved.push(key);
                continue;
            }

            let Some(shape) = deck.shape(key) else {
                log::warn!("{} '{}': shape no longer in deck", key, resolved.name);
                continue;
            };
            let update = match plan(record, shape, self.dataset) {
                Ok(update) => update,
                Err(issues) => {
                    for issue in &issues {
                        log::warn!("{} '{}': {}", key, resolved.name, issue);
                    }
                    report.failed.push(ShapeFailure {
                        key,
                        name: resolved.name.clone(),
                        issues,
                    });
                    continue;
                }
            };
            if let ShapeContent::Chart(chart) = &shape.content {
                if chart.series.len() > 1 {
                    report.warnings.push(Warning::ExtraSeries {
                        key,
                        count: chart.series.len(),
                    });
                }
            }

            if let Some(shape) = deck.shape_mut(key) {
                if update.apply(&mut shape.content) {
                    report.changed.push(key);
                }
            }
            log::debug!("{} '{}': refreshed from '{}'", key, resolved.name, record.table_title);
            report.updated.push(key);

            self.refresh_companions(deck, resolution, resolved, &mut report);
        }

        log::info!(
            "Reconciled deck: {} updated ({} changed), {} preserved, {} failed, {} unmapped",
            report.updated.len(),
            report.changed.len(),
            report.preserved.len(),
            report.failed.len(),
            report.unmapped.len()
        );
        report
    }

    fn refresh_companions(
        &self,
        deck: &mut Deck,
        resolution: &Resolution,
        owner: &ResolvedShape,
        report: &mut ReconcileReport,
    ) {
        let Some(table) = self.dataset.table(&owner.record.table_title) else {
            return;
        };

        for (binding, target) in owner.record.bindings() {
            let Some(companion) = deck.find_on_slide(owner.key.slide, target) else {
                report.warnings.push(Warning::BindingNotFound {
                    owner: owner.key,
                    target: target.to_string(),
                });
                continue;
            };
            if resolution
                .record(companion)
                .is_some_and(|own| !own.auto_update)
            {
                log::debug!("{}: companion {} has auto_update off", owner.key, companion);
                continue;
            }
            let Some(shape) = deck.shape_mut(companion) else {
                continue;
            };
            let ShapeContent::Text(body) = &mut shape.content else {
                report.warnings.push(Warning::BindingNotText {
                    owner: owner.key,
                    target: target.to_string(),
                    companion,
                    kind: shape.kind(),
                });
                continue;
            };

            write_text(body, &text_for(binding, table));
            if !report.companions.contains(&companion) {
                report.companions.push(companion);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::dataset::fixtures::dataset;
    use crate::deck::{Chart, ChartSeries, ChartType, RunStyle, TableGrid};
    use crate::mapping::ExcludeRows;
    use pretty_assertions::assert_eq;

    fn styled() -> RunStyle {
        RunStyle {
            font: Some("Arial".into()),
            size: Some(1200),
            bold: Some(true),
            color: Some("2175F3".into()),
        }
    }

    fn grid(rows: usize, columns: usize) -> TableGrid {
        TableGrid {
            rows: (0..rows)
                .map(|_| (0..columns).map(|_| TextBody::plain("old", styled())).collect())
                .collect(),
        }
    }

    fn chart() -> Chart {
        Chart::single_series(
            ChartType::Bar,
            vec!["a".into()],
            ChartSeries {
                name: "Series 1".into(),
                values: vec![Some(1.0)],
                color: Some("2175F3".into()),
            },
        )
    }

    fn chart_record() -> MappingRecord {
        MappingRecord::chart("Q Age", "Total")
            .with_exclude_rows(ExcludeRows::standard())
            .with_bind_question("TEXT_QUESTION")
            .with_bind_base("TEXT_BASE")
    }

    fn deck() -> Deck {
        let mut deck = Deck::new();
        let slide = deck.add_slide();
        slide.push(
            Shape::new("TEXT_QUESTION", ShapeContent::Text(TextBody::plain("old", styled())))
                .with_alt_text(encode(&MappingRecord::question_text("Q Age"))),
        );
        slide.push(
            Shape::new("CHART", ShapeContent::Chart(chart()))
                .with_alt_text(encode(&chart_record())),
        );
        slide.push(
            Shape::new("TABLE", ShapeContent::Table(grid(3, 4))).with_alt_text(encode(
                &MappingRecord::table("Q Age").with_exclude_rows(ExcludeRows::standard()),
            )),
        );
        slide.push(Shape::new(
            "TEXT_BASE",
            ShapeContent::Text(TextBody::plain("old", styled())),
        ));
        deck
    }

    #[test]
    fn test_chart_refresh() {
        let mut deck = deck();
        let report = Reconciler::new(&dataset()).reconcile(&mut deck);
        assert!(report.is_clean(), "{:?}", report);

        let ShapeContent::Chart(chart) = &deck.shape(ShapeKey::new(1, 2)).unwrap().content else {
            panic!("expected chart");
        };
        assert_eq!(chart.categories, vec!["18-24", "25-34"]);
        assert_eq!(chart.series[0].name, "Total");
        assert_eq!(chart.series[0].values, vec![Some(37.4), Some(62.6)]);
        assert_eq!(chart.series[0].color.as_deref(), Some("2175F3"));
        assert_eq!(chart.chart_type, ChartType::Bar);
    }

    #[test]
    fn test_table_refresh_keeps_corner_and_style() {
        let mut deck = deck();
        Reconciler::new(&dataset()).reconcile(&mut deck);

        let ShapeContent::Table(grid) = &deck.shape(ShapeKey::new(1, 3)).unwrap().content else {
            panic!("expected table");
        };
        assert_eq!(
            grid.texts(),
            vec![
                vec!["old", "Male", "Female", "Total"],
                vec!["18-24", "40.0", "35.0", "37.4"],
                vec!["25-34", "60.0", "65.0", "62.6"],
            ]
        );
        let run = &grid.cell(1, 1).unwrap().paragraphs[0].runs[0];
        assert_eq!(run.style, styled());
    }

    #[test]
    fn test_listed_columns_in_listed_order() {
        let record = MappingRecord::table_with_columns("Q Age", ["Total", "Male"]);
        let shape = Shape::new("T", ShapeContent::Table(grid(5, 3)));
        let ContentUpdate::Table { cells } = plan(&record, &shape, &dataset()).unwrap() else {
            panic!("expected table update");
        };
        assert_eq!(
            cells[0],
            vec![None, Some("Total".to_string()), Some("Male".to_string())]
        );
        assert_eq!(cells[4][0].as_deref(), Some("Mean"));
    }

    #[test]
    fn test_companions_follow_bindings() {
        let mut deck = deck();
        let report = Reconciler::new(&dataset()).reconcile(&mut deck);

        assert_eq!(report.companions, vec![ShapeKey::new(1, 1), ShapeKey::new(1, 4)]);
        let base = deck.shape(ShapeKey::new(1, 4)).unwrap();
        let ShapeContent::Text(body) = &base.content else {
            panic!("expected text");
        };
        assert_eq!(body.text(), "Base: Total respondents. 1000 complete surveys.");
        assert_eq!(body.paragraphs[0].runs[0].style, styled());
    }

    #[test]
    fn test_missing_companion_is_a_warning() {
        let mut deck = deck();
        deck.slides[0].shapes.pop();
        let report = Reconciler::new(&dataset()).reconcile(&mut deck);

        assert!(report.failed.is_empty());
        assert_eq!(
            report.warnings,
            vec![Warning::BindingNotFound {
                owner: ShapeKey::new(1, 2),
                target: "TEXT_BASE".into()
            }]
        );
    }

    #[test]
    fn test_preserved_shape_untouched() {
        let mut deck = deck();
        deck.slides[0].shapes[0].alt_text = Some(encode(
            &MappingRecord::question_text("Q Age").with_auto_update(false),
        ));
        let report = Reconciler::new(&dataset()).reconcile(&mut deck);

        assert_eq!(report.preserved, vec![ShapeKey::new(1, 1)]);
        assert!(!report.companions.contains(&ShapeKey::new(1, 1)));
        let ShapeContent::Text(body) = &deck.shape(ShapeKey::new(1, 1)).unwrap().content else {
            panic!("expected text");
        };
        assert_eq!(body.text(), "old");
    }

    #[test]
    fn test_failure_is_isolated() {
        let mut deck = Deck::new();
        let slide = deck.add_slide();
        let record = encode(&MappingRecord::table("Q Gender"));
        slide.push(Shape::new("A", ShapeContent::Table(grid(4, 2))).with_alt_text(record.clone()));
        slide.push(Shape::new("B", ShapeContent::Table(grid(2, 2))).with_alt_text(record.clone()));
        slide.push(Shape::new("C", ShapeContent::Table(grid(4, 2))).with_alt_text(record));
        let before = deck.shape(ShapeKey::new(1, 2)).cloned();

        let report = Reconciler::new(&dataset()).reconcile(&mut deck);

        assert_eq!(report.updated, vec![ShapeKey::new(1, 1), ShapeKey::new(1, 3)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key, ShapeKey::new(1, 2));
        assert_eq!(report.failed[0].issues[0].code(), "GridMismatch");
        assert_eq!(deck.shape(ShapeKey::new(1, 2)).cloned(), before);
    }

    #[test]
    fn test_missing_series() {
        let mut empty = chart();
        empty.series.clear();
        let shape = Shape::new("C", ShapeContent::Chart(empty));
        assert_eq!(
            plan(&MappingRecord::chart("Q Age", "Male"), &shape, &dataset()),
            Err(vec![Issue::MissingSeries])
        );
    }

    #[test]
    fn test_second_pass_changes_nothing() {
        let mut deck = deck();
        let data = dataset();
        let reconciler = Reconciler::new(&data);
        let first = reconciler.reconcile(&mut deck);
        assert!(!first.changed.is_empty());
        let after_first = deck.clone();

        let second = reconciler.reconcile(&mut deck);
        assert_eq!(deck, after_first);
        assert!(second.changed.is_empty());
        assert_eq!(second.updated, first.updated);
    }
}
