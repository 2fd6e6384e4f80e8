//! Export: building a fresh deck from a dataset, one slide per table.
//!
//! Every data-bearing shape is tagged with its mapping record at creation,
//! so the deck can be refreshed later without guessing. Content is filled
//! through the same planning step the reconciler uses, which keeps a freshly
//! exported deck already in sync with its data.

use crate::codec;
use crate::dataset::{CrosstabDataset, CrosstabTable};
use crate::deck::{
    Chart, ChartSeries, ChartType, Deck, Frame, RunStyle, Shape, ShapeContent, Slide, TableGrid,
    TextBody,
};
use crate::error::Result;
use crate::mapping::{ExcludeRows, MappingRecord, TOTAL_COLUMN};
use crate::reconcile::plan;
use crate::validate::Issue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const TITLE_SHAPE: &str = "TITLE";
pub const QUESTION_SHAPE: &str = "TEXT_QUESTION";
pub const CHART_SHAPE: &str = "CHART";
pub const TABLE_SHAPE: &str = "TABLE";
pub const BASE_SHAPE: &str = "TEXT_BASE";

pub const BRAND_FONT: &str = "Arial";
/// Series palette, first colour first.
pub const BRAND_COLORS: [&str; 5] = ["2175F3", "00AA72", "F7941E", "9966FF", "FF6384"];
/// Slide background fill.
pub const BACKGROUND_COLOR: &str = "F7F7EA";

const DEFAULT_REPORT_TITLE: &str = "Automated Crosstab Report";

/// How a table is drawn on its slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visual {
    #[default]
    #[serde(rename = "bar_h", alias = "horizontal", alias = "bar")]
    BarH,
    #[serde(rename = "bar_v", alias = "vertical", alias = "column")]
    BarV,
    #[serde(rename = "donut", alias = "doughnut")]
    Donut,
    #[serde(rename = "line")]
    Line,
    /// Horizontal bars with the table underneath.
    #[serde(rename = "chart+table", alias = "chart_with_table")]
    ChartTable,
}

impl Visual {
    pub fn chart_type(&self) -> ChartType {
        match self {
            Visual::BarH | Visual::ChartTable => ChartType::Bar,
            Visual::BarV => ChartType::Column,
            Visual::Donut => ChartType::Doughnut,
            Visual::Line => ChartType::Line,
        }
    }

    pub fn includes_table(&self) -> bool {
        matches!(self, Visual::ChartTable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visual::BarH => "bar_h",
            Visual::BarV => "bar_v",
            Visual::Donut => "donut",
            Visual::Line => "line",
            Visual::ChartTable => "chart+table",
        }
    }
}

impl fmt::Display for Visual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visual {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bar_h" | "bar" | "horizontal" | "bar horizontal" => Ok(Visual::BarH),
            "bar_v" | "column" | "vertical" | "bar vertical" => Ok(Visual::BarV),
            "donut" | "doughnut" => Ok(Visual::Donut),
            "line" => Ok(Visual::Line),
            "chart+table" | "chart_with_table" | "chart table" => Ok(Visual::ChartTable),
            other => Err(format!("unknown visual '{}'", other)),
        }
    }
}

/// Per-table choices made before export.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    pub visual: Option<Visual>,
    /// Slide title; the table title when unset.
    pub title: Option<String>,
    /// Fixed question wording. Written once and never refreshed.
    pub question_text: Option<String>,
    /// Fixed base wording. Written once and never refreshed.
    pub base_text: Option<String>,
    /// Column the chart plots; the total-like column when unset.
    pub column: Option<String>,
}

/// Export settings, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Title slide text; no title slide when `None`.
    pub report_title: Option<String>,
    pub visual: Visual,
    pub exclude_rows: ExcludeRows,
    /// Overrides keyed by table title or table id.
    pub tables: BTreeMap<String, TableOptions>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            report_title: Some(DEFAULT_REPORT_TITLE.to_string()),
            visual: Visual::default(),
            exclude_rows: ExcludeRows::standard(),
            tables: BTreeMap::new(),
        }
    }
}

impl ExportOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A table left out of the export.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTable {
    pub title: String,
    pub issues: Vec<Issue>,
}

/// Result of an export.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub deck: Deck,
    pub skipped: Vec<SkippedTable>,
}

fn style(size: u32, bold: bool) -> RunStyle {
    RunStyle {
        font: Some(BRAND_FONT.to_string()),
        size: Some(size),
        bold: bold.then_some(true),
        color: None,
    }
}

fn text_shape(name: &str, text: &str, style: RunStyle, frame: Frame) -> Shape {
    Shape::new(name, ShapeContent::Text(TextBody::plain(text, style))).with_frame(frame)
}

pub struct Exporter {
    options: ExportOptions,
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Overrides for `table`, by title first, then id.
    pub fn table_options(&self, table: &CrosstabTable) -> TableOptions {
        self.options
            .tables
            .get(table.title())
            .or_else(|| table.id().and_then(|id| self.options.tables.get(id)))
            .cloned()
            .unwrap_or_default()
    }

    /// Build a deck for every table of `dataset`.
    pub fn export(&self, dataset: &CrosstabDataset) -> Export {
        let mut deck = Deck::new();
        let mut skipped = Vec::new();

        if let Some(title) = &self.options.report_title {
            deck.add_slide().push(text_shape(
                TITLE_SHAPE,
                title,
                style(3600, true),
                Frame::inches(0.5, 3.0, 12.3, 1.2),
            ));
        }

        for table in dataset.tables() {
            match self.table_slide(table, dataset) {
                Ok(slide) => deck.slides.push(slide),
                Err(issues) => {
                    for issue in &issues {
                        log::warn!("Skipping table '{}': {}", table.title(), issue);
                    }
                    skipped.push(SkippedTable {
                        title: table.title().to_string(),
                        issues,
                    });
                }
            }
        }

        log::info!(
            "Exported {} slides ({} tables skipped)",
            deck.slides.len(),
            skipped.len()
        );
        Export { deck, skipped }
    }

    fn table_slide(
        &self,
        table: &CrosstabTable,
        dataset: &CrosstabDataset,
    ) -> std::result::Result<Slide, Vec<Issue>> {
        let opts = self.table_options(table);
        let visual = opts.visual.unwrap_or(self.options.visual);
        let exclude = self.options.exclude_rows.clone();
        let title = table.title();

        let mut chart_record =
            MappingRecord::chart(title, opts.column.as_deref().unwrap_or(TOTAL_COLUMN))
                .with_exclude_rows(exclude.clone());
        if opts.question_text.is_none() {
            chart_record = chart_record.with_bind_question(QUESTION_SHAPE);
        }
        if opts.base_text.is_none() {
            chart_record = chart_record.with_bind_base(BASE_SHAPE);
        }

        let question = MappingRecord::question_text(title).with_auto_update(opts.question_text.is_none());
        let base = MappingRecord::base_text(title).with_auto_update(opts.base_text.is_none());
        let chart_height = if visual.includes_table() { 3.0 } else { 5.4 };

        let mut parts = vec![
            (
                question,
                text_shape(
                    QUESTION_SHAPE,
                    opts.question_text.as_deref().unwrap_or_default(),
                    style(1200, false),
                    Frame::inches(0.5, 0.8, 12.3, 0.4),
                ),
            ),
            (
                chart_record,
                Shape::new(
                    CHART_SHAPE,
                    ShapeContent::Chart(Chart::single_series(
                        visual.chart_type(),
                        Vec::new(),
                        ChartSeries {
                            name: String::new(),
                            values: Vec::new(),
                            color: Some(BRAND_COLORS[0].to_string()),
                        },
                    )),
                )
                .with_frame(Frame::inches(0.5, 1.4, 12.3, chart_height)),
            ),
        ];

        if visual.includes_table() {
            let rows = table.filtered_rows(&exclude).len() + 1;
            let columns = table.columns().len() + 1;
            let grid = TableGrid {
                rows: (0..rows)
                    .map(|r| {
                        (0..columns)
                            .map(|_| TextBody::plain("", style(1000, r == 0)))
                            .collect()
                    })
                    .collect(),
            };
            parts.push((
                MappingRecord::table(title).with_exclude_rows(exclude),
                Shape::new(TABLE_SHAPE, ShapeContent::Table(grid))
                    .with_frame(Frame::inches(0.5, 4.5, 12.3, 2.4)),
            ));
        }

        parts.push((
            base,
            text_shape(
                BASE_SHAPE,
                opts.base_text.as_deref().unwrap_or_default(),
                style(1000, false),
                Frame::inches(0.5, 7.0, 12.3, 0.4),
            ),
        ));

        let mut slide = Slide::default();
        slide.push(text_shape(
            TITLE_SHAPE,
            opts.title.as_deref().unwrap_or(title),
            style(2800, true),
            Frame::inches(0.5, 0.2, 12.3, 0.6),
        ));
        for (record, mut shape) in parts {
            let update = plan(&record, &shape, dataset)?;
            if record.auto_update {
                update.apply(&mut shape.content);
            }
            shape.alt_text = Some(codec::encode(&record));
            slide.push(shape);
        }
        Ok(slide)
    }
}
