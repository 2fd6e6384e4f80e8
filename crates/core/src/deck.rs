//! In-memory deck model shared by the engine and the file backends.
//!
//! The model carries just enough of a presentation for mapping work: shape
//! names, the alt-text metadata slot, geometry, and the data-bearing parts
//! (chart caches, table cell text, text runs). Style fields are read by the
//! backends and written back untouched.

use crate::mapping::ShapeKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A whole presentation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Deck {
    /// Slides in presentation order.
    pub slides: Vec<Slide>,
}

impl Deck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a slide and return it for filling.
    pub fn add_slide(&mut self) -> &mut Slide {
        self.slides.push(Slide::default());
        let idx = self.slides.len() - 1;
        &mut self.slides[idx]
    }

    /// Shape at `key`.
    pub fn shape(&self, key: ShapeKey) -> Option<&Shape> {
        self.slides
            .get(key.slide.checked_sub(1)?)?
            .shapes
            .get(key.shape.checked_sub(1)?)
    }

    /// Mutable shape at `key`.
    pub fn shape_mut(&mut self, key: ShapeKey) -> Option<&mut Shape> {
        self.slides
            .get_mut(key.slide.checked_sub(1)?)?
            .shapes
            .get_mut(key.shape.checked_sub(1)?)
    }

    /// Every shape with its key, in slide then shape-tree order.
    pub fn shapes(&self) -> impl Iterator<Item = (ShapeKey, &Shape)> {
        self.slides.iter().enumerate().flat_map(|(s, slide)| {
            slide
                .shapes
                .iter()
                .enumerate()
                .map(move |(i, shape)| (ShapeKey::new(s + 1, i + 1), shape))
        })
    }

    /// Number of shapes across all slides.
    pub fn shape_count(&self) -> usize {
        self.slides.iter().map(|s| s.shapes.len()).sum()
    }

    /// Find a shape on `slide` by `slide:shape` key or by name. A key on
    /// another slide finds nothing.
    pub fn find_on_slide(&self, slide: usize, target: &str) -> Option<ShapeKey> {
        if let Ok(key) = target.parse::<ShapeKey>() {
            return self.shape(key).filter(|_| key.slide == slide).map(|_| key);
        }
        let shapes = &self.slides.get(slide.checked_sub(1)?)?.shapes;
        shapes
            .iter()
            .position(|s| s.name == target)
            .map(|i| ShapeKey::new(slide, i + 1))
    }
}

/// One slide's shape tree (top level only).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Slide {
    pub shapes: Vec<Shape>,
}

impl Slide {
    /// Append a shape and return its 1-based index.
    pub fn push(&mut self, shape: Shape) -> usize {
        self.shapes.push(shape);
        self.shapes.len()
    }
}

/// Position and size in EMUs (914400 per inch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Frame {
    pub x: i64,
    pub y: i64,
    pub cx: i64,
    pub cy: i64,
}

impl Frame {
    /// Frame from inch measurements.
    pub fn inches(x: f64, y: f64, cx: f64, cy: f64) -> Self {
        let emu = |v: f64| (v * 914_400.0).round() as i64;
        Self {
            x: emu(x),
            y: emu(y),
            cx: emu(cx),
            cy: emu(cy),
        }
    }
}

/// A visual object on a slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    /// Display name; a diagnostic label, not an identity.
    pub name: String,
    /// Alt-text description, the slot holding an encoded mapping record.
    pub alt_text: Option<String>,
    pub frame: Option<Frame>,
    pub content: ShapeContent,
}

impl Shape {
    pub fn new(name: impl Into<String>, content: ShapeContent) -> Self {
        Self {
            name: name.into(),
            alt_text: None,
            frame: None,
            content,
        }
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn with_alt_text(mut self, text: impl Into<String>) -> Self {
        self.alt_text = Some(text.into());
        self
    }

    pub fn kind(&self) -> ShapeKind {
        self.content.kind()
    }
}

/// Visual kind of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Chart,
    Table,
    Text,
    Other,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShapeKind::Chart => "chart",
            ShapeKind::Table => "table",
            ShapeKind::Text => "text",
            ShapeKind::Other => "other",
        })
    }
}

/// Data-bearing content of a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeContent {
    Chart(Chart),
    Table(TableGrid),
    Text(TextBody),
    /// Pictures, groups, connectors and anything else the engine ignores.
    Other,
}

impl ShapeContent {
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeContent::Chart(_) => ShapeKind::Chart,
            ShapeContent::Table(_) => ShapeKind::Table,
            ShapeContent::Text(_) => ShapeKind::Text,
            ShapeContent::Other => ShapeKind::Other,
        }
    }
}

/// Chart families the exporter creates; anything else loads as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartType {
    /// Horizontal clustered bars.
    Bar,
    /// Vertical clustered bars.
    Column,
    Doughnut,
    Line,
    Pie,
    Other,
}

/// A chart's plotted data plus the style bits backends need to round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub chart_type: ChartType,
    pub categories: Vec<String>,
    pub series: Vec<ChartSeries>,
    pub has_legend: bool,
}

impl Chart {
    /// Chart with a single series over `categories`.
    pub fn single_series(
        chart_type: ChartType,
        categories: Vec<String>,
        series: ChartSeries,
    ) -> Self {
        Self {
            chart_type,
            categories,
            series: vec![series],
            has_legend: false,
        }
    }
}

/// One data series; blank points are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<Option<f64>>,
    /// Fill colour as `RRGGBB`, style only.
    pub color: Option<String>,
}

/// Table shape cells, row-major; row 0 is the header row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableGrid {
    pub rows: Vec<Vec<TextBody>>,
}

impl TableGrid {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns, taken from the widest row.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&TextBody> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    pub fn cell_mut(&mut self, row: usize, column: usize) -> Option<&mut TextBody> {
        self.rows.get_mut(row).and_then(|r| r.get_mut(column))
    }

    /// Plain text of every cell.
    pub fn texts(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(TextBody::text).collect())
            .collect()
    }
}

/// Character formatting of a run, as far as the backends read it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunStyle {
    /// Latin typeface.
    pub font: Option<String>,
    /// Size in hundredths of a point.
    pub size: Option<u32>,
    pub bold: Option<bool>,
    /// Solid fill colour as `RRGGBB`.
    pub color: Option<String>,
}

/// A run of uniformly formatted text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub style: RunStyle,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Paragraph {
    pub runs: Vec<TextRun>,
}

/// Paragraphs of runs inside a text box or table cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextBody {
    pub paragraphs: Vec<Paragraph>,
}

impl TextBody {
    /// Body with one paragraph holding one run.
    pub fn plain(text: impl Into<String>, style: RunStyle) -> Self {
        Self {
            paragraphs: vec![Paragraph {
                runs: vec![TextRun {
                    text: text.into(),
                    style,
                }],
            }],
        }
    }

    /// Text of all runs; paragraphs joined by newlines.
    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(|p| p.runs.iter().map(|r| r.text.as_str()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Replace the text while keeping run formatting.
    ///
    /// The first run receives `text` and every other run is emptied, so the
    /// run structure (and each run's formatting) is left as it was. A body
    /// without runs gets one unformatted run.
    pub fn set_text(&mut self, text: &str) {
        if self.paragraphs.is_empty() {
            self.paragraphs.push(Paragraph::default());
        }
        if self.paragraphs[0].runs.is_empty() {
            self.paragraphs[0].runs.push(TextRun::default());
        }
        let mut first = true;
        for run in self.paragraphs.iter_mut().flat_map(|p| p.runs.iter_mut()) {
            if first {
                if run.text != text {
                    run.text = text.to_string();
                }
                first = false;
            } else {
                run.text.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn styled(size: u32) -> RunStyle {
        RunStyle {
            font: Some("Arial".into()),
            size: Some(size),
            bold: None,
            color: Some("1F1F1F".into()),
        }
    }

    #[test]
    fn test_set_text_keeps_runs_and_styles() {
        let mut body = TextBody {
            paragraphs: vec![
                Paragraph {
                    runs: vec![
                        TextRun { text: "Base: ".into(), style: styled(1000) },
                        TextRun { text: "412".into(), style: styled(1200) },
                    ],
                },
                Paragraph {
                    runs: vec![TextRun { text: "respondents".into(), style: styled(800) }],
                },
            ],
        };
        body.set_text("Base: Total respondents.");

        assert_eq!(body.paragraphs.len(), 2);
        assert_eq!(body.paragraphs[0].runs[0].text, "Base: Total respondents.");
        assert_eq!(body.paragraphs[0].runs[0].style, styled(1000));
        assert_eq!(body.paragraphs[0].runs[1].text, "");
        assert_eq!(body.paragraphs[0].runs[1].style, styled(1200));
        assert_eq!(body.paragraphs[1].runs[0].text, "");
    }

    #[test]
    fn test_set_text_on_empty_body() {
        let mut body = TextBody::default();
        body.set_text("Question");
        assert_eq!(body.text(), "Question");
        assert_eq!(body.paragraphs[0].runs[0].style, RunStyle::default());
    }

    #[test]
    fn test_shape_lookup_by_key_and_name() {
        let mut deck = Deck::new();
        let slide = deck.add_slide();
        slide.push(Shape::new("Title", ShapeContent::Text(TextBody::default())));
        slide.push(Shape::new("TEXT_BASE", ShapeContent::Text(TextBody::default())));

        assert_eq!(deck.shape(ShapeKey::new(1, 2)).map(|s| s.name.as_str()), Some("TEXT_BASE"));
        assert!(deck.shape(ShapeKey::new(2, 1)).is_none());
        assert!(deck.shape(ShapeKey::new(0, 1)).is_none());
        assert_eq!(deck.find_on_slide(1, "TEXT_BASE"), Some(ShapeKey::new(1, 2)));
        assert_eq!(deck.find_on_slide(1, "1:1"), Some(ShapeKey::new(1, 1)));
        assert_eq!(deck.find_on_slide(1, "TEXT_QUESTION"), None);
    }

    #[test]
    fn test_find_on_slide_stays_on_its_slide() {
        let mut deck = Deck::new();
        deck.add_slide()
            .push(Shape::new("TEXT_BASE", ShapeContent::Text(TextBody::default())));
        deck.add_slide()
            .push(Shape::new("CHART", ShapeContent::Other));

        assert_eq!(deck.find_on_slide(2, "1:1"), None);
        assert_eq!(deck.find_on_slide(2, "TEXT_BASE"), None);
        assert_eq!(deck.find_on_slide(2, "2:1"), Some(ShapeKey::new(2, 1)));
    }

    #[test]
    fn test_frame_inches() {
        let frame = Frame::inches(0.5, 1.0, 9.0, 0.4);
        assert_eq!(frame.x, 457_200);
        assert_eq!(frame.y, 914_400);
        assert_eq!(frame.cx, 8_229_600);
        assert_eq!(frame.cy, 365_760);
    }
}
