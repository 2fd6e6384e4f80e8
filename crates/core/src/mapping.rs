//! Mapping records: what data a shape displays and how it is refreshed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Row exclusions written by the exporter: base, mean and average rows.
pub const DEFAULT_EXCLUSIONS: &str = "base, mean, average, avg";

/// Column name selecting the total-like column of a table.
pub const TOTAL_COLUMN: &str = "Total";

/// Stable identity of a shape: 1-based slide number and 1-based position
/// within the slide's shape tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeKey {
    pub slide: usize,
    pub shape: usize,
}

impl ShapeKey {
    pub fn new(slide: usize, shape: usize) -> Self {
        Self { slide, shape }
    }
}

impl fmt::Display for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.slide, self.shape)
    }
}

impl FromStr for ShapeKey {
    type Err = String;

    /// Parse `slide:shape`, e.g. `3:2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slide, shape) = s
            .split_once(':')
            .ok_or_else(|| format!("expected 'slide:shape', got '{}'", s))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("invalid shape key '{}'", s))
        };
        Ok(Self::new(parse(slide)?, parse(shape)?))
    }
}

/// What a mapped shape displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    Chart,
    Table,
    QuestionText,
    BaseText,
}

impl MappingKind {
    /// Value written to the `type` key.
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingKind::Chart => "chart",
            MappingKind::Table => "table",
            MappingKind::QuestionText => "question_text",
            MappingKind::BaseText => "base_text",
        }
    }

    /// Whether this kind refreshes a text shape.
    pub fn is_text(&self) -> bool {
        matches!(self, MappingKind::QuestionText | MappingKind::BaseText)
    }
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chart" => Ok(MappingKind::Chart),
            "table" => Ok(MappingKind::Table),
            "question_text" => Ok(MappingKind::QuestionText),
            // `text_base` is what older exports wrote
            "base_text" | "text_base" => Ok(MappingKind::BaseText),
            _ => Err(()),
        }
    }
}

/// Which columns of the table a shape shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// One column, used by charts.
    Column(String),
    /// Every column in declared order (`columns: *`).
    AllColumns,
    /// An explicit ordered list of columns.
    Columns(Vec<String>),
    /// Text mappings do not select columns.
    Unset,
}

/// Case-insensitive row-label substrings removed before charting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExcludeRows(Vec<String>);

impl ExcludeRows {
    /// Build from patterns, lowercasing, trimming and dropping duplicates.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim().to_lowercase();
            if !pattern.is_empty() && !out.contains(&pattern) {
                out.push(pattern);
            }
        }
        Self(out)
    }

    /// Parse a comma-separated list such as `base, mean`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// The exporter's default exclusions.
    pub fn standard() -> Self {
        Self::parse(DEFAULT_EXCLUSIONS)
    }

    /// Whether `label` contains any pattern, ignoring case.
    pub fn matches(&self, label: &str) -> bool {
        if self.0.is_empty() {
            return false;
        }
        let label = label.to_lowercase();
        self.0.iter().any(|p| label.contains(p.as_str()))
    }

    pub fn patterns(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ExcludeRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Binding of one shape to a data selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub kind: MappingKind,
    /// Title of the table in the dataset; resolved at use time.
    pub table_title: String,
    pub selector: Selector,
    pub exclude_rows: ExcludeRows,
    /// When false the shape is never rewritten.
    pub auto_update: bool,
    /// Companion question text shape, by name or `slide:shape` key.
    pub bind_question: Option<String>,
    /// Companion base text shape, by name or `slide:shape` key.
    pub bind_base: Option<String>,
}

impl MappingRecord {
    fn with_selector(kind: MappingKind, table_title: impl Into<String>, selector: Selector) -> Self {
        Self {
            kind,
            table_title: table_title.into(),
            selector,
            exclude_rows: ExcludeRows::default(),
            auto_update: true,
            bind_question: None,
            bind_base: None,
        }
    }

    /// Chart plotting one column of a table.
    pub fn chart(table_title: impl Into<String>, column: impl Into<String>) -> Self {
        Self::with_selector(MappingKind::Chart, table_title, Selector::Column(column.into()))
    }

    /// Table showing every column.
    pub fn table(table_title: impl Into<String>) -> Self {
        Self::with_selector(MappingKind::Table, table_title, Selector::AllColumns)
    }

    /// Table showing the listed columns in the given order.
    pub fn table_with_columns<I, S>(table_title: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_selector(
            MappingKind::Table,
            table_title,
            Selector::Columns(columns.into_iter().map(Into::into).collect()),
        )
    }

    pub fn question_text(table_title: impl Into<String>) -> Self {
        Self::with_selector(MappingKind::QuestionText, table_title, Selector::Unset)
    }

    pub fn base_text(table_title: impl Into<String>) -> Self {
        Self::with_selector(MappingKind::BaseText, table_title, Selector::Unset)
    }

    pub fn with_exclude_rows(mut self, exclude: ExcludeRows) -> Self {
        self.exclude_rows = exclude;
        self
    }

    pub fn with_auto_update(mut self, auto_update: bool) -> Self {
        self.auto_update = auto_update;
        self
    }

    pub fn with_bind_question(mut self, target: impl Into<String>) -> Self {
        self.bind_question = Some(target.into());
        self
    }

    pub fn with_bind_base(mut self, target: impl Into<String>) -> Self {
        self.bind_base = Some(target.into());
        self
    }

    /// Column labels named by the selector, if any.
    pub fn selected_columns(&self) -> Vec<&str> {
        match &self.selector {
            Selector::Column(c) => vec![c.as_str()],
            Selector::Columns(cols) => cols.iter().map(String::as_str).collect(),
            Selector::AllColumns | Selector::Unset => Vec::new(),
        }
    }

    /// Companion bindings that are set, as (binding, target) pairs.
    pub fn bindings(&self) -> Vec<(MappingKind, &str)> {
        let mut out = Vec::new();
        if let Some(target) = &self.bind_question {
            out.push((MappingKind::QuestionText, target.as_str()));
        }
        if let Some(target) = &self.bind_base {
            out.push((MappingKind::BaseText, target.as_str()));
        }
        out
    }
}
