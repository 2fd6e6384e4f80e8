//! Editable JSON mapping templates.
//!
//! A template lists the deck's chart and table shapes by key with their
//! mapping fields, so records can be written by hand and then applied to the
//! deck's alt text in one go.

use crate::codec::{self, ParseError, KEY_TABLE_TITLE};
use crate::dataset::CrosstabDataset;
use crate::deck::{Deck, ShapeKind};
use crate::error::{self, Result};
use crate::mapping::{ExcludeRows, MappingRecord, ShapeKey, TOTAL_COLUMN};
use crate::resolve::{inventory, MappingStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Table title written into placeholder entries.
pub const PLACEHOLDER_TABLE: &str = "REPLACE_WITH_TABLE_TITLE";

/// A dataset table, listed for reference while editing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableTable {
    pub title: String,
    pub columns: Vec<String>,
}

/// One shape's mapping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub slide: usize,
    pub shape: usize,
    /// Shape name when the template was generated; informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl TemplateEntry {
    pub fn key(&self) -> ShapeKey {
        ShapeKey::new(self.slide, self.shape)
    }

    fn from_record(key: ShapeKey, name: &str, record: &MappingRecord) -> Self {
        Self {
            slide: key.slide,
            shape: key.shape,
            name: Some(name.to_string()),
            fields: codec::record_to_fields(record)
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v)))
                .collect(),
        }
    }

    /// Fields as codec text: canonical keys, empty values dropped.
    pub fn text_fields(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter_map(|(key, value)| {
                let text = value_text(value)?;
                let text = text.trim();
                (!text.is_empty()).then(|| (codec::canonical_key(key), text.to_string()))
            })
            .collect()
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(true) => Some("yes".to_string()),
        Value::Bool(false) => Some("no".to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        // array items are plain labels; commas inside them are escaped
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(value_text)
                .map(|item| codec::escape_item(&item))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Why a template entry was not applied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectReason {
    #[error("no shape at {0}")]
    UnknownShape(ShapeKey),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("table_title still holds the placeholder")]
    Placeholder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub key: ShapeKey,
    pub reason: RejectReason,
}

/// Outcome of applying a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub applied: Vec<ShapeKey>,
    pub rejected: Vec<Rejection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingTemplate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_tables: Vec<AvailableTable>,
    #[serde(default)]
    pub mappings: Vec<TemplateEntry>,
}

impl MappingTemplate {
    /// Template for `deck`: existing records as they are, placeholders for
    /// chart and table shapes without one.
    pub fn generate(deck: &Deck, dataset: Option<&CrosstabDataset>) -> Self {
        let available_tables = dataset
            .map(|d| {
                d.tables()
                    .iter()
                    .map(|t| AvailableTable {
                        title: t.title().to_string(),
                        columns: t.columns().to_vec(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mappings = inventory(deck)
            .into_iter()
            .filter_map(|summary| match &summary.status {
                MappingStatus::Mapped(record) => Some(TemplateEntry::from_record(
                    summary.key,
                    &summary.name,
                    record,
                )),
                _ => {
                    let record = match summary.kind {
                        ShapeKind::Chart => MappingRecord::chart(PLACEHOLDER_TABLE, TOTAL_COLUMN),
                        ShapeKind::Table => MappingRecord::table(PLACEHOLDER_TABLE),
                        _ => return None,
                    };
                    let record = record.with_exclude_rows(ExcludeRows::standard());
                    Some(TemplateEntry::from_record(summary.key, &summary.name, &record))
                }
            })
            .collect();

        Self {
            available_tables,
            mappings,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| error::Error::TemplateError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| error::Error::TemplateError(e.to_string()))
    }

    /// Write every entry's record into its shape's alt text.
    ///
    /// Entries are checked one at a time; a rejected entry leaves its shape
    /// alone and does not stop the rest.
    pub fn apply(&self, deck: &mut Deck) -> ApplyReport {
        let mut report = ApplyReport::default();
        for entry in &self.mappings {
            let key = entry.key();
            match Self::encode_entry(entry) {
                Ok(text) => {
                    let Some(shape) = deck.shape_mut(key) else {
                        report.rejected.push(Rejection {
                            key,
                            reason: RejectReason::UnknownShape(key),
                        });
                        continue;
                    };
                    if let Some(name) = entry.name.as_deref().filter(|n| *n != shape.name) {
                        log::info!("{}: template names '{}', shape is '{}'", key, name, shape.name);
                    }
                    shape.alt_text = Some(text);
                    report.applied.push(key);
                }
                Err(reason) => {
                    log::warn!("{}: {}", key, reason);
                    report.rejected.push(Rejection { key, reason });
                }
            }
        }
        report
    }

    fn encode_entry(entry: &TemplateEntry) -> std::result::Result<String, RejectReason> {
        let fields = entry.text_fields();
        if fields.get(KEY_TABLE_TITLE).map(String::as_str) == Some(PLACEHOLDER_TABLE) {
            return Err(RejectReason::Placeholder);
        }
        let record = codec::record_from_fields(&fields)?;
        Ok(codec::encode(&record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::dataset;
    use crate::deck::{Chart, ChartSeries, ChartType, Shape, ShapeContent, TableGrid, TextBody};
    use crate::mapping::Selector;
    use pretty_assertions::assert_eq;

    fn deck() -> Deck {
        let mut deck = Deck::new();
        let slide = deck.add_slide();
        slide.push(Shape::new("Title", ShapeContent::Text(TextBody::default())));
        slide.push(Shape::new(
            "Chart 3",
            ShapeContent::Chart(Chart::single_series(
                ChartType::Column,
                vec![],
                ChartSeries {
                    name: "S".into(),
                    values: vec![],
                    color: None,
                },
            )),
        ));
        slide.push(
            Shape::new("TABLE_age", ShapeContent::Table(TableGrid::default()))
                .with_alt_text("type: table\ntable_title: Q Age\ncolumns: Male, Total"),
        );
        deck
    }

    #[test]
    fn test_generate_prefills_and_placeholders() {
        let template = MappingTemplate::generate(&deck(), Some(&dataset()));
        assert_eq!(template.available_tables.len(), 2);
        assert_eq!(template.available_tables[0].columns, vec!["Male", "Female", "Total"]);

        let keys: Vec<String> = template.mappings.iter().map(|e| e.key().to_string()).collect();
        assert_eq!(keys, vec!["1:2", "1:3"]);
        assert_eq!(
            template.mappings[0].text_fields().get("table_title").map(String::as_str),
            Some(PLACEHOLDER_TABLE)
        );
        assert_eq!(
            template.mappings[1].text_fields().get("columns").map(String::as_str),
            Some("Male, Total")
        );
    }

    #[test]
    fn test_json_shape() {
        let template = MappingTemplate::from_json(
            r#"{
                "mappings": [
                    {"slide": 1, "shape": 2, "name": "Chart 3", "type": "chart",
                     "table_title": "Q Age", "column": "Male", "auto_update": false,
                     "exclude_rows": ["base", "mean"]}
                ]
            }"#,
        )
        .unwrap();
        let fields = template.mappings[0].text_fields();
        assert_eq!(fields.get("auto_update").map(String::as_str), Some("no"));
        assert_eq!(fields.get("exclude_rows").map(String::as_str), Some("base, mean"));
        assert!(!fields.contains_key("name"));

        let json = template.to_json().unwrap();
        assert!(json.contains("\"table_title\": \"Q Age\""));
        assert!(!json.contains("available_tables"));
    }

    #[test]
    fn test_malformed_template_is_a_template_error() {
        let err = MappingTemplate::from_json(r#"{"mappings": [{"slide": "one"}]}"#).unwrap_err();
        assert!(matches!(err, error::Error::TemplateError(_)), "{:?}", err);
    }

    #[test]
    fn test_array_items_keep_commas() {
        let mut deck = deck();
        let template = MappingTemplate::from_json(
            r#"{"mappings": [{"slide": 1, "shape": 3, "type": "table",
                "table_title": "Q Income", "columns": ["$50,000+", "Total"]}]}"#,
        )
        .unwrap();
        assert_eq!(template.apply(&mut deck).applied, vec![ShapeKey::new(1, 3)]);

        let alt_text = deck.shape(ShapeKey::new(1, 3)).unwrap().alt_text.clone().unwrap();
        assert_eq!(
            codec::decode(&alt_text).unwrap().selector,
            Selector::Columns(vec!["$50,000+".into(), "Total".into()])
        );
    }

    #[test]
    fn test_apply_rejects_per_entry() {
        let mut deck = deck();
        let mut template = MappingTemplate::generate(&deck, None);
        let json = r#"{"slide": 1, "shape": 2, "name": "Chart 3", "type": "chart", "table_title": "Q Age", "column": "Male"}"#;
        let bad_kind = r#"{"slide": 1, "shape": 1, "type": "headline", "table_title": "Q Age"}"#;
        let missing = r#"{"slide": 4, "shape": 1, "type": "table", "table_title": "Q Age"}"#;
        let placeholder = template.mappings[0].clone();
        template.mappings = vec![
            serde_json::from_str(json).unwrap(),
            serde_json::from_str(bad_kind).unwrap(),
            serde_json::from_str(missing).unwrap(),
            placeholder,
        ];

        let report = template.apply(&mut deck);
        assert_eq!(report.applied, vec![ShapeKey::new(1, 2)]);
        let reasons: Vec<RejectReason> = report.rejected.into_iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                RejectReason::Parse(ParseError::UnknownKind("headline".into())),
                RejectReason::UnknownShape(ShapeKey::new(4, 1)),
                RejectReason::Placeholder,
            ]
        );

        let record = codec::decode(deck.shape(ShapeKey::new(1, 2)).unwrap().alt_text.as_deref().unwrap())
            .unwrap();
        assert_eq!(record.selector, Selector::Column("Male".into()));
        assert!(deck.shape(ShapeKey::new(1, 1)).unwrap().alt_text.is_none());
    }
}
