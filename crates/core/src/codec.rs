//! Alt-text codec for mapping records.
//!
//! Records are stored in a shape's alt text as flat `key: value` lines so they
//! stay readable and editable inside PowerPoint:
//!
//! ```text
//! type: chart
//! table_title: Q Age
//! column: Total
//! exclude_rows: base, mean, average, avg
//! auto_update: yes
//! ```
//!
//! Decoding ignores unknown keys and line order, so newer writers can add
//! fields without breaking older readers.
//!
//! Values are escaped so any label fits on one line: `\\` for a backslash,
//! `\n` and `\r` for line breaks, and `\,` for a comma inside a list item.

use crate::mapping::{ExcludeRows, MappingKind, MappingRecord, Selector, TOTAL_COLUMN};
use std::collections::BTreeMap;
use thiserror::Error;

pub const KEY_TYPE: &str = "type";
pub const KEY_TABLE_TITLE: &str = "table_title";
pub const KEY_COLUMN: &str = "column";
pub const KEY_COLUMNS: &str = "columns";
pub const KEY_EXCLUDE_ROWS: &str = "exclude_rows";
pub const KEY_AUTO_UPDATE: &str = "auto_update";
pub const KEY_BIND_QUESTION: &str = "bind_question";
pub const KEY_BIND_BASE: &str = "bind_base";

/// Literal selecting every column of a table.
pub const WILDCARD: &str = "*";

/// Keys written by older tools, mapped to their current names.
const KEY_ALIASES: &[(&str, &str)] = &[
    ("kind", KEY_TYPE),
    ("table_key", KEY_TABLE_TITLE),
    ("col", KEY_COLUMN),
];

/// Reasons alt text cannot be read as a mapping record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing 'type' field")]
    MissingKind,

    #[error("unrecognized type '{0}' (expected chart, table, question_text or base_text)")]
    UnknownKind(String),

    #[error("missing 'table_title' field")]
    MissingTableTitle,

    #[error("chart mappings select exactly one column, got columns '{0}'")]
    ChartColumns(String),

    #[error("table mapping has an empty column list")]
    EmptyColumns,

    #[error("invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },
}

/// Parsed `columns` value.
enum ColumnsValue {
    Wildcard,
    List(Vec<String>),
}

fn parse_columns(value: &str) -> ColumnsValue {
    if value.trim() == WILDCARD {
        return ColumnsValue::Wildcard;
    }
    ColumnsValue::List(split_list(value))
}

/// Escape a single value for one alt-text line.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape one item of a comma-separated list.
pub fn escape_item(value: &str) -> String {
    escape(value).replace(',', "\\,")
}

/// Undo [`escape`] and [`escape_item`]. Unknown escapes are kept as written.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(next @ ('\\' | ',')) => out.push(next),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split a list on unescaped commas; items are trimmed, unescaped and
/// empty ones dropped.
pub fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(unescape)
        .collect()
}

fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| escape_item(item.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ParseError> {
    match value.trim().to_lowercase().as_str() {
        "yes" | "y" | "true" | "on" | "1" => Ok(true),
        "no" | "n" | "false" | "off" | "0" => Ok(false),
        _ => Err(ParseError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Canonical form of a field key: trimmed, lowercase, spaces and hyphens as
/// underscores, legacy aliases resolved.
pub fn canonical_key(key: &str) -> String {
    let key = key
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    KEY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(key)
}

/// Split alt text into canonical key/value fields.
///
/// Lines without a colon and fields with empty values are skipped; a key
/// that appears twice keeps its last value.
pub fn parse_fields(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for line in text.split(['\n', '\r']) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = canonical_key(key);
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        fields.insert(key, value.to_string());
    }
    fields
}

/// Whether the text carries mapping fields at all (as opposed to ordinary
/// accessibility alt text).
pub fn looks_like_mapping(text: &str) -> bool {
    let fields = parse_fields(text);
    fields.contains_key(KEY_TYPE) || fields.contains_key(KEY_TABLE_TITLE)
}

/// Build a record from canonical fields.
pub fn record_from_fields(fields: &BTreeMap<String, String>) -> Result<MappingRecord, ParseError> {
    let kind_value = fields.get(KEY_TYPE).ok_or(ParseError::MissingKind)?;
    let kind: MappingKind = kind_value
        .parse()
        .map_err(|_| ParseError::UnknownKind(kind_value.clone()))?;
    let table_title = fields
        .get(KEY_TABLE_TITLE)
        .map(|v| unescape(v))
        .ok_or(ParseError::MissingTableTitle)?;
    let columns = fields.get(KEY_COLUMNS).map(|v| parse_columns(v));

    let selector = match kind {
        MappingKind::Chart => match (fields.get(KEY_COLUMN), columns) {
            (_, Some(ColumnsValue::Wildcard)) => {
                return Err(ParseError::ChartColumns(WILDCARD.to_string()))
            }
            (_, Some(ColumnsValue::List(list))) if list.len() > 1 => {
                return Err(ParseError::ChartColumns(list.join(", ")))
            }
            (Some(column), _) => Selector::Column(unescape(column)),
            (None, Some(ColumnsValue::List(list))) => Selector::Column(
                list.into_iter()
                    .next()
                    .unwrap_or_else(|| TOTAL_COLUMN.to_string()),
            ),
            (None, None) => Selector::Column(TOTAL_COLUMN.to_string()),
        },
        // a stray `column` key on tables is ignored
        MappingKind::Table => match columns {
            None | Some(ColumnsValue::Wildcard) => Selector::AllColumns,
            Some(ColumnsValue::List(list)) if list.is_empty() => {
                return Err(ParseError::EmptyColumns)
            }
            Some(ColumnsValue::List(list)) => Selector::Columns(list),
        },
        MappingKind::QuestionText | MappingKind::BaseText => Selector::Unset,
    };

    let auto_update = match fields.get(KEY_AUTO_UPDATE) {
        Some(value) => parse_flag(KEY_AUTO_UPDATE, value)?,
        None => true,
    };

    Ok(MappingRecord {
        kind,
        table_title,
        selector,
        exclude_rows: fields
            .get(KEY_EXCLUDE_ROWS)
            .map(|v| ExcludeRows::new(split_list(v)))
            .unwrap_or_default(),
        auto_update,
        bind_question: fields.get(KEY_BIND_QUESTION).map(|v| unescape(v)),
        bind_base: fields.get(KEY_BIND_BASE).map(|v| unescape(v)),
    })
}

/// Fields of a record in their written order, values escaped.
pub fn record_to_fields(record: &MappingRecord) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        (KEY_TYPE, record.kind.as_str().to_string()),
        (KEY_TABLE_TITLE, escape(&record.table_title)),
    ];
    match &record.selector {
        Selector::Column(column) => fields.push((KEY_COLUMN, escape(column))),
        Selector::AllColumns => fields.push((KEY_COLUMNS, WILDCARD.to_string())),
        Selector::Columns(list) => fields.push((KEY_COLUMNS, join_list(list))),
        Selector::Unset => {}
    }
    if !record.exclude_rows.is_empty() {
        fields.push((KEY_EXCLUDE_ROWS, join_list(record.exclude_rows.patterns())));
    }
    fields.push((
        KEY_AUTO_UPDATE,
        if record.auto_update { "yes" } else { "no" }.to_string(),
    ));
    if let Some(target) = &record.bind_question {
        fields.push((KEY_BIND_QUESTION, escape(target)));
    }
    if let Some(target) = &record.bind_base {
        fields.push((KEY_BIND_BASE, escape(target)));
    }
    fields
}

/// Encode a record as alt text.
pub fn encode(record: &MappingRecord) -> String {
    record_to_fields(record)
        .into_iter()
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode alt text into a record.
pub fn decode(text: &str) -> Result<MappingRecord, ParseError> {
    record_from_fields(&parse_fields(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_encode_chart() {
        let record = MappingRecord::chart("Q Age", "Total")
            .with_exclude_rows(ExcludeRows::standard())
            .with_bind_question("TEXT_QUESTION")
            .with_bind_base("TEXT_BASE");
        assert_eq!(
            encode(&record),
            "type: chart\n\
             table_title: Q Age\n\
             column: Total\n\
             exclude_rows: base, mean, average, avg\n\
             auto_update: yes\n\
             bind_question: TEXT_QUESTION\n\
             bind_base: TEXT_BASE"
        );
    }

    #[test]
    fn test_decode_is_order_insensitive_and_ignores_unknown_keys() {
        let text = "auto_update: no\nfuture_field: 42\nTable Title: Q Gender\nTYPE: table\ncolumns: Male, Female";
        let record = decode(text).unwrap();
        assert_eq!(
            record,
            MappingRecord::table_with_columns("Q Gender", ["Male", "Female"]).with_auto_update(false)
        );
    }

    #[test]
    fn test_decode_legacy_export() {
        // what the first exporter wrote for tables: both `columns` and `column`
        let text = "type: table\ntable_title: Q Age\ncolumns: *\ncolumn: Total\nexclude_rows: base, mean, average, avg\nauto_update: yes";
        let record = decode(text).unwrap();
        assert_eq!(record.selector, Selector::AllColumns);
        assert_eq!(record.exclude_rows, ExcludeRows::standard());

        let text = "type: text_base\ntable_key: Q Age\r\ncol: Total";
        let record = decode(text).unwrap();
        assert_eq!(record.kind, MappingKind::BaseText);
        assert_eq!(record.table_title, "Q Age");
    }

    #[test]
    fn test_decode_title_with_colon() {
        let record = decode("type: chart\ntable_title: Q1: Age\ncolumn: Male").unwrap();
        assert_eq!(record.table_title, "Q1: Age");
        assert_eq!(record.selector, Selector::Column("Male".into()));
    }

    #[test]
    fn test_decode_chart_defaults_to_total() {
        let record = decode("type: chart\ntable_title: Q Age").unwrap();
        assert_eq!(record.selector, Selector::Column("Total".into()));
        assert!(record.auto_update);

        let record = decode("type: chart\ntable_title: Q Age\ncolumns: Female").unwrap();
        assert_eq!(record.selector, Selector::Column("Female".into()));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode("table_title: Q Age"), Err(ParseError::MissingKind));
        assert_eq!(
            decode("type: text_title\ntable_title: Q Age"),
            Err(ParseError::UnknownKind("text_title".into()))
        );
        assert_eq!(decode("type: chart"), Err(ParseError::MissingTableTitle));
        assert_eq!(
            decode("type: chart\ntable_title: Q Age\ncolumns: Male, Female"),
            Err(ParseError::ChartColumns("Male, Female".into()))
        );
        assert_eq!(
            decode("type: chart\ntable_title: Q Age\ncolumns: *"),
            Err(ParseError::ChartColumns("*".into()))
        );
        assert_eq!(
            decode("type: table\ntable_title: Q Age\ncolumns: , ,"),
            Err(ParseError::EmptyColumns)
        );
        assert!(matches!(
            decode("type: table\ntable_title: Q Age\nauto_update: maybe"),
            Err(ParseError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_labels_with_commas_and_line_breaks() {
        let record = MappingRecord::table_with_columns("Q Income", ["$50,000+", "Total"]);
        let text = encode(&record);
        assert!(text.contains("columns: $50\\,000+, Total"));
        assert_eq!(
            decode(&text).unwrap().selector,
            Selector::Columns(vec!["$50,000+".into(), "Total".into()])
        );

        let record = MappingRecord::chart("Q1. Age\n(single answer)", "C:\\data")
            .with_exclude_rows(ExcludeRows::new(["base, weighted", "mean"]));
        let text = encode(&record);
        assert_eq!(text.lines().count(), 5);
        assert!(text.contains("table_title: Q1. Age\\n(single answer)"));
        assert_eq!(decode(&text), Ok(record));
    }

    #[test]
    fn test_unescape_keeps_unknown_escapes() {
        assert_eq!(unescape("a\\tb\\"), "a\\tb\\");
        assert_eq!(split_list("a\\,b, c,, "), vec!["a,b", "c"]);
    }

    #[test]
    fn test_looks_like_mapping() {
        assert!(looks_like_mapping("type: chart"));
        assert!(looks_like_mapping("table_title: Q Age"));
        assert!(!looks_like_mapping("Bar chart of respondents by age"));
    }

    fn label() -> impl Strategy<Value = String> {
        "[A-Za-z0-9][A-Za-z0-9 ,?()\\\\\\n\\r-]{0,16}[A-Za-z0-9?)]"
    }

    fn record() -> impl Strategy<Value = MappingRecord> {
        let selector_and_kind = prop_oneof![
            label().prop_map(|c| (MappingKind::Chart, Selector::Column(c))),
            Just((MappingKind::Table, Selector::AllColumns)),
            prop::collection::vec(label(), 1..4)
                .prop_map(|cols| (MappingKind::Table, Selector::Columns(cols))),
            Just((MappingKind::QuestionText, Selector::Unset)),
            Just((MappingKind::BaseText, Selector::Unset)),
        ];
        (
            selector_and_kind,
            label(),
            prop::collection::vec("[a-z][a-z ,]{0,6}[a-z]", 0..4),
            any::<bool>(),
            prop::option::of(label()),
            prop::option::of(label()),
        )
            .prop_map(
                |((kind, selector), table_title, exclude, auto_update, bind_question, bind_base)| {
                    MappingRecord {
                        kind,
                        table_title,
                        selector,
                        exclude_rows: ExcludeRows::new(exclude),
                        auto_update,
                        bind_question,
                        bind_base,
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn test_round_trip(record in record()) {
            prop_assert_eq!(decode(&encode(&record)), Ok(record));
        }
    }
}
