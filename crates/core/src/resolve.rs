//! Resolution: pairing shapes with the mapping records in their alt text.
//!
//! Only explicit metadata is trusted here. A shape whose alt text is missing
//! or unreadable is reported as unmapped and never bound by guesswork; the
//! creation-time binding lives with the exporter, which builds records
//! directly for the shapes it creates.

use crate::codec::{self, ParseError};
use crate::deck::{Deck, ShapeKind};
use crate::mapping::{MappingRecord, ShapeKey};
use std::fmt;

/// Name prefixes used by hand-built decks for shapes meant to be mapped.
const MAPPABLE_NAME_PREFIXES: &[&str] = &["CHART_", "TABLE_", "TEXT_"];

/// A shape bound to a decoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedShape {
    pub key: ShapeKey,
    pub name: String,
    pub shape_kind: ShapeKind,
    pub record: MappingRecord,
}

/// Why a shape has no binding.
#[derive(Debug, Clone, PartialEq)]
pub enum UnmappedReason {
    /// The alt-text slot is empty.
    NoMetadata,
    /// The alt text is ordinary description text.
    NotAMapping,
    /// The alt text looks like a mapping but does not decode.
    Invalid(ParseError),
}

impl fmt::Display for UnmappedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmappedReason::NoMetadata => f.write_str("no alt text"),
            UnmappedReason::NotAMapping => f.write_str("alt text holds no mapping"),
            UnmappedReason::Invalid(err) => write!(f, "unreadable mapping: {}", err),
        }
    }
}

/// A shape left out of resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Unmapped {
    pub key: ShapeKey,
    pub name: String,
    pub reason: UnmappedReason,
}

/// Result of resolving a whole deck.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub mapped: Vec<ResolvedShape>,
    pub unmapped: Vec<Unmapped>,
}

impl Resolution {
    /// Record bound to `key`, if any.
    pub fn record(&self, key: ShapeKey) -> Option<&MappingRecord> {
        self.mapped.iter().find(|r| r.key == key).map(|r| &r.record)
    }
}

/// Decode one alt-text slot.
pub fn resolve_alt_text(alt_text: Option<&str>) -> Result<MappingRecord, UnmappedReason> {
    let text = match alt_text {
        Some(t) if !t.trim().is_empty() => t,
        _ => return Err(UnmappedReason::NoMetadata),
    };
    if !codec::looks_like_mapping(text) {
        return Err(UnmappedReason::NotAMapping);
    }
    codec::decode(text).map_err(UnmappedReason::Invalid)
}

/// Resolve every shape of `deck` from its alt text.
pub fn resolve(deck: &Deck) -> Resolution {
    let mut resolution = Resolution::default();
    for (key, shape) in deck.shapes() {
        match resolve_alt_text(shape.alt_text.as_deref()) {
            Ok(record) => {
                log::debug!("{} '{}' -> {} '{}'", key, shape.name, record.kind, record.table_title);
                resolution.mapped.push(ResolvedShape {
                    key,
                    name: shape.name.clone(),
                    shape_kind: shape.kind(),
                    record,
                });
            }
            Err(reason) => {
                if let UnmappedReason::Invalid(err) = &reason {
                    log::warn!("{} '{}': {}", key, shape.name, err);
                }
                resolution.unmapped.push(Unmapped {
                    key,
                    name: shape.name.clone(),
                    reason,
                });
            }
        }
    }
    resolution
}

/// Mapping status of a shape, for listings.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingStatus {
    Mapped(MappingRecord),
    Invalid(ParseError),
    /// Named like a mapped shape (`CHART_…`) but carrying no record.
    NamedButUnmapped,
    Unmapped,
}

impl MappingStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MappingStatus::Mapped(_) => "mapped",
            MappingStatus::Invalid(_) => "invalid",
            MappingStatus::NamedButUnmapped => "named_but_unmapped",
            MappingStatus::Unmapped => "unmapped",
        }
    }
}

/// One row of a shape inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeSummary {
    pub key: ShapeKey,
    pub name: String,
    pub kind: ShapeKind,
    pub status: MappingStatus,
}

/// List every shape with its kind and mapping status.
pub fn inventory(deck: &Deck) -> Vec<ShapeSummary> {
    deck.shapes()
        .map(|(key, shape)| {
            let status = match resolve_alt_text(shape.alt_text.as_deref()) {
                Ok(record) => MappingStatus::Mapped(record),
                Err(UnmappedReason::Invalid(err)) => MappingStatus::Invalid(err),
                Err(_)
                    if MAPPABLE_NAME_PREFIXES
                        .iter()
                        .any(|p| shape.name.starts_with(p)) =>
                {
                    MappingStatus::NamedButUnmapped
                }
                Err(_) => MappingStatus::Unmapped,
            };
            ShapeSummary {
                key,
                name: shape.name.clone(),
                kind: shape.kind(),
                status,
            }
        })
        .collect()
}
