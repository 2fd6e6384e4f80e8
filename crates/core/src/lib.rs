//! Core model and engine for crosstab-driven slide decks: the crosstab
//! dataset, mapping records kept in shape alt text, and the resolution,
//! validation, reconciliation and export steps built on them.

pub mod codec;
pub mod dataset;
pub mod deck;
pub mod error;
pub mod export;
pub mod mapping;
pub mod normalize;
pub mod reconcile;
pub mod resolve;
pub mod template;
pub mod validate;

pub use codec::ParseError;
pub use dataset::{CellValue, CrosstabDataset, CrosstabTable};
pub use deck::{Deck, Shape, ShapeContent, ShapeKind};
pub use error::{Error, Result};
pub use export::{Export, ExportOptions, Exporter, TableOptions, Visual};
pub use mapping::{ExcludeRows, MappingKind, MappingRecord, Selector, ShapeKey};
pub use reconcile::{ReconcileReport, Reconciler};
pub use resolve::{inventory, resolve, MappingStatus, Resolution};
pub use template::{ApplyReport, MappingTemplate};
pub use validate::{validate, validate_deck, Issue, ValidationReport};
