//! PPTX (Office Open XML) backend for crosstab decks.
//!
//! A `.pptx` is a ZIP archive of XML parts. [`PptxPackage`] reads the slides
//! and charts into a [`Deck`](xtab_core::Deck) and writes changes back by
//! patching only the data-bearing XML, so everything else in the file is
//! kept byte for byte. [`DeckBuilder`] writes a fresh package for an
//! exported deck.

mod builder;
mod chart;
mod package;
mod slide;
mod xml;

pub use builder::{DeckBuilder, SLIDE_HEIGHT, SLIDE_WIDTH};
pub use package::PptxPackage;

use std::path::Path;
use xtab_core::{Deck, Result};

/// Build a new `.pptx` for `deck` and return its bytes.
pub fn build(deck: &Deck) -> Result<Vec<u8>> {
    DeckBuilder::new(deck).to_bytes()
}

/// Build a new `.pptx` for `deck` at `path`.
pub fn save_deck(deck: &Deck, path: impl AsRef<Path>) -> Result<()> {
    DeckBuilder::new(deck).save(path)
}
