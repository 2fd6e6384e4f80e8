//! PPTX package: load a deck from the ZIP container, patch it, save it.
//!
//! Every archive entry is kept as raw bytes in archive order. Applying an
//! edited deck rewrites only the slide and chart parts whose model changed;
//! all other entries are written back byte-for-byte.

use crate::chart::{patch_chart, read_chart};
use crate::slide::{patch_shapes, read_shapes, RawContent};
use crate::xml::{attr, local_name, xml_error};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use xtab_core::deck::{Deck, Shape, ShapeContent, Slide};
use xtab_core::{Error, Result};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const REL_SLIDE: &str = "/relationships/slide";
const REL_CHART: &str = "/relationships/chart";

struct Part {
    name: String,
    data: Vec<u8>,
}

/// A relationship entry from a `.rels` part.
#[derive(Debug, Clone, PartialEq)]
struct Relationship {
    id: String,
    rel_type: String,
    target: String,
}

/// Where the parts of one slide live.
#[derive(Debug, Clone)]
struct SlidePart {
    path: String,
    /// Chart part for each shape that is a chart.
    charts: Vec<Option<String>>,
}

/// An opened `.pptx` file.
pub struct PptxPackage {
    parts: Vec<Part>,
    slides: Vec<SlidePart>,
    deck: Deck,
}

impl PptxPackage {
    /// Open a package from a reader.
    pub fn open<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| Error::ZipError(format!("Failed to read entry {}: {}", i, e)))?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            parts.push(Part {
                name: file.name().to_string(),
                data,
            });
        }

        let mut package = Self {
            parts,
            slides: Vec::new(),
            deck: Deck::new(),
        };
        package.load()?;
        Ok(package)
    }

    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Opening {}", path.display());
        Self::open(BufReader::new(File::open(path)?))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::open(Cursor::new(bytes))
    }

    /// The deck as currently stored in the package.
    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    fn part_text(&self, name: &str) -> Result<String> {
        let part = self
            .part(name)
            .ok_or_else(|| Error::PptxParseError(format!("Part '{}' not found in package", name)))?;
        String::from_utf8(part.data.clone())
            .map_err(|e| Error::PptxParseError(format!("Part '{}' is not UTF-8: {}", name, e)))
    }

    fn set_part(&mut self, name: &str, text: String) {
        if let Some(part) = self.parts.iter_mut().find(|p| p.name == name) {
            part.data = text.into_bytes();
        }
    }

    /// Relationships of `part`, empty when it has none.
    fn relationships(&self, part: &str) -> Result<Vec<Relationship>> {
        let rels = rels_path(part);
        if self.part(&rels).is_none() {
            return Ok(Vec::new());
        }
        parse_relationships(&self.part_text(&rels)?)
    }

    fn load(&mut self) -> Result<()> {
        let slide_paths = self.slide_order()?;
        let mut deck = Deck::new();
        let mut slides = Vec::with_capacity(slide_paths.len());

        for path in slide_paths {
            let rels = self.relationships(&path)?;
            let raw = read_shapes(&self.part_text(&path)?)?;
            let mut slide = Slide::default();
            let mut charts = Vec::with_capacity(raw.len());

            for shape in raw {
                let (content, chart_path) = match shape.content {
                    RawContent::Text(body) => (ShapeContent::Text(body), None),
                    RawContent::Table(grid) => (ShapeContent::Table(grid), None),
                    RawContent::Chart(rel_id) => match self.load_chart(&path, &rels, &rel_id) {
                        Ok((chart_path, chart)) => (ShapeContent::Chart(chart), Some(chart_path)),
                        Err(e) => {
                            log::warn!("{}: chart '{}' unreadable: {}", path, shape.name, e);
                            (ShapeContent::Other, None)
                        }
                    },
                    RawContent::Other => (ShapeContent::Other, None),
                };
                let mut model = Shape::new(shape.name, content);
                model.alt_text = shape.alt_text;
                model.frame = shape.frame;
                slide.push(model);
                charts.push(chart_path);
            }

            log::debug!("{}: {} shapes", path, slide.shapes.len());
            deck.slides.push(slide);
            slides.push(SlidePart { path, charts });
        }

        self.deck = deck;
        self.slides = slides;
        Ok(())
    }

    fn load_chart(
        &self,
        slide_path: &str,
        rels: &[Relationship],
        rel_id: &str,
    ) -> Result<(String, xtab_core::deck::Chart)> {
        let rel = rels
            .iter()
            .find(|r| r.id == rel_id && r.rel_type.ends_with(REL_CHART))
            .ok_or_else(|| Error::PptxParseError(format!("No chart relationship '{}'", rel_id)))?;
        let path = resolve_target(parent_dir(slide_path), &rel.target);
        let chart = read_chart(&self.part_text(&path)?)?;
        Ok((path, chart))
    }

    /// Slide part paths in presentation order.
    ///
    /// The order comes from `p:sldIdLst`; packages without one fall back to
    /// the number in each slide's relationship id or file name.
    fn slide_order(&self) -> Result<Vec<String>> {
        let presentation = "ppt/presentation.xml";
        let rels = self.relationships(presentation)?;
        let target = |rel: &Relationship| resolve_target(parent_dir(presentation), &rel.target);

        let ids = slide_id_list(&self.part_text(presentation)?)?;
        if !ids.is_empty() {
            return Ok(ids
                .iter()
                .filter_map(|id| rels.iter().find(|r| &r.id == id))
                .map(target)
                .collect());
        }

        let mut slides: Vec<(String, Option<usize>)> = rels
            .iter()
            .filter(|r| r.rel_type.ends_with(REL_SLIDE))
            .map(|r| {
                let order = extract_slide_number(&r.id).or_else(|| extract_slide_number(&r.target));
                (target(r), order)
            })
            .collect();
        slides.sort_by(|a, b| match (a.1, b.1) {
            (Some(na), Some(nb)) => na.cmp(&nb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });
        Ok(slides.into_iter().map(|(path, _)| path).collect())
    }

    /// Write `deck` into the package. The deck must have the package's
    /// slides and shapes; only alt text and data content may differ.
    ///
    /// Returns the number of parts rewritten.
    pub fn apply(&mut self, deck: &Deck) -> Result<usize> {
        if deck.slides.len() != self.deck.slides.len() {
            return Err(Error::PptxParseError(format!(
                "deck has {} slides, package has {}",
                deck.slides.len(),
                self.deck.slides.len()
            )));
        }

        let mut rewritten = 0;
        for (index, slide_part) in self.slides.clone().iter().enumerate() {
            let before = self.deck.slides[index].clone();
            let after = &deck.slides[index];
            if before == *after {
                continue;
            }
            if before.shapes.len() != after.shapes.len() {
                return Err(Error::PptxParseError(format!(
                    "slide {} has {} shapes in the deck, {} in the package",
                    index + 1,
                    after.shapes.len(),
                    before.shapes.len()
                )));
            }

            let xml = self.part_text(&slide_part.path)?;
            let patched = patch_shapes(&xml, &before, after)?;
            if patched != xml {
                self.set_part(&slide_part.path, patched);
                rewritten += 1;
            }

            let charts: Vec<(String, xtab_core::deck::Chart)> = slide_part
                .charts
                .iter()
                .zip(before.shapes.iter().zip(&after.shapes))
                .filter_map(|(path, (old, new))| match (path, &old.content, &new.content) {
                    (Some(path), ShapeContent::Chart(old), ShapeContent::Chart(new)) if old != new => {
                        Some((path.clone(), new.clone()))
                    }
                    _ => None,
                })
                .collect();
            for (path, chart) in charts {
                let xml = self.part_text(&path)?;
                self.set_part(&path, patch_chart(&xml, &chart)?);
                rewritten += 1;
            }
        }

        self.deck = deck.clone();
        log::debug!("Rewrote {} parts", rewritten);
        Ok(rewritten)
    }

    /// Write the package as a ZIP archive, entries in their original order.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        write_parts(
            writer,
            self.parts.iter().map(|p| (p.name.as_str(), p.data.as_slice())),
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        log::debug!("Saving {}", path.display());
        self.write_to(BufWriter::new(File::create(path)?))
    }
}

/// Write named entries into a new ZIP archive.
pub(crate) fn write_parts<'p, W: Write + Seek>(
    writer: W,
    parts: impl IntoIterator<Item = (&'p str, &'p [u8])>,
) -> Result<()> {
    let mut zip = ZipWriter::new(writer);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in parts {
        zip.start_file(name, options)
            .map_err(|e| Error::ZipError(format!("Failed to add '{}': {}", name, e)))?;
        zip.write_all(data)?;
    }
    zip.finish()
        .map_err(|e| Error::ZipError(format!("Failed to finish ZIP: {}", e)))?;
    Ok(())
}

fn parse_relationships(xml: &str) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_str(xml);
    let mut rels = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                rels.push(Relationship {
                    id: attr(e, b"Id").unwrap_or_default(),
                    rel_type: attr(e, b"Type").unwrap_or_default(),
                    target: attr(e, b"Target").unwrap_or_default(),
                });
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("relationships", e)),
            _ => {}
        }
    }
    Ok(rels)
}

/// Relationship ids of `p:sldId` entries, in order.
fn slide_id_list(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut ids = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"sldId" =>
            {
                // the namespaced `r:id`, not the numeric `id`
                let rel_id = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() != b"id" && local_name(a.key.as_ref()) == b"id")
                    .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                if let Some(id) = rel_id {
                    ids.push(id);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("presentation", e)),
            _ => {}
        }
    }
    Ok(ids)
}

/// `ppt/slides/slide1.xml` -> `ppt/slides/_rels/slide1.xml.rels`.
fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

fn parent_dir(part: &str) -> &str {
    part.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Extract a slide number from a string like "rId2" or "slide3.xml".
fn extract_slide_number(s: &str) -> Option<usize> {
    let s = s.trim_end_matches(".xml").trim_end_matches(".rels");
    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_slide_number() {
        assert_eq!(extract_slide_number("rId1"), Some(1));
        assert_eq!(extract_slide_number("rId12"), Some(12));
        assert_eq!(extract_slide_number("slide123.xml"), Some(123));
        assert_eq!(extract_slide_number("nodigits"), None);
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("ppt", "slides/slide1.xml"), "ppt/slides/slide1.xml");
        assert_eq!(
            resolve_target("ppt/slides", "../charts/chart2.xml"),
            "ppt/charts/chart2.xml"
        );
        assert_eq!(resolve_target("ppt/slides", "/ppt/media/a.png"), "ppt/media/a.png");
        assert_eq!(rels_path("ppt/slides/slide1.xml"), "ppt/slides/_rels/slide1.xml.rels");
    }

    #[test]
    fn test_slide_id_list_order() {
        let xml = r#"<p:presentation xmlns:p="p" xmlns:r="r"><p:sldIdLst><p:sldId id="257" r:id="rId9"/><p:sldId id="256" r:id="rId3"/></p:sldIdLst></p:presentation>"#;
        assert_eq!(slide_id_list(xml).unwrap(), vec!["rId9", "rId3"]);
    }
}
