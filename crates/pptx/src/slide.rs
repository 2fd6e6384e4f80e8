//! Slide part reading and in-place patching.
//!
//! Shapes are the direct children of the slide's `p:spTree`, numbered in
//! document order. Group shapes, pictures and connectors count as one opaque
//! shape each. Patching streams every event through unchanged except the
//! `descr` attribute of changed shapes and the `a:t` text of changed runs.

use crate::xml::{attr, escape_attr, local_name, xml_error};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use xtab_core::deck::{
    Frame, Paragraph, RunStyle, ShapeContent, Slide, TableGrid, TextBody, TextRun,
};
use xtab_core::Result;

/// Elements that are shapes when they sit directly in the shape tree.
const SHAPE_TAGS: &[&[u8]] = &[
    b"sp",
    b"graphicFrame",
    b"grpSp",
    b"pic",
    b"cxnSp",
    b"contentPart",
    b"AlternateContent",
];

fn next(index: Option<usize>) -> usize {
    index.map_or(0, |i| i + 1)
}

/// Location of the text run currently being read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TextSlot {
    pub cell: Option<(usize, usize)>,
    pub paragraph: Option<usize>,
    pub run: Option<usize>,
}

/// Follows element nesting to tell which shape, table cell, paragraph and
/// run an event belongs to. Reader and patcher share it so both number
/// things the same way.
#[derive(Debug, Default)]
pub(crate) struct Tracker {
    stack: Vec<Vec<u8>>,
    tree: Option<usize>,
    tree_done: bool,
    shape: Option<usize>,
    count: usize,
    row: Option<usize>,
    col: Option<usize>,
    body: Option<usize>,
    in_cell: bool,
    paragraph: Option<usize>,
    run: Option<usize>,
}

impl Tracker {
    pub fn open(&mut self, name: &[u8]) {
        let local = local_name(name);
        self.stack.push(local.to_vec());
        let depth = self.stack.len();

        match self.tree {
            None if !self.tree_done && local == b"spTree" => self.tree = Some(depth),
            Some(tree) if depth == tree + 1 => {
                if SHAPE_TAGS.contains(&local) {
                    self.shape = Some(self.count);
                    self.count += 1;
                    self.row = None;
                    self.col = None;
                    self.body = None;
                    self.in_cell = false;
                }
            }
            Some(tree) if depth > tree + 1 && self.shape.is_some() => match local {
                b"tr" => {
                    self.row = Some(next(self.row));
                    self.col = None;
                }
                b"tc" => self.col = Some(next(self.col)),
                b"txBody" => {
                    let in_cell = self.stack[depth - 2].as_slice() == b"tc";
                    if depth == tree + 2 || in_cell {
                        self.body = Some(depth);
                        self.in_cell = in_cell;
                        self.paragraph = None;
                        self.run = None;
                    }
                }
                b"p" if self.body == Some(depth - 1) => {
                    self.paragraph = Some(next(self.paragraph));
                    self.run = None;
                }
                b"r" | b"fld" if self.body.is_some_and(|b| depth == b + 2) => {
                    self.run = Some(next(self.run));
                }
                _ => {}
            },
            _ => {}
        }
    }

    pub fn close(&mut self) {
        let depth = self.stack.len();
        if self.body == Some(depth) {
            self.body = None;
            self.paragraph = None;
            self.run = None;
        }
        if let Some(tree) = self.tree {
            if depth == tree + 1 {
                self.shape = None;
            } else if depth == tree {
                self.tree = None;
                self.tree_done = true;
            }
        }
        self.stack.pop();
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn at(&self, depth: usize) -> Option<&[u8]> {
        depth
            .checked_sub(1)
            .and_then(|i| self.stack.get(i))
            .map(Vec::as_slice)
    }

    fn current(&self) -> &[u8] {
        self.at(self.depth()).unwrap_or_default()
    }

    fn parent(&self) -> &[u8] {
        self.at(self.depth().saturating_sub(1)).unwrap_or_default()
    }

    /// Index of the open top-level shape.
    pub fn shape(&self) -> Option<usize> {
        self.shape
    }

    /// The element just opened is a top-level shape.
    pub fn is_shape_root(&self) -> bool {
        self.shape.is_some() && self.tree.is_some_and(|t| self.depth() == t + 1)
    }

    /// The element just opened is the shape's own `cNvPr`.
    pub fn is_shape_props(&self) -> bool {
        self.shape.is_some()
            && self.tree.is_some_and(|t| self.depth() == t + 3)
            && self.current() == b"cNvPr"
    }

    /// The element just opened is an offset or extent of the shape's frame.
    pub fn is_frame_part(&self) -> bool {
        self.shape.is_some()
            && self.tree.is_some_and(|t| self.depth() <= t + 4)
            && self.parent() == b"xfrm"
    }

    /// Whether the element just opened is the active text body.
    pub fn is_body(&self) -> bool {
        self.body == Some(self.depth())
    }

    /// Whether the element just opened is a paragraph of the active body.
    pub fn is_paragraph(&self) -> bool {
        self.body.is_some_and(|b| self.depth() == b + 1) && self.current() == b"p"
    }

    /// Whether the element just opened is a run of the active paragraph.
    pub fn is_run(&self) -> bool {
        self.body.is_some_and(|b| self.depth() == b + 2)
            && matches!(self.current(), b"r" | b"fld")
    }

    /// Whether the element just opened sits in a paragraph of the active body,
    /// after its runs (`a:endParaRPr`).
    pub fn is_paragraph_end_props(&self) -> bool {
        self.body.is_some_and(|b| self.depth() == b + 2) && self.current() == b"endParaRPr"
    }

    /// Whether the element just opened is the `a:t` of a run.
    pub fn is_run_text(&self) -> bool {
        self.body.is_some_and(|b| self.depth() == b + 3)
            && self.current() == b"t"
            && matches!(self.parent(), b"r" | b"fld")
    }

    /// Whether the element just opened is inside a run's `a:rPr`.
    pub fn in_run_props(&self) -> bool {
        self.body.is_some_and(|b| {
            self.depth() >= b + 3
                && matches!(self.at(b + 2), Some(b"r") | Some(b"fld"))
                && self.at(b + 3) == Some(b"rPr".as_slice())
        })
    }

    pub fn text_slot(&self) -> Option<TextSlot> {
        self.body?;
        Some(TextSlot {
            cell: if self.in_cell {
                self.row.zip(self.col)
            } else {
                None
            },
            paragraph: self.paragraph,
            run: self.run,
        })
    }

    pub fn current_local(&self) -> &[u8] {
        self.current()
    }
}

/// What a shape holds, as read from the slide part.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawContent {
    Text(TextBody),
    Table(TableGrid),
    /// Chart frame; the chart part is found through the relationship id.
    Chart(String),
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawShape {
    pub name: String,
    pub alt_text: Option<String>,
    pub frame: Option<Frame>,
    pub content: RawContent,
}

fn body_mut<'s>(shape: &'s mut RawShape, slot: &TextSlot) -> Option<&'s mut TextBody> {
    match (&mut shape.content, slot.cell) {
        (RawContent::Text(body), None) => Some(body),
        (RawContent::Table(grid), Some((r, c))) => grid.cell_mut(r, c),
        _ => None,
    }
}

fn current_run<'s>(shape: &'s mut RawShape, slot: &TextSlot) -> Option<&'s mut TextRun> {
    body_mut(shape, slot)?
        .paragraphs
        .last_mut()?
        .runs
        .last_mut()
}

fn read_style(e: &BytesStart, local: &[u8], style: &mut RunStyle) {
    match local {
        b"rPr" => {
            style.size = attr(e, b"sz").and_then(|v| v.parse().ok());
            style.bold = attr(e, b"b").map(|v| v == "1" || v == "true");
        }
        b"latin" => style.font = attr(e, b"typeface"),
        b"srgbClr" => {
            if style.color.is_none() {
                style.color = attr(e, b"val");
            }
        }
        _ => {}
    }
}

/// Read the top-level shapes of a slide part.
pub(crate) fn read_shapes(xml: &str) -> Result<Vec<RawShape>> {
    let mut reader = Reader::from_str(xml);
    let mut tracker = Tracker::default();
    let mut shapes: Vec<RawShape> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| xml_error("slide", e))?;
        let (e, empty) = match &event {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(_) => {
                tracker.close();
                continue;
            }
            Event::Text(t) => {
                if tracker.is_run_text() {
                    if let (Some(shape), Some(slot)) = (shapes.last_mut(), tracker.text_slot()) {
                        if let Some(run) = current_run(shape, &slot) {
                            run.text.push_str(&t.unescape().map_err(|e| xml_error("slide", e))?);
                        }
                    }
                }
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        tracker.open(e.name().as_ref());
        let local = tracker.current_local().to_vec();

        if tracker.is_shape_root() {
            shapes.push(RawShape {
                name: String::new(),
                alt_text: None,
                frame: None,
                content: RawContent::Other,
            });
        }

        if let Some(shape) = shapes.last_mut().filter(|_| tracker.shape().is_some()) {
            if tracker.is_shape_props() {
                shape.name = attr(e, b"name").unwrap_or_default();
                shape.alt_text = attr(e, b"descr").filter(|d| !d.is_empty());
            } else if tracker.is_frame_part() {
                let frame = shape.frame.get_or_insert_with(Frame::default);
                let num = |key: &[u8]| attr(e, key).and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
                match local.as_slice() {
                    b"off" => {
                        frame.x = num(b"x");
                        frame.y = num(b"y");
                    }
                    b"ext" => {
                        frame.cx = num(b"cx");
                        frame.cy = num(b"cy");
                    }
                    _ => {}
                }
            } else if local == b"chart" && tracker.parent() == b"graphicData" {
                if let Some(id) = attr(e, b"id") {
                    shape.content = RawContent::Chart(id);
                }
            } else if local == b"tbl" && tracker.parent() == b"graphicData" {
                shape.content = RawContent::Table(TableGrid::default());
            } else if let RawContent::Table(grid) = &mut shape.content {
                match local.as_slice() {
                    b"tr" => grid.rows.push(Vec::new()),
                    b"tc" => {
                        if let Some(row) = grid.rows.last_mut() {
                            row.push(TextBody::default());
                        }
                    }
                    _ => {}
                }
            }

            if tracker.is_body() && tracker.text_slot().is_some_and(|s| s.cell.is_none()) {
                shape.content = RawContent::Text(TextBody::default());
            }
            if let Some(slot) = tracker.text_slot() {
                if tracker.is_paragraph() {
                    if let Some(body) = body_mut(shape, &slot) {
                        body.paragraphs.push(Paragraph::default());
                    }
                } else if tracker.is_run() {
                    if let Some(paragraph) =
                        body_mut(shape, &slot).and_then(|b| b.paragraphs.last_mut())
                    {
                        paragraph.runs.push(TextRun::default());
                    }
                } else if tracker.in_run_props() {
                    if let Some(run) = current_run(shape, &slot) {
                        read_style(e, &local, &mut run.style);
                    }
                }
            }
        }

        if empty {
            tracker.close();
        }
    }

    Ok(shapes)
}

/// Rewrites changed alt text and run text of one slide part.
struct Patcher<'a> {
    before: &'a Slide,
    after: &'a Slide,
    writer: Writer<Vec<u8>>,
    tracker: Tracker,
    replacing_text: bool,
    runs_added: bool,
}

impl<'a> Patcher<'a> {
    /// Old and new body for the text slot, when they differ.
    fn changed_body(&self, slot: &TextSlot) -> Option<(&'a TextBody, &'a TextBody)> {
        let index = self.tracker.shape()?;
        let before = &self.before.shapes.get(index)?.content;
        let after = &self.after.shapes.get(index)?.content;
        let pair = match (before, after, slot.cell) {
            (ShapeContent::Text(old), ShapeContent::Text(new), None) => (old, new),
            (ShapeContent::Table(old), ShapeContent::Table(new), Some((r, c))) => {
                (old.cell(r, c)?, new.cell(r, c)?)
            }
            _ => return None,
        };
        (pair.0 != pair.1).then_some(pair)
    }

    fn changed_alt_text(&self) -> Option<Option<&'a str>> {
        let index = self.tracker.shape()?;
        let before = self.before.shapes.get(index)?;
        let after = self.after.shapes.get(index)?;
        (before.alt_text != after.alt_text).then(|| after.alt_text.as_deref())
    }

    fn write(&mut self, event: Event) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| xml_error("slide", e))
    }

    /// Runs of the new paragraph that the XML does not have yet.
    fn missing_runs(&self) -> Vec<TextRun> {
        let Some(slot) = self.tracker.text_slot() else {
            return Vec::new();
        };
        let (Some(p), Some((old, new))) = (slot.paragraph, self.changed_body(&slot)) else {
            return Vec::new();
        };
        let existing = old.paragraphs.get(p).map_or(0, |para| para.runs.len());
        new.paragraphs
            .get(p)
            .map(|para| para.runs.iter().skip(existing).cloned().collect())
            .unwrap_or_default()
    }

    fn write_run(&mut self, run: &TextRun) -> Result<()> {
        self.write(Event::Start(BytesStart::new("a:r")))?;
        let mut props = BytesStart::new("a:rPr");
        props.push_attribute(("lang", "en-US"));
        let size = run.style.size.map(|s| s.to_string());
        if let Some(size) = &size {
            props.push_attribute(("sz", size.as_str()));
        }
        if let Some(bold) = run.style.bold {
            props.push_attribute(("b", if bold { "1" } else { "0" }));
        }
        props.push_attribute(("dirty", "0"));
        if run.style.color.is_none() && run.style.font.is_none() {
            self.write(Event::Empty(props))?;
        } else {
            self.write(Event::Start(props))?;
            if let Some(color) = &run.style.color {
                self.write(Event::Start(BytesStart::new("a:solidFill")))?;
                let mut clr = BytesStart::new("a:srgbClr");
                clr.push_attribute(("val", color.as_str()));
                self.write(Event::Empty(clr))?;
                self.write(Event::End(BytesEnd::new("a:solidFill")))?;
            }
            if let Some(font) = &run.style.font {
                let mut latin = BytesStart::new("a:latin");
                latin.push_attribute(("typeface", font.as_str()));
                self.write(Event::Empty(latin))?;
            }
            self.write(Event::End(BytesEnd::new("a:rPr")))?;
        }
        self.write(Event::Start(BytesStart::new("a:t")))?;
        self.write(Event::Text(BytesText::new(&run.text)))?;
        self.write(Event::End(BytesEnd::new("a:t")))?;
        self.write(Event::End(BytesEnd::new("a:r")))
    }

    fn add_missing_runs(&mut self) -> Result<()> {
        if self.runs_added {
            return Ok(());
        }
        self.runs_added = true;
        for run in self.missing_runs() {
            self.write_run(&run)?;
        }
        Ok(())
    }

    fn on_open(&mut self, e: &BytesStart, empty: bool) -> Result<()> {
        if self.tracker.is_paragraph() {
            self.runs_added = false;
        }

        if self.tracker.is_shape_props() {
            if let Some(alt_text) = self.changed_alt_text() {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut elem = BytesStart::new(name);
                for a in e.attributes().flatten() {
                    if local_name(a.key.as_ref()) != b"descr" {
                        elem.push_attribute(a);
                    }
                }
                let escaped = alt_text.map(escape_attr);
                if let Some(value) = &escaped {
                    elem.push_attribute(Attribute {
                        key: QName(b"descr"),
                        value: Cow::Borrowed(value.as_bytes()),
                    });
                }
                return self.write(if empty {
                    Event::Empty(elem)
                } else {
                    Event::Start(elem)
                });
            }
        }

        if self.tracker.is_run_text() {
            let slot = self.tracker.text_slot();
            let text = slot.and_then(|slot| {
                let (_, new) = self.changed_body(&slot)?;
                let run = new.paragraphs.get(slot.paragraph?)?.runs.get(slot.run?)?;
                Some(run.text.clone())
            });
            if let Some(text) = text {
                if empty && text.is_empty() {
                    return self.write(Event::Empty(e.clone()));
                }
                self.write(Event::Start(e.clone()))?;
                self.write(Event::Text(BytesText::new(&text)))?;
                if empty {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    return self.write(Event::End(BytesEnd::new(name)));
                }
                self.replacing_text = true;
                return Ok(());
            }
        }

        if self.tracker.is_paragraph_end_props() {
            self.add_missing_runs()?;
        }

        if empty && self.tracker.is_paragraph() && !self.missing_runs().is_empty() {
            let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
            self.write(Event::Start(e.clone()))?;
            self.add_missing_runs()?;
            return self.write(Event::End(BytesEnd::new(name)));
        }

        self.write(if empty {
            Event::Empty(e.clone())
        } else {
            Event::Start(e.clone())
        })
    }

    fn on_close(&mut self, e: &BytesEnd) -> Result<()> {
        if self.replacing_text && local_name(e.name().as_ref()) == b"t" {
            self.replacing_text = false;
        } else if self.tracker.is_paragraph() {
            self.add_missing_runs()?;
        } else if self.tracker.is_body() {
            self.add_missing_paragraphs()?;
        }
        self.write(Event::End(e.clone()))
    }

    fn add_missing_paragraphs(&mut self) -> Result<()> {
        let Some(slot) = self.tracker.text_slot() else {
            return Ok(());
        };
        let Some((old, new)) = self.changed_body(&slot) else {
            return Ok(());
        };
        for paragraph in new.paragraphs.iter().skip(old.paragraphs.len()) {
            self.write(Event::Start(BytesStart::new("a:p")))?;
            for run in &paragraph.runs {
                self.write_run(run)?;
            }
            self.write(Event::End(BytesEnd::new("a:p")))?;
        }
        Ok(())
    }
}

/// Rewrite a slide part so it matches `after`, given that it currently
/// matches `before`. Only alt text and run text are touched.
pub(crate) fn patch_shapes(xml: &str, before: &Slide, after: &Slide) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut patcher = Patcher {
        before,
        after,
        writer: Writer::new(Vec::with_capacity(xml.len())),
        tracker: Tracker::default(),
        replacing_text: false,
        runs_added: false,
    };

    loop {
        let event = reader.read_event().map_err(|e| xml_error("slide", e))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                patcher.tracker.open(e.name().as_ref());
                patcher.on_open(&e, false)?;
            }
            Event::Empty(e) => {
                patcher.tracker.open(e.name().as_ref());
                patcher.on_open(&e, true)?;
                patcher.tracker.close();
            }
            Event::End(e) => {
                patcher.on_close(&e)?;
                patcher.tracker.close();
            }
            Event::Text(_) | Event::CData(_) if patcher.replacing_text => {}
            other => patcher.write(other)?,
        }
    }

    String::from_utf8(patcher.writer.into_inner())
        .map_err(|e| xml_error("slide", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use xtab_core::deck::Shape;

    const SLIDE: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
        r#"<p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>"#,
        r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="TEXT_BASE" descr="type: base_text&#10;table_title: Q Age"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr>"#,
        r#"<p:spPr><a:xfrm><a:off x="457200" y="6400800"/><a:ext cx="8229600" cy="365760"/></a:xfrm></p:spPr>"#,
        r#"<p:txBody><a:bodyPr/><a:p><a:r><a:rPr lang="en-US" sz="1000" b="1"><a:solidFill><a:srgbClr val="333333"/></a:solidFill><a:latin typeface="Arial"/></a:rPr><a:t>Base: </a:t></a:r><a:r><a:rPr lang="en-US" sz="1000"/><a:t>500 &amp; up</a:t></a:r><a:endParaRPr lang="en-US"/></a:p></p:txBody></p:sp>"#,
        r#"<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="3" name="Table 2"/><p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr><p:xfrm><a:off x="0" y="0"/><a:ext cx="100" cy="100"/></p:xfrm>"#,
        r#"<a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/table"><a:tbl><a:tblPr/><a:tblGrid><a:gridCol w="50"/><a:gridCol w="50"/></a:tblGrid>"#,
        r#"<a:tr h="50"><a:tc><a:txBody><a:bodyPr/><a:p><a:endParaRPr/></a:p></a:txBody><a:tcPr/></a:tc><a:tc><a:txBody><a:bodyPr/><a:p><a:r><a:t>Total</a:t></a:r></a:p></a:txBody><a:tcPr/></a:tc></a:tr>"#,
        r#"<a:tr h="50"><a:tc><a:txBody><a:bodyPr/><a:p><a:r><a:t>Male</a:t></a:r></a:p></a:txBody><a:tcPr/></a:tc><a:tc><a:txBody><a:bodyPr/><a:p/></a:txBody><a:tcPr/></a:tc></a:tr>"#,
        r#"</a:tbl></a:graphicData></a:graphic></p:graphicFrame>"#,
        r#"<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="4" name="Chart 3"/><p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr><p:xfrm><a:off x="0" y="0"/><a:ext cx="100" cy="100"/></p:xfrm>"#,
        r#"<a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/chart"><c:chart xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart" r:id="rId2"/></a:graphicData></a:graphic></p:graphicFrame>"#,
        r#"<p:grpSp><p:nvGrpSpPr><p:cNvPr id="5" name="Group"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>"#,
        r#"<p:sp><p:nvSpPr><p:cNvPr id="6" name="Inner"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:t>nested</a:t></a:r></a:p></p:txBody></p:sp></p:grpSp>"#,
        r#"</p:spTree></p:cSld></p:sld>"#
    );

    fn to_slide(raw: Vec<RawShape>) -> Slide {
        Slide {
            shapes: raw
                .into_iter()
                .map(|s| {
                    let content = match s.content {
                        RawContent::Text(body) => ShapeContent::Text(body),
                        RawContent::Table(grid) => ShapeContent::Table(grid),
                        RawContent::Chart(_) | RawContent::Other => ShapeContent::Other,
                    };
                    let mut shape = Shape::new(s.name, content);
                    shape.alt_text = s.alt_text;
                    shape.frame = s.frame;
                    shape
                })
                .collect(),
        }
    }

    #[test]
    fn test_read_shapes() {
        let shapes = read_shapes(SLIDE).unwrap();
        let names: Vec<&str> = shapes.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["TEXT_BASE", "Table 2", "Chart 3", "Group"]);

        assert_eq!(
            shapes[0].alt_text.as_deref(),
            Some("type: base_text\ntable_title: Q Age")
        );
        assert_eq!(shapes[0].frame.unwrap().cy, 365760);
        let RawContent::Text(body) = &shapes[0].content else {
            panic!("expected text");
        };
        assert_eq!(body.text(), "Base: 500 & up");
        assert_eq!(
            body.paragraphs[0].runs[0].style,
            RunStyle {
                font: Some("Arial".into()),
                size: Some(1000),
                bold: Some(true),
                color: Some("333333".into()),
            }
        );

        let RawContent::Table(grid) = &shapes[1].content else {
            panic!("expected table");
        };
        assert_eq!(grid.texts(), vec![vec!["", "Total"], vec!["Male", ""]]);
        assert_eq!(shapes[2].content, RawContent::Chart("rId2".into()));
        assert_eq!(shapes[3].content, RawContent::Other);
    }

    #[test]
    fn test_patch_unchanged_is_identity() {
        let slide = to_slide(read_shapes(SLIDE).unwrap());
        let patched = patch_shapes(SLIDE, &slide, &slide).unwrap();
        assert_eq!(patched, SLIDE);
    }

    #[test]
    fn test_patch_text_keeps_formatting() {
        let before = to_slide(read_shapes(SLIDE).unwrap());
        let mut after = before.clone();
        if let ShapeContent::Text(body) = &mut after.shapes[0].content {
            body.set_text("Base: Total respondents. 1000 complete surveys.");
        }
        after.shapes[0].alt_text = Some("type: base_text\ntable_title: Q <Age>".into());

        let patched = patch_shapes(SLIDE, &before, &after).unwrap();
        assert!(patched.contains(r#"descr="type: base_text&#10;table_title: Q &lt;Age&gt;""#));
        assert!(patched.contains(
            r#"<a:latin typeface="Arial"/></a:rPr><a:t>Base: Total respondents. 1000 complete surveys.</a:t>"#
        ));
        assert!(patched.contains(r#"<a:rPr lang="en-US" sz="1000"/><a:t></a:t>"#));

        let reread = to_slide(read_shapes(&patched).unwrap());
        assert_eq!(reread, after);
    }

    #[test]
    fn test_patch_table_cells_adds_missing_runs() {
        let before = to_slide(read_shapes(SLIDE).unwrap());
        let mut after = before.clone();
        if let ShapeContent::Table(grid) = &mut after.shapes[1].content {
            grid.cell_mut(0, 1).unwrap().set_text("Overall");
            grid.cell_mut(1, 1).unwrap().set_text("48.0");
        }

        let patched = patch_shapes(SLIDE, &before, &after).unwrap();
        let reread = to_slide(read_shapes(&patched).unwrap());
        let ShapeContent::Table(grid) = &reread.shapes[1].content else {
            panic!("expected table");
        };
        assert_eq!(grid.texts(), vec![vec!["", "Overall"], vec!["Male", "48.0"]]);
        // the nested group text is never touched
        assert!(patched.contains("<a:t>nested</a:t>"));
    }
}
