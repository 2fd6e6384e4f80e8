//! Writes a complete `.pptx` for a deck that has no source file, such as a
//! freshly exported one.
//!
//! The package is minimal: one master, one blank layout, one theme, the
//! slides and their charts. Chart data is written as literal caches, so the
//! file carries no embedded workbook.

use crate::package::write_parts;
use crate::xml::{escape_attr, escape_text};
use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;
use xtab_core::deck::{
    Chart, ChartType, Deck, Frame, Shape, ShapeContent, Slide, TableGrid, TextBody, TextRun,
};
use xtab_core::export::{BACKGROUND_COLOR, BRAND_COLORS, BRAND_FONT};
use xtab_core::{Error, Result};

/// 13.333 x 7.5 inches (16:9).
pub const SLIDE_WIDTH: i64 = 12_192_000;
pub const SLIDE_HEIGHT: i64 = 6_858_000;

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_C: &str = "http://schemas.openxmlformats.org/drawingml/2006/chart";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

const CT_SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
const CT_CHART: &str = "application/vnd.openxmlformats-officedocument.drawingml.chart+xml";

const GRIDLINE_COLOR: &str = "D2D2D2";

fn fmt_error(e: std::fmt::Error) -> Error {
    Error::XmlError(format!("Failed to write XML: {}", e))
}

/// Builds a `.pptx` package from a [`Deck`].
pub struct DeckBuilder<'a> {
    deck: &'a Deck,
    background: Option<String>,
}

impl<'a> DeckBuilder<'a> {
    pub fn new(deck: &'a Deck) -> Self {
        Self {
            deck,
            background: Some(BACKGROUND_COLOR.to_string()),
        }
    }

    /// Solid slide background as `RRGGBB`, or none.
    pub fn with_background(mut self, color: Option<&str>) -> Self {
        self.background = color.map(str::to_string);
        self
    }

    /// Every part of the package, in archive order.
    pub fn parts(&self) -> Result<Vec<(String, String)>> {
        let mut parts = Vec::new();
        let mut slide_parts = Vec::new();
        let mut chart_count = 0;

        for (index, slide) in self.deck.slides.iter().enumerate() {
            let number = index + 1;
            let mut rels = vec![(
                "slideLayout".to_string(),
                "../slideLayouts/slideLayout1.xml".to_string(),
            )];
            let mut chart_ids = Vec::new();
            for shape in &slide.shapes {
                if let ShapeContent::Chart(chart) = &shape.content {
                    chart_count += 1;
                    rels.push(("chart".to_string(), format!("../charts/chart{}.xml", chart_count)));
                    chart_ids.push(format!("rId{}", rels.len()));
                    slide_parts.push((
                        format!("ppt/charts/chart{}.xml", chart_count),
                        chart_xml(chart)?,
                    ));
                }
            }
            slide_parts.push((
                format!("ppt/slides/slide{}.xml", number),
                self.slide_xml(slide, &chart_ids)?,
            ));
            slide_parts.push((
                format!("ppt/slides/_rels/slide{}.xml.rels", number),
                rels_xml(&rels)?,
            ));
        }

        parts.push(("[Content_Types].xml".to_string(), content_types(self.deck.slides.len(), chart_count)?));
        parts.push((
            "_rels/.rels".to_string(),
            rels_xml(&[("officeDocument".to_string(), "ppt/presentation.xml".to_string())])?,
        ));
        parts.push(("ppt/presentation.xml".to_string(), self.presentation_xml()?));

        let mut presentation_rels = vec![
            ("slideMaster".to_string(), "slideMasters/slideMaster1.xml".to_string()),
            ("theme".to_string(), "theme/theme1.xml".to_string()),
        ];
        for number in 1..=self.deck.slides.len() {
            presentation_rels.push(("slide".to_string(), format!("slides/slide{}.xml", number)));
        }
        parts.push(("ppt/_rels/presentation.xml.rels".to_string(), rels_xml(&presentation_rels)?));

        parts.push(("ppt/slideMasters/slideMaster1.xml".to_string(), master_xml()));
        parts.push((
            "ppt/slideMasters/_rels/slideMaster1.xml.rels".to_string(),
            rels_xml(&[
                ("slideLayout".to_string(), "../slideLayouts/slideLayout1.xml".to_string()),
                ("theme".to_string(), "../theme/theme1.xml".to_string()),
            ])?,
        ));
        parts.push(("ppt/slideLayouts/slideLayout1.xml".to_string(), layout_xml()));
        parts.push((
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels".to_string(),
            rels_xml(&[("slideMaster".to_string(), "../slideMasters/slideMaster1.xml".to_string())])?,
        ));
        parts.push(("ppt/theme/theme1.xml".to_string(), theme_xml()?));
        parts.extend(slide_parts);
        Ok(parts)
    }

    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let parts = self.parts()?;
        write_parts(
            writer,
            parts.iter().map(|(name, xml)| (name.as_str(), xml.as_bytes())),
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        log::debug!("Writing {} slides to {}", self.deck.slides.len(), path.display());
        self.write_to(BufWriter::new(File::create(path)?))
    }

    fn presentation_xml(&self) -> Result<String> {
        let mut xml = String::with_capacity(1024);
        xml.push_str(XML_DECL);
        write!(xml, r#"<p:presentation xmlns:a="{}" xmlns:r="{}" xmlns:p="{}">"#, NS_A, NS_R, NS_P)
            .map_err(fmt_error)?;
        xml.push_str(r#"<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#);
        if !self.deck.slides.is_empty() {
            xml.push_str("<p:sldIdLst>");
            for index in 0..self.deck.slides.len() {
                // rId1 and rId2 are the master and the theme
                write!(xml, r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + index, index + 3)
                    .map_err(fmt_error)?;
            }
            xml.push_str("</p:sldIdLst>");
        }
        write!(xml, r#"<p:sldSz cx="{}" cy="{}"/>"#, SLIDE_WIDTH, SLIDE_HEIGHT).map_err(fmt_error)?;
        xml.push_str(r#"<p:notesSz cx="6858000" cy="9144000"/>"#);
        xml.push_str("</p:presentation>");
        Ok(xml)
    }

    fn slide_xml(&self, slide: &Slide, chart_ids: &[String]) -> Result<String> {
        let mut xml = String::with_capacity(4096);
        xml.push_str(XML_DECL);
        write!(xml, r#"<p:sld xmlns:a="{}" xmlns:r="{}" xmlns:p="{}"><p:cSld>"#, NS_A, NS_R, NS_P)
            .map_err(fmt_error)?;
        if let Some(color) = &self.background {
            write!(
                xml,
                r#"<p:bg><p:bgPr><a:solidFill><a:srgbClr val="{}"/></a:solidFill><a:effectLst/></p:bgPr></p:bg>"#,
                escape_attr(color)
            )
            .map_err(fmt_error)?;
        }
        xml.push_str(concat!(
            r#"<p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
            r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#
        ));

        let mut charts = chart_ids.iter();
        for (index, shape) in slide.shapes.iter().enumerate() {
            let id = index + 2;
            match &shape.content {
                ShapeContent::Text(body) => write_text_shape(&mut xml, id, shape, body)?,
                ShapeContent::Table(grid) => write_table_shape(&mut xml, id, shape, grid)?,
                ShapeContent::Chart(_) => {
                    let rel_id = charts
                        .next()
                        .ok_or_else(|| Error::XmlError("chart without relationship".to_string()))?;
                    write_chart_frame(&mut xml, id, shape, rel_id)?;
                }
                ShapeContent::Other => write_empty_shape(&mut xml, id, shape)?,
            }
        }

        xml.push_str(r#"</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#);
        Ok(xml)
    }
}

fn frame_of(shape: &Shape) -> Frame {
    shape.frame.unwrap_or_default()
}

fn write_props(xml: &mut String, tag: &str, id: usize, shape: &Shape) -> Result<()> {
    write!(xml, r#"<p:cNvPr id="{}" name="{}""#, id, escape_attr(&shape.name)).map_err(fmt_error)?;
    if let Some(alt_text) = &shape.alt_text {
        write!(xml, r#" descr="{}""#, escape_attr(alt_text)).map_err(fmt_error)?;
    }
    xml.push_str("/>");
    xml.push_str(tag);
    xml.push_str("<p:nvPr/>");
    Ok(())
}

fn write_xfrm(xml: &mut String, prefix: &str, frame: Frame) -> Result<()> {
    write!(
        xml,
        r#"<{p}:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></{p}:xfrm>"#,
        frame.x,
        frame.y,
        frame.cx,
        frame.cy,
        p = prefix
    )
    .map_err(fmt_error)
}

fn write_run(xml: &mut String, run: &TextRun) -> Result<()> {
    xml.push_str(r#"<a:r><a:rPr lang="en-US""#);
    if let Some(size) = run.style.size {
        write!(xml, r#" sz="{}""#, size).map_err(fmt_error)?;
    }
    if let Some(bold) = run.style.bold {
        write!(xml, r#" b="{}""#, if bold { 1 } else { 0 }).map_err(fmt_error)?;
    }
    xml.push_str(r#" dirty="0""#);
    if run.style.color.is_none() && run.style.font.is_none() {
        xml.push_str("/>");
    } else {
        xml.push('>');
        if let Some(color) = &run.style.color {
            write!(xml, r#"<a:solidFill><a:srgbClr val="{}"/></a:solidFill>"#, escape_attr(color))
                .map_err(fmt_error)?;
        }
        if let Some(font) = &run.style.font {
            write!(xml, r#"<a:latin typeface="{}"/>"#, escape_attr(font)).map_err(fmt_error)?;
        }
        xml.push_str("</a:rPr>");
    }
    write!(xml, "<a:t>{}</a:t></a:r>", escape_text(&run.text)).map_err(fmt_error)
}

fn write_body(xml: &mut String, tag: &str, body_props: &str, body: &TextBody) -> Result<()> {
    write!(xml, "<{}>{}<a:lstStyle/>", tag, body_props).map_err(fmt_error)?;
    if body.paragraphs.is_empty() {
        xml.push_str(r#"<a:p><a:endParaRPr lang="en-US" dirty="0"/></a:p>"#);
    }
    for paragraph in &body.paragraphs {
        xml.push_str("<a:p>");
        for run in &paragraph.runs {
            write_run(xml, run)?;
        }
        if paragraph.runs.is_empty() {
            xml.push_str(r#"<a:endParaRPr lang="en-US" dirty="0"/>"#);
        }
        xml.push_str("</a:p>");
    }
    write!(xml, "</{}>", tag).map_err(fmt_error)
}

fn write_text_shape(xml: &mut String, id: usize, shape: &Shape, body: &TextBody) -> Result<()> {
    xml.push_str("<p:sp><p:nvSpPr>");
    write_props(xml, r#"<p:cNvSpPr txBox="1"/>"#, id, shape)?;
    xml.push_str("</p:nvSpPr><p:spPr>");
    write_xfrm(xml, "a", frame_of(shape))?;
    xml.push_str(r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr>"#);
    write_body(
        xml,
        "p:txBody",
        r#"<a:bodyPr wrap="square" rtlCol="0"><a:spAutoFit/></a:bodyPr>"#,
        body,
    )?;
    xml.push_str("</p:sp>");
    Ok(())
}

fn write_empty_shape(xml: &mut String, id: usize, shape: &Shape) -> Result<()> {
    xml.push_str("<p:sp><p:nvSpPr>");
    write_props(xml, "<p:cNvSpPr/>", id, shape)?;
    xml.push_str("</p:nvSpPr><p:spPr>");
    write_xfrm(xml, "a", frame_of(shape))?;
    xml.push_str(r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:sp>"#);
    Ok(())
}

fn write_frame_open(xml: &mut String, id: usize, shape: &Shape, uri: &str) -> Result<()> {
    xml.push_str("<p:graphicFrame><p:nvGraphicFramePr>");
    write_props(
        xml,
        r#"<p:cNvGraphicFramePr><a:graphicFrameLocks noGrp="1"/></p:cNvGraphicFramePr>"#,
        id,
        shape,
    )?;
    xml.push_str("</p:nvGraphicFramePr>");
    write_xfrm(xml, "p", frame_of(shape))?;
    write!(xml, r#"<a:graphic><a:graphicData uri="{}">"#, uri).map_err(fmt_error)
}

fn write_table_shape(xml: &mut String, id: usize, shape: &Shape, grid: &TableGrid) -> Result<()> {
    let frame = frame_of(shape);
    let columns = grid.column_count().max(1) as i64;
    let rows = grid.row_count().max(1) as i64;

    write_frame_open(xml, id, shape, "http://schemas.openxmlformats.org/drawingml/2006/table")?;
    xml.push_str(r#"<a:tbl><a:tblPr firstRow="1" bandRow="1"/><a:tblGrid>"#);
    for _ in 0..columns {
        write!(xml, r#"<a:gridCol w="{}"/>"#, frame.cx / columns).map_err(fmt_error)?;
    }
    xml.push_str("</a:tblGrid>");
    for row in &grid.rows {
        write!(xml, r#"<a:tr h="{}">"#, frame.cy / rows).map_err(fmt_error)?;
        for cell in row {
            xml.push_str("<a:tc>");
            write_body(xml, "a:txBody", "<a:bodyPr/>", cell)?;
            xml.push_str("<a:tcPr/></a:tc>");
        }
        xml.push_str("</a:tr>");
    }
    xml.push_str("</a:tbl></a:graphicData></a:graphic></p:graphicFrame>");
    Ok(())
}

fn write_chart_frame(xml: &mut String, id: usize, shape: &Shape, rel_id: &str) -> Result<()> {
    write_frame_open(xml, id, shape, NS_C)?;
    write!(xml, r#"<c:chart xmlns:c="{}" r:id="{}"/>"#, NS_C, rel_id).map_err(fmt_error)?;
    xml.push_str("</a:graphicData></a:graphic></p:graphicFrame>");
    Ok(())
}

fn write_fill(xml: &mut String, chart_type: ChartType, color: &str) -> Result<()> {
    let color = escape_attr(color);
    if chart_type == ChartType::Line {
        write!(
            xml,
            r#"<c:spPr><a:ln w="28575" cap="rnd"><a:solidFill><a:srgbClr val="{}"/></a:solidFill></a:ln></c:spPr>"#,
            color
        )
    } else {
        write!(xml, r#"<c:spPr><a:solidFill><a:srgbClr val="{}"/></a:solidFill></c:spPr>"#, color)
    }
    .map_err(fmt_error)
}

/// Chart part with literal caches for every series.
pub(crate) fn chart_xml(chart: &Chart) -> Result<String> {
    let chart_type = match chart.chart_type {
        ChartType::Other => ChartType::Column,
        other => other,
    };
    let round = matches!(chart_type, ChartType::Doughnut | ChartType::Pie);

    let mut xml = String::with_capacity(4096);
    xml.push_str(XML_DECL);
    write!(xml, r#"<c:chartSpace xmlns:c="{}" xmlns:a="{}" xmlns:r="{}">"#, NS_C, NS_A, NS_R)
        .map_err(fmt_error)?;
    xml.push_str(r#"<c:roundedCorners val="0"/><c:chart><c:autoTitleDeleted val="1"/><c:plotArea><c:layout/>"#);

    match chart_type {
        ChartType::Bar | ChartType::Column | ChartType::Other => write!(
            xml,
            r#"<c:barChart><c:barDir val="{}"/><c:grouping val="clustered"/><c:varyColors val="0"/>"#,
            if chart_type == ChartType::Bar { "bar" } else { "col" }
        )
        .map_err(fmt_error)?,
        ChartType::Line => xml.push_str(r#"<c:lineChart><c:grouping val="standard"/><c:varyColors val="0"/>"#),
        ChartType::Doughnut => xml.push_str(r#"<c:doughnutChart><c:varyColors val="1"/>"#),
        ChartType::Pie => xml.push_str(r#"<c:pieChart><c:varyColors val="1"/>"#),
    }

    for (index, series) in chart.series.iter().enumerate() {
        write!(
            xml,
            r#"<c:ser><c:idx val="{i}"/><c:order val="{i}"/><c:tx><c:v>{}</c:v></c:tx>"#,
            escape_text(&series.name),
            i = index
        )
        .map_err(fmt_error)?;
        let color = series
            .color
            .clone()
            .unwrap_or_else(|| BRAND_COLORS[index % BRAND_COLORS.len()].to_string());
        if !round {
            write_fill(&mut xml, chart_type, &color)?;
        }
        match chart_type {
            ChartType::Line => xml.push_str(r#"<c:marker><c:symbol val="circle"/><c:size val="6"/></c:marker>"#),
            ChartType::Bar | ChartType::Column => xml.push_str(r#"<c:invertIfNegative val="0"/>"#),
            _ => {}
        }
        if round {
            for point in 0..chart.categories.len() {
                write!(
                    xml,
                    r#"<c:dPt><c:idx val="{}"/><c:bubble3D val="0"/><c:spPr><a:solidFill><a:srgbClr val="{}"/></a:solidFill></c:spPr></c:dPt>"#,
                    point,
                    BRAND_COLORS[point % BRAND_COLORS.len()]
                )
                .map_err(fmt_error)?;
            }
        }
        xml.push_str(concat!(
            r#"<c:dLbls><c:numFmt formatCode="0.0" sourceLinked="0"/><c:showLegendKey val="0"/><c:showVal val="1"/>"#,
            r#"<c:showCatName val="0"/><c:showSerName val="0"/><c:showPercent val="0"/><c:showBubbleSize val="0"/></c:dLbls>"#
        ));

        write!(xml, r#"<c:cat><c:strLit><c:ptCount val="{}"/>"#, chart.categories.len()).map_err(fmt_error)?;
        for (idx, category) in chart.categories.iter().enumerate() {
            write!(xml, r#"<c:pt idx="{}"><c:v>{}</c:v></c:pt>"#, idx, escape_text(category))
                .map_err(fmt_error)?;
        }
        xml.push_str("</c:strLit></c:cat>");

        write!(
            xml,
            r#"<c:val><c:numLit><c:formatCode>General</c:formatCode><c:ptCount val="{}"/>"#,
            series.values.len()
        )
        .map_err(fmt_error)?;
        for (idx, value) in series.values.iter().enumerate() {
            if let Some(value) = value {
                write!(xml, r#"<c:pt idx="{}"><c:v>{}</c:v></c:pt>"#, idx, value).map_err(fmt_error)?;
            }
        }
        xml.push_str("</c:numLit></c:val>");
        if chart_type == ChartType::Line {
            xml.push_str(r#"<c:smooth val="0"/>"#);
        }
        xml.push_str("</c:ser>");
    }

    match chart_type {
        ChartType::Doughnut => {
            xml.push_str(r#"<c:firstSliceAng val="0"/><c:holeSize val="50"/></c:doughnutChart>"#)
        }
        ChartType::Pie => xml.push_str(r#"<c:firstSliceAng val="0"/></c:pieChart>"#),
        ChartType::Line => {
            xml.push_str(r#"<c:marker val="1"/><c:axId val="500000001"/><c:axId val="500000002"/></c:lineChart>"#)
        }
        _ => xml.push_str(
            r#"<c:gapWidth val="80"/><c:axId val="500000001"/><c:axId val="500000002"/></c:barChart>"#,
        ),
    }

    if !round {
        let (cat_pos, val_pos) = if chart_type == ChartType::Bar { ("l", "b") } else { ("b", "l") };
        write!(
            xml,
            concat!(
                r#"<c:catAx><c:axId val="500000001"/><c:scaling><c:orientation val="minMax"/></c:scaling><c:delete val="0"/>"#,
                r#"<c:axPos val="{}"/><c:numFmt formatCode="General" sourceLinked="0"/><c:majorTickMark val="none"/>"#,
                r#"<c:minorTickMark val="none"/><c:tickLblPos val="nextTo"/><c:crossAx val="500000002"/><c:crosses val="autoZero"/>"#,
                r#"<c:auto val="1"/><c:lblAlgn val="ctr"/><c:lblOffset val="100"/><c:noMultiLvlLbl val="0"/></c:catAx>"#,
                r#"<c:valAx><c:axId val="500000002"/><c:scaling><c:orientation val="minMax"/></c:scaling><c:delete val="0"/>"#,
                r#"<c:axPos val="{}"/><c:majorGridlines><c:spPr><a:ln w="6350"><a:solidFill><a:srgbClr val="{}"/></a:solidFill></a:ln></c:spPr></c:majorGridlines>"#,
                r#"<c:numFmt formatCode="General" sourceLinked="1"/><c:majorTickMark val="none"/><c:minorTickMark val="none"/>"#,
                r#"<c:tickLblPos val="nextTo"/><c:crossAx val="500000001"/><c:crosses val="autoZero"/><c:crossBetween val="between"/></c:valAx>"#
            ),
            cat_pos, val_pos, GRIDLINE_COLOR
        )
        .map_err(fmt_error)?;
    }

    xml.push_str("</c:plotArea>");
    if chart.has_legend {
        xml.push_str(r#"<c:legend><c:legendPos val="r"/><c:overlay val="0"/></c:legend>"#);
    }
    xml.push_str(r#"<c:plotVisOnly val="1"/><c:dispBlanksAs val="gap"/></c:chart>"#);
    write!(
        xml,
        r#"<c:txPr><a:bodyPr/><a:lstStyle/><a:p><a:pPr><a:defRPr sz="1100"><a:latin typeface="{}"/></a:defRPr></a:pPr><a:endParaRPr lang="en-US"/></a:p></c:txPr>"#,
        BRAND_FONT
    )
    .map_err(fmt_error)?;
    xml.push_str("</c:chartSpace>");
    Ok(xml)
}

fn rels_xml(rels: &[(String, String)]) -> Result<String> {
    let mut xml = String::with_capacity(512);
    xml.push_str(XML_DECL);
    xml.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    for (index, (kind, target)) in rels.iter().enumerate() {
        write!(
            xml,
            r#"<Relationship Id="rId{}" Type="{}/{}" Target="{}"/>"#,
            index + 1,
            REL_BASE,
            kind,
            escape_attr(target)
        )
        .map_err(fmt_error)?;
    }
    xml.push_str("</Relationships>");
    Ok(xml)
}

fn content_types(slides: usize, charts: usize) -> Result<String> {
    let mut xml = String::with_capacity(2048);
    xml.push_str(XML_DECL);
    xml.push_str(concat!(
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
        r#"<Default Extension="xml" ContentType="application/xml"/>"#,
        r#"<Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>"#,
        r#"<Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/>"#,
        r#"<Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/>"#,
        r#"<Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>"#
    ));
    for number in 1..=slides {
        write!(xml, r#"<Override PartName="/ppt/slides/slide{}.xml" ContentType="{}"/>"#, number, CT_SLIDE)
            .map_err(fmt_error)?;
    }
    for number in 1..=charts {
        write!(xml, r#"<Override PartName="/ppt/charts/chart{}.xml" ContentType="{}"/>"#, number, CT_CHART)
            .map_err(fmt_error)?;
    }
    xml.push_str("</Types>");
    Ok(xml)
}

const EMPTY_TREE: &str = concat!(
    r#"<p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
    r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr></p:spTree>"#
);

fn master_xml() -> String {
    format!(
        concat!(
            "{}",
            r#"<p:sldMaster xmlns:a="{}" xmlns:r="{}" xmlns:p="{}"><p:cSld>{}</p:cSld>"#,
            r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" "#,
            r#"accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#,
            r#"<p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#
        ),
        XML_DECL, NS_A, NS_R, NS_P, EMPTY_TREE
    )
}

fn layout_xml() -> String {
    format!(
        concat!(
            "{}",
            r#"<p:sldLayout xmlns:a="{}" xmlns:r="{}" xmlns:p="{}" type="blank" preserve="1">"#,
            r#"<p:cSld name="Blank">{}</p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#
        ),
        XML_DECL, NS_A, NS_R, NS_P, EMPTY_TREE
    )
}

fn theme_xml() -> Result<String> {
    let mut xml = String::with_capacity(4096);
    xml.push_str(XML_DECL);
    write!(xml, r#"<a:theme xmlns:a="{}" name="Crosstab Report"><a:themeElements>"#, NS_A).map_err(fmt_error)?;
    xml.push_str(concat!(
        r#"<a:clrScheme name="Crosstab Report">"#,
        r#"<a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1>"#,
        r#"<a:dk2><a:srgbClr val="44546A"/></a:dk2><a:lt2><a:srgbClr val="E7E6E6"/></a:lt2>"#
    ));
    let accents = BRAND_COLORS.iter().chain(std::iter::once(&"70AD47"));
    for (index, color) in accents.enumerate() {
        write!(xml, r#"<a:accent{n}><a:srgbClr val="{}"/></a:accent{n}>"#, color, n = index + 1)
            .map_err(fmt_error)?;
    }
    xml.push_str(r#"<a:hlink><a:srgbClr val="0563C1"/></a:hlink><a:folHlink><a:srgbClr val="954F72"/></a:folHlink></a:clrScheme>"#);

    xml.push_str(r#"<a:fontScheme name="Crosstab Report">"#);
    for tag in ["majorFont", "minorFont"] {
        write!(
            xml,
            r#"<a:{t}><a:latin typeface="{}"/><a:ea typeface=""/><a:cs typeface=""/></a:{t}>"#,
            BRAND_FONT,
            t = tag
        )
        .map_err(fmt_error)?;
    }
    xml.push_str("</a:fontScheme>");

    let fill = r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#;
    let line = r#"<a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#;
    let effect = "<a:effectStyle><a:effectLst/></a:effectStyle>";
    write!(
        xml,
        concat!(
            r#"<a:fmtScheme name="Crosstab Report">"#,
            "<a:fillStyleLst>{f}{f}{f}</a:fillStyleLst>",
            "<a:lnStyleLst>{l}{l}{l}</a:lnStyleLst>",
            "<a:effectStyleLst>{e}{e}{e}</a:effectStyleLst>",
            "<a:bgFillStyleLst>{f}{f}{f}</a:bgFillStyleLst>",
            "</a:fmtScheme>"
        ),
        f = fill,
        l = line,
        e = effect
    )
    .map_err(fmt_error)?;
    xml.push_str("</a:themeElements></a:theme>");
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::read_chart;
    use crate::package::PptxPackage;
    use pretty_assertions::assert_eq;
    use xtab_core::dataset::{CellValue, CrosstabDataset, CrosstabTable};
    use xtab_core::deck::ChartSeries;
    use xtab_core::export::{ExportOptions, Exporter, Visual, CHART_SHAPE};
    use xtab_core::{resolve, MappingKind, Reconciler};

    fn dataset(male: f64) -> CrosstabDataset {
        let table = CrosstabTable::new(
            "Q Gender",
            vec!["Base".into(), "Male".into(), "Female".into()],
            vec!["Total".into()],
            vec![
                vec![CellValue::Number(1000.0)],
                vec![CellValue::Number(male)],
                vec![CellValue::Number(100.0 - male)],
            ],
        )
        .unwrap()
        .with_question_text("What is your gender?");
        CrosstabDataset::new(vec![table]).unwrap()
    }

    fn exported(visual: Visual) -> Vec<u8> {
        let options = ExportOptions {
            visual,
            ..ExportOptions::default()
        };
        let export = Exporter::new(options).export(&dataset(48.0));
        DeckBuilder::new(&export.deck).to_bytes().unwrap()
    }

    fn chart_values(package: &PptxPackage) -> Vec<Option<f64>> {
        package
            .deck()
            .shapes()
            .find_map(|(_, shape)| match &shape.content {
                ShapeContent::Chart(chart) if shape.name == CHART_SHAPE => {
                    Some(chart.series[0].values.clone())
                }
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_chart_xml_reads_back() {
        let chart = Chart {
            chart_type: ChartType::Doughnut,
            categories: vec!["Male".into(), "Female & other".into()],
            series: vec![ChartSeries {
                name: "Total".into(),
                values: vec![Some(48.0), None],
                color: Some("2175F3".into()),
            }],
            has_legend: true,
        };
        let mut expected = chart.clone();
        // round charts colour points, not the series
        expected.series[0].color = None;
        assert_eq!(read_chart(&chart_xml(&chart).unwrap()).unwrap(), expected);
    }

    #[test]
    fn test_parts_layout() {
        let mut deck = Deck::new();
        deck.add_slide();
        let names: Vec<String> = DeckBuilder::new(&deck)
            .parts()
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names[0], "[Content_Types].xml");
        assert!(names.contains(&"ppt/slides/slide1.xml".to_string()));
        assert!(names.contains(&"ppt/theme/theme1.xml".to_string()));
    }

    #[test]
    fn test_built_deck_keeps_mappings() {
        let package = PptxPackage::from_bytes(&exported(Visual::ChartTable)).unwrap();
        assert_eq!(package.deck().slides.len(), 2);

        let resolution = resolve(package.deck());
        let kinds: Vec<MappingKind> = resolution.mapped.iter().map(|r| r.record.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MappingKind::QuestionText,
                MappingKind::Chart,
                MappingKind::Table,
                MappingKind::BaseText
            ]
        );
        assert_eq!(chart_values(&package), vec![Some(48.0), Some(52.0)]);
    }

    #[test]
    fn test_built_deck_is_in_sync() {
        let package = PptxPackage::from_bytes(&exported(Visual::BarH)).unwrap();
        let mut deck = package.deck().clone();
        let report = Reconciler::new(&dataset(48.0)).reconcile(&mut deck);
        assert!(report.is_clean(), "{:?}", report);
        assert!(report.changed.is_empty(), "{:?}", report.changed);
    }

    #[test]
    fn test_update_round_trip() {
        let mut package = PptxPackage::from_bytes(&exported(Visual::Donut)).unwrap();
        let mut deck = package.deck().clone();
        let report = Reconciler::new(&dataset(40.0)).reconcile(&mut deck);
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.changed.len(), 1);

        assert!(package.apply(&deck).unwrap() > 0);
        let reopened = PptxPackage::from_bytes(&package.to_bytes().unwrap()).unwrap();
        assert_eq!(chart_values(&reopened), vec![Some(40.0), Some(60.0)]);
        assert_eq!(resolve(reopened.deck()).mapped.len(), 3);
    }
}
