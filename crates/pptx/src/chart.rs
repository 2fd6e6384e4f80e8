//! Chart part reading and cache patching.
//!
//! Only the first series is data-bound. Patching rewrites its name, category
//! and value caches (literal or reference caches alike) and copies every
//! other event through, so axes, colours, labels and the legend stay as they
//! were. The embedded workbook is not refreshed. Row labels are one level,
//! so numeric and multi-level category caches are written back as string
//! caches.

use crate::xml::{attr, ends_with, local_name, renamed, xml_error};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use xtab_core::deck::{Chart, ChartSeries, ChartType};
use xtab_core::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Name,
    Categories,
    Values,
}

fn is_plot(local: &[u8]) -> bool {
    local.ends_with(b"Chart")
}

fn chart_type(plot: &[u8], bar_dir: Option<&str>) -> ChartType {
    match plot {
        b"barChart" | b"bar3DChart" => match bar_dir {
            Some("bar") => ChartType::Bar,
            _ => ChartType::Column,
        },
        b"doughnutChart" => ChartType::Doughnut,
        b"lineChart" | b"line3DChart" => ChartType::Line,
        b"pieChart" | b"pie3DChart" | b"ofPieChart" => ChartType::Pie,
        _ => ChartType::Other,
    }
}

/// Position of the open `c:ser` in the stack, if any.
fn series_depth(stack: &[Vec<u8>]) -> Option<usize> {
    stack
        .iter()
        .enumerate()
        .position(|(i, name)| {
            name.as_slice() == b"ser" && i > 0 && is_plot(&stack[i - 1])
        })
}

/// Which data-bearing part of the series the stack is in.
fn section(stack: &[Vec<u8>]) -> Option<Section> {
    let ser = series_depth(stack)?;
    match stack.get(ser + 1)?.as_slice() {
        b"tx" => Some(Section::Name),
        b"cat" => Some(Section::Categories),
        b"val" => Some(Section::Values),
        _ => None,
    }
}

#[derive(Default)]
struct ChartReader {
    stack: Vec<Vec<u8>>,
    plot: Option<Vec<u8>>,
    bar_dir: Option<String>,
    has_legend: bool,
    categories: Vec<String>,
    series: Vec<ChartSeries>,
    point: Option<usize>,
    /// `c:lvl` elements opened in the category cache; the first holds the leaf labels.
    category_levels: usize,
}

impl ChartReader {
    fn open(&mut self, e: &BytesStart) {
        let local = local_name(e.name().as_ref()).to_vec();
        let parent = self.stack.last().cloned().unwrap_or_default();
        self.stack.push(local.clone());

        match local.as_slice() {
            b"legend" if parent.as_slice() == b"chart" => self.has_legend = true,
            l if is_plot(l) && parent.as_slice() == b"plotArea" && self.plot.is_none() => {
                self.plot = Some(local.clone());
            }
            b"barDir" if self.bar_dir.is_none() => self.bar_dir = attr(e, b"val"),
            b"ser" if is_plot(&parent) => self.series.push(ChartSeries {
                name: String::new(),
                values: Vec::new(),
                color: None,
            }),
            b"srgbClr" => {
                let Some(ser) = series_depth(&self.stack) else {
                    return;
                };
                let fill = &self.stack[ser + 1..];
                let is_series_fill = (fill.len() == 3
                    && ends_with(fill, &[b"spPr", b"solidFill", b"srgbClr"]))
                    || (fill.len() == 4 && ends_with(fill, &[b"spPr", b"ln", b"solidFill", b"srgbClr"]));
                if let Some(series) = self.series.last_mut().filter(|_| is_series_fill) {
                    if series.color.is_none() {
                        series.color = attr(e, b"val");
                    }
                }
            }
            b"ptCount" => {
                let count = attr(e, b"val").and_then(|v| v.parse::<usize>().ok()).unwrap_or(0);
                let first = self.series.len() == 1;
                match section(&self.stack) {
                    Some(Section::Categories) if first && self.categories.is_empty() => {
                        self.categories = vec![String::new(); count];
                    }
                    Some(Section::Values) => {
                        if let Some(series) = self.series.last_mut() {
                            series.values = vec![None; count];
                        }
                    }
                    _ => {}
                }
            }
            b"pt" => self.point = attr(e, b"idx").and_then(|v| v.parse().ok()),
            b"lvl" if section(&self.stack) == Some(Section::Categories) => self.category_levels += 1,
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.stack.last().map(Vec::as_slice) != Some(b"v".as_slice()) {
            return;
        }
        let first = self.series.len() == 1;
        let point = self.point;
        let Some(series) = self.series.last_mut() else {
            return;
        };
        match section(&self.stack) {
            Some(Section::Name) => series.name.push_str(text),
            Some(Section::Categories) if first && self.category_levels <= 1 => {
                if let Some(idx) = point {
                    if self.categories.len() <= idx {
                        self.categories.resize(idx + 1, String::new());
                    }
                    self.categories[idx].push_str(text);
                }
            }
            Some(Section::Values) => {
                if let Some(idx) = point {
                    if series.values.len() <= idx {
                        series.values.resize(idx + 1, None);
                    }
                    series.values[idx] = text.trim().parse().ok();
                }
            }
            _ => {}
        }
    }

    fn close(&mut self) {
        if self.stack.pop().as_deref() == Some(b"pt".as_slice()) {
            self.point = None;
        }
    }

    fn finish(self) -> Chart {
        Chart {
            chart_type: self
                .plot
                .as_deref()
                .map(|p| chart_type(p, self.bar_dir.as_deref()))
                .unwrap_or(ChartType::Other),
            categories: self.categories,
            series: self.series,
            has_legend: self.has_legend,
        }
    }
}

/// Read a chart part.
pub(crate) fn read_chart(xml: &str) -> Result<Chart> {
    let mut reader = Reader::from_str(xml);
    let mut chart = ChartReader::default();
    loop {
        match reader.read_event().map_err(|e| xml_error("chart", e))? {
            Event::Start(e) => chart.open(&e),
            Event::Empty(e) => {
                chart.open(&e);
                chart.close();
            }
            Event::End(_) => chart.close(),
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| xml_error("chart", e))?;
                chart.text(&text);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(chart.finish())
}

struct ChartPatcher<'a> {
    chart: &'a Chart,
    writer: Writer<Vec<u8>>,
    stack: Vec<Vec<u8>>,
    series_seen: usize,
    /// Depths whose end tag is written under a new name.
    renames: Vec<(usize, String)>,
    replacing_text: bool,
}

impl<'a> ChartPatcher<'a> {
    fn write(&mut self, event: Event) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| xml_error("chart", e))
    }

    fn in_first_series(&self) -> bool {
        self.series_seen == 1 && series_depth(&self.stack).is_some()
    }

    fn write_points<S: AsRef<str>>(&mut self, prefix: &str, points: &[(usize, S)], count: usize) -> Result<()> {
        let count = count.to_string();
        let mut pt_count = BytesStart::new(format!("{}ptCount", prefix));
        pt_count.push_attribute(("val", count.as_str()));
        self.write(Event::Empty(pt_count))?;
        for (idx, value) in points {
            let idx = idx.to_string();
            let mut pt = BytesStart::new(format!("{}pt", prefix));
            pt.push_attribute(("idx", idx.as_str()));
            self.write(Event::Start(pt))?;
            self.write(Event::Start(BytesStart::new(format!("{}v", prefix))))?;
            self.write(Event::Text(BytesText::new(value.as_ref())))?;
            self.write(Event::End(BytesEnd::new(format!("{}v", prefix))))?;
            self.write(Event::End(BytesEnd::new(format!("{}pt", prefix))))?;
        }
        Ok(())
    }

    /// Replace a cache element's children with the chart's data.
    fn write_cache(
        &mut self,
        name: &str,
        section: Section,
        format_code: Option<String>,
    ) -> Result<()> {
        let prefix = name
            .split_once(':')
            .map(|(p, _)| format!("{}:", p))
            .unwrap_or_default();
        self.write(Event::Start(BytesStart::new(name.to_string())))?;
        match section {
            Section::Name => {
                let name = self.chart.series.first().map(|s| s.name.clone()).unwrap_or_default();
                self.write_points(&prefix, &[(0, name)], 1)?;
            }
            Section::Categories => {
                let points: Vec<(usize, String)> =
                    self.chart.categories.iter().cloned().enumerate().collect();
                self.write_points(&prefix, &points, points.len())?;
            }
            Section::Values => {
                if let Some(code) = format_code {
                    let tag = format!("{}formatCode", prefix);
                    self.write(Event::Start(BytesStart::new(tag.clone())))?;
                    self.write(Event::Text(BytesText::new(&code)))?;
                    self.write(Event::End(BytesEnd::new(tag)))?;
                }
                let values = self
                    .chart
                    .series
                    .first()
                    .map(|s| s.values.clone())
                    .unwrap_or_default();
                let points: Vec<(usize, String)> = values
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| v.map(|v| (i, v.to_string())))
                    .collect();
                self.write_points(&prefix, &points, values.len())?;
            }
        }
        self.write(Event::End(BytesEnd::new(name.to_string())))
    }
}

/// Skip the rest of an element, returning the text of a `formatCode` child.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<Option<String>> {
    let mut depth = 1usize;
    let mut format_code = None;
    let mut in_format = false;
    while depth > 0 {
        match reader.read_event().map_err(|e| xml_error("chart", e))? {
            Event::Start(e) => {
                depth += 1;
                in_format = local_name(e.name().as_ref()) == b"formatCode";
            }
            Event::End(_) => {
                depth -= 1;
                in_format = false;
            }
            Event::Text(t) if in_format => {
                format_code = Some(t.unescape().map_err(|e| xml_error("chart", e))?.into_owned());
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(format_code)
}

const CACHES: &[&[u8]] = &[b"strCache", b"strLit", b"numCache", b"numLit", b"multiLvlStrCache"];

/// Rewrite a chart part so its first series shows `chart`'s data.
pub(crate) fn patch_chart(xml: &str, chart: &Chart) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut patcher = ChartPatcher {
        chart,
        writer: Writer::new(Vec::with_capacity(xml.len())),
        stack: Vec::new(),
        series_seen: 0,
        renames: Vec::new(),
        replacing_text: false,
    };

    loop {
        let event = reader.read_event().map_err(|e| xml_error("chart", e))?;
        let (e, empty) = match event {
            Event::Eof => break,
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(e) => {
                if patcher.replacing_text {
                    patcher.replacing_text = false;
                }
                let depth = patcher.stack.len();
                match patcher.renames.last() {
                    Some((d, name)) if *d == depth => {
                        let name = name.clone();
                        patcher.renames.pop();
                        patcher.write(Event::End(BytesEnd::new(name)))?;
                    }
                    _ => patcher.write(Event::End(e))?,
                }
                patcher.stack.pop();
                continue;
            }
            Event::Text(_) | Event::CData(_) if patcher.replacing_text => continue,
            other => {
                patcher.write(other)?;
                continue;
            }
        };

        let local = local_name(e.name().as_ref()).to_vec();
        let parent_is_plot = patcher.stack.last().is_some_and(|p| is_plot(p));
        patcher.stack.push(local.clone());
        if local.as_slice() == b"ser" && parent_is_plot {
            patcher.series_seen += 1;
        }

        let section = if patcher.in_first_series() {
            section(&patcher.stack)
        } else {
            None
        };
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();

        match section {
            Some(part) if CACHES.contains(&local.as_slice()) => {
                let text_only = part != Section::Values;
                let target = match (text_only, local.as_slice()) {
                    (true, b"numCache") => renamed(name.as_bytes(), "strCache"),
                    (true, b"numLit") => renamed(name.as_bytes(), "strLit"),
                    (true, b"multiLvlStrCache") => renamed(name.as_bytes(), "strCache"),
                    _ => name,
                };
                let format_code = if empty { None } else { skip_element(&mut reader)? };
                patcher.write_cache(&target, part, format_code)?;
                patcher.stack.pop();
                continue;
            }
            Some(Section::Categories) if matches!(local.as_slice(), b"numRef" | b"multiLvlStrRef") => {
                let target = renamed(name.as_bytes(), "strRef");
                if empty {
                    patcher.write(Event::Empty(BytesStart::new(target)))?;
                } else {
                    patcher.renames.push((patcher.stack.len(), target.clone()));
                    patcher.write(Event::Start(BytesStart::new(target)))?;
                }
            }
            // series name written inline as `c:tx/c:v`
            Some(Section::Name)
                if local.as_slice() == b"v" && patcher.stack.len() >= 2
                    && patcher.stack[patcher.stack.len() - 2].as_slice() == b"tx" =>
            {
                let series_name = chart.series.first().map(|s| s.name.clone()).unwrap_or_default();
                patcher.write(Event::Start(e.clone()))?;
                patcher.write(Event::Text(BytesText::new(&series_name)))?;
                if empty {
                    patcher.write(Event::End(BytesEnd::new(name)))?;
                } else {
                    patcher.replacing_text = true;
                }
            }
            _ => patcher.write(if empty {
                Event::Empty(e.clone())
            } else {
                Event::Start(e.clone())
            })?,
        }

        if empty {
            patcher.stack.pop();
        }
    }

    String::from_utf8(patcher.writer.into_inner()).map_err(|e| xml_error("chart", e))
}
