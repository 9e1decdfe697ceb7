//! DOCX backend: `word/document.xml` read with quick-xml.
//!
//! Paragraph styles drive the labels (`Title`, `Heading N`, `Caption`), a
//! `w:numPr` marks a list item, `w:tbl` becomes a table (horizontal spans from
//! `w:gridSpan`, vertical spans from `w:vMerge`) and every `a:blip` is
//! resolved through the document relationships to a `word/media` part. DOCX
//! has no page geometry, so the result has no pages.

use super::ooxml::{get_attr, Package};
use super::{BackendInput, DocumentBackend};
use crate::document::{DocItemLabel, DoclingDocument, DocumentBuilder, ImageRef, TableCell, TableData};
use crate::error::DocServeError;
use crate::format::InputFormat;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use tracing::{debug, warn};

const DOCUMENT_PART: &str = "word/document.xml";

pub struct DocxBackend;

impl DocumentBackend for DocxBackend {
    fn format(&self) -> InputFormat {
        InputFormat::Docx
    }

    fn convert(&self, input: &BackendInput<'_>) -> Result<DoclingDocument, DocServeError> {
        let mut pkg = Package::open(input.path)?;
        let xml = pkg
            .read_string(DOCUMENT_PART)
            .ok_or_else(|| input.corrupt(format!("missing {DOCUMENT_PART}")))?;
        let rels = pkg.relationships(DOCUMENT_PART);
        input.check_cancelled()?;

        let mut b = input.builder();
        let mut media = |rid: &str| -> Option<ImageRef> {
            let target = rels.get(rid)?;
            let bytes = pkg.read_bytes(target)?;
            match ImageRef::from_encoded_bytes(&bytes, 72) {
                Ok(img) => Some(img),
                Err(e) => {
                    warn!("Skipping undecodable image {target}: {e}");
                    None
                }
            }
        };
        parse_document_xml(&xml, &mut b, &mut media).map_err(|e| input.corrupt(e))?;
        Ok(b.build())
    }
}

#[derive(Default)]
struct Paragraph {
    style: Option<String>,
    list: bool,
    text: String,
    images: Vec<String>,
}

#[derive(Default)]
struct RawCell {
    text: String,
    col_span: usize,
    /// `Some(true)` starts a vertical merge, `Some(false)` continues one.
    v_merge: Option<bool>,
}

#[derive(Default)]
struct TableState {
    rows: Vec<Vec<RawCell>>,
    /// Nested tables are flattened into the enclosing cell's text.
    depth: usize,
}

/// Walk `document.xml`, appending items to `b`. `media` resolves a
/// relationship id to a decoded image.
fn parse_document_xml(
    xml: &str,
    b: &mut DocumentBuilder,
    media: &mut dyn FnMut(&str) -> Option<ImageRef>,
) -> Result<(), String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut para: Option<Paragraph> = None;
    let mut table: Option<TableState> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(format!("XML error at {}: {e}", reader.buffer_position())),
            Ok(Event::Start(e)) => {
                start_element(&e, &mut para, &mut table, &mut in_text);
            }
            Ok(Event::Empty(e)) => {
                start_element(&e, &mut para, &mut table, &mut in_text);
                if e.name().as_ref() == b"w:t" {
                    in_text = false;
                }
            }
            Ok(Event::Text(t)) if in_text => {
                if let Some(p) = para.as_mut() {
                    p.text.push_str(&t.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    if let Some(p) = para.take() {
                        finish_paragraph(p, b, table.as_mut(), media);
                    }
                }
                b"w:tc" => {
                    if let Some(t) = table.as_mut() {
                        if t.depth == 1 {
                            if let Some(cell) = t.rows.last_mut().and_then(|r| r.last_mut()) {
                                cell.text = cell.text.trim().to_string();
                            }
                        }
                    }
                }
                b"w:tbl" => {
                    if let Some(t) = table.as_mut() {
                        t.depth -= 1;
                        if t.depth == 0 {
                            if let Some(t) = table.take() {
                                b.add_table(build_table(t.rows), None, None);
                            }
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn start_element(
    e: &BytesStart<'_>,
    para: &mut Option<Paragraph>,
    table: &mut Option<TableState>,
    in_text: &mut bool,
) {
    match e.name().as_ref() {
        b"w:p" => *para = Some(Paragraph::default()),
        b"w:pStyle" => {
            if let Some(p) = para.as_mut() {
                p.style = get_attr(e, b"w:val");
            }
        }
        b"w:numPr" => {
            if let Some(p) = para.as_mut() {
                p.list = true;
            }
        }
        b"w:t" => *in_text = true,
        b"w:tab" => push_text(para, "\t"),
        b"w:br" | b"w:cr" => push_text(para, "\n"),
        b"a:blip" => {
            if let (Some(p), Some(rid)) = (para.as_mut(), get_attr(e, b"r:embed")) {
                p.images.push(rid);
            }
        }
        b"w:tbl" => match table.as_mut() {
            Some(t) => t.depth += 1,
            None => {
                *table = Some(TableState {
                    rows: Vec::new(),
                    depth: 1,
                })
            }
        },
        b"w:tr" => {
            if let Some(t) = table.as_mut().filter(|t| t.depth == 1) {
                t.rows.push(Vec::new());
            }
        }
        b"w:tc" => {
            if let Some(t) = table.as_mut().filter(|t| t.depth == 1) {
                if let Some(row) = t.rows.last_mut() {
                    row.push(RawCell {
                        col_span: 1,
                        ..RawCell::default()
                    });
                }
            }
        }
        b"w:gridSpan" => {
            if let Some(cell) = current_cell(table) {
                cell.col_span = get_attr(e, b"w:val")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1usize)
                    .max(1);
            }
        }
        b"w:vMerge" => {
            if let Some(cell) = current_cell(table) {
                // A bare <w:vMerge/> continues the merge above.
                cell.v_merge = Some(get_attr(e, b"w:val").as_deref() == Some("restart"));
            }
        }
        _ => {}
    }
}

fn current_cell(table: &mut Option<TableState>) -> Option<&mut RawCell> {
    table
        .as_mut()
        .filter(|t| t.depth == 1)
        .and_then(|t| t.rows.last_mut())
        .and_then(|r| r.last_mut())
}

fn push_text(para: &mut Option<Paragraph>, s: &str) {
    if let Some(p) = para.as_mut() {
        p.text.push_str(s);
    }
}

fn finish_paragraph(
    p: Paragraph,
    b: &mut DocumentBuilder,
    table: Option<&mut TableState>,
    media: &mut dyn FnMut(&str) -> Option<ImageRef>,
) {
    // Inside a table the paragraph only contributes text to the open cell.
    if let Some(t) = table {
        if let Some(cell) = t.rows.last_mut().and_then(|r| r.last_mut()) {
            if !cell.text.is_empty() && !p.text.trim().is_empty() {
                cell.text.push(' ');
            }
            cell.text.push_str(p.text.trim());
        }
        return;
    }

    let style = p.style.as_deref().unwrap_or("");
    let text = p.text.as_str();
    if let Some(level) = heading_level(style) {
        b.add_heading(text, level, None);
    } else if style.eq_ignore_ascii_case("title") {
        b.add_title(text, None);
    } else if style.eq_ignore_ascii_case("caption") {
        b.add_text(DocItemLabel::Caption, text, None);
    } else if p.list || style.to_ascii_lowercase().starts_with("list") {
        b.add_list_item(text, false, None);
    } else {
        b.add_text(DocItemLabel::Paragraph, text, None);
    }

    for rid in &p.images {
        debug!("Picture relationship {rid}");
        let image = media(rid);
        b.add_picture(image, None, None);
    }
}

/// `Heading1`, `heading 2`, … → 1, 2, …
fn heading_level(style: &str) -> Option<u32> {
    let lower = style.to_ascii_lowercase();
    let rest = lower.strip_prefix("heading")?.trim();
    rest.parse::<u32>().ok().filter(|n| *n >= 1)
}

/// Lay raw rows out on a grid, folding `vMerge` continuations into the
/// starting cell's row span.
fn build_table(rows: Vec<Vec<RawCell>>) -> TableData {
    let mut cells: Vec<TableCell> = Vec::new();
    // Column → index into `cells` of an open vertical merge.
    let mut open_merges: HashMap<usize, usize> = HashMap::new();

    for (r, row) in rows.into_iter().enumerate() {
        let mut c = 0usize;
        for raw in row {
            let span = raw.col_span.max(1);
            match raw.v_merge {
                Some(false) => {
                    if let Some(&idx) = open_merges.get(&c) {
                        let cell = &mut cells[idx];
                        cell.row_span += 1;
                        cell.end_row_offset_idx = r + 1;
                    }
                }
                merge => {
                    let header = r == 0;
                    cells.push(TableCell::spanning(raw.text, r, c, 1, span).with_column_header(header));
                    if merge == Some(true) {
                        open_merges.insert(c, cells.len() - 1);
                    } else {
                        open_merges.remove(&c);
                    }
                }
            }
            c += span;
        }
    }
    TableData::from_cells(cells)
}
