//! PPTX backend: one page per slide, in slide-number order.
//!
//! Shapes contribute their paragraphs (title placeholders as titles, bulleted
//! or indented paragraphs as list items), graphic frames holding `a:tbl`
//! become tables and `p:pic` elements become pictures resolved through the
//! slide's relationships. Slides are not rasterised.

use super::ooxml::{get_attr, Package};
use super::{BackendInput, DocumentBackend};
use crate::document::{
    BoundingBox, CoordOrigin, DocItemLabel, DoclingDocument, DocumentBuilder, ImageRef,
    ProvenanceItem, Size, TableCell, TableData,
};
use crate::error::DocServeError;
use crate::format::InputFormat;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use tracing::{debug, warn};

/// English Metric Units per point.
const EMU_PER_POINT: f64 = 12_700.0;
/// 4:3 default slide size (10in × 7.5in) when `presentation.xml` has none.
const DEFAULT_SLIDE_SIZE: Size = Size {
    width: 720.0,
    height: 540.0,
};

static SLIDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").expect("valid regex"));

pub struct PptxBackend;

impl DocumentBackend for PptxBackend {
    fn format(&self) -> InputFormat {
        InputFormat::Pptx
    }

    fn convert(&self, input: &BackendInput<'_>) -> Result<DoclingDocument, DocServeError> {
        let mut pkg = Package::open(input.path)?;
        let size = pkg
            .read_string("ppt/presentation.xml")
            .and_then(|xml| slide_size(&xml))
            .unwrap_or(DEFAULT_SLIDE_SIZE);

        let mut slides: Vec<(u32, String)> = pkg
            .names()
            .into_iter()
            .filter_map(|name| {
                let n = SLIDE_RE.captures(&name)?.get(1)?.as_str().parse().ok()?;
                Some((n, name))
            })
            .collect();
        if slides.is_empty() {
            return Err(input.corrupt("no slides in ppt/slides/"));
        }
        slides.sort_by_key(|(n, _)| *n);

        let mut b = input.builder();
        for (page_no, (_, part)) in (1u32..).zip(slides) {
            input.check_cancelled()?;
            let Some(xml) = pkg.read_string(&part) else {
                warn!("Slide part {part} unreadable, skipping");
                continue;
            };
            debug!("Parsing {part} as page {page_no}");
            let rels = pkg.relationships(&part);
            b.add_page(page_no, size, None);

            let mut media = |rid: &str| -> Option<ImageRef> {
                let target = rels.get(rid)?;
                let bytes = pkg.read_bytes(target)?;
                ImageRef::from_encoded_bytes(&bytes, 72)
                    .map_err(|e| warn!("Skipping undecodable image {target}: {e}"))
                    .ok()
            };
            parse_slide(&xml, page_no, &mut b, &mut media)
                .map_err(|e| input.corrupt(format!("{part}: {e}")))?;
        }
        Ok(b.build())
    }
}

fn slide_size(presentation_xml: &str) -> Option<Size> {
    let mut reader = Reader::from_str(presentation_xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"p:sldSz" => {
                let cx: f64 = get_attr(&e, b"cx")?.parse().ok()?;
                let cy: f64 = get_attr(&e, b"cy")?.parse().ok()?;
                return Some(Size {
                    width: cx / EMU_PER_POINT,
                    height: cy / EMU_PER_POINT,
                });
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

#[derive(Default)]
struct Para {
    text: String,
    bullet: Option<bool>,
    level: u32,
}

#[derive(Default)]
struct Shape {
    placeholder: Option<String>,
    paras: Vec<Para>,
}

struct RawCell {
    text: String,
    row_span: usize,
    col_span: usize,
    merged: bool,
}

#[derive(Default)]
struct Frame {
    off: Option<(f64, f64)>,
    ext: Option<(f64, f64)>,
}

impl Frame {
    fn prov(&self, page_no: u32) -> Option<ProvenanceItem> {
        let (x, y) = self.off?;
        let (w, h) = self.ext?;
        Some(ProvenanceItem {
            page_no,
            bbox: BoundingBox::new(
                x / EMU_PER_POINT,
                y / EMU_PER_POINT,
                (x + w) / EMU_PER_POINT,
                (y + h) / EMU_PER_POINT,
                CoordOrigin::TopLeft,
            ),
            charspan: [0, 0],
        })
    }
}

#[derive(Default)]
struct SlideState {
    shape: Option<Shape>,
    para: Option<Para>,
    in_text: bool,
    table: Option<Vec<Vec<RawCell>>>,
    pic_rid: Option<String>,
    in_pic: bool,
    frame: Frame,
}

fn parse_slide(
    xml: &str,
    page_no: u32,
    b: &mut DocumentBuilder,
    media: &mut dyn FnMut(&str) -> Option<ImageRef>,
) -> Result<(), String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut s = SlideState::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(format!("XML error at {}: {e}", reader.buffer_position())),
            Ok(Event::Start(e)) => start_element(&e, &mut s),
            Ok(Event::Empty(e)) => {
                start_element(&e, &mut s);
                if e.name().as_ref() == b"a:t" {
                    s.in_text = false;
                }
            }
            Ok(Event::Text(t)) if s.in_text => {
                if let Some(p) = s.para.as_mut() {
                    p.text.push_str(&t.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"a:t" => s.in_text = false,
                b"a:p" => {
                    if let Some(para) = s.para.take() {
                        finish_para(para, &mut s);
                    }
                }
                b"p:sp" => {
                    if let Some(shape) = s.shape.take() {
                        emit_shape(shape, b);
                    }
                }
                b"a:tbl" => {
                    if let Some(rows) = s.table.take() {
                        b.add_table(build_table(rows), s.frame.prov(page_no), None);
                    }
                }
                b"p:pic" => {
                    let image = s.pic_rid.take().and_then(|rid| media(&rid));
                    b.add_picture(image, s.frame.prov(page_no), None);
                    s.in_pic = false;
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

fn start_element(e: &BytesStart<'_>, s: &mut SlideState) {
    match e.name().as_ref() {
        b"p:sp" => s.shape = Some(Shape::default()),
        b"p:ph" => {
            if let Some(shape) = s.shape.as_mut() {
                shape.placeholder = Some(get_attr(e, b"type").unwrap_or_else(|| "body".into()));
            }
        }
        b"p:pic" => {
            s.in_pic = true;
            s.pic_rid = None;
            s.frame = Frame::default();
        }
        b"p:graphicFrame" => s.frame = Frame::default(),
        b"a:blip" if s.in_pic => s.pic_rid = get_attr(e, b"r:embed"),
        b"a:off" => {
            if let (Some(x), Some(y)) = (num_attr(e, b"x"), num_attr(e, b"y")) {
                s.frame.off = Some((x, y));
            }
        }
        b"a:ext" => {
            if let (Some(cx), Some(cy)) = (num_attr(e, b"cx"), num_attr(e, b"cy")) {
                s.frame.ext = Some((cx, cy));
            }
        }
        b"a:p" => s.para = Some(Para::default()),
        b"a:pPr" => {
            if let Some(p) = s.para.as_mut() {
                p.level = num_attr(e, b"lvl").map(|l| l as u32).unwrap_or(0);
            }
        }
        b"a:buChar" => {
            if let Some(p) = s.para.as_mut() {
                p.bullet = Some(false);
            }
        }
        b"a:buAutoNum" => {
            if let Some(p) = s.para.as_mut() {
                p.bullet = Some(true);
            }
        }
        b"a:t" => s.in_text = true,
        b"a:br" => {
            if let Some(p) = s.para.as_mut() {
                p.text.push('\n');
            }
        }
        b"a:tbl" => s.table = Some(Vec::new()),
        b"a:tr" => {
            if let Some(t) = s.table.as_mut() {
                t.push(Vec::new());
            }
        }
        b"a:tc" => {
            if let Some(row) = s.table.as_mut().and_then(|t| t.last_mut()) {
                let span = |key: &[u8]| num_attr(e, key).map(|v| v as usize).unwrap_or(1).max(1);
                row.push(RawCell {
                    text: String::new(),
                    row_span: span(b"rowSpan"),
                    col_span: span(b"gridSpan"),
                    merged: get_attr(e, b"hMerge").is_some() || get_attr(e, b"vMerge").is_some(),
                });
            }
        }
        _ => {}
    }
}

/// Table cells take the paragraph text; shapes keep the paragraph.
fn finish_para(para: Para, s: &mut SlideState) {
    let cell = s
        .table
        .as_mut()
        .and_then(|t| t.last_mut())
        .and_then(|r| r.last_mut());
    if let Some(cell) = cell {
        if !cell.text.is_empty() && !para.text.trim().is_empty() {
            cell.text.push(' ');
        }
        cell.text.push_str(para.text.trim());
    } else if let Some(shape) = s.shape.as_mut() {
        shape.paras.push(para);
    }
}

fn num_attr(e: &BytesStart<'_>, key: &[u8]) -> Option<f64> {
    get_attr(e, key)?.parse().ok()
}

fn emit_shape(shape: Shape, b: &mut DocumentBuilder) {
    let is_title = matches!(
        shape.placeholder.as_deref(),
        Some("title") | Some("ctrTitle")
    );
    for para in shape.paras {
        if is_title {
            b.add_title(&para.text, None);
        } else if para.bullet.is_some() || para.level > 0 {
            b.add_list_item(&para.text, para.bullet == Some(true), None);
        } else {
            b.add_text(DocItemLabel::Paragraph, &para.text, None);
        }
    }
}

/// Continuation cells (`hMerge`/`vMerge`) keep their grid position but are
/// covered by the spanning cell that starts the merge.
fn build_table(rows: Vec<Vec<RawCell>>) -> TableData {
    let mut cells = Vec::new();
    for (r, row) in rows.into_iter().enumerate() {
        for (c, raw) in row.into_iter().enumerate() {
            if raw.merged {
                continue;
            }
            cells.push(
                TableCell::spanning(raw.text, r, c, raw.row_span, raw.col_span)
                    .with_column_header(r == 0),
            );
        }
    }
    TableData::from_cells(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ooxml::test_support::zip_bytes;
    use crate::backend::test_support::convert_bytes;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

    fn slide1() -> String {
        format!(
            r#"<p:sld {NS}><p:cSld><p:spTree>
<p:sp><p:nvSpPr><p:nvPr><p:ph type="ctrTitle"/></p:nvPr></p:nvSpPr>
  <p:txBody><a:p><a:r><a:t>Roadmap 2025</a:t></a:r></a:p></p:txBody></p:sp>
<p:sp><p:nvSpPr><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr>
  <p:txBody>
    <a:p><a:r><a:t>Goals for the year</a:t></a:r></a:p>
    <a:p><a:pPr lvl="1"><a:buChar char="•"/></a:pPr><a:r><a:t>Ship v2</a:t></a:r></a:p>
  </p:txBody></p:sp>
</p:spTree></p:cSld></p:sld>"#
        )
    }

    fn slide2() -> String {
        format!(
            r#"<p:sld {NS}><p:cSld><p:spTree>
<p:graphicFrame><p:xfrm><a:off x="127000" y="254000"/><a:ext cx="1270000" cy="635000"/></p:xfrm>
  <a:graphic><a:graphicData><a:tbl>
    <a:tr><a:tc gridSpan="2"><a:txBody><a:p><a:r><a:t>Quarter</a:t></a:r></a:p></a:txBody></a:tc><a:tc hMerge="1"><a:txBody><a:p/></a:txBody></a:tc></a:tr>
    <a:tr><a:tc><a:txBody><a:p><a:r><a:t>Q1</a:t></a:r></a:p></a:txBody></a:tc><a:tc><a:txBody><a:p><a:r><a:t>Q2</a:t></a:r></a:p></a:txBody></a:tc></a:tr>
  </a:tbl></a:graphicData></a:graphic></p:graphicFrame>
<p:pic><p:blipFill><a:blip r:embed="rId2"/></p:blipFill>
  <p:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="127000" cy="127000"/></a:xfrm></p:spPr></p:pic>
</p:spTree></p:cSld></p:sld>"#
        )
    }

    const SLIDE2_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId2" Type="image" Target="../media/image1.png"/></Relationships>"#;

    fn pptx() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255])));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let presentation = format!(r#"<p:presentation {NS}><p:sldSz cx="12192000" cy="6858000"/></p:presentation>"#);
        let (s1, s2) = (slide1(), slide2());
        // slide10 sorts after slide2 numerically, not lexically.
        zip_bytes(&[
            ("ppt/presentation.xml", presentation.as_bytes()),
            ("ppt/slides/slide10.xml", s1.as_bytes()),
            ("ppt/slides/slide2.xml", s2.as_bytes()),
            ("ppt/slides/_rels/slide2.xml.rels", SLIDE2_RELS.as_bytes()),
            ("ppt/media/image1.png", &png),
        ])
    }

    #[test]
    fn slides_become_pages_in_numeric_order() {
        let doc = convert_bytes(&PptxBackend, "deck.pptx", &pptx()).unwrap();
        assert_eq!(doc.num_pages(), 2);
        assert_eq!(doc.pages[&1].size.width, 960.0);
        assert_eq!(doc.pages[&1].size.height, 540.0);

        let labels: Vec<DocItemLabel> = doc.iterate_items().map(|i| i.label()).collect();
        assert_eq!(
            labels,
            vec![
                DocItemLabel::Table,
                DocItemLabel::Picture,
                DocItemLabel::Title,
                DocItemLabel::Paragraph,
                DocItemLabel::ListItem,
            ]
        );
    }

    #[test]
    fn table_merge_and_provenance() {
        let doc = convert_bytes(&PptxBackend, "deck.pptx", &pptx()).unwrap();
        let table = &doc.tables[0];
        assert_eq!((table.data.num_rows, table.data.num_cols), (2, 2));
        assert_eq!(table.data.table_cells[0].col_span, 2);
        let prov = &table.prov[0];
        assert_eq!(prov.page_no, 1);
        assert_eq!(prov.bbox.l, 10.0);
        assert_eq!(prov.bbox.t, 20.0);
        assert_eq!(prov.bbox.r, 110.0);

        let pic = &doc.pictures[0];
        assert!(pic.image.is_some());
        assert_eq!(pic.prov[0].bbox.r, 10.0);
    }

    #[test]
    fn empty_package_is_corrupt() {
        let bytes = zip_bytes(&[("ppt/presentation.xml", b"<p:presentation/>")]);
        let err = convert_bytes(&PptxBackend, "empty.pptx", &bytes).unwrap_err();
        assert!(matches!(err, DocServeError::CorruptDocument { .. }));
    }
}
