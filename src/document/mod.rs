//! Structured document model produced by the converter.
//!
//! The layout follows the `DoclingDocument` JSON shape: items live in
//! per-kind arrays (`texts`, `pictures`, `tables`) and the reading order is
//! the list of references in `body.children`. [`DoclingDocument::iterate_items`]
//! resolves that list into an ordered stream of [`NodeItem`]s.
//!
//! Exporters live in submodules:
//!
//! | Module | Output |
//! |--------|--------|
//! | [`markdown`] | Markdown and plain text |
//! | [`html`] | standalone HTML page |
//! | [`table`] | per-table CSV ([`DataFrame`]) and HTML |
//! | [`image`] | PNG encoding, cropping, data URIs |

pub mod html;
pub mod image;
pub mod markdown;
pub mod table;

pub use self::image::ImageRef;
pub use self::table::{DataFrame, TableCell, TableData};

use crate::error::DocServeError;
use ::image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema identifier written into every export.
pub const SCHEMA_NAME: &str = "DoclingDocument";
/// Schema version written into every export.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// How exporters treat picture rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageRefMode {
    /// `<!-- image -->` marker, no image data.
    #[default]
    Placeholder,
    /// Inline `data:` URI.
    Embedded,
    /// Link to a PNG file written next to the export.
    Referenced,
}

/// Semantic label of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocItemLabel {
    Title,
    SectionHeader,
    Paragraph,
    Text,
    ListItem,
    Code,
    Caption,
    Formula,
    PageHeader,
    PageFooter,
    Picture,
    Table,
}

/// JSON pointer to an item, serialised as `{"$ref": "#/texts/0"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefItem {
    #[serde(rename = "$ref")]
    pub cref: String,
}

impl RefItem {
    pub fn new(cref: impl Into<String>) -> Self {
        Self { cref: cref.into() }
    }
}

/// Width/height pair in points (pages) or pixels (images).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Where the bounding box coordinates are measured from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordOrigin {
    #[default]
    TopLeft,
    BottomLeft,
}

/// Axis-aligned box in page points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub l: f64,
    pub t: f64,
    pub r: f64,
    pub b: f64,
    pub coord_origin: CoordOrigin,
}

impl BoundingBox {
    pub fn new(l: f64, t: f64, r: f64, b: f64, coord_origin: CoordOrigin) -> Self {
        Self {
            l,
            t,
            r,
            b,
            coord_origin,
        }
    }

    /// The whole page, top-left origin.
    pub fn page(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height, CoordOrigin::TopLeft)
    }

    /// Same box measured from the top-left corner.
    pub fn to_top_left_origin(&self, page_height: f64) -> Self {
        match self.coord_origin {
            CoordOrigin::TopLeft => *self,
            CoordOrigin::BottomLeft => Self::new(
                self.l,
                page_height - self.t,
                self.r,
                page_height - self.b,
                CoordOrigin::TopLeft,
            ),
        }
    }

    pub fn width(&self) -> f64 {
        (self.r - self.l).abs()
    }

    pub fn height(&self) -> f64 {
        (self.b - self.t).abs()
    }
}

/// Where an item came from on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceItem {
    /// 1-based page number.
    pub page_no: u32,
    pub bbox: BoundingBox,
    pub charspan: [usize; 2],
}

/// Input file description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub mimetype: String,
    /// Hex SHA-256 of the input bytes.
    pub binary_hash: String,
    pub filename: String,
}

/// Ordered container of child references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupItem {
    pub self_ref: String,
    #[serde(default)]
    pub children: Vec<RefItem>,
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    pub self_ref: String,
    pub parent: RefItem,
    pub label: DocItemLabel,
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
    pub orig: String,
    pub text: String,
    /// Heading depth for section headers (1 = top-level section).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<u32>,
    /// `true` for numbered list items.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub enumerated: Option<bool>,
    /// Info string of fenced code blocks.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PictureItem {
    pub self_ref: String,
    pub parent: RefItem,
    pub label: DocItemLabel,
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
    #[serde(default)]
    pub captions: Vec<RefItem>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableItem {
    pub self_ref: String,
    pub parent: RefItem,
    pub label: DocItemLabel,
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
    #[serde(default)]
    pub captions: Vec<RefItem>,
    pub data: TableData,
}

/// One page of the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageItem {
    pub page_no: u32,
    pub size: Size,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image: Option<ImageRef>,
}

/// Borrowed view of one item in reading order.
#[derive(Debug, Clone, Copy)]
pub enum NodeItem<'a> {
    Text(&'a TextItem),
    Picture(&'a PictureItem),
    Table(&'a TableItem),
}

impl<'a> NodeItem<'a> {
    pub fn self_ref(&self) -> &'a str {
        match self {
            NodeItem::Text(t) => &t.self_ref,
            NodeItem::Picture(p) => &p.self_ref,
            NodeItem::Table(t) => &t.self_ref,
        }
    }

    pub fn label(&self) -> DocItemLabel {
        match self {
            NodeItem::Text(t) => t.label,
            NodeItem::Picture(p) => p.label,
            NodeItem::Table(t) => t.label,
        }
    }

    pub fn prov(&self) -> &'a [ProvenanceItem] {
        match self {
            NodeItem::Text(t) => &t.prov,
            NodeItem::Picture(p) => &p.prov,
            NodeItem::Table(t) => &t.prov,
        }
    }
}

/// The structured result of a conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoclingDocument {
    pub schema_name: String,
    pub version: String,
    pub name: String,
    pub origin: Origin,
    pub body: GroupItem,
    #[serde(default)]
    pub texts: Vec<TextItem>,
    #[serde(default)]
    pub pictures: Vec<PictureItem>,
    #[serde(default)]
    pub tables: Vec<TableItem>,
    #[serde(default)]
    pub pages: BTreeMap<u32, PageItem>,
}

impl DoclingDocument {
    /// Empty document named `name`.
    pub fn new(name: impl Into<String>, origin: Origin) -> Self {
        Self {
            schema_name: SCHEMA_NAME.to_string(),
            version: SCHEMA_VERSION.to_string(),
            name: name.into(),
            origin,
            body: GroupItem {
                self_ref: "#/body".to_string(),
                children: Vec::new(),
                name: "_root_".to_string(),
                label: "unspecified".to_string(),
            },
            texts: Vec::new(),
            pictures: Vec::new(),
            tables: Vec::new(),
            pages: BTreeMap::new(),
        }
    }

    /// Resolve a `#/<kind>/<index>` reference.
    pub fn resolve(&self, r: &RefItem) -> Option<NodeItem<'_>> {
        let mut parts = r.cref.trim_start_matches("#/").splitn(2, '/');
        let kind = parts.next()?;
        let idx: usize = parts.next()?.parse().ok()?;
        match kind {
            "texts" => self.texts.get(idx).map(NodeItem::Text),
            "pictures" => self.pictures.get(idx).map(NodeItem::Picture),
            "tables" => self.tables.get(idx).map(NodeItem::Table),
            _ => None,
        }
    }

    /// Items in reading order. Captions are reachable through their owner,
    /// not through this stream.
    pub fn iterate_items(&self) -> impl Iterator<Item = NodeItem<'_>> + '_ {
        self.body.children.iter().filter_map(|r| self.resolve(r))
    }

    /// Caption texts attached to a picture or table, joined by spaces.
    pub fn caption_text(&self, captions: &[RefItem]) -> String {
        captions
            .iter()
            .filter_map(|r| match self.resolve(r) {
                Some(NodeItem::Text(t)) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    /// Raster of page `page_no`, if the pipeline generated one.
    pub fn page_image(&self, page_no: u32) -> Result<Option<DynamicImage>, DocServeError> {
        match self.pages.get(&page_no).and_then(|p| p.image.as_ref()) {
            Some(img) => Ok(Some(img.to_image()?)),
            None => Ok(None),
        }
    }

    /// Raster of a picture or table.
    ///
    /// Pictures with their own image return it; otherwise the item is cropped
    /// from its page raster using the first provenance box. Returns `None`
    /// when neither is available (text items always return `None`).
    pub fn item_image(&self, item: NodeItem<'_>) -> Result<Option<DynamicImage>, DocServeError> {
        if let NodeItem::Text(_) = item {
            return Ok(None);
        }
        if let NodeItem::Picture(p) = item {
            if let Some(img) = &p.image {
                return Ok(Some(img.to_image()?));
            }
        }
        let Some(prov) = item.prov().first() else {
            return Ok(None);
        };
        let Some(page) = self.pages.get(&prov.page_no) else {
            return Ok(None);
        };
        let Some(page_img) = page.image.as_ref() else {
            return Ok(None);
        };
        let raster = page_img.to_image()?;
        Ok(image::crop_to_bbox(&raster, &prov.bbox, page.size))
    }

    /// Whole-document dictionary export.
    pub fn export_to_dict(&self) -> Result<serde_json::Value, DocServeError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Dictionary export rendered as JSON indented by four spaces.
    pub fn export_to_json(&self) -> Result<String, DocServeError> {
        let value = self.export_to_dict()?;
        to_json_pretty(&value)
    }

    /// Dictionary export rendered as YAML.
    pub fn export_to_yaml(&self) -> Result<String, DocServeError> {
        to_yaml(&self.export_to_dict()?)
    }

    /// Copy of the document whose embedded picture images are replaced by
    /// `<link_prefix>/image_<NNNNNN>.png` URIs, plus the PNG files those URIs
    /// name. `NNNNNN` is the picture index, so re-exports reuse the same
    /// names whatever the image content.
    pub fn with_referenced_images(
        &self,
        link_prefix: &str,
    ) -> Result<(DoclingDocument, Vec<ReferencedImage>), DocServeError> {
        let mut doc = self.clone();
        let mut files = Vec::new();

        for (idx, pic) in doc.pictures.iter_mut().enumerate() {
            let Some(img) = pic.image.as_mut() else {
                continue;
            };
            if !img.is_embedded() {
                continue;
            }
            let png = img.png_bytes()?;
            let file_name = referenced_image_name(idx);
            img.uri = if link_prefix.is_empty() {
                file_name.clone()
            } else {
                format!("{link_prefix}/{file_name}")
            };
            files.push(ReferencedImage { file_name, png });
        }

        Ok((doc, files))
    }
}

/// A PNG a referenced-image export links to.
#[derive(Debug, Clone)]
pub struct ReferencedImage {
    /// File name inside the artifacts directory.
    pub file_name: String,
    pub png: Vec<u8>,
}

/// `image_<NNNNNN>.png` for the picture at `index` (0-based).
pub fn referenced_image_name(index: usize) -> String {
    format!("image_{index:06}.png")
}

/// Serialise a dictionary export as YAML.
pub fn to_yaml(value: &serde_json::Value) -> Result<String, DocServeError> {
    Ok(serde_yaml::to_string(value)?)
}

/// Serialise a JSON value with four-space indentation.
pub fn to_json_pretty(value: &serde_json::Value) -> Result<String, DocServeError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| DocServeError::Internal(e.to_string()))
}

/// Incremental construction of a [`DoclingDocument`] in reading order.
///
/// Backends push items as they encounter them; the builder assigns
/// `self_ref`s and keeps `body.children` in the same order.
#[derive(Debug)]
pub struct DocumentBuilder {
    doc: DoclingDocument,
}

impl DocumentBuilder {
    pub fn new(name: impl Into<String>, origin: Origin) -> Self {
        Self {
            doc: DoclingDocument::new(name, origin),
        }
    }

    pub fn add_page(&mut self, page_no: u32, size: Size, image: Option<ImageRef>) -> &mut Self {
        self.doc.pages.insert(
            page_no,
            PageItem {
                page_no,
                size,
                image,
            },
        );
        self
    }

    fn push_text(
        &mut self,
        label: DocItemLabel,
        text: &str,
        prov: Option<ProvenanceItem>,
        parent: RefItem,
        in_body: bool,
    ) -> RefItem {
        let self_ref = format!("#/texts/{}", self.doc.texts.len());
        self.doc.texts.push(TextItem {
            self_ref: self_ref.clone(),
            parent,
            label,
            prov: prov.into_iter().collect(),
            orig: text.to_string(),
            text: text.to_string(),
            level: None,
            enumerated: None,
            code_language: None,
        });
        let r = RefItem::new(self_ref);
        if in_body {
            self.doc.body.children.push(r.clone());
        }
        r
    }

    fn last_text_mut(&mut self) -> Option<&mut TextItem> {
        self.doc.texts.last_mut()
    }

    fn body_ref(&self) -> RefItem {
        RefItem::new(self.doc.body.self_ref.clone())
    }

    /// Add a plain text item. Empty (whitespace-only) text is ignored.
    pub fn add_text(
        &mut self,
        label: DocItemLabel,
        text: &str,
        prov: Option<ProvenanceItem>,
    ) -> Option<RefItem> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let parent = self.body_ref();
        Some(self.push_text(label, text, prov, parent, true))
    }

    pub fn add_title(&mut self, text: &str, prov: Option<ProvenanceItem>) -> Option<RefItem> {
        self.add_text(DocItemLabel::Title, text, prov)
    }

    pub fn add_heading(
        &mut self,
        text: &str,
        level: u32,
        prov: Option<ProvenanceItem>,
    ) -> Option<RefItem> {
        let r = self.add_text(DocItemLabel::SectionHeader, text, prov)?;
        if let Some(item) = self.last_text_mut() {
            item.level = Some(level.max(1));
        }
        Some(r)
    }

    pub fn add_list_item(
        &mut self,
        text: &str,
        enumerated: bool,
        prov: Option<ProvenanceItem>,
    ) -> Option<RefItem> {
        let r = self.add_text(DocItemLabel::ListItem, text, prov)?;
        if let Some(item) = self.last_text_mut() {
            item.enumerated = Some(enumerated);
        }
        Some(r)
    }

    /// Code keeps its inner whitespace; only trailing newlines are trimmed.
    pub fn add_code(
        &mut self,
        code: &str,
        language: Option<&str>,
        prov: Option<ProvenanceItem>,
    ) -> Option<RefItem> {
        let code = code.trim_end_matches(['\n', '\r']);
        if code.trim().is_empty() {
            return None;
        }
        let parent = self.body_ref();
        let r = self.push_text(DocItemLabel::Code, code, prov, parent, true);
        if let Some(item) = self.last_text_mut() {
            item.code_language = language.filter(|l| !l.is_empty()).map(str::to_string);
        }
        Some(r)
    }

    pub fn add_picture(
        &mut self,
        image: Option<ImageRef>,
        prov: Option<ProvenanceItem>,
        caption: Option<&str>,
    ) -> RefItem {
        let self_ref = format!("#/pictures/{}", self.doc.pictures.len());
        let r = RefItem::new(self_ref.clone());
        let captions = self.caption_for(&r, caption);
        self.doc.pictures.push(PictureItem {
            self_ref,
            parent: self.body_ref(),
            label: DocItemLabel::Picture,
            prov: prov.into_iter().collect(),
            captions,
            image,
        });
        self.doc.body.children.push(r.clone());
        r
    }

    /// Add a table. Tables without rows are dropped.
    pub fn add_table(
        &mut self,
        data: TableData,
        prov: Option<ProvenanceItem>,
        caption: Option<&str>,
    ) -> Option<RefItem> {
        if data.num_rows == 0 || data.num_cols == 0 {
            return None;
        }
        let self_ref = format!("#/tables/{}", self.doc.tables.len());
        let r = RefItem::new(self_ref.clone());
        let captions = self.caption_for(&r, caption);
        self.doc.tables.push(TableItem {
            self_ref,
            parent: self.body_ref(),
            label: DocItemLabel::Table,
            prov: prov.into_iter().collect(),
            captions,
            data,
        });
        self.doc.body.children.push(r.clone());
        Some(r)
    }

    fn caption_for(&mut self, owner: &RefItem, caption: Option<&str>) -> Vec<RefItem> {
        match caption.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => vec![self.push_text(DocItemLabel::Caption, c, None, owner.clone(), false)],
            None => Vec::new(),
        }
    }

    pub fn build(self) -> DoclingDocument {
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn origin() -> Origin {
        Origin {
            mimetype: "text/markdown".into(),
            binary_hash: "ab12".into(),
            filename: "report.md".into(),
        }
    }

    fn sample() -> DoclingDocument {
        let mut b = DocumentBuilder::new("report", origin());
        b.add_title("Quarterly report", None);
        b.add_heading("Revenue", 1, None);
        b.add_text(DocItemLabel::Text, "Numbers went up.", None);
        b.add_picture(None, None, Some("Figure 1: growth"));
        b.add_table(
            TableData::from_rows(&[vec!["Q", "Rev"], vec!["Q1", "10"]], true),
            None,
            None,
        );
        b.build()
    }

    #[test]
    fn reading_order_and_refs() {
        let doc = sample();
        let labels: Vec<DocItemLabel> = doc.iterate_items().map(|i| i.label()).collect();
        assert_eq!(
            labels,
            vec![
                DocItemLabel::Title,
                DocItemLabel::SectionHeader,
                DocItemLabel::Text,
                DocItemLabel::Picture,
                DocItemLabel::Table,
            ]
        );
        // The caption is a text item but not part of the body stream.
        assert_eq!(doc.texts.len(), 4);
        assert_eq!(doc.caption_text(&doc.pictures[0].captions), "Figure 1: growth");
        assert_eq!(doc.tables[0].self_ref, "#/tables/0");
    }

    #[test]
    fn blank_text_and_empty_tables_are_skipped() {
        let mut b = DocumentBuilder::new("x", origin());
        assert!(b.add_text(DocItemLabel::Text, "   ", None).is_none());
        assert!(b.add_table(TableData::default(), None, None).is_none());
        assert_eq!(b.build().iterate_items().count(), 0);
    }

    #[test]
    fn dict_export_roundtrips() {
        let doc = sample();
        let value = doc.export_to_dict().unwrap();
        assert_eq!(value["schema_name"], SCHEMA_NAME);
        assert_eq!(value["body"]["children"][0]["$ref"], "#/texts/0");
        assert_eq!(value["texts"][1]["level"], 1);
        let back: DoclingDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn json_uses_four_space_indent() {
        let json = sample().export_to_json().unwrap();
        assert!(json.starts_with("{\n    \"schema_name\""), "got: {}", &json[..40]);
    }

    #[test]
    fn page_keys_serialise_as_strings() {
        let mut b = DocumentBuilder::new("x", origin());
        b.add_page(
            1,
            Size {
                width: 612.0,
                height: 792.0,
            },
            None,
        );
        let value = b.build().export_to_dict().unwrap();
        assert_eq!(value["pages"]["1"]["page_no"], 1);
    }

    #[test]
    fn bbox_origin_conversion() {
        let b = BoundingBox::new(10.0, 700.0, 110.0, 600.0, CoordOrigin::BottomLeft);
        let tl = b.to_top_left_origin(792.0);
        assert_eq!(tl.t, 92.0);
        assert_eq!(tl.b, 192.0);
        assert_eq!(tl.coord_origin, CoordOrigin::TopLeft);
        assert_eq!(tl.width(), 100.0);
        assert_eq!(tl.height(), 100.0);
    }
}
