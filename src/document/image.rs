//! Image encoding: `DynamicImage` → PNG bytes → base64 `data:` URI.
//!
//! Every raster attached to a document (page images, picture images) is
//! stored as PNG, so writing an artifact never re-encodes and exported files
//! are byte-stable across runs. PNG is lossless; rendered text stays crisp.

use super::{BoundingBox, Size};
use crate::error::DocServeError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// A raster attached to a page or picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub mimetype: String,
    pub dpi: u32,
    /// Pixel dimensions.
    pub size: Size,
    /// `data:image/png;base64,…` while in memory; a relative file path after
    /// [`super::DoclingDocument::with_referenced_images`].
    pub uri: String,
}

impl ImageRef {
    /// Encode `img` as an embedded PNG.
    pub fn from_image(img: &DynamicImage, dpi: u32) -> Result<Self, DocServeError> {
        let png = encode_png(img)?;
        let b64 = STANDARD.encode(&png);
        debug!("Encoded image → {} bytes base64", b64.len());
        Ok(Self {
            mimetype: "image/png".to_string(),
            dpi,
            size: Size {
                width: img.width() as f64,
                height: img.height() as f64,
            },
            uri: format!("{PNG_DATA_URI_PREFIX}{b64}"),
        })
    }

    /// Decode any format the `image` crate reads and store it as PNG.
    pub fn from_encoded_bytes(bytes: &[u8], dpi: u32) -> Result<Self, DocServeError> {
        let img = image::load_from_memory(bytes)?;
        Self::from_image(&img, dpi)
    }

    /// Build from a `data:<mime>;base64,<payload>` URI, re-encoding to PNG.
    /// Returns `None` for anything that is not a base64 data URI.
    pub fn from_data_uri(uri: &str, dpi: u32) -> Option<Self> {
        let bytes = decode_data_uri(uri)?;
        Self::from_encoded_bytes(&bytes, dpi).ok()
    }

    /// `true` while the image data lives inside [`ImageRef::uri`].
    pub fn is_embedded(&self) -> bool {
        self.uri.starts_with("data:")
    }

    /// Raw PNG bytes of an embedded image.
    pub fn png_bytes(&self) -> Result<Vec<u8>, DocServeError> {
        match self.uri.strip_prefix(PNG_DATA_URI_PREFIX) {
            Some(payload) => STANDARD
                .decode(payload)
                .map_err(|e| DocServeError::Internal(format!("invalid image payload: {e}"))),
            None => {
                // Not PNG (or not embedded): decode whatever is there and re-encode.
                let bytes = decode_data_uri(&self.uri).ok_or_else(|| {
                    DocServeError::Internal(format!(
                        "image is not embedded: '{}'",
                        truncate(&self.uri, 64)
                    ))
                })?;
                encode_png(&image::load_from_memory(&bytes)?)
            }
        }
    }

    pub fn to_image(&self) -> Result<DynamicImage, DocServeError> {
        Ok(image::load_from_memory(&self.png_bytes()?)?)
    }
}

/// PNG-encode an image.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, DocServeError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Crop the part of `page` covered by `bbox`.
///
/// `bbox` is in page points; `page_size` is the page size in points and is
/// used to derive the pixel scale from the raster's actual width. Returns
/// `None` when the box falls entirely outside the raster.
pub fn crop_to_bbox(page: &DynamicImage, bbox: &BoundingBox, page_size: Size) -> Option<DynamicImage> {
    if page_size.width <= 0.0 || page_size.height <= 0.0 {
        return None;
    }
    let bbox = bbox.to_top_left_origin(page_size.height);
    let sx = page.width() as f64 / page_size.width;
    let sy = page.height() as f64 / page_size.height;

    let x0 = (bbox.l.min(bbox.r) * sx).floor().max(0.0) as u32;
    let y0 = (bbox.t.min(bbox.b) * sy).floor().max(0.0) as u32;
    let x1 = ((bbox.l.max(bbox.r) * sx).ceil() as u32).min(page.width());
    let y1 = ((bbox.t.max(bbox.b) * sy).ceil() as u32).min(page.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(page.crop_imm(x0, y0, x1 - x0, y1 - y0))
}

fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let rest = uri.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    STANDARD.decode(payload.trim()).ok()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::CoordOrigin;
    use image::{Rgba, RgbaImage};

    fn red(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_small_image() {
        let img = ImageRef::from_image(&red(10, 12), 72).expect("encode should succeed");
        assert_eq!(img.mimetype, "image/png");
        assert_eq!(img.size.width, 10.0);
        assert_eq!(img.size.height, 12.0);
        assert!(img.is_embedded());

        let bytes = img.png_bytes().unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));
        let back = img.to_image().unwrap();
        assert_eq!((back.width(), back.height()), (10, 12));
    }

    #[test]
    fn jpeg_data_uri_is_stored_as_png() {
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(red(4, 4).to_rgb8())
            .write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();
        let uri = format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg));
        let img = ImageRef::from_data_uri(&uri, 96).unwrap();
        assert!(img.uri.starts_with(PNG_DATA_URI_PREFIX));
        assert_eq!(img.dpi, 96);
    }

    #[test]
    fn non_data_uris_are_rejected() {
        assert!(ImageRef::from_data_uri("https://example.com/a.png", 72).is_none());
        let linked = ImageRef {
            mimetype: "image/png".into(),
            dpi: 72,
            size: Size::default(),
            uri: "report_artifacts/image_000000.png".into(),
        };
        assert!(!linked.is_embedded());
        assert!(linked.png_bytes().is_err());
    }

    #[test]
    fn crop_scales_points_to_pixels() {
        // 100x200 pt page rendered at 2x.
        let page = red(200, 400);
        let size = Size {
            width: 100.0,
            height: 200.0,
        };
        let bbox = BoundingBox::new(10.0, 20.0, 60.0, 70.0, CoordOrigin::TopLeft);
        let crop = crop_to_bbox(&page, &bbox, size).unwrap();
        assert_eq!((crop.width(), crop.height()), (100, 100));

        let outside = BoundingBox::new(150.0, 0.0, 180.0, 10.0, CoordOrigin::TopLeft);
        assert!(crop_to_bbox(&page, &outside, size).is_none());
    }
}
