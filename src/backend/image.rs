//! Raster image backend: one page whose raster is the image itself, and one
//! picture covering that page.

use super::{BackendInput, DocumentBackend};
use crate::document::{BoundingBox, DoclingDocument, ImageRef, ProvenanceItem, Size};
use crate::error::DocServeError;
use crate::format::InputFormat;
use tracing::debug;

/// Resolution assumed for images; their pixel size equals their point size.
const IMAGE_DPI: u32 = 72;

pub struct ImageBackend;

impl DocumentBackend for ImageBackend {
    fn format(&self) -> InputFormat {
        InputFormat::Image
    }

    fn convert(&self, input: &BackendInput<'_>) -> Result<DoclingDocument, DocServeError> {
        let bytes = input.read_bytes()?;
        let img = image::load_from_memory(&bytes).map_err(|e| input.corrupt(e.to_string()))?;
        debug!("Decoded image {}x{} px", img.width(), img.height());

        let size = Size {
            width: img.width() as f64,
            height: img.height() as f64,
        };
        let page_image = ImageRef::from_image(&img, IMAGE_DPI)?;

        let mut b = input.builder();
        let picture_image = input
            .options
            .generate_picture_images
            .then(|| page_image.clone());
        b.add_page(
            1,
            size,
            input.options.generate_page_images.then_some(page_image),
        );
        b.add_picture(
            picture_image,
            Some(ProvenanceItem {
                page_no: 1,
                bbox: BoundingBox::page(size),
                charspan: [0, 0],
            }),
            None,
        );
        Ok(b.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::convert_bytes;
    use crate::document::NodeItem;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([0, 128, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn one_page_one_picture() {
        let doc = convert_bytes(&ImageBackend, "scan.png", &png(30, 20)).unwrap();
        assert_eq!(doc.num_pages(), 1);
        assert_eq!(doc.pages[&1].size.width, 30.0);
        assert_eq!(doc.pictures.len(), 1);

        let item = doc.iterate_items().next().unwrap();
        assert!(matches!(item, NodeItem::Picture(_)));
        let cropped = doc.item_image(item).unwrap().unwrap();
        assert_eq!((cropped.width(), cropped.height()), (30, 20));
        assert!(doc.page_image(1).unwrap().is_some());
    }

    #[test]
    fn undecodable_bytes_are_corrupt() {
        let err = convert_bytes(&ImageBackend, "broken.png", b"\x89PNG\r\n\x1a\nnope").unwrap_err();
        assert!(matches!(err, DocServeError::CorruptDocument { .. }));
    }
}
