//! PDF backend: pdfium page rasters, text blocks and image objects.
//!
//! ## Why one pdfium binding per conversion?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which keeps global
//! state and is not safe to share across threads without the `thread_safe`
//! feature's lock. The converter already runs each conversion on a blocking
//! pool thread, so the backend binds, loads, renders and drops pdfium inside
//! that one call.
//!
//! Pages are rasterised at `72 × images_scale` DPI. Text comes from pdfium's
//! text segments, merged into lines and then into paragraphs by vertical
//! gaps. Every image object becomes a picture whose bounding box is cropped
//! from the page raster.

use super::{BackendInput, DocumentBackend};
use crate::document::{
    image::crop_to_bbox, BoundingBox, CoordOrigin, DocItemLabel, DoclingDocument, ImageRef,
    ProvenanceItem, Size,
};
use crate::error::DocServeError;
use crate::format::InputFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct PdfBackend;

impl DocumentBackend for PdfBackend {
    fn format(&self) -> InputFormat {
        InputFormat::Pdf
    }

    fn convert(&self, input: &BackendInput<'_>) -> Result<DoclingDocument, DocServeError> {
        let start = Instant::now();
        let pdfium = bind_pdfium(input.pdfium_lib_path)?;
        let pdf_path = input.path;

        let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                DocServeError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                DocServeError::CorruptDocument {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        let opts = input.options;
        let want_raster = opts.generate_page_images || opts.generate_picture_images;
        let render_config = PdfRenderConfig::new().scale_page_by_factor(opts.images_scale);
        let dpi = opts.dpi().round() as u32;

        let mut b = input.builder();

        for (idx, page) in pages.iter().enumerate() {
            input.check_cancelled()?;
            let page_no = idx as u32 + 1;
            let size = Size {
                width: page.width().value as f64,
                height: page.height().value as f64,
            };

            let raster = if want_raster {
                let bitmap = page.render_with_config(&render_config).map_err(|e| {
                    DocServeError::RasterisationFailed {
                        page: idx + 1,
                        detail: format!("{:?}", e),
                    }
                })?;
                let image = bitmap.as_image();
                debug!(
                    "Rendered page {} → {}x{} px",
                    page_no,
                    image.width(),
                    image.height()
                );
                Some(image)
            } else {
                None
            };

            let page_image = match (&raster, opts.generate_page_images) {
                (Some(img), true) => Some(ImageRef::from_image(img, dpi)?),
                _ => None,
            };
            b.add_page(page_no, size, page_image);

            // ── Text blocks ──────────────────────────────────────────────
            match page.text() {
                Ok(text) => {
                    let runs: Vec<TextRun> = text
                        .segments()
                        .iter()
                        .filter_map(|segment| {
                            let content = segment.text();
                            let content = content.trim();
                            if content.is_empty() {
                                return None;
                            }
                            let r = segment.bounds();
                            Some(TextRun {
                                text: content.to_string(),
                                bbox: BoundingBox::new(
                                    r.left().value as f64,
                                    r.top().value as f64,
                                    r.right().value as f64,
                                    r.bottom().value as f64,
                                    CoordOrigin::BottomLeft,
                                ),
                            })
                        })
                        .collect();
                    for (text, bbox) in group_paragraphs(runs) {
                        let prov = ProvenanceItem {
                            page_no,
                            bbox,
                            charspan: [0, text.chars().count()],
                        };
                        b.add_text(DocItemLabel::Text, &text, Some(prov));
                    }
                }
                Err(e) => warn!("No text layer on page {}: {:?}", page_no, e),
            }

            // ── Image objects ────────────────────────────────────────────
            for object in page.objects().iter() {
                if object.as_image_object().is_none() {
                    continue;
                }
                let Ok(bounds) = object.bounds() else {
                    continue;
                };
                let bbox = BoundingBox::new(
                    bounds.left().value as f64,
                    bounds.top().value as f64,
                    bounds.right().value as f64,
                    bounds.bottom().value as f64,
                    CoordOrigin::BottomLeft,
                );
                let image = match (&raster, opts.generate_picture_images) {
                    (Some(img), true) => crop_to_bbox(img, &bbox, size)
                        .map(|crop| ImageRef::from_image(&crop, dpi))
                        .transpose()?,
                    _ => None,
                };
                b.add_picture(
                    image,
                    Some(ProvenanceItem {
                        page_no,
                        bbox,
                        charspan: [0, 0],
                    }),
                    None,
                );
            }
        }

        info!(
            "PDF converted: {} pages in {} ms",
            total_pages,
            start.elapsed().as_millis()
        );
        Ok(b.build())
    }
}

/// Bind pdfium from `explicit`, `PDFIUM_LIB_PATH`, the working directory or
/// the system library, in that order. A directory resolves to the platform
/// library name inside it.
pub fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, DocServeError> {
    let configured = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match configured {
        Some(path) => {
            let lib = if path.is_dir() {
                PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(&path))
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| DocServeError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// A text segment with its box (bottom-left origin, as pdfium reports it).
#[derive(Debug, Clone)]
struct TextRun {
    text: String,
    bbox: BoundingBox,
}

/// Merge runs into lines (overlapping vertical extent) and lines into
/// paragraphs (vertical gap below ~0.8 line heights). Output is top to
/// bottom.
fn group_paragraphs(mut runs: Vec<TextRun>) -> Vec<(String, BoundingBox)> {
    // Higher `t` is nearer the top with a bottom-left origin.
    runs.sort_by(|a, b| {
        b.bbox
            .t
            .partial_cmp(&a.bbox.t)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.bbox
                    .l
                    .partial_cmp(&b.bbox.l)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    let mut lines: Vec<TextRun> = Vec::new();
    for run in runs {
        match lines.last_mut() {
            Some(line) if overlaps_vertically(&line.bbox, &run.bbox) => {
                line.text.push(' ');
                line.text.push_str(&run.text);
                line.bbox = union(&line.bbox, &run.bbox);
            }
            _ => lines.push(run),
        }
    }

    let mut paragraphs: Vec<(String, BoundingBox)> = Vec::new();
    let mut prev_bottom: Option<(f64, f64)> = None;
    for line in lines {
        let height = line.bbox.height().max(1.0);
        let joins = match (prev_bottom, paragraphs.last()) {
            (Some((bottom, prev_height)), Some(_)) => {
                bottom - line.bbox.t < 0.8 * height.max(prev_height)
            }
            _ => false,
        };
        prev_bottom = Some((line.bbox.b, height));
        match paragraphs.last_mut() {
            Some((text, bbox)) if joins => {
                text.push(' ');
                text.push_str(&line.text);
                *bbox = union(bbox, &line.bbox);
            }
            _ => paragraphs.push((line.text, line.bbox)),
        }
    }
    paragraphs
}

fn overlaps_vertically(a: &BoundingBox, b: &BoundingBox) -> bool {
    // Bottom-left origin: t > b.
    let overlap = a.t.min(b.t) - a.b.max(b.b);
    overlap > 0.5 * a.height().min(b.height())
}

fn union(a: &BoundingBox, b: &BoundingBox) -> BoundingBox {
    BoundingBox::new(
        a.l.min(b.l),
        a.t.max(b.t),
        a.r.max(b.r),
        a.b.min(b.b),
        a.coord_origin,
    )
}
