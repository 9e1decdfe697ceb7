//! Format backends: turn one input file into a [`DoclingDocument`].
//!
//! Each backend is a structural extractor. It reads the headings, paragraphs,
//! lists, tables and pictures the format already encodes; there is no layout
//! analysis or OCR. The converter picks the backend with [`backend_for`].
//!
//! ```text
//! InputFormat ─┬─ PDF       pdfium: page rasters, text blocks, image objects
//!              ├─ IMAGE     one page, one picture
//!              ├─ MD        pulldown-cmark events
//!              ├─ ASCIIDOC  line parser
//!              ├─ HTML      scraper DOM walk
//!              ├─ DOCX      zip + quick-xml (word/document.xml)
//!              └─ PPTX      zip + quick-xml (ppt/slides/slideN.xml)
//! ```

pub mod asciidoc;
pub mod docx;
pub mod html;
pub mod image;
pub mod markdown;
mod ooxml;
pub mod pdf;
pub mod pptx;

use crate::config::PdfPipelineOptions;
use crate::convert::CancelFlag;
use crate::document::{DoclingDocument, DocumentBuilder, Origin};
use crate::error::DocServeError;
use crate::format::InputFormat;
use std::path::{Path, PathBuf};

/// Everything a backend needs to convert one file.
#[derive(Debug)]
pub struct BackendInput<'a> {
    pub path: &'a Path,
    pub format: InputFormat,
    /// Document name (the file stem).
    pub name: String,
    pub origin: Origin,
    pub options: &'a PdfPipelineOptions,
    pub pdfium_lib_path: Option<&'a Path>,
    pub cancel: &'a CancelFlag,
}

impl BackendInput<'_> {
    /// Empty document builder carrying this input's name and origin.
    pub fn builder(&self) -> DocumentBuilder {
        DocumentBuilder::new(self.name.clone(), self.origin.clone())
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>, DocServeError> {
        std::fs::read(self.path).map_err(|e| self.io_error(e))
    }

    /// Read as UTF-8, replacing invalid sequences.
    pub fn read_to_string(&self) -> Result<String, DocServeError> {
        let bytes = self.read_bytes()?;
        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// `Err(Cancelled)` once the request has been cancelled.
    pub fn check_cancelled(&self) -> Result<(), DocServeError> {
        if self.cancel.is_cancelled() {
            return Err(DocServeError::Cancelled {
                path: self.path.to_path_buf(),
            });
        }
        Ok(())
    }

    pub fn corrupt(&self, detail: impl Into<String>) -> DocServeError {
        DocServeError::CorruptDocument {
            path: self.path.to_path_buf(),
            detail: detail.into(),
        }
    }

    fn io_error(&self, e: std::io::Error) -> DocServeError {
        let path: PathBuf = self.path.to_path_buf();
        match e.kind() {
            std::io::ErrorKind::NotFound => DocServeError::FileNotFound { path },
            std::io::ErrorKind::PermissionDenied => DocServeError::PermissionDenied { path },
            _ => DocServeError::CorruptDocument {
                path,
                detail: e.to_string(),
            },
        }
    }
}

/// A converter for one input format.
pub trait DocumentBackend: Send + Sync {
    fn format(&self) -> InputFormat;

    /// Convert the file described by `input`.
    fn convert(&self, input: &BackendInput<'_>) -> Result<DoclingDocument, DocServeError>;
}

/// Backend handling `format`, or `None` for formats without one.
pub fn backend_for(format: InputFormat) -> Option<Box<dyn DocumentBackend>> {
    let backend: Box<dyn DocumentBackend> = match format {
        InputFormat::Pdf => Box::new(pdf::PdfBackend),
        InputFormat::Image => Box::new(image::ImageBackend),
        InputFormat::Md => Box::new(markdown::MarkdownBackend),
        InputFormat::Asciidoc => Box::new(asciidoc::AsciiDocBackend),
        InputFormat::Html => Box::new(html::HtmlBackend),
        InputFormat::Docx => Box::new(docx::DocxBackend),
        InputFormat::Pptx => Box::new(pptx::PptxBackend),
        InputFormat::Xlsx | InputFormat::Csv => return None,
    };
    Some(backend)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn origin(filename: &str) -> Origin {
        Origin {
            mimetype: "application/octet-stream".into(),
            binary_hash: "00".into(),
            filename: filename.into(),
        }
    }

    /// Write `bytes` to `<dir>/<name>` and convert it with `backend`.
    pub fn convert_bytes(
        backend: &dyn DocumentBackend,
        name: &str,
        bytes: &[u8],
    ) -> Result<DoclingDocument, DocServeError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        let options = PdfPipelineOptions::default();
        let cancel = CancelFlag::new();
        let input = BackendInput {
            path: &path,
            format: backend.format(),
            name: Path::new(name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(name)
                .to_string(),
            origin: origin(name),
            options: &options,
            pdfium_lib_path: None,
            cancel: &cancel,
        };
        backend.convert(&input)
    }
}
