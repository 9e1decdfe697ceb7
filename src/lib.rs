//! # edgequake-docserve
//!
//! Upload a document over HTTP, convert it into a structured document model
//! and write every derived artifact (page images, figure and table images,
//! Markdown, HTML, text, JSON, YAML, per-table CSV/HTML) to a per-document
//! output directory. A second endpoint serves the produced files back.
//!
//! ## Why a document model in the middle?
//!
//! Every input format (PDF, DOCX, PPTX, HTML, Markdown, AsciiDoc, images)
//! is first turned into one [`DoclingDocument`]: pages with rasters, an
//! ordered stream of text, picture and table items, and captions. Every
//! export is then a pure function of that model, so a table looks the same
//! in the Markdown, the HTML, the JSON and its own CSV regardless of where it
//! came from.
//!
//! ## Request Flow
//!
//! ```text
//! POST /process/  (multipart "file")
//!  │
//!  ├─ 1. Upload   validate basename, save to <output_root>/<filename>
//!  ├─ 2. Convert  detect format → backend → DoclingDocument
//!  │              (blocking pool, bounded slots, timeout + cancel flag)
//!  ├─ 3. Export   <output_root>/<stem>/<stem>-page-1.png, <stem>.json, …
//!  └─ 4. Respond  {message, processing_time, output_directory, files?}
//!
//! GET /download/{filename}  → bytes of a produced file
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docserve::{serve, ExportProfile, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder()
//!         .profile(ExportProfile::Minimal)
//!         .output_root("outputs")
//!         .build()?;
//!     serve(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! Converting without the server:
//!
//! ```rust,no_run
//! use edgequake_docserve::{
//!     export_document, CancelFlag, ConversionEngine, DocumentConverter, ExportProfile,
//!     NoopExportObserver, ServiceConfig,
//! };
//! use std::path::Path;
//!
//! let config = ServiceConfig::default();
//! let converter = DocumentConverter::from_config(&config);
//! let result = converter.convert(Path::new("report.docx"), &CancelFlag::new())?;
//! export_document(
//!     &result.document,
//!     &result.input.stem,
//!     Path::new("outputs"),
//!     ExportProfile::Full,
//!     &NoopExportObserver,
//!     &CancelFlag::new(),
//! )?;
//! # Ok::<(), edgequake_docserve::DocServeError>(())
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docserve` and `docserve-client` binaries (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## Profiles
//!
//! | Profile | Port | `images_scale` | Artifacts |
//! |---------|------|----------------|-----------|
//! | `minimal` | 8010 | 1.0 | page PNGs, `-with-images.md`, `.json`, table CSVs |
//! | `full`    | 8020 | 2.0 | all of the above plus item PNGs, referenced-image MD/HTML, `.md`, `.txt`, `.yaml`, table HTML |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod client;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod export;
pub mod format;
pub mod progress;
pub mod server;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::DocServeClient;
pub use config::{ExportProfile, PdfPipelineOptions, ServiceConfig, ServiceConfigBuilder};
pub use convert::{
    CancelFlag, ConversionEngine, ConversionLimiter, ConversionResult, ConversionStatus,
    ConversionTimings, DocumentConverter, InputDocument,
};
pub use document::{DoclingDocument, ImageRefMode, NodeItem};
pub use error::DocServeError;
pub use export::{export_document, ExportSummary};
pub use format::InputFormat;
pub use progress::{ExportObserver, NoopExportObserver, TracingObserver};
pub use server::{router, serve, ApiError, AppState, ProcessResponse};
