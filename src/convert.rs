//! Conversion entry points.
//!
//! [`ConversionEngine`] is the seam between the HTTP layer and whatever turns
//! a saved file into a [`DoclingDocument`]. The crate ships one engine,
//! [`DocumentConverter`], which detects the input format, checks it against
//! the allowed set and hands the file to the matching backend.
//!
//! Conversion is synchronous and CPU/IO bound. [`ConversionLimiter`] runs a
//! blocking job on tokio's blocking pool with a bounded number of slots and a
//! per-job timeout; on timeout it raises the job's [`CancelFlag`], which the
//! backends poll between pages.

use crate::backend::{backend_for, BackendInput};
use crate::config::{PdfPipelineOptions, ServiceConfig};
use crate::document::{DoclingDocument, NodeItem, Origin};
use crate::error::DocServeError;
use crate::format::InputFormat;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Shared cancellation flag for one conversion.
///
/// Cloning shares the flag; raising it on any clone is seen by all.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The resolved input of a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDocument {
    pub path: PathBuf,
    pub format: InputFormat,
    /// File name without its extension; names the output directory.
    pub stem: String,
}

/// Outcome of a conversion that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Success,
    /// The document was read but no pages or items came out of it.
    Empty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ConversionTimings {
    pub convert_ms: u64,
    pub pages: usize,
}

/// A converted document plus what it was converted from.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub input: InputDocument,
    pub document: DoclingDocument,
    pub status: ConversionStatus,
    pub timings: ConversionTimings,
}

/// Converts a file on disk into a [`ConversionResult`].
///
/// Implementations must be `Send + Sync`; the service shares one engine
/// across all requests behind an `Arc`.
pub trait ConversionEngine: Send + Sync {
    /// Formats this engine accepts.
    fn allowed_formats(&self) -> &[InputFormat];

    /// Convert the file at `path`, polling `cancel` where possible.
    fn convert(&self, path: &Path, cancel: &CancelFlag) -> Result<ConversionResult, DocServeError>;
}

/// The built-in engine: format detection plus one structural backend per
/// format.
#[derive(Debug, Clone)]
pub struct DocumentConverter {
    allowed_formats: Vec<InputFormat>,
    pipeline: PdfPipelineOptions,
    pdfium_lib_path: Option<PathBuf>,
}

impl DocumentConverter {
    pub fn new(allowed_formats: Vec<InputFormat>, pipeline: PdfPipelineOptions) -> Self {
        Self {
            allowed_formats,
            pipeline,
            pdfium_lib_path: None,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            allowed_formats: config.allowed_formats.clone(),
            pipeline: config.pipeline,
            pdfium_lib_path: config.pdfium_lib_path.clone(),
        }
    }

    pub fn with_pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn pipeline(&self) -> &PdfPipelineOptions {
        &self.pipeline
    }
}

impl ConversionEngine for DocumentConverter {
    fn allowed_formats(&self) -> &[InputFormat] {
        &self.allowed_formats
    }

    fn convert(&self, path: &Path, cancel: &CancelFlag) -> Result<ConversionResult, DocServeError> {
        let start = Instant::now();
        info!("Starting conversion: {}", path.display());

        // ── Step 1: Resolve format ───────────────────────────────────────────
        let format = InputFormat::detect(path)?;
        let unsupported = || DocServeError::UnsupportedFormat {
            path: path.to_path_buf(),
            format,
        };
        if !self.allowed_formats.contains(&format) {
            return Err(unsupported());
        }
        let backend = backend_for(format).ok_or_else(unsupported)?;
        debug!("Detected format {} for {}", format, path.display());

        // ── Step 2: Origin ───────────────────────────────────────────────────
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = file_stem(path);
        let origin = Origin {
            mimetype: format.mimetype(path).to_string(),
            binary_hash: hash_file(path)?,
            filename,
        };

        // ── Step 3: Backend ──────────────────────────────────────────────────
        let input = BackendInput {
            path,
            format,
            name: stem.clone(),
            origin,
            options: &self.pipeline,
            pdfium_lib_path: self.pdfium_lib_path.as_deref(),
            cancel,
        };
        let document = backend.convert(&input)?;

        let timings = ConversionTimings {
            convert_ms: start.elapsed().as_millis() as u64,
            pages: document.num_pages(),
        };
        let status = if document.num_pages() == 0 && document.iterate_items().next().is_none() {
            warn!("Conversion of {} produced an empty document", path.display());
            ConversionStatus::Empty
        } else {
            ConversionStatus::Success
        };

        info!(
            "Conversion complete: {} ({} pages, {} pictures, {} tables) in {}ms",
            path.display(),
            timings.pages,
            count_items(&document, |i| matches!(i, NodeItem::Picture(_))),
            count_items(&document, |i| matches!(i, NodeItem::Table(_))),
            timings.convert_ms
        );

        Ok(ConversionResult {
            input: InputDocument {
                path: path.to_path_buf(),
                format,
                stem,
            },
            document,
            status,
            timings,
        })
    }
}

/// File name without its final extension (`report.v2.pdf` → `report.v2`).
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// SHA-256 of the file contents as lowercase hex.
fn hash_file(path: &Path) -> Result<String, DocServeError> {
    let mut file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => DocServeError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => DocServeError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| DocServeError::CorruptDocument {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(hex::encode(hasher.finalize()))
}

fn count_items(doc: &DoclingDocument, pred: impl Fn(&NodeItem<'_>) -> bool) -> usize {
    doc.iterate_items().filter(|i| pred(i)).count()
}

/// Runs blocking conversion jobs with bounded concurrency and a timeout.
#[derive(Debug, Clone)]
pub struct ConversionLimiter {
    slots: Arc<Semaphore>,
    timeout: Duration,
}

impl ConversionLimiter {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.max_concurrent_conversions,
            Duration::from_secs(config.conversion_timeout_secs),
        )
    }

    /// Slots not currently held by a running job.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run `job` on the blocking pool once a slot is free.
    ///
    /// The slot stays held until the job returns, even past a timeout, so a
    /// runaway conversion keeps counting against the limit. On timeout the
    /// job's flag is raised and [`DocServeError::Timeout`] is returned for
    /// `path`.
    pub async fn run<T, F>(&self, path: &Path, job: F) -> Result<T, DocServeError>
    where
        F: FnOnce(&CancelFlag) -> Result<T, DocServeError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|e| DocServeError::Internal(format!("conversion slots closed: {e}")))?;

        let cancel = CancelFlag::new();
        let job_cancel = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(&job_cancel)
        });

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(DocServeError::Internal(format!(
                "conversion task failed: {join_err}"
            ))),
            Err(_) => {
                cancel.cancel();
                warn!(
                    "Conversion of {} exceeded {}s, cancelling",
                    path.display(),
                    self.timeout.as_secs()
                );
                Err(DocServeError::Timeout {
                    path: path.to_path_buf(),
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }
}
