//! Error types for the edgequake-docserve library.
//!
//! Every failure while saving an upload, converting it, or writing an export
//! is a [`DocServeError`]. The variants keep enough detail for logs and for
//! the `detail` string the HTTP layer returns, but callers are not expected
//! to branch on them: the service collapses all of them into a single
//! "processing failed" response (see [`crate::server::ApiError`]).
//!
//! The one exception is [`DocServeError::InvalidFilename`], which the HTTP
//! layer reports as a client error rather than a server error.

use crate::format::InputFormat;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-docserve library.
#[derive(Debug, Error)]
pub enum DocServeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Client-supplied name is not a plain file name.
    #[error("Invalid file name '{name}': {reason}")]
    InvalidFilename { name: String, reason: &'static str },

    /// The file format could not be determined from its name or content.
    #[error("File format not recognised for '{path}'")]
    UnknownFormat { path: PathBuf },

    /// The format was recognised but the converter is not configured for it.
    #[error("File format {format} is not allowed for '{path}'")]
    UnsupportedFormat { path: PathBuf, format: InputFormat },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The input could be opened but its structure is unreadable.
    #[error("Input '{path}' is corrupt: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// PDF requires a password.
    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Encoding or decoding a raster image failed.
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    /// The conversion did not finish within the configured timeout.
    #[error("Conversion of '{path}' timed out after {secs}s")]
    Timeout { path: PathBuf, secs: u64 },

    /// The conversion was cancelled before it finished.
    #[error("Conversion of '{path}' was cancelled")]
    Cancelled { path: PathBuf },

    // ── Export errors ─────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialising the document (JSON/YAML/CSV) failed.
    #[error("Failed to serialise document as {format}: {detail}")]
    SerializationFailed { format: &'static str, detail: String },

    // ── Client errors ─────────────────────────────────────────────────────
    /// The HTTP request could not be sent or its body not read.
    #[error("Request to '{url}' failed: {reason}")]
    RequestFailed { url: String, reason: String },

    /// The HTTP request did not complete in time.
    #[error("Request to '{url}' timed out after {secs}s")]
    RequestTimeout { url: String, secs: u64 },

    /// The service answered with a non-success status.
    #[error("Server returned HTTP {status} for '{url}': {detail}")]
    ServerStatus {
        url: String,
        status: u16,
        detail: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocServeError {
    /// Wrap an I/O error raised while writing `path`.
    pub fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocServeError::OutputWriteFailed {
            path: path.into(),
            source,
        }
    }

    /// `true` when the failure was caused by the client-supplied name rather
    /// than by processing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, DocServeError::InvalidFilename { .. })
    }
}

impl From<serde_json::Error> for DocServeError {
    fn from(e: serde_json::Error) -> Self {
        DocServeError::SerializationFailed {
            format: "JSON",
            detail: e.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for DocServeError {
    fn from(e: serde_yaml::Error) -> Self {
        DocServeError::SerializationFailed {
            format: "YAML",
            detail: e.to_string(),
        }
    }
}

impl From<csv::Error> for DocServeError {
    fn from(e: csv::Error) -> Self {
        DocServeError::SerializationFailed {
            format: "CSV",
            detail: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = DocServeError::UnsupportedFormat {
            path: PathBuf::from("outputs/data.xlsx"),
            format: InputFormat::Xlsx,
        };
        let msg = e.to_string();
        assert!(msg.contains("XLSX"), "got: {msg}");
        assert!(msg.contains("data.xlsx"), "got: {msg}");
    }

    #[test]
    fn timeout_display() {
        let e = DocServeError::Timeout {
            path: PathBuf::from("big.pdf"),
            secs: 30,
        };
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn write_failed_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let e = DocServeError::write_failed("outputs/a/a.json", io);
        assert!(e.to_string().contains("disk full"));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn only_invalid_filename_is_client_error() {
        let e = DocServeError::InvalidFilename {
            name: "../x".into(),
            reason: "contains a path separator",
        };
        assert!(e.is_client_error());
        assert!(!DocServeError::Internal("boom".into()).is_client_error());
    }
}
