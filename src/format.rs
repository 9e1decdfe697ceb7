//! Input format detection.
//!
//! The converter dispatches on [`InputFormat`]. Detection looks at the file
//! extension first and falls back to magic bytes for extension-less or
//! misnamed uploads. Formats that are recognised but have no backend
//! (`Xlsx`, `Csv`) exist so the converter can report "not allowed" instead of
//! "unknown".

use crate::error::DocServeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Input document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputFormat {
    #[serde(rename = "PDF")]
    Pdf,
    /// Any raster image the `image` crate can decode (PNG, JPEG, TIFF, …).
    #[serde(rename = "IMAGE")]
    Image,
    #[serde(rename = "DOCX")]
    Docx,
    #[serde(rename = "HTML")]
    Html,
    #[serde(rename = "PPTX")]
    Pptx,
    #[serde(rename = "ASCIIDOC")]
    Asciidoc,
    #[serde(rename = "MD")]
    Md,
    #[serde(rename = "XLSX")]
    Xlsx,
    #[serde(rename = "CSV")]
    Csv,
}

impl InputFormat {
    /// The seven formats the service accepts by default.
    pub const DEFAULT_ALLOWED: [InputFormat; 7] = [
        InputFormat::Pdf,
        InputFormat::Image,
        InputFormat::Docx,
        InputFormat::Html,
        InputFormat::Pptx,
        InputFormat::Asciidoc,
        InputFormat::Md,
    ];

    /// Upper-case name used in logs, errors and the JSON export.
    pub fn as_str(&self) -> &'static str {
        match self {
            InputFormat::Pdf => "PDF",
            InputFormat::Image => "IMAGE",
            InputFormat::Docx => "DOCX",
            InputFormat::Html => "HTML",
            InputFormat::Pptx => "PPTX",
            InputFormat::Asciidoc => "ASCIIDOC",
            InputFormat::Md => "MD",
            InputFormat::Xlsx => "XLSX",
            InputFormat::Csv => "CSV",
        }
    }

    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let fmt = match ext.to_ascii_lowercase().as_str() {
            "pdf" => InputFormat::Pdf,
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" | "gif" | "webp" => InputFormat::Image,
            "docx" | "dotx" | "docm" | "dotm" => InputFormat::Docx,
            "html" | "htm" | "xhtml" => InputFormat::Html,
            "pptx" | "potx" | "ppsx" | "pptm" | "potm" | "ppsm" => InputFormat::Pptx,
            "adoc" | "asciidoc" | "asc" => InputFormat::Asciidoc,
            "md" | "markdown" => InputFormat::Md,
            "xlsx" | "xlsm" => InputFormat::Xlsx,
            "csv" => InputFormat::Csv,
            _ => return None,
        };
        Some(fmt)
    }

    /// Detect the format of the file at `path`.
    ///
    /// # Errors
    /// [`DocServeError::FileNotFound`] when the file does not exist and
    /// [`DocServeError::UnknownFormat`] when neither the extension nor the
    /// leading bytes identify a known format.
    pub fn detect(path: &Path) -> Result<Self, DocServeError> {
        if !path.exists() {
            return Err(DocServeError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        if let Some(fmt) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
        {
            return Ok(fmt);
        }

        let mut head = [0u8; 16];
        let n = match std::fs::File::open(path) {
            Ok(mut f) => f.read(&mut head).unwrap_or(0),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(DocServeError::PermissionDenied {
                    path: path.to_path_buf(),
                });
            }
            Err(_) => 0,
        };

        match Self::from_magic(&head[..n]) {
            Some(InputFormat::Docx) => Ok(sniff_zip_container(path).unwrap_or(InputFormat::Docx)),
            Some(fmt) => Ok(fmt),
            None => Err(DocServeError::UnknownFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Identify a format from leading bytes. Zip containers are reported as
    /// `Docx`; [`InputFormat::detect`] refines them by looking inside.
    pub fn from_magic(head: &[u8]) -> Option<Self> {
        const SIGNATURES: &[(&[u8], InputFormat)] = &[
            (b"%PDF", InputFormat::Pdf),
            (b"\x89PNG\r\n\x1a\n", InputFormat::Image),
            (b"\xFF\xD8\xFF", InputFormat::Image),
            (b"GIF87a", InputFormat::Image),
            (b"GIF89a", InputFormat::Image),
            (b"II*\0", InputFormat::Image),
            (b"MM\0*", InputFormat::Image),
            (b"BM", InputFormat::Image),
            (b"PK\x03\x04", InputFormat::Docx),
        ];

        for (sig, fmt) in SIGNATURES {
            if head.starts_with(sig) {
                return Some(*fmt);
            }
        }
        if head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP" {
            return Some(InputFormat::Image);
        }
        let text = String::from_utf8_lossy(head).trim_start().to_ascii_lowercase();
        if text.starts_with("<!doctype html") || text.starts_with("<html") {
            return Some(InputFormat::Html);
        }
        None
    }

    /// MIME type recorded in the document origin.
    pub fn mimetype(&self, path: &Path) -> &'static str {
        match self {
            InputFormat::Pdf => "application/pdf",
            InputFormat::Image => {
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("")
                    .to_ascii_lowercase();
                match ext.as_str() {
                    "jpg" | "jpeg" => "image/jpeg",
                    "tif" | "tiff" => "image/tiff",
                    "bmp" => "image/bmp",
                    "gif" => "image/gif",
                    "webp" => "image/webp",
                    _ => "image/png",
                }
            }
            InputFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            InputFormat::Html => "text/html",
            InputFormat::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            InputFormat::Asciidoc => "text/asciidoc",
            InputFormat::Md => "text/markdown",
            InputFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            InputFormat::Csv => "text/csv",
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputFormat {
    type Err = DocServeError;

    /// Parse a format name (`pdf`, `IMAGE`, `markdown`, …).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fmt = match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => InputFormat::Pdf,
            "image" | "img" => InputFormat::Image,
            "docx" => InputFormat::Docx,
            "html" => InputFormat::Html,
            "pptx" => InputFormat::Pptx,
            "asciidoc" | "adoc" => InputFormat::Asciidoc,
            "md" | "markdown" => InputFormat::Md,
            "xlsx" => InputFormat::Xlsx,
            "csv" => InputFormat::Csv,
            other => {
                return Err(DocServeError::InvalidConfig(format!(
                    "unknown input format '{other}'"
                )))
            }
        };
        Ok(fmt)
    }
}

/// Look at the entry names of a zip container to tell DOCX/PPTX/XLSX apart.
fn sniff_zip_container(path: &Path) -> Option<InputFormat> {
    let file = std::fs::File::open(path).ok()?;
    let archive = zip::ZipArchive::new(file).ok()?;
    let names: Vec<&str> = archive.file_names().collect();
    if names.iter().any(|n| n.starts_with("ppt/")) {
        Some(InputFormat::Pptx)
    } else if names.iter().any(|n| n.starts_with("xl/")) {
        Some(InputFormat::Xlsx)
    } else if names.iter().any(|n| n.starts_with("word/")) {
        Some(InputFormat::Docx)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extension_mapping_is_case_insensitive() {
        assert_eq!(InputFormat::from_extension("PDF"), Some(InputFormat::Pdf));
        assert_eq!(InputFormat::from_extension("Jpeg"), Some(InputFormat::Image));
        assert_eq!(InputFormat::from_extension("adoc"), Some(InputFormat::Asciidoc));
        assert_eq!(InputFormat::from_extension("markdown"), Some(InputFormat::Md));
        assert_eq!(InputFormat::from_extension("exe"), None);
    }

    #[test]
    fn names_parse() {
        assert_eq!("PDF".parse::<InputFormat>().unwrap(), InputFormat::Pdf);
        assert_eq!(" markdown ".parse::<InputFormat>().unwrap(), InputFormat::Md);
        assert_eq!("adoc".parse::<InputFormat>().unwrap(), InputFormat::Asciidoc);
        assert!("odt".parse::<InputFormat>().is_err());
    }

    #[test]
    fn magic_bytes() {
        assert_eq!(InputFormat::from_magic(b"%PDF-1.7\n"), Some(InputFormat::Pdf));
        assert_eq!(
            InputFormat::from_magic(b"\x89PNG\r\n\x1a\n\0\0"),
            Some(InputFormat::Image)
        );
        assert_eq!(
            InputFormat::from_magic(b"RIFF\0\0\0\0WEBPVP8 "),
            Some(InputFormat::Image)
        );
        assert_eq!(
            InputFormat::from_magic(b"  <!DOCTYPE html>"),
            Some(InputFormat::Html)
        );
        assert_eq!(InputFormat::from_magic(b"hello world"), None);
    }

    #[test]
    fn detect_falls_back_to_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"%PDF-1.4\n%...")
            .unwrap();
        assert_eq!(InputFormat::detect(&path).unwrap(), InputFormat::Pdf);
    }

    #[test]
    fn detect_unknown_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, b"\x00\x01\x02\x03").unwrap();
        assert!(matches!(
            InputFormat::detect(&path),
            Err(DocServeError::UnknownFormat { .. })
        ));
        assert!(matches!(
            InputFormat::detect(&dir.path().join("nope.pdf")),
            Err(DocServeError::FileNotFound { .. })
        ));
    }

    #[test]
    fn display_matches_serde_name() {
        for fmt in InputFormat::DEFAULT_ALLOWED {
            let json = serde_json::to_string(&fmt).unwrap();
            assert_eq!(json, format!("\"{}\"", fmt));
        }
    }
}
