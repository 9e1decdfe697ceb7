//! Configuration types for the conversion service.
//!
//! Everything the service needs at startup lives in [`ServiceConfig`], built
//! via its [`ServiceConfigBuilder`]. The config is constructed once in the
//! binary and handed to the router state; nothing reads process-wide
//! globals after that.
//!
//! Two deployment shapes exist, captured by [`ExportProfile`]: `Minimal`
//! writes page images, embedded-image Markdown, JSON and table CSVs at
//! `images_scale = 1.0`; `Full` writes every artifact at `images_scale = 2.0`.

use crate::error::DocServeError;
use crate::format::InputFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Which set of artifacts the export writer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportProfile {
    /// Page PNGs, Markdown with embedded images, JSON, table CSVs.
    Minimal,
    /// Everything in `Minimal` plus item images, referenced-image Markdown
    /// and HTML, plain Markdown, text, YAML and per-table HTML. (default)
    #[default]
    Full,
}

impl ExportProfile {
    /// Rasterisation scale used when the caller does not override it.
    pub fn default_images_scale(&self) -> f32 {
        match self {
            ExportProfile::Minimal => 1.0,
            ExportProfile::Full => 2.0,
        }
    }

    /// Listening port used when the caller does not override it.
    pub fn default_port(&self) -> u16 {
        match self {
            ExportProfile::Minimal => 8010,
            ExportProfile::Full => 8020,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, ExportProfile::Full)
    }
}

impl fmt::Display for ExportProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportProfile::Minimal => f.write_str("minimal"),
            ExportProfile::Full => f.write_str("full"),
        }
    }
}

impl FromStr for ExportProfile {
    type Err = DocServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" | "min" => Ok(ExportProfile::Minimal),
            "full" => Ok(ExportProfile::Full),
            other => Err(DocServeError::InvalidConfig(format!(
                "unknown export profile '{other}' (expected 'minimal' or 'full')"
            ))),
        }
    }
}

/// Options for the PDF pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfPipelineOptions {
    /// Raster scale relative to 72 DPI. 1.0 → 72 DPI, 2.0 → 144 DPI.
    pub images_scale: f32,
    /// Keep a raster of every page on the document.
    pub generate_page_images: bool,
    /// Crop a raster for every picture item.
    pub generate_picture_images: bool,
}

impl Default for PdfPipelineOptions {
    fn default() -> Self {
        Self {
            images_scale: ExportProfile::default().default_images_scale(),
            generate_page_images: true,
            generate_picture_images: true,
        }
    }
}

impl PdfPipelineOptions {
    /// Effective render DPI.
    pub fn dpi(&self) -> f32 {
        72.0 * self.images_scale
    }
}

/// Startup configuration for the service.
///
/// Built via [`ServiceConfig::builder()`] or [`ServiceConfig::for_profile()`].
///
/// # Example
/// ```rust
/// use edgequake_docserve::{ExportProfile, ServiceConfig};
///
/// let config = ServiceConfig::builder()
///     .profile(ExportProfile::Minimal)
///     .output_root("outputs")
///     .max_concurrent_conversions(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.port, 8010);
/// assert_eq!(config.pipeline.images_scale, 1.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Directory holding uploads and per-document artifact directories.
    /// Default: `outputs`.
    pub output_root: PathBuf,

    /// Bind address. Default: `0.0.0.0`.
    pub host: String,

    /// Bind port. Default: the profile's port (8010 minimal, 8020 full).
    pub port: u16,

    /// Which artifacts to write. Default: [`ExportProfile::Full`].
    pub profile: ExportProfile,

    /// PDF pipeline options.
    pub pipeline: PdfPipelineOptions,

    /// Formats the converter accepts. Default: PDF, IMAGE, DOCX, HTML, PPTX,
    /// ASCIIDOC, MD.
    pub allowed_formats: Vec<InputFormat>,

    /// Conversions running at once. Further requests wait for a slot.
    /// Default: 4.
    pub max_concurrent_conversions: usize,

    /// Upper bound for convert + export of one request. Default: 600.
    pub conversion_timeout_secs: u64,

    /// Largest accepted upload body in bytes. Default: 256 MiB.
    pub max_upload_bytes: usize,

    /// Explicit pdfium library (file or directory). Falls back to
    /// `PDFIUM_LIB_PATH`, then the system library.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::for_profile(ExportProfile::default())
    }
}

impl ServiceConfig {
    /// Defaults for the given profile.
    pub fn for_profile(profile: ExportProfile) -> Self {
        Self {
            output_root: PathBuf::from("outputs"),
            host: "0.0.0.0".to_string(),
            port: profile.default_port(),
            profile,
            pipeline: PdfPipelineOptions {
                images_scale: profile.default_images_scale(),
                ..PdfPipelineOptions::default()
            },
            allowed_formats: InputFormat::DEFAULT_ALLOWED.to_vec(),
            max_concurrent_conversions: 4,
            conversion_timeout_secs: 600,
            max_upload_bytes: 256 * 1024 * 1024,
            pdfium_lib_path: None,
        }
    }

    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
            port_set: false,
            scale_set: false,
        }
    }

    /// `host:port` string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`ServiceConfig`].
///
/// Choosing a profile resets port and `images_scale` to that profile's
/// defaults unless they were set explicitly.
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
    port_set: bool,
    scale_set: bool,
}

impl ServiceConfigBuilder {
    pub fn profile(mut self, profile: ExportProfile) -> Self {
        self.config.profile = profile;
        if !self.port_set {
            self.config.port = profile.default_port();
        }
        if !self.scale_set {
            self.config.pipeline.images_scale = profile.default_images_scale();
        }
        self
    }

    pub fn output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.output_root = root.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self.port_set = true;
        self
    }

    pub fn images_scale(mut self, scale: f32) -> Self {
        self.config.pipeline.images_scale = scale.clamp(0.1, 10.0);
        self.scale_set = true;
        self
    }

    pub fn generate_page_images(mut self, v: bool) -> Self {
        self.config.pipeline.generate_page_images = v;
        self
    }

    pub fn generate_picture_images(mut self, v: bool) -> Self {
        self.config.pipeline.generate_picture_images = v;
        self
    }

    pub fn allowed_formats(mut self, formats: impl IntoIterator<Item = InputFormat>) -> Self {
        let mut unique: Vec<InputFormat> = Vec::new();
        for f in formats {
            if !unique.contains(&f) {
                unique.push(f);
            }
        }
        self.config.allowed_formats = unique;
        self
    }

    pub fn max_concurrent_conversions(mut self, n: usize) -> Self {
        self.config.max_concurrent_conversions = n.max(1);
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, DocServeError> {
        let c = &self.config;
        if c.output_root.as_os_str().is_empty() {
            return Err(DocServeError::InvalidConfig(
                "output root must not be empty".into(),
            ));
        }
        if c.allowed_formats.is_empty() {
            return Err(DocServeError::InvalidConfig(
                "at least one input format must be allowed".into(),
            ));
        }
        if c.conversion_timeout_secs == 0 {
            return Err(DocServeError::InvalidConfig(
                "conversion timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(DocServeError::InvalidConfig(
                "max upload size must be ≥ 1 byte".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_defaults() {
        let min = ServiceConfig::for_profile(ExportProfile::Minimal);
        assert_eq!(min.port, 8010);
        assert_eq!(min.pipeline.images_scale, 1.0);

        let full = ServiceConfig::for_profile(ExportProfile::Full);
        assert_eq!(full.port, 8020);
        assert_eq!(full.pipeline.images_scale, 2.0);
        assert!(full.pipeline.generate_page_images);
        assert!(full.pipeline.generate_picture_images);
        assert_eq!(full.allowed_formats.len(), 7);
    }

    #[test]
    fn explicit_values_survive_profile_change() {
        let config = ServiceConfig::builder()
            .port(9000)
            .images_scale(1.5)
            .profile(ExportProfile::Minimal)
            .build()
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.pipeline.images_scale, 1.5);
        assert_eq!(config.profile, ExportProfile::Minimal);
    }

    #[test]
    fn setters_clamp() {
        let config = ServiceConfig::builder()
            .images_scale(100.0)
            .max_concurrent_conversions(0)
            .build()
            .unwrap();
        assert_eq!(config.pipeline.images_scale, 10.0);
        assert_eq!(config.max_concurrent_conversions, 1);
    }

    #[test]
    fn build_rejects_invalid() {
        assert!(ServiceConfig::builder()
            .allowed_formats(Vec::new())
            .build()
            .is_err());
        assert!(ServiceConfig::builder()
            .conversion_timeout_secs(0)
            .build()
            .is_err());
        assert!(ServiceConfig::builder().output_root("").build().is_err());
    }

    #[test]
    fn profile_parsing() {
        assert_eq!("Minimal".parse::<ExportProfile>().unwrap(), ExportProfile::Minimal);
        assert_eq!("full".parse::<ExportProfile>().unwrap(), ExportProfile::Full);
        assert!("everything".parse::<ExportProfile>().is_err());
    }

    #[test]
    fn dpi_follows_scale() {
        let opts = PdfPipelineOptions {
            images_scale: 2.0,
            ..Default::default()
        };
        assert_eq!(opts.dpi(), 144.0);
    }
}
