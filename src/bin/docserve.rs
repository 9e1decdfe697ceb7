//! Server binary for edgequake-docserve.
//!
//! Maps CLI flags (each with a `DOCSERVE_*` environment override) onto
//! `ServiceConfig` and runs the HTTP service until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docserve::{serve, ExportProfile, InputFormat, ServiceConfig};
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full profile on :8020, every artifact at 2x raster scale
  docserve

  # Minimal profile on :8010
  docserve --profile minimal

  # Only PDFs and Word documents, two conversions at a time
  docserve --formats pdf,docx --max-concurrent 2

  # Upload and fetch results
  curl -F "file=@report.pdf" http://127.0.0.1:8020/process/
  curl -O http://127.0.0.1:8020/download/report.json

PDFIUM:
  PDF conversion needs the pdfium shared library. It is looked up at
  --pdfium-lib-path, then PDFIUM_LIB_PATH, then the working directory,
  then the system library path.
"#;

/// Document upload, conversion and export service.
#[derive(Parser, Debug)]
#[command(
    name = "docserve",
    version,
    about = "Upload, convert and export documents over HTTP",
    long_about = "HTTP service that converts uploaded PDF, DOCX, PPTX, HTML, Markdown, AsciiDoc \
and image files into a structured document and writes page images, Markdown, HTML, text, JSON, \
YAML and per-table CSV/HTML artifacts to a per-document output directory.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Export profile: minimal or full.
    #[arg(long, env = "DOCSERVE_PROFILE", value_enum, default_value = "full")]
    profile: ProfileArg,

    /// Bind address.
    #[arg(long, env = "DOCSERVE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port. Default: 8010 (minimal) or 8020 (full).
    #[arg(short, long, env = "DOCSERVE_PORT")]
    port: Option<u16>,

    /// Directory for uploads and per-document outputs.
    #[arg(short, long, env = "DOCSERVE_OUTPUT_ROOT", default_value = "outputs")]
    output_root: PathBuf,

    /// Raster scale relative to 72 DPI. Default: 1.0 (minimal) or 2.0 (full).
    #[arg(long, env = "DOCSERVE_IMAGES_SCALE")]
    images_scale: Option<f32>,

    /// Do not keep page rasters (no page PNGs, no cropped items).
    #[arg(long, env = "DOCSERVE_NO_PAGE_IMAGES")]
    no_page_images: bool,

    /// Do not crop picture rasters.
    #[arg(long, env = "DOCSERVE_NO_PICTURE_IMAGES")]
    no_picture_images: bool,

    /// Accepted input formats, comma separated (pdf,image,docx,html,pptx,asciidoc,md).
    #[arg(long, env = "DOCSERVE_FORMATS", value_delimiter = ',')]
    formats: Vec<String>,

    /// Conversions running at once.
    #[arg(long, env = "DOCSERVE_MAX_CONCURRENT", default_value_t = 4)]
    max_concurrent: usize,

    /// Per-request conversion + export timeout in seconds.
    #[arg(long, env = "DOCSERVE_TIMEOUT", default_value_t = 600)]
    timeout: u64,

    /// Largest accepted upload in MiB.
    #[arg(long, env = "DOCSERVE_MAX_UPLOAD_MB", default_value_t = 256)]
    max_upload_mb: usize,

    /// pdfium shared library (file or directory).
    #[arg(long, env = "DOCSERVE_PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCSERVE_VERBOSE")]
    verbose: bool,

    /// Suppress all logs except errors.
    #[arg(short, long, env = "DOCSERVE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ProfileArg {
    Minimal,
    Full,
}

impl From<ProfileArg> for ExportProfile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Minimal => ExportProfile::Minimal,
            ProfileArg::Full => ExportProfile::Full,
        }
    }
}

fn parse_formats(raw: &[String]) -> Result<Vec<InputFormat>> {
    raw.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<InputFormat>()
                .with_context(|| format!("Unknown input format '{s}'"))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = ServiceConfig::builder()
        .profile(cli.profile.into())
        .host(cli.host)
        .output_root(cli.output_root)
        .generate_page_images(!cli.no_page_images)
        .generate_picture_images(!cli.no_picture_images)
        .max_concurrent_conversions(cli.max_concurrent)
        .conversion_timeout_secs(cli.timeout)
        .max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024));
    if let Some(port) = cli.port {
        builder = builder.port(port);
    }
    if let Some(scale) = cli.images_scale {
        builder = builder.images_scale(scale);
    }
    let formats = parse_formats(&cli.formats)?;
    if !formats.is_empty() {
        builder = builder.allowed_formats(formats);
    }
    if let Some(path) = cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path);
    }
    let config = builder.build().context("Invalid configuration")?;

    info!(
        "Starting {} v{} ({} profile)",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        config.profile
    );
    serve(config).await.context("Server failed")?;
    Ok(())
}
