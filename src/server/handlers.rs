//! Request handlers.

use super::error::ApiError;
use super::state::AppState;
use crate::convert::CancelFlag;
use crate::error::DocServeError;
use crate::export::{export_document, list_output_files, locate_artifact};
use crate::upload::{save_upload, validate_basename};
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

pub const SUCCESS_MESSAGE: &str = "File processed successfully";

/// Body of a successful `POST /process/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessResponse {
    pub message: String,
    /// Seconds with two decimals, e.g. `"1.37 seconds"`.
    pub processing_time: String,
    /// `<output_root>/<stem>`.
    pub output_directory: String,
    /// Entries of the output directory (full profile only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub profile: String,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        profile: state.config.profile.to_string(),
    })
}

/// `POST /process/`: save the `file` field, convert it, export every
/// artifact of the configured profile.
pub async fn process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ProcessResponse>, ApiError> {
    let start = Instant::now();

    // ── Upload ───────────────────────────────────────────────────────────
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("Upload has no file name".into()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {e}")))?;
        upload = Some((name, bytes));
        break;
    }
    let (name, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("No file provided in field 'file'".into()))?;

    let config = &state.config;
    let saved = save_upload(&config.output_root, &name, &bytes).await?;

    // ── Convert + export on the blocking pool ────────────────────────────
    let engine = state.engine.clone();
    let observer = state.observer.clone();
    let output_root = config.output_root.clone();
    let profile = config.profile;
    let job_path = saved.clone();

    let (stem, output_dir) = state
        .limiter
        .run(&saved, move |cancel: &CancelFlag| {
            let result = engine.convert(&job_path, cancel)?;
            if cancel.is_cancelled() {
                return Err(DocServeError::Cancelled { path: job_path });
            }
            let stem = result.input.stem;
            let summary = export_document(
                &result.document,
                &stem,
                &output_root,
                profile,
                observer.as_ref(),
                cancel,
            )?;
            Ok((stem, summary.output_dir))
        })
        .await?;

    // ── Respond ──────────────────────────────────────────────────────────
    let files = if profile.is_full() {
        Some(list_output_files(&output_dir)?)
    } else {
        None
    };
    let elapsed = start.elapsed().as_secs_f64();
    info!("Processed '{}' in {:.2}s", name, elapsed);

    Ok(Json(ProcessResponse {
        message: SUCCESS_MESSAGE.to_string(),
        processing_time: format!("{elapsed:.2} seconds"),
        output_directory: config.output_root.join(&stem).display().to_string(),
        files,
    }))
}

/// `GET /download/:filename`
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let name = validate_basename(&filename)?;
    let path = locate_artifact(&state.config.output_root, name).ok_or(ApiError::NotFound)?;
    serve_file(path).await
}

/// `GET /download/:stem/:filename`
pub async fn download_artifact(
    State(state): State<AppState>,
    Path((stem, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let stem = validate_basename(&stem)?;
    let name = validate_basename(&filename)?;
    let path = state.config.output_root.join(stem).join(name);
    if !path.is_file() {
        return Err(ApiError::NotFound);
    }
    serve_file(path).await
}

async fn serve_file(path: PathBuf) -> Result<Response, ApiError> {
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ApiError::NotFound),
        Err(e) => return Err(ApiError::Processing(format!("Failed to read '{}': {e}", path.display()))),
    };
    debug!("Serving {} ({} bytes)", path.display(), bytes.len());
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type_for(&path))],
        Body::from(bytes),
    )
        .into_response())
}

/// MIME type for a downloaded file, from its extension.
pub fn content_type_for(path: &std::path::Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "json" => "application/json",
        "yaml" | "yml" => "application/yaml",
        "md" => "text/markdown; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "adoc" | "asciidoc" => "text/asciidoc; charset=utf-8",
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => "application/octet-stream",
    }
}
