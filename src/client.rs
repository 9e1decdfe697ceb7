//! HTTP client for a running service.
//!
//! Thin wrapper over `reqwest`: upload a file to `POST /process/` and fetch
//! artifacts from `GET /download/...`. Non-success responses become
//! [`DocServeError::ServerStatus`] carrying the server's `detail` string.

use crate::error::DocServeError;
use crate::server::ProcessResponse;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default server address of the full profile.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8020";

#[derive(Debug, Clone)]
pub struct DocServeClient {
    base_url: String,
    http: reqwest::Client,
    timeout_secs: u64,
}

impl DocServeClient {
    /// Client for the service at `base_url` (e.g. `http://127.0.0.1:8020`).
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, DocServeError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DocServeError::RequestFailed {
                url: base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url,
            http,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload the file at `path` for processing.
    pub async fn process_file(&self, path: &Path) -> Result<ProcessResponse, DocServeError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => DocServeError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => DocServeError::FileNotFound {
                path: path.to_path_buf(),
            },
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DocServeError::InvalidFilename {
                name: path.display().to_string(),
                reason: "path has no file name",
            })?;
        self.process_bytes(&name, bytes).await
    }

    /// Upload `bytes` under the file name `name`.
    pub async fn process_bytes(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<ProcessResponse, DocServeError> {
        let url = format!("{}/process/", self.base_url);
        info!("Uploading '{}' ({} bytes) to {}", name, bytes.len(), url);

        let form = Form::new().part("file", Part::bytes(bytes).file_name(name.to_string()));
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.request_error(&url, e))?;
        let response = check_status(&url, response).await?;

        response
            .json::<ProcessResponse>()
            .await
            .map_err(|e| self.request_error(&url, e))
    }

    /// Fetch a produced file by name.
    pub async fn download(&self, name: &str) -> Result<Vec<u8>, DocServeError> {
        let url = format!("{}/download/{}", self.base_url, name);
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.request_error(&url, e))?;
        let response = check_status(&url, response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.request_error(&url, e))?;
        Ok(bytes.to_vec())
    }

    /// Fetch `name` and write it to `dest`. Returns the byte count.
    pub async fn download_to(&self, name: &str, dest: &Path) -> Result<usize, DocServeError> {
        let bytes = self.download(name).await?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| DocServeError::write_failed(dest, e))?;
        info!("Saved {} ({} bytes)", dest.display(), bytes.len());
        Ok(bytes.len())
    }

    /// `GET /health` as raw JSON.
    pub async fn health(&self) -> Result<serde_json::Value, DocServeError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.request_error(&url, e))?;
        let response = check_status(&url, response).await?;
        response
            .json()
            .await
            .map_err(|e| self.request_error(&url, e))
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> DocServeError {
        if e.is_timeout() {
            DocServeError::RequestTimeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            DocServeError::RequestFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

async fn check_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, DocServeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DocServeError::ServerStatus {
        url: url.to_string(),
        status: status.as_u16(),
        detail: error_detail(&body),
    })
}

/// `detail` of a `{"detail": ...}` body, else the body itself.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
