//! HTTP error type.
//!
//! Every failing request gets a JSON body `{"detail": "<message>"}`. Library
//! errors are collapsed into [`ApiError::Processing`] (500) except the
//! client-caused [`DocServeError::InvalidFilename`], which becomes
//! [`ApiError::BadRequest`] (400).

use crate::error::DocServeError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request: missing upload field, invalid file name.
    #[error("{0}")]
    BadRequest(String),

    #[error("File not found")]
    NotFound,

    /// Conversion or export failed.
    #[error("{0}")]
    Processing(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DocServeError> for ApiError {
    fn from(err: DocServeError) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Processing(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Processing(detail) = &self {
            error!("Processing failed: {}", detail);
        }
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
