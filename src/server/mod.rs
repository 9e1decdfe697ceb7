//! HTTP surface: upload + convert + export, and download.
//!
//! ```text
//! POST /process/                   multipart `file` → ProcessResponse
//! GET  /download/:filename         output root, then the stem's directory
//! GET  /download/:stem/:filename   <output_root>/<stem>/<filename>
//! GET  /health
//! ```
//!
//! Build the router with [`router`] and run it with [`serve`], or hand the
//! router to `axum-test` in tests.

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use handlers::{ProcessResponse, SUCCESS_MESSAGE};
pub use state::AppState;

use crate::config::ServiceConfig;
use crate::error::DocServeError;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Router with all routes, the upload size limit, tracing and CORS.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/process/", post(handlers::process))
        .route("/process", post(handlers::process))
        .route("/download/:filename", get(handlers::download))
        .route("/download/:stem/:filename", get(handlers::download_artifact))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `config.bind_addr()` and serve until the process is stopped.
pub async fn serve(config: ServiceConfig) -> Result<(), DocServeError> {
    let addr = config.bind_addr();
    std::fs::create_dir_all(&config.output_root)
        .map_err(|e| DocServeError::write_failed(&config.output_root, e))?;

    info!(
        "Profile: {} (images_scale {}), output root: {}",
        config.profile,
        config.pipeline.images_scale,
        config.output_root.display()
    );
    info!(
        "Conversions: {} at once, {}s timeout",
        config.max_concurrent_conversions, config.conversion_timeout_secs
    );

    let app = router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DocServeError::Internal(format!("Failed to bind {addr}: {e}")))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| DocServeError::Internal(format!("Server error: {e}")))
}
