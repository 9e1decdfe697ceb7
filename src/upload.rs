//! Uploaded files: name validation and persistence into the output root.
//!
//! Client-supplied names end up as path components under the output root,
//! both for uploads and downloads. Only plain basenames are accepted; a
//! name that could reach outside the root is rejected before any file
//! system access.

use crate::error::DocServeError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Check that `name` is a single path component.
///
/// # Errors
/// [`DocServeError::InvalidFilename`] for empty names, `.`/`..`, names
/// containing `/`, `\` or NUL, and names with a drive prefix.
pub fn validate_basename(name: &str) -> Result<&str, DocServeError> {
    let reject = |reason: &'static str| DocServeError::InvalidFilename {
        name: name.to_string(),
        reason,
    };

    if name.trim().is_empty() {
        return Err(reject("file name is empty"));
    }
    if name == "." || name == ".." {
        return Err(reject("file name is a directory reference"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(reject("file name contains a path separator"));
    }
    if name.contains('\0') {
        return Err(reject("file name contains a NUL byte"));
    }
    if name.len() >= 2 && name.as_bytes()[1] == b':' && name.as_bytes()[0].is_ascii_alphabetic() {
        return Err(reject("file name has a drive prefix"));
    }
    Ok(name)
}

/// Write an uploaded file unmodified to `<output_root>/<name>`, replacing
/// any file of the same name. Returns the saved path.
pub async fn save_upload(
    output_root: &Path,
    name: &str,
    bytes: &[u8],
) -> Result<PathBuf, DocServeError> {
    let name = validate_basename(name)?;

    tokio::fs::create_dir_all(output_root)
        .await
        .map_err(|e| DocServeError::write_failed(output_root, e))?;

    let path = output_root.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| DocServeError::write_failed(&path, e))?;

    debug!("Saved upload {} ({} bytes)", path.display(), bytes.len());
    info!("Received '{}'", name);
    Ok(path)
}
