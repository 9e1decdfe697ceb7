//! Observer trait for export events.
//!
//! Pass a `&dyn ExportObserver` to [`crate::export::export_document`] to be
//! told about every artifact as it lands on disk. The server uses
//! [`TracingObserver`]; library callers that don't care pass
//! [`NoopExportObserver`].
//!
//! # Example
//!
//! ```rust
//! use edgequake_docserve::ExportObserver;
//! use std::path::Path;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct CountingObserver {
//!     written: AtomicUsize,
//! }
//!
//! impl ExportObserver for CountingObserver {
//!     fn on_artifact_written(&self, path: &Path, bytes: usize) {
//!         self.written.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} ({} bytes)", path.display(), bytes);
//!     }
//! }
//! ```

use std::path::Path;
use tracing::{debug, info, warn};

/// Called by the export writer as it produces artifacts.
///
/// All methods have default no-op implementations so implementors only
/// override what they care about. Requests export concurrently, so
/// implementations shared between requests must synchronise their state.
pub trait ExportObserver: Send + Sync {
    /// Called once the output directory exists, before any artifact.
    fn on_export_start(&self, stem: &str, output_dir: &Path) {
        let _ = (stem, output_dir);
    }

    /// Called after each artifact has been renamed into place.
    fn on_artifact_written(&self, path: &Path, bytes: usize) {
        let _ = (path, bytes);
    }

    /// Called when an item yields no image and its file is skipped.
    ///
    /// # Arguments
    /// * `kind`   — `"table"` or `"picture"`
    /// * `index`  — 1-based per-kind index the file would have used
    /// * `reason` — human-readable cause
    fn on_item_skipped(&self, kind: &str, index: usize, reason: &str) {
        let _ = (kind, index, reason);
    }

    /// Called once after the last artifact.
    fn on_export_complete(&self, stem: &str, artifacts: usize) {
        let _ = (stem, artifacts);
    }
}

/// Ignores every event.
pub struct NoopExportObserver;

impl ExportObserver for NoopExportObserver {}

/// Forwards events to `tracing`.
pub struct TracingObserver;

impl ExportObserver for TracingObserver {
    fn on_export_start(&self, stem: &str, output_dir: &Path) {
        info!("Exporting '{}' to {}", stem, output_dir.display());
    }

    fn on_artifact_written(&self, path: &Path, bytes: usize) {
        debug!("Wrote {} ({} bytes)", path.display(), bytes);
    }

    fn on_item_skipped(&self, kind: &str, index: usize, reason: &str) {
        warn!("Skipped {} {} image: {}", kind, index, reason);
    }

    fn on_export_complete(&self, stem: &str, artifacts: usize) {
        info!("Export of '{}' complete: {} artifacts", stem, artifacts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct TrackingObserver {
        written: AtomicUsize,
        skipped: AtomicUsize,
        completed_with: AtomicUsize,
    }

    impl ExportObserver for TrackingObserver {
        fn on_artifact_written(&self, _path: &Path, _bytes: usize) {
            self.written.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_skipped(&self, _kind: &str, _index: usize, _reason: &str) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }

        fn on_export_complete(&self, _stem: &str, artifacts: usize) {
            self.completed_with.store(artifacts, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let obs = NoopExportObserver;
        obs.on_export_start("doc", Path::new("outputs/doc"));
        obs.on_artifact_written(Path::new("outputs/doc/doc.json"), 10);
        obs.on_item_skipped("picture", 1, "no image");
        obs.on_export_complete("doc", 1);
    }

    #[test]
    fn tracking_observer_receives_events() {
        let obs = TrackingObserver::default();
        obs.on_artifact_written(Path::new("a.png"), 1);
        obs.on_artifact_written(Path::new("a.json"), 2);
        obs.on_item_skipped("table", 1, "no provenance");
        obs.on_export_complete("a", 2);

        assert_eq!(obs.written.load(Ordering::SeqCst), 2);
        assert_eq!(obs.skipped.load(Ordering::SeqCst), 1);
        assert_eq!(obs.completed_with.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_observer_works() {
        let obs: Arc<dyn ExportObserver> = Arc::new(TracingObserver);
        obs.on_export_start("doc", Path::new("outputs/doc"));
        obs.on_artifact_written(Path::new("outputs/doc/doc.md"), 512);
    }
}
