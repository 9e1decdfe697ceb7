//! Export writer: every artifact of one converted document.
//!
//! All artifacts go to `<output_root>/<stem>/` and are named after the stem
//! plus a page number or per-kind index, so re-exporting the same input
//! overwrites the same files. Steps run in a fixed order and the first
//! failure aborts the rest; files already written stay on disk. The cancel
//! flag is checked before every file, so a timed-out request stops writing.
//!
//! ```text
//! 1. <stem>-page-<n>.png                        every page with a raster
//! 2. <stem>-table-<n>.png, <stem>-picture-<n>.png  (full)
//! 3. <stem>-with-images.md                      embedded images
//! 4. <stem>-with-image-refs.{md,html}           (full) + _artifacts/
//! 5. <stem>.md, <stem>.txt                      (full)
//! 6. <stem>.json                                4-space indent
//! 7. <stem>.yaml                                (full)
//! 8. <stem>-table-<i>.csv, <stem>-table-<i>.html (html: full)
//! ```
//!
//! Each file is written to a temp file in the same directory and renamed
//! into place, so a reader never sees a half-written artifact.

use crate::config::ExportProfile;
use crate::convert::CancelFlag;
use crate::document::{
    image::encode_png, to_json_pretty, to_yaml, DoclingDocument, ImageRefMode, NodeItem,
};
use crate::error::DocServeError;
use crate::progress::ExportObserver;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Suffix of the directory holding images of a referenced-image export.
pub const ARTIFACTS_DIR_SUFFIX: &str = "_artifacts";

pub fn page_image_name(stem: &str, page_no: u32) -> String {
    format!("{stem}-page-{page_no}.png")
}

pub fn table_image_name(stem: &str, index: usize) -> String {
    format!("{stem}-table-{index}.png")
}

pub fn picture_image_name(stem: &str, index: usize) -> String {
    format!("{stem}-picture-{index}.png")
}

pub fn table_csv_name(stem: &str, index: usize) -> String {
    format!("{stem}-table-{index}.csv")
}

pub fn table_html_name(stem: &str, index: usize) -> String {
    format!("{stem}-table-{index}.html")
}

/// What an export produced.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// `<output_root>/<stem>`.
    pub output_dir: PathBuf,
    /// Artifacts in the order they were written.
    pub written: Vec<PathBuf>,
    pub elapsed_ms: u64,
}

/// Write every artifact `profile` calls for.
///
/// # Errors
/// [`DocServeError::OutputWriteFailed`] when a directory or file cannot be
/// written, [`DocServeError::SerializationFailed`] when JSON/YAML/CSV
/// serialisation fails, [`DocServeError::Cancelled`] once `cancel` is raised.
pub fn export_document(
    doc: &DoclingDocument,
    stem: &str,
    output_root: &Path,
    profile: ExportProfile,
    observer: &dyn ExportObserver,
    cancel: &CancelFlag,
) -> Result<ExportSummary, DocServeError> {
    let start = Instant::now();
    let output_dir = output_root.join(stem);
    std::fs::create_dir_all(&output_dir)
        .map_err(|e| DocServeError::write_failed(&output_dir, e))?;
    observer.on_export_start(stem, &output_dir);

    let mut w = ArtifactWriter {
        dir: &output_dir,
        observer,
        cancel,
        written: Vec::new(),
    };
    let full = profile.is_full();

    // ── Step 1: Page images ──────────────────────────────────────────────
    for page_no in doc.pages.keys() {
        if let Some(img) = doc.page_image(*page_no)? {
            w.write(&page_image_name(stem, *page_no), &encode_png(&img)?)?;
        }
    }

    // ── Step 2: Table and picture images ─────────────────────────────────
    if full {
        let (mut tables, mut pictures) = (0usize, 0usize);
        for item in doc.iterate_items() {
            let (kind, name) = match item {
                NodeItem::Table(_) => {
                    tables += 1;
                    ("table", table_image_name(stem, tables))
                }
                NodeItem::Picture(_) => {
                    pictures += 1;
                    ("picture", picture_image_name(stem, pictures))
                }
                NodeItem::Text(_) => continue,
            };
            let index = if kind == "table" { tables } else { pictures };
            match doc.item_image(item) {
                Ok(Some(img)) => w.write(&name, &encode_png(&img)?)?,
                Ok(None) => observer.on_item_skipped(kind, index, "no image available"),
                Err(e) => observer.on_item_skipped(kind, index, &e.to_string()),
            }
        }
    }

    // ── Step 3: Markdown with embedded images ────────────────────────────
    w.write_text(
        &format!("{stem}-with-images.md"),
        &doc.export_to_markdown(ImageRefMode::Embedded),
    )?;

    // ── Step 4: Referenced-image Markdown and HTML ───────────────────────
    if full {
        let refs_stem = format!("{stem}-with-image-refs");
        let link_prefix = format!("{refs_stem}{ARTIFACTS_DIR_SUFFIX}");
        let artifacts_dir = output_dir.join(&link_prefix);
        w.check_cancelled()?;
        // Drop images of a previous export so the directory mirrors this one.
        match std::fs::remove_dir_all(&artifacts_dir) {
            Ok(()) => debug!("Cleared {}", artifacts_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DocServeError::write_failed(&artifacts_dir, e)),
        }
        let (referenced, images) = doc.with_referenced_images(&link_prefix)?;
        if !images.is_empty() {
            std::fs::create_dir_all(&artifacts_dir)
                .map_err(|e| DocServeError::write_failed(&artifacts_dir, e))?;
        }
        for image in &images {
            w.write(&format!("{link_prefix}/{}", image.file_name), &image.png)?;
        }
        w.write_text(
            &format!("{refs_stem}.md"),
            &referenced.export_to_markdown(ImageRefMode::Referenced),
        )?;
        w.write_text(
            &format!("{refs_stem}.html"),
            &referenced.export_to_html(ImageRefMode::Referenced),
        )?;
    }

    // ── Step 5: Plain Markdown and text ──────────────────────────────────
    if full {
        w.write_text(
            &format!("{stem}.md"),
            &doc.export_to_markdown(ImageRefMode::Placeholder),
        )?;
        w.write_text(&format!("{stem}.txt"), &doc.export_to_text())?;
    }

    // ── Step 6: JSON ─────────────────────────────────────────────────────
    w.check_cancelled()?;
    let dict = doc.export_to_dict()?;
    w.write_text(&format!("{stem}.json"), &to_json_pretty(&dict)?)?;

    // ── Step 7: YAML ─────────────────────────────────────────────────────
    if full {
        w.write_text(&format!("{stem}.yaml"), &to_yaml(&dict)?)?;
    }

    // ── Step 8: Per-table CSV and HTML ───────────────────────────────────
    let tables = doc.iterate_items().filter_map(|item| match item {
        NodeItem::Table(t) => Some(t),
        _ => None,
    });
    for (i, table) in tables.enumerate() {
        let index = i + 1;
        let csv = table.data.export_to_dataframe().to_csv_string()?;
        w.write_text(&table_csv_name(stem, index), &csv)?;
        if full {
            w.write_text(&table_html_name(stem, index), &doc.table_html(table))?;
        }
    }

    let elapsed_ms = start.elapsed().as_millis() as u64;
    observer.on_export_complete(stem, w.written.len());
    info!(
        "Exported {} artifacts for '{}' in {}ms",
        w.written.len(),
        stem,
        elapsed_ms
    );

    Ok(ExportSummary {
        written: w.written,
        output_dir,
        elapsed_ms,
    })
}

struct ArtifactWriter<'a> {
    dir: &'a Path,
    observer: &'a dyn ExportObserver,
    cancel: &'a CancelFlag,
    written: Vec<PathBuf>,
}

impl ArtifactWriter<'_> {
    fn check_cancelled(&self) -> Result<(), DocServeError> {
        if self.cancel.is_cancelled() {
            return Err(DocServeError::Cancelled {
                path: self.dir.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Write `name` (relative to the output directory) atomically.
    fn write(&mut self, name: &str, bytes: &[u8]) -> Result<(), DocServeError> {
        self.check_cancelled()?;
        let path = self.dir.join(name);
        write_atomic(&path, bytes)?;
        self.observer.on_artifact_written(&path, bytes.len());
        self.written.push(path);
        Ok(())
    }

    fn write_text(&mut self, name: &str, text: &str) -> Result<(), DocServeError> {
        self.write(name, text.as_bytes())
    }
}

/// Write `bytes` to a temp file beside `path`, then rename it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DocServeError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| DocServeError::write_failed(path, e))?;
    tmp.write_all(bytes)
        .map_err(|e| DocServeError::write_failed(path, e))?;
    tmp.persist(path)
        .map_err(|e| DocServeError::write_failed(path, e.error))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Names of the entries directly inside `dir`, sorted.
pub fn list_output_files(dir: &Path) -> Result<Vec<String>, DocServeError> {
    let entries = std::fs::read_dir(dir).map_err(|e| DocServeError::write_failed(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DocServeError::write_failed(dir, e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Find a previously written file by name.
///
/// Looks at `<output_root>/<name>` first (raw uploads), then in the artifact
/// directory named after the file stem or its longest `-`-delimited prefix:
/// `report-page-1.png` is looked up in `report-page-1/`, `report-page/`,
/// then `report/`. `name` must already be a validated basename.
pub fn locate_artifact(output_root: &Path, name: &str) -> Option<PathBuf> {
    let direct = output_root.join(name);
    if direct.is_file() {
        return Some(direct);
    }
    let stem = Path::new(name).file_stem()?.to_str()?;
    let mut candidate = stem;
    loop {
        if !candidate.is_empty() {
            let path = output_root.join(candidate).join(name);
            if path.is_file() {
                return Some(path);
            }
        }
        match candidate.rfind('-') {
            Some(idx) => candidate = &candidate[..idx],
            None => return None,
        }
    }
}
