//! HTTP integration tests for edgequake-docserve.
//!
//! Every test gets its own output root in a temp directory and drives the
//! router through `axum-test`. Inputs are text formats (Markdown, HTML) so
//! no pdfium library is needed; the PDF test is gated behind `E2E_ENABLED`
//! like the rest of the live-library tests.
//!
//! Run with:
//!   cargo test --test service -- --nocapture
//!
//! PDF round trip (needs pdfium and test_cases/sample.pdf):
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test service pdf -- --nocapture

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use edgequake_docserve::document::to_json_pretty;
use edgequake_docserve::{
    router, AppState, CancelFlag, ConversionEngine, ConversionResult, DocServeClient,
    DocServeError, DocumentConverter, ExportObserver, ExportProfile, InputFormat,
    ProcessResponse, ServiceConfig,
};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

const NOTES_MD: &str = "# Notes\n\nIntro paragraph.\n\n## Data\n\n| Name | Score |\n|------|-------|\n| ann  | 3     |\n| bob  | 5     |\n\n- first\n- second\n";

const TWO_TABLES_HTML: &str = r#"<html><body>
<h1>Tables</h1>
<table><caption>First</caption><tr><th>a</th><th>b</th></tr><tr><td>1</td><td>2</td></tr></table>
<p>Between.</p>
<table><tr><th>x</th></tr><tr><td>y</td></tr></table>
</body></html>"#;

fn config(root: &Path, profile: ExportProfile) -> ServiceConfig {
    ServiceConfig::builder()
        .profile(profile)
        .output_root(root)
        .max_concurrent_conversions(2)
        .conversion_timeout_secs(60)
        .build()
        .unwrap()
}

fn server(root: &Path, profile: ExportProfile) -> TestServer {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("edgequake_docserve=debug")
        .with_test_writer()
        .try_init();
    TestServer::new(router(AppState::new(config(root, profile)))).unwrap()
}

fn upload(name: &str, bytes: &[u8]) -> MultipartForm {
    MultipartForm::new().add_part("file", Part::bytes(bytes.to_vec()).file_name(name.to_string()))
}

async fn process(server: &TestServer, name: &str, bytes: &[u8]) -> ProcessResponse {
    let response = server.post("/process/").multipart(upload(name, bytes)).await;
    response.assert_status_ok();
    response.json::<ProcessResponse>()
}

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run pdfium tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

// ── Health ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_profile() {
    let root = TempDir::new().unwrap();
    let server = server(root.path(), ExportProfile::Minimal);
    let response = server.get("/health").await;
    response.assert_status_ok();

    let json = response.json::<serde_json::Value>();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "edgequake-docserve");
    assert_eq!(json["profile"], "minimal");
}

// ── Process ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_process_markdown_full_profile() {
    let root = TempDir::new().unwrap();
    let server = server(root.path(), ExportProfile::Full);

    let resp = process(&server, "notes.md", NOTES_MD.as_bytes()).await;
    assert_eq!(resp.message, "File processed successfully");
    assert!(resp.processing_time.ends_with(" seconds"), "{}", resp.processing_time);
    assert_eq!(
        resp.output_directory,
        root.path().join("notes").display().to_string()
    );

    // Markdown has no pages and its picture-less table has no raster.
    assert_eq!(
        resp.files.unwrap(),
        vec![
            "notes-table-1.csv",
            "notes-table-1.html",
            "notes-with-image-refs.html",
            "notes-with-image-refs.md",
            "notes-with-images.md",
            "notes.json",
            "notes.md",
            "notes.txt",
            "notes.yaml",
        ]
    );

    // The raw upload sits in the output root, unmodified.
    let saved = std::fs::read_to_string(root.path().join("notes.md")).unwrap();
    assert_eq!(saved, NOTES_MD);

    let csv = std::fs::read_to_string(root.path().join("notes/notes-table-1.csv")).unwrap();
    assert_eq!(csv, "Name,Score\nann,3\nbob,5\n");
}

#[tokio::test]
async fn test_process_minimal_profile_has_no_files_list() {
    let root = TempDir::new().unwrap();
    let server = server(root.path(), ExportProfile::Minimal);

    let response = server
        .post("/process/")
        .multipart(upload("notes.md", NOTES_MD.as_bytes()))
        .await;
    response.assert_status_ok();
    let json = response.json::<serde_json::Value>();
    assert!(json.get("files").is_none(), "minimal response: {json}");

    let mut names: Vec<String> = std::fs::read_dir(root.path().join("notes"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["notes-table-1.csv", "notes-with-images.md", "notes.json"]
    );
}

#[tokio::test]
async fn test_tables_are_numbered_from_one() {
    let root = TempDir::new().unwrap();
    let server = server(root.path(), ExportProfile::Full);

    let resp = process(&server, "tables.html", TWO_TABLES_HTML.as_bytes()).await;
    let files = resp.files.unwrap();
    for name in [
        "tables-table-1.csv",
        "tables-table-1.html",
        "tables-table-2.csv",
        "tables-table-2.html",
    ] {
        assert!(files.iter().any(|f| f == name), "missing {name} in {files:?}");
    }
    let html = std::fs::read_to_string(root.path().join("tables/tables-table-1.html")).unwrap();
    assert!(html.contains("<caption>First</caption>"));
}

#[tokio::test]
async fn test_output_directory_is_the_stem() {
    let root = TempDir::new().unwrap();
    let server = server(root.path(), ExportProfile::Minimal);

    let resp = process(&server, "Quarterly.Report.MD", NOTES_MD.as_bytes()).await;
    assert_eq!(
        resp.output_directory,
        root.path().join("Quarterly.Report").display().to_string()
    );
    assert!(root
        .path()
        .join("Quarterly.Report/Quarterly.Report.json")
        .is_file());
}

#[tokio::test]
async fn test_reprocessing_overwrites_in_place() {
    let root = TempDir::new().unwrap();
    let server = server(root.path(), ExportProfile::Full);

    let first = process(&server, "notes.md", NOTES_MD.as_bytes()).await;
    let changed = NOTES_MD.replace("Intro paragraph.", "Rewritten intro.");
    let second = process(&server, "notes.md", changed.as_bytes()).await;

    assert_eq!(first.files, second.files);
    let md = std::fs::read_to_string(root.path().join("notes/notes.md")).unwrap();
    assert!(md.contains("Rewritten intro."));
    assert!(!md.contains("Intro paragraph."));
}

#[tokio::test]
async fn test_unsupported_format_is_500_without_output_dir() {
    let root = TempDir::new().unwrap();
    let server = server(root.path(), ExportProfile::Full);

    let response = server
        .post("/process/")
        .multipart(upload("sheet.csv", b"a,b\n1,2\n"))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let detail = response.json::<serde_json::Value>()["detail"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(detail.contains("CSV"), "detail: {detail}");
    assert!(!root.path().join("sheet").exists());
}

#[tokio::test]
async fn test_missing_file_field_is_400() {
    let root = TempDir::new().unwrap();
    let server = server(root.path(), ExportProfile::Full);

    let response = server
        .post("/process/")
        .multipart(MultipartForm::new().add_text("comment", "no file here"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.json::<serde_json::Value>()["detail"].is_string());
}

// ── Download ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_downloaded_json_matches_direct_conversion() {
    let root = TempDir::new().unwrap();
    let server = server(root.path(), ExportProfile::Full);
    process(&server, "notes.md", NOTES_MD.as_bytes()).await;

    let response = server.get("/download/notes.json").await;
    response.assert_status_ok();
    assert_eq!(
        response.header("content-type").to_str().unwrap(),
        "application/json"
    );

    let converter = DocumentConverter::from_config(&config(root.path(), ExportProfile::Full));
    let direct = converter
        .convert(&root.path().join("notes.md"), &CancelFlag::new())
        .unwrap();
    let expected = to_json_pretty(&direct.document.export_to_dict().unwrap()).unwrap();
    assert_eq!(response.text(), expected);
}

#[tokio::test]
async fn test_download_routes() {
    let root = TempDir::new().unwrap();
    let server = server(root.path(), ExportProfile::Full);
    process(&server, "notes.md", NOTES_MD.as_bytes()).await;

    // Raw upload from the output root.
    let raw = server.get("/download/notes.md").await;
    raw.assert_status_ok();
    assert_eq!(raw.text(), NOTES_MD);

    // Artifact found through its stem prefix.
    let csv = server.get("/download/notes-table-1.csv").await;
    csv.assert_status_ok();
    assert_eq!(
        csv.header("content-type").to_str().unwrap(),
        "text/csv; charset=utf-8"
    );

    // Explicit stem directory.
    let md = server.get("/download/notes/notes.md").await;
    md.assert_status_ok();
    assert!(md.text().contains("<!-- image -->") || md.text().starts_with("# Notes"));
}

#[tokio::test]
async fn test_download_missing_is_404() {
    let root = TempDir::new().unwrap();
    let server = server(root.path(), ExportProfile::Full);

    for url in ["/download/nothing.json", "/download/nothing/nothing.json"] {
        let response = server.get(url).await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(
            response.json::<serde_json::Value>(),
            serde_json::json!({ "detail": "File not found" })
        );
    }
}

#[tokio::test]
async fn test_download_traversal_is_400() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("secret.txt"), b"s").unwrap();
    let nested = root.path().join("inner");
    std::fs::create_dir_all(&nested).unwrap();
    let server = server(&nested, ExportProfile::Full);

    let response = server.get("/download/..%2Fsecret.txt").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/download/../secret.txt").await;
    assert_ne!(response.status_code(), StatusCode::OK);
}

// ── Concurrency and timeout ──────────────────────────────────────────────────

/// Engine that never finishes on its own; it only stops when cancelled.
struct StuckEngine;

impl ConversionEngine for StuckEngine {
    fn allowed_formats(&self) -> &[InputFormat] {
        &InputFormat::DEFAULT_ALLOWED
    }

    fn convert(&self, path: &Path, cancel: &CancelFlag) -> Result<ConversionResult, DocServeError> {
        while !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(10));
        }
        Err(DocServeError::Cancelled {
            path: path.to_path_buf(),
        })
    }
}

#[tokio::test]
async fn test_conversion_timeout_is_500() {
    let root = TempDir::new().unwrap();
    let config = ServiceConfig::builder()
        .output_root(root.path())
        .conversion_timeout_secs(1)
        .build()
        .unwrap();
    let state = AppState::with_engine(config, Arc::new(StuckEngine));
    let server = TestServer::new(router(state)).unwrap();

    let response = server
        .post("/process/")
        .multipart(upload("slow.md", b"# slow"))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let detail = response.json::<serde_json::Value>()["detail"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(detail.contains("timed out"), "detail: {detail}");
    assert!(!root.path().join("slow").exists());
}

/// Observer that takes 700ms to acknowledge each artifact.
struct SlowObserver;

impl ExportObserver for SlowObserver {
    fn on_artifact_written(&self, _path: &Path, _bytes: usize) {
        std::thread::sleep(Duration::from_millis(700));
    }
}

#[tokio::test]
async fn test_timeout_during_export_stops_writing() {
    let root = TempDir::new().unwrap();
    let config = ServiceConfig::builder()
        .output_root(root.path())
        .conversion_timeout_secs(1)
        .build()
        .unwrap();
    let state = AppState::new(config).with_observer(Arc::new(SlowObserver));
    let server = TestServer::new(router(state)).unwrap();

    let response = server
        .post("/process/")
        .multipart(upload("t.md", NOTES_MD.as_bytes()))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    // Give the blocking job time to reach its next write and stop.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let dir = root.path().join("t");
    let files = std::fs::read_dir(&dir)
        .map(|entries| entries.filter_map(Result::ok).count())
        .unwrap_or(0);
    assert!(files <= 2, "{files} artifacts written after timeout");
    assert!(!dir.join("t.json").exists());
    assert!(!dir.join("t.yaml").exists());
    assert!(!dir.join("t-table-1.csv").exists());
}

// ── Client against a live listener ───────────────────────────────────────────

#[tokio::test]
async fn test_client_round_trip() {
    let root = TempDir::new().unwrap();
    let app = router(AppState::new(config(root.path(), ExportProfile::Full)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = DocServeClient::new(format!("http://{addr}"), 30).unwrap();
    let resp = client
        .process_bytes("notes.md", NOTES_MD.as_bytes().to_vec())
        .await
        .unwrap();
    assert!(resp.files.unwrap().contains(&"notes.yaml".to_string()));

    let yaml = client.download("notes.yaml").await.unwrap();
    assert!(String::from_utf8(yaml).unwrap().contains("DoclingDocument"));

    let dest = root.path().join("fetched.txt");
    let n = client.download_to("notes.txt", &dest).await.unwrap();
    assert_eq!(n, std::fs::metadata(&dest).unwrap().len() as usize);

    match client.download("absent.json").await {
        Err(DocServeError::ServerStatus { status, detail, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(detail, "File not found");
        }
        other => panic!("expected 404, got {other:?}"),
    }
}

// ── PDF (needs pdfium) ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_pdf_full_export() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));
    let root = TempDir::new().unwrap();
    let server = server(root.path(), ExportProfile::Full);

    let bytes = std::fs::read(&pdf).unwrap();
    let resp = process(&server, "report.pdf", &bytes).await;
    assert_eq!(
        resp.output_directory,
        root.path().join("report").display().to_string()
    );
    let files = resp.files.unwrap();
    for name in ["report-page-1.png", "report.json", "report-with-image-refs.html"] {
        assert!(files.iter().any(|f| f == name), "missing {name} in {files:?}");
    }

    let png = server.get("/download/report-page-1.png").await;
    png.assert_status_ok();
    assert!(png.as_bytes().starts_with(b"\x89PNG"));
}
