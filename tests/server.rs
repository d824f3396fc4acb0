//! End-to-end tests: spawn the real server on a loopback port, substitute
//! an in-process recognition backend, and drive it with reqwest.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ocr_gateway::{
    start_server, AppState, GatewayConfig, GatewayError, OcrBackend, OcrOptions, PageRecord,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

// ── Backend doubles ──────────────────────────────────────────────────────

/// Writes a fixed set of page artifacts and records the options it saw.
struct ScriptedBackend {
    pages: Vec<(usize, String)>,
    seen_options: Mutex<Vec<OcrOptions>>,
}

impl ScriptedBackend {
    fn new(pages: Vec<(usize, String)>) -> Self {
        Self {
            pages,
            seen_options: Mutex::new(Vec::new()),
        }
    }
}

impl OcrBackend for ScriptedBackend {
    fn parse_document(
        &self,
        _source: &Path,
        page_dir: &Path,
        options: &OcrOptions,
    ) -> Result<Vec<PageRecord>, GatewayError> {
        self.seen_options.lock().unwrap().push(options.clone());
        std::fs::create_dir_all(page_dir).unwrap();
        let doc = page_dir.file_name().unwrap().to_string_lossy().into_owned();
        let mut records = Vec::new();
        for (page_no, markdown) in &self.pages {
            let path = page_dir.join(format!("{doc}_page_{page_no}.md"));
            std::fs::write(&path, markdown).unwrap();
            records.push(PageRecord {
                page_no: *page_no,
                md_content_path: Some(path),
            });
        }
        Ok(records)
    }
}

/// Fails every invocation, leaving backend-style scratch litter behind.
struct ExplodingBackend;

impl OcrBackend for ExplodingBackend {
    fn parse_document(
        &self,
        _source: &Path,
        page_dir: &Path,
        _options: &OcrOptions,
    ) -> Result<Vec<PageRecord>, GatewayError> {
        let root = page_dir.parent().unwrap();
        std::fs::create_dir_all(root.join("tmpScratch")).unwrap();
        std::fs::write(root.join("pages.jsonl"), "{}").unwrap();
        Err(GatewayError::Inference {
            detail: "backend ran out of layout".into(),
        })
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct TestServer {
    url: String,
    output_root: PathBuf,
    _root: tempfile::TempDir,
}

async fn spawn(port: u16, backend: Arc<dyn OcrBackend>) -> TestServer {
    let root = tempfile::tempdir().unwrap();
    let output_root = root.path().to_path_buf();
    let config = GatewayConfig {
        // Nothing listens here; liveness probes must fail fast.
        backend_url: "http://127.0.0.1:1".to_string(),
        output_root: output_root.clone(),
        health_timeout_secs: 2,
        ..Default::default()
    };
    let state = AppState::with_backend(config, backend);
    let addr = format!("127.0.0.1:{port}");
    let server_addr = addr.clone();
    tokio::spawn(async move {
        start_server(&server_addr, state)
            .await
            .expect("Failed to start server");
    });
    sleep(Duration::from_millis(300)).await;

    TestServer {
        url: format!("http://{addr}"),
        output_root,
        _root: root,
    }
}

fn inline_image(alt: &str, data: &[u8]) -> String {
    format!("![{alt}](data:image/png;base64,{})", STANDARD.encode(data))
}

fn tmp_dirs_under(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    if entry.file_name().to_string_lossy().starts_with("tmp") {
                        found.push(path.clone());
                    }
                    stack.push(path);
                }
            }
        }
    }
    found
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn json_submission_consolidates_two_pages() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        (1, format!("# First\n{}", inline_image("fig", b"img-bytes"))),
        (2, "# Second".to_string()),
    ]));
    let server = spawn(18180, backend).await;

    let body = serde_json::json!({
        "file_data": STANDARD.encode(b"%PDF-1.7 two pages"),
    });
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/invocations", server.url))
        .json(&body)
        .send()
        .await
        .expect("Failed to submit document");

    assert_eq!(response.status(), 200);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["object"], "ocr.completion");
    assert_eq!(json["result"].as_array().unwrap().len(), 2);

    // The published document holds both page markers, one rule, and the
    // renumbered image.
    let doc_path = PathBuf::from(json["document"]["path"].as_str().unwrap());
    let text = std::fs::read_to_string(&doc_path).unwrap();
    assert!(text.contains("<!-- Page 1 -->"));
    assert!(text.contains("<!-- Page 2 -->"));
    assert_eq!(text.matches("\n\n---\n\n").count(), 1);
    assert!(text.contains("![fig](assets/image1.png)"));

    let doc_dir = PathBuf::from(json["document"]["dir"].as_str().unwrap());
    assert!(doc_dir.join("assets").join("image1.png").exists());

    // No intermediates survive outside final/.
    assert!(tmp_dirs_under(&server.output_root).is_empty());
    assert!(!server.output_root.join("consolidated").join(
        doc_dir.file_name().unwrap()
    ).exists());
}

#[tokio::test]
async fn raw_submission_applies_header_overrides() {
    let backend = Arc::new(ScriptedBackend::new(vec![(1, "# Only page".to_string())]));
    let server = spawn(18181, Arc::clone(&backend) as Arc<dyn OcrBackend>).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/invocations", server.url))
        .header("Content-Type", "application/pdf")
        .header("X-Ocr-Dpi", "240")
        .header("X-Ocr-Temperature", "garbage")
        .body(b"%PDF-1.7 raw mode".to_vec())
        .send()
        .await
        .expect("Failed to submit document");

    assert_eq!(response.status(), 200);

    let seen = backend.seen_options.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].dpi, 240, "valid header override applied");
    assert!(
        (seen[0].temperature - 0.1).abs() < f32::EPSILON,
        "malformed header override keeps the default"
    );
}

#[tokio::test]
async fn empty_raw_body_is_a_client_fault() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let server = spawn(18182, backend).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/invocations", server.url))
        .header("Content-Type", "application/octet-stream")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let json: serde_json::Value = response.json().await.unwrap();
    assert!(json["error"].as_str().unwrap().contains("Empty request body"));
}

#[tokio::test]
async fn invalid_json_and_bad_base64_are_client_faults() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let server = spawn(18183, backend).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/invocations", server.url))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .post(format!("{}/invocations", server.url))
        .json(&serde_json::json!({ "file_data": "@@@not base64@@@" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let json: serde_json::Value = response.json().await.unwrap();
    assert!(json["error"].as_str().unwrap().contains("base64"));
}

#[tokio::test]
async fn inference_failure_reports_500_and_sweeps_intermediates() {
    let server = spawn(18184, Arc::new(ExplodingBackend)).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/invocations", server.url))
        .json(&serde_json::json!({
            "file_data": STANDARD.encode(b"%PDF-1.7 doomed"),
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let json: serde_json::Value = response.json().await.unwrap();
    let error = json["error"].as_str().unwrap();
    assert!(error.contains("OCR failed"));
    assert!(error.contains("backend ran out of layout"));

    // The sweep ran: no scratch directories or structured leftovers remain.
    assert!(tmp_dirs_under(&server.output_root).is_empty());
    assert!(!server.output_root.join("pages.jsonl").exists());
}

#[tokio::test]
async fn ping_reports_unavailable_backend() {
    let backend = Arc::new(ScriptedBackend::new(vec![]));
    let server = spawn(18185, backend).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/ping", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);

    let response = client
        .get(format!("{}/health", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["status"], "unhealthy");
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn republishing_same_document_replaces_final_content() {
    // Drive the pipeline twice against one output root with a fixed id by
    // publishing directly; the HTTP path assigns fresh uuids per request.
    use ocr_gateway::consolidate;
    use ocr_gateway::pipeline::finalize::publish;

    let root = tempfile::tempdir().unwrap();
    let final_root = root.path().join("final");

    let input = root.path().join("a").join("doc");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::write(
        input.join("doc_page_1.md"),
        format!("v1 {}", inline_image("x", b"one")),
    )
    .unwrap();
    let staged = consolidate(&input, &root.path().join("staging"), None).unwrap();
    publish(&staged, &final_root, "doc").unwrap();

    let input = root.path().join("b").join("doc");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::write(input.join("doc_page_1.md"), "v2 no images").unwrap();
    let staged = consolidate(&input, &root.path().join("staging"), None).unwrap();
    publish(&staged, &final_root, "doc").unwrap();

    let text = std::fs::read_to_string(final_root.join("doc").join("document.md")).unwrap();
    assert!(text.contains("v2 no images"));
    let assets: Vec<_> = std::fs::read_dir(final_root.join("doc").join("assets"))
        .unwrap()
        .collect();
    assert!(assets.is_empty());
}
