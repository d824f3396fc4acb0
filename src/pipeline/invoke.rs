//! Backend invocation: the opaque call to the recognition service.
//!
//! ## Why a blocking call?
//!
//! The backend transcribes whole documents in one request and offers no
//! job polling; a 200-page scan can hold the connection open for minutes.
//! The call is therefore made with a blocking client, no timeout, from
//! inside `tokio::task::spawn_blocking` so it never stalls the async
//! workers. The liveness probe, by contrast, is async and bounded by
//! `health_timeout_secs`: a hung backend fails `/ping` quickly while an
//! in-flight submission keeps waiting.
//!
//! [`OcrBackend`] is the seam: the pipeline only needs "give me ordered
//! page results and page artifacts in this directory", so tests substitute
//! an in-process implementation and never touch the network.

use crate::config::{GatewayConfig, OcrOptions};
use crate::error::GatewayError;
use crate::output::PageRecord;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// The recognition backend boundary.
///
/// Implementations perform one synchronous, blocking call: given the staged
/// document and resolved options, write per-page Markdown artifacts into
/// `page_dir` and return the ordered page results. Errors surface as
/// [`GatewayError::Inference`] and never prevent cleanup from running.
pub trait OcrBackend: Send + Sync {
    fn parse_document(
        &self,
        source: &Path,
        page_dir: &Path,
        options: &OcrOptions,
    ) -> Result<Vec<PageRecord>, GatewayError>;
}

/// Probe the backend's health endpoint within the configured timeout.
pub async fn probe_backend(config: &GatewayConfig) -> Result<(), GatewayError> {
    let url = config.backend_health_url();
    let unavailable = |detail: String| GatewayError::BackendUnavailable {
        url: url.clone(),
        detail,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.health_timeout_secs))
        .build()
        .map_err(|e| unavailable(e.to_string()))?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| unavailable(e.to_string()))?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(unavailable(format!("HTTP {}", response.status())))
    }
}

// ── HTTP implementation ──────────────────────────────────────────────────

/// Wire format of one page in the backend's parse response.
#[derive(Debug, Deserialize)]
struct WirePage {
    page_no: usize,
    #[serde(default)]
    markdown: Option<String>,
    /// Variant with running headers/footers stripped, when the backend
    /// produces one.
    #[serde(default)]
    markdown_nohf: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireParseResponse {
    pages: Vec<WirePage>,
}

/// Production backend: forwards the staged document to the recognition
/// service's parse endpoint over HTTP.
pub struct HttpOcrBackend {
    parse_url: String,
}

impl HttpOcrBackend {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            parse_url: config.backend_parse_url(),
        }
    }
}

impl OcrBackend for HttpOcrBackend {
    fn parse_document(
        &self,
        source: &Path,
        page_dir: &Path,
        options: &OcrOptions,
    ) -> Result<Vec<PageRecord>, GatewayError> {
        let inference = |detail: String| GatewayError::Inference { detail };

        let bytes = std::fs::read(source)
            .map_err(|e| inference(format!("read staged input {}: {e}", source.display())))?;

        info!(
            "Invoking backend for {} ({} bytes)",
            source.display(),
            bytes.len()
        );

        // No timeout: parse calls run as long as the document demands.
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .build()
            .map_err(|e| inference(e.to_string()))?;

        let body = serde_json::json!({
            "file_data": STANDARD.encode(&bytes),
            "options": options,
        });

        let response = client
            .post(&self.parse_url)
            .json(&body)
            .send()
            .map_err(|e| inference(e.to_string()))?;

        if !response.status().is_success() {
            return Err(inference(format!("backend answered HTTP {}", response.status())));
        }

        let parsed: WireParseResponse = response.json().map_err(|e| inference(e.to_string()))?;

        write_page_artifacts(page_dir, &parsed.pages)
    }
}

/// Write per-page Markdown artifacts and build the ordered page records.
///
/// Artifact names follow the `<doc>_page_<n>.md` / `<doc>_page_<n>_nohf.md`
/// convention the consolidator selects on; `<doc>` is the directory's base
/// name, i.e. the document identifier.
fn write_page_artifacts(
    page_dir: &Path,
    pages: &[WirePage],
) -> Result<Vec<PageRecord>, GatewayError> {
    let inference = |detail: String| GatewayError::Inference { detail };

    std::fs::create_dir_all(page_dir)
        .map_err(|e| inference(format!("create {}: {e}", page_dir.display())))?;

    let doc = page_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let mut records = Vec::with_capacity(pages.len());
    for page in pages {
        let mut md_content_path = None;

        if let Some(md) = &page.markdown {
            let path = page_dir.join(format!("{doc}_page_{}.md", page.page_no));
            std::fs::write(&path, md)
                .map_err(|e| inference(format!("write {}: {e}", path.display())))?;
            md_content_path = Some(path);
        }
        if let Some(md) = &page.markdown_nohf {
            let path = page_dir.join(format!("{doc}_page_{}_nohf.md", page.page_no));
            std::fs::write(&path, md)
                .map_err(|e| inference(format!("write {}: {e}", path.display())))?;
            md_content_path.get_or_insert(path);
        }

        debug!("Page {}: artifact {:?}", page.page_no, md_content_path);
        records.push(PageRecord {
            page_no: page.page_no,
            md_content_path,
        });
    }

    records.sort_by_key(|r| r.page_no);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifacts_follow_naming_convention() {
        let dir = tempfile::tempdir().unwrap();
        let page_dir = dir.path().join("abc123");
        let pages = vec![
            WirePage {
                page_no: 1,
                markdown: Some("# One".into()),
                markdown_nohf: None,
            },
            WirePage {
                page_no: 2,
                markdown: Some("# Two".into()),
                markdown_nohf: Some("Two body".into()),
            },
        ];

        let records = write_page_artifacts(&page_dir, &pages).unwrap();
        assert_eq!(records.len(), 2);
        assert!(page_dir.join("abc123_page_1.md").exists());
        assert!(page_dir.join("abc123_page_2.md").exists());
        assert!(page_dir.join("abc123_page_2_nohf.md").exists());
        assert_eq!(
            records[0].md_content_path.as_deref(),
            Some(page_dir.join("abc123_page_1.md").as_path())
        );
    }

    #[test]
    fn page_without_markdown_has_no_path() {
        let dir = tempfile::tempdir().unwrap();
        let page_dir = dir.path().join("doc");
        let pages = vec![WirePage {
            page_no: 1,
            markdown: None,
            markdown_nohf: None,
        }];

        let records = write_page_artifacts(&page_dir, &pages).unwrap();
        assert!(records[0].md_content_path.is_none());
    }

    #[test]
    fn records_come_back_page_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let pages = vec![
            WirePage {
                page_no: 3,
                markdown: Some("c".into()),
                markdown_nohf: None,
            },
            WirePage {
                page_no: 1,
                markdown: Some("a".into()),
                markdown_nohf: None,
            },
        ];
        let records = write_page_artifacts(&dir.path().join("d"), &pages).unwrap();
        assert_eq!(
            records.iter().map(|r| r.page_no).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }
}
