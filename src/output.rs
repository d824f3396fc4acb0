//! Result types produced by the pipeline and serialised to callers.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One per-page result returned by the recognition backend.
///
/// `md_content_path` points at the page's Markdown artifact when the backend
/// wrote one; pages the backend could not transcribe carry `None` and are
/// simply absent from the consolidated document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    /// Page position within the document (1-indexed as the backend counts).
    pub page_no: usize,

    /// Where the page's Markdown content was written, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md_content_path: Option<PathBuf>,
}

/// Pointer to the published artifacts for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPointer {
    /// The final consolidated Markdown file (`.../final/<id>/document.md`).
    pub path: PathBuf,

    /// Its containing directory, which also holds `assets/`.
    pub dir: PathBuf,
}

/// Everything a successful submission produces.
#[derive(Debug, Clone)]
pub struct SubmissionOutput {
    /// Identifier under which the final artifacts were published.
    pub document_id: String,

    /// Ordered per-page results from the backend.
    pub pages: Vec<PageRecord>,

    /// Location of the published document.
    pub document: DocumentPointer,
}

/// The JSON envelope answered by `POST /invocations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResponse {
    /// Envelope kind tag, always `"ocr.completion"`.
    pub object: String,

    /// Model identifier the submission was processed with.
    pub model: String,

    /// Unix timestamp (seconds) of response creation.
    pub created: u64,

    /// Ordered per-page results.
    pub result: Vec<PageRecord>,

    /// Published document location.
    pub document: DocumentPointer,
}

impl OcrResponse {
    /// Wrap a pipeline output in the wire envelope.
    pub fn from_output(output: &SubmissionOutput, model: &str) -> Self {
        let created = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            object: "ocr.completion".to_string(),
            model: model.to_string(),
            created,
            result: output.pages.clone(),
            document: output.document.clone(),
        }
    }
}
