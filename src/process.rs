//! Request orchestration: drive one submission through every pipeline stage.
//!
//! Stages run sequentially within a submission; concurrency across
//! submissions comes from the server's runtime. The state machine is
//!
//! ```text
//! STAGED → INVOKED → {PAGES_READY | INVOKE_FAILED}
//!        → CONSOLIDATED → FINALIZED → CLEANED
//! ```
//!
//! and CLEANED is the only terminal state: the cleanup sweep runs after the
//! fallible stages on success and failure alike, and the staged input file
//! removes itself on drop. A failure at any stage short-circuits straight
//! to cleanup with the triggering error preserved for the response.

use crate::config::{GatewayConfig, OcrOptions};
use crate::error::GatewayError;
use crate::output::SubmissionOutput;
use crate::pipeline::{cleanup, consolidate, finalize, invoke::OcrBackend, stage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Process one submitted document end to end.
///
/// Returns the ordered page results and the published document location.
/// Every intermediate path is scoped under the document id generated at
/// staging, so concurrent submissions never collide; only the publish step
/// serializes, and only per id.
pub async fn process_submission(
    config: &GatewayConfig,
    backend: Arc<dyn OcrBackend>,
    locks: &finalize::PublishLocks,
    bytes: &[u8],
    options: &OcrOptions,
) -> Result<SubmissionOutput, GatewayError> {
    let start = Instant::now();

    // ── Stage input ──────────────────────────────────────────────────────
    let staged = stage::StagedInput::write(bytes)?;
    let document_id = staged.document_id().to_string();
    info!(
        "Submission staged as document '{document_id}' ({} bytes)",
        bytes.len()
    );

    let result = run_stages(config, backend, locks, &staged, &document_id, options).await;

    // ── Cleanup, unconditionally ─────────────────────────────────────────
    cleanup::sweep(&config.output_root, &document_id);
    debug!(
        "Document '{document_id}' finished in {}ms ({})",
        start.elapsed().as_millis(),
        if result.is_ok() { "ok" } else { "failed" }
    );

    result
}

async fn run_stages(
    config: &GatewayConfig,
    backend: Arc<dyn OcrBackend>,
    locks: &finalize::PublishLocks,
    staged: &stage::StagedInput,
    document_id: &str,
    options: &OcrOptions,
) -> Result<SubmissionOutput, GatewayError> {
    let page_dir: PathBuf = config.output_root.join(document_id);

    // ── Invoke backend ───────────────────────────────────────────────────
    // The call is synchronous and unbounded; spawn_blocking keeps it off
    // the async workers for however long it runs.
    let pages = {
        let backend = Arc::clone(&backend);
        let source = staged.path().to_path_buf();
        let page_dir = page_dir.clone();
        let options = options.clone();
        tokio::task::spawn_blocking(move || backend.parse_document(&source, &page_dir, &options))
            .await
            .map_err(|e| GatewayError::Internal(format!("backend task panicked: {e}")))??
    };
    info!("Backend returned {} page results", pages.len());

    // ── Consolidate ──────────────────────────────────────────────────────
    let consolidated = {
        let staging_root = config.output_root.join("consolidated");
        let page_dir = page_dir.clone();
        tokio::task::spawn_blocking(move || {
            consolidate::consolidate(&page_dir, &staging_root, None)
        })
        .await
        .map_err(|e| GatewayError::Internal(format!("consolidation task panicked: {e}")))??
    };

    // ── Publish ──────────────────────────────────────────────────────────
    let lock = locks.for_document(document_id);
    let _guard = lock.lock().await;
    let final_root = config.output_root.join("final");
    let document = finalize::publish(&consolidated, &final_root, document_id)?;

    Ok(SubmissionOutput {
        document_id: document_id.to_string(),
        pages,
        document,
    })
}
