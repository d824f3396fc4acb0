//! Error types for the ocr-gateway library.
//!
//! The taxonomy mirrors the four response classes the service exposes:
//!
//! * client faults (bad payload) answered with 400,
//! * an unreachable recognition backend answered with 503,
//! * a failed backend invocation answered with 500,
//! * a failed consolidation/publication answered with 500.
//!
//! Per-artifact failures inside consolidation (one undecodable inline image,
//! one unreadable page file) are NOT represented here. They are recovered
//! locally with a `warn!` log so one bad page never costs the caller the
//! whole document; only top-level failures surface as [`GatewayError`].

use std::path::PathBuf;
use thiserror::Error;

/// All errors surfaced to callers of the gateway pipeline.
#[derive(Debug, Error)]
pub enum GatewayError {
    // ── Client faults ─────────────────────────────────────────────────────
    /// The submission carried no document bytes at all.
    #[error("Empty request body: submit a PDF or image payload")]
    EmptyPayload,

    /// The submission envelope was present but unusable.
    #[error("Invalid payload: {detail}")]
    InvalidPayload { detail: String },

    // ── Backend faults ────────────────────────────────────────────────────
    /// The recognition backend did not answer its liveness probe.
    #[error("Recognition backend unavailable at '{url}': {detail}")]
    BackendUnavailable { url: String, detail: String },

    /// The backend invocation itself failed.
    #[error("OCR failed: {detail}")]
    Inference { detail: String },

    // ── Consolidation faults ──────────────────────────────────────────────
    /// Top-level consolidation could not run (missing input directory,
    /// zero page artifacts, unwritable staging file).
    #[error("Consolidation failed: {detail}")]
    Postprocess { detail: String },

    /// Publishing the final artifacts failed.
    #[error("Failed to publish '{path}': {source}")]
    PublishFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The HTTP status the service answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::EmptyPayload | GatewayError::InvalidPayload { .. } => 400,
            GatewayError::BackendUnavailable { .. } => 503,
            GatewayError::Inference { .. }
            | GatewayError::Postprocess { .. }
            | GatewayError::PublishFailed { .. }
            | GatewayError::Internal(_) => 500,
        }
    }
}
