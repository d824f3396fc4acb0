//! # ocr-gateway
//!
//! Document-submission gateway for an external OCR/layout-recognition
//! backend.
//!
//! ## Why this crate?
//!
//! Recognition backends answer one page at a time: a 30-page scan comes
//! back as 30 loose Markdown files full of inline base64 images, dumped in
//! a working directory. This crate owns everything around that call:
//! staging the upload, resolving per-request options, merging the per-page
//! output into one readable document with extracted image assets, and
//! publishing the result atomically under a stable document key, with every
//! intermediate cleaned up no matter how the request ends.
//!
//! ## Pipeline Overview
//!
//! ```text
//! submission
//!  │
//!  ├─ 1. Options      layer defaults < environment < body < headers
//!  ├─ 2. Stage        persist bytes under a sniffed suffix, assign doc id
//!  ├─ 3. Invoke       blocking call to the recognition backend
//!  ├─ 4. Consolidate  merge per-page Markdown, extract inline images
//!  ├─ 5. Finalize     swap-publish final/<id>/{document.md, assets/}
//!  └─ 6. Cleanup      sweep intermediates, success or failure
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_gateway::{start_server, AppState, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::from_env();
//!     let state = AppState::new(config);
//!     start_server("0.0.0.0:8080", state).await?;
//!     Ok(())
//! }
//! ```
//!
//! The consolidation stage is also usable on its own (the `ocr-consolidate`
//! binary) to reprocess an existing directory of page artifacts without
//! touching the backend.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GatewayConfig, OcrOptions, OptionOverrides};
pub use error::GatewayError;
pub use output::{DocumentPointer, OcrResponse, PageRecord, SubmissionOutput};
pub use pipeline::consolidate::{consolidate, Consolidated};
pub use pipeline::invoke::{HttpOcrBackend, OcrBackend};
pub use process::process_submission;
pub use server::{build_router, start_server, AppState};
