//! Input staging: persist submitted bytes to ephemeral storage.
//!
//! ## Why a named temp file?
//!
//! The recognition backend takes a file-system path; it cannot stream from
//! a byte buffer. Writing the payload to a [`NamedTempFile`] gives the
//! backend a path to open while ensuring the staged input disappears when
//! [`StagedInput`] is dropped, even if the request handler panics. The
//! suffix is sniffed from the payload's magic bytes because callers rarely
//! label raw uploads accurately.

use crate::error::GatewayError;
use std::io::Write;
use std::path::Path;
use tempfile::{Builder, NamedTempFile};
use tracing::debug;
use uuid::Uuid;

/// Magic signatures checked in order; first match wins.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", ".pdf"),
    (b"\xFF\xD8", ".jpg"),
    (b"\x89PNG\r\n\x1a\n", ".png"),
    (b"II*\x00", ".tif"),
    (b"MM\x00*", ".tif"),
];

/// Guess a file suffix from the payload's leading bytes.
///
/// Undetected content defaults to `.pdf`, the dominant submission type.
pub fn sniff_suffix(bytes: &[u8]) -> &'static str {
    for (magic, suffix) in SIGNATURES {
        if bytes.starts_with(magic) {
            return suffix;
        }
    }
    ".pdf"
}

/// A staged submission: payload bytes on disk plus the document identifier
/// the rest of the pipeline is keyed on.
///
/// The temp file is owned by this handle and removed on drop.
pub struct StagedInput {
    file: NamedTempFile,
    document_id: String,
}

impl StagedInput {
    /// Persist `bytes` to a fresh temp file with a sniffed suffix and
    /// assign a new document identifier.
    ///
    /// The identifier is generated here, at ingestion, and used for every
    /// working path downstream. Deriving it from the temp filename would
    /// not be collision-free under concurrent load.
    pub fn write(bytes: &[u8]) -> Result<Self, GatewayError> {
        if bytes.is_empty() {
            return Err(GatewayError::EmptyPayload);
        }

        let suffix = sniff_suffix(bytes);
        let mut file = Builder::new()
            .prefix("ocrgate-")
            .suffix(suffix)
            .tempfile()
            .map_err(|e| GatewayError::Internal(format!("staging tempfile: {e}")))?;
        file.write_all(bytes)
            .map_err(|e| GatewayError::Internal(format!("staging write: {e}")))?;
        file.flush()
            .map_err(|e| GatewayError::Internal(format!("staging flush: {e}")))?;

        let document_id = Uuid::new_v4().simple().to_string();
        debug!(
            "Staged {} bytes as {} (doc {document_id})",
            bytes.len(),
            file.path().display()
        );

        Ok(Self { file, document_id })
    }

    /// Path of the staged payload.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// The document identifier assigned at ingestion.
    pub fn document_id(&self) -> &str {
        &self.document_id
    }
}
