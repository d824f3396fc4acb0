//! Publication: move a staged consolidation to its stable, document-keyed
//! output location.
//!
//! ## Why populate-then-swap?
//!
//! Readers of `final/<id>/` must see either the complete previous version
//! or the complete new one. Copying straight into the destination would
//! expose a half-populated directory for the duration of the copy, and a
//! republish with fewer assets would leave stale files behind. Instead the
//! new content is fully populated into a hidden sibling directory, the old
//! destination is removed, and the sibling is renamed into place: the swap
//! is as close to atomic as the host filesystem allows.
//!
//! Concurrent republishes of the same id are serialized through
//! [`PublishLocks`]; distinct ids never contend.

use crate::error::GatewayError;
use crate::output::DocumentPointer;
use crate::pipeline::consolidate::Consolidated;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// Per-document-id publish locks.
///
/// The registry grows by one entry per distinct id and is never pruned;
/// entries are a handful of bytes and ids are bounded by the number of
/// documents the deployment has ever published.
#[derive(Default)]
pub struct PublishLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PublishLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding publishes for `document_id`.
    pub fn for_document(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("publish lock registry poisoned");
        Arc::clone(map.entry(document_id.to_string()).or_default())
    }
}

/// Publish staged consolidation artifacts under `final_root/<document_id>`.
///
/// Replaces any prior content for the id entirely, then removes the
/// consolidation staging directory. Callers must hold the id's publish
/// lock; see [`PublishLocks`].
pub fn publish(
    consolidated: &Consolidated,
    final_root: &Path,
    document_id: &str,
) -> Result<DocumentPointer, GatewayError> {
    let dest = final_root.join(document_id);
    let failed = |path: &Path, source: std::io::Error| GatewayError::PublishFailed {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(final_root).map_err(|e| failed(final_root, e))?;

    // Populate a hidden sibling so the rename below lands on the same
    // filesystem as the destination.
    let fresh = final_root.join(format!(".publish-{}", Uuid::new_v4().simple()));
    let populate = || -> std::io::Result<()> {
        let assets_dest = fresh.join("assets");
        std::fs::create_dir_all(&assets_dest)?;
        std::fs::copy(&consolidated.file, fresh.join("document.md"))?;
        for entry in std::fs::read_dir(&consolidated.assets_dir)?.flatten() {
            let path = entry.path();
            if path.is_file() {
                std::fs::copy(&path, assets_dest.join(entry.file_name()))?;
            }
        }
        Ok(())
    };

    if let Err(e) = populate() {
        let _ = std::fs::remove_dir_all(&fresh);
        return Err(failed(&fresh, e));
    }

    if dest.exists() {
        if let Err(e) = std::fs::remove_dir_all(&dest) {
            let _ = std::fs::remove_dir_all(&fresh);
            return Err(failed(&dest, e));
        }
    }
    if let Err(e) = std::fs::rename(&fresh, &dest) {
        let _ = std::fs::remove_dir_all(&fresh);
        return Err(failed(&dest, e));
    }

    // The staging directory has served its purpose; losing this removal is
    // harmless because the cleanup sweep also covers it.
    if let Some(staging_dir) = consolidated.file.parent() {
        if let Err(e) = std::fs::remove_dir_all(staging_dir) {
            debug!("Leaving staging '{}': {e}", staging_dir.display());
        }
    }

    info!(
        "Published document '{document_id}' ({} pages, {} assets) to '{}'",
        consolidated.pages,
        consolidated.images_extracted,
        dest.display()
    );

    Ok(DocumentPointer {
        path: dest.join("document.md"),
        dir: dest,
    })
}
