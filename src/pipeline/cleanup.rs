//! Cleanup guard: best-effort removal of request intermediates.
//!
//! Runs at the end of every submission, success or failure. The staged
//! input file is already covered by [`StagedInput`]'s drop; this sweep
//! handles everything the backend and the consolidator leave on shared
//! disk:
//!
//! * the request's per-page working directory,
//! * a leftover consolidation staging directory,
//! * stray intermediates anywhere under the output root: structured
//!   per-page `.jsonl` files and `tmp`-prefixed scratch directories.
//!
//! Every failure in here is swallowed with a `debug!` log. Cleanup must
//! never replace or mask the response the caller is owed.
//!
//! [`StagedInput`]: crate::pipeline::stage::StagedInput

use std::path::Path;
use tracing::debug;

/// Remove the intermediates of one finished submission.
pub fn sweep(output_root: &Path, document_id: &str) {
    remove_dir(&output_root.join(document_id));
    remove_dir(&output_root.join("consolidated").join(document_id));
    sweep_strays(output_root);
}

/// Recursively remove stray `.jsonl` files and `tmp*` directories.
fn sweep_strays(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            debug!("Cleanup: cannot list '{}': {e}", dir.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if path.is_dir() {
            if name.starts_with("tmp") {
                remove_dir(&path);
            } else {
                sweep_strays(&path);
            }
        } else if name.ends_with(".jsonl") {
            if let Err(e) = std::fs::remove_file(&path) {
                debug!("Cleanup: cannot remove '{}': {e}", path.display());
            } else {
                debug!("Cleanup: removed stray '{}'", path.display());
            }
        }
    }
}

fn remove_dir(path: &Path) {
    if !path.exists() {
        return;
    }
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!("Cleanup: removed '{}'", path.display()),
        Err(e) => debug!("Cleanup: cannot remove '{}': {e}", path.display()),
    }
}
