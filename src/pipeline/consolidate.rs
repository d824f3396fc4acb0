//! Consolidation: merge per-page Markdown artifacts into one document.
//!
//! The backend leaves one Markdown file per page in a document's working
//! directory, some of them in a second "no header/footer" variant. This
//! module selects exactly one artifact per page, rewrites inline base64
//! images into numbered asset files, and concatenates the pages in order
//! with a visible rule between them.
//!
//! Filename parsing and image rewriting are pure functions over text; the
//! only I/O is reading artifacts and writing the staged result, so every
//! selection and numbering rule is unit-testable without a backend.
//!
//! ## Failure policy
//!
//! A single bad artifact (unreadable file, undecodable image) is logged and
//! skipped; the rest of the document still consolidates. Only an
//! inaccessible input directory, an empty one, or an unwritable output
//! escalate to [`GatewayError::Postprocess`].

use crate::error::GatewayError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Page number embedded in an artifact filename, `_nohf` variant included.
static RE_PAGE_NUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_page_(\d+)(?:_nohf)?\.md$").unwrap());

/// Inline Markdown image with a base64 payload and declared format.
static RE_INLINE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)!\[([^\]]*)\]\(data:image/([^;]+);base64,([^)]+)\)").unwrap());

/// Extract the page number from an artifact filename.
///
/// Filenames without an embedded page number sort as page 0.
pub fn page_number(filename: &str) -> usize {
    RE_PAGE_NUM
        .captures(filename)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

/// Whether the artifact is the "no header/footer" variant of its page.
pub fn is_nohf_variant(filename: &str) -> bool {
    filename.ends_with("_nohf.md")
}

/// Enumerate the Markdown artifacts in `input_dir` and select exactly one
/// per page number, preferring the non-variant member of each page group.
///
/// Returns `(page_number, path)` pairs in ascending page order.
pub fn select_artifacts(input_dir: &Path) -> Result<Vec<(usize, PathBuf)>, GatewayError> {
    let entries = std::fs::read_dir(input_dir).map_err(|e| GatewayError::Postprocess {
        detail: format!("input directory '{}': {e}", input_dir.display()),
    })?;

    let mut groups: BTreeMap<usize, Vec<PathBuf>> = BTreeMap::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if !name.ends_with(".md") || !path.is_file() {
            continue;
        }
        groups.entry(page_number(name)).or_default().push(path);
    }

    if groups.is_empty() {
        return Err(GatewayError::Postprocess {
            detail: format!(
                "no markdown artifacts found in '{}'",
                input_dir.display()
            ),
        });
    }

    let mut selected = Vec::with_capacity(groups.len());
    for (page, mut members) in groups {
        // Directory enumeration order is platform-dependent; sort for a
        // deterministic pick when a group has several candidates.
        members.sort();
        let pick = members
            .iter()
            .find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !is_nohf_variant(n))
            })
            .unwrap_or(&members[0])
            .clone();
        selected.push((page, pick));
    }

    Ok(selected)
}

/// Rewrite inline base64 images in `content`, numbering extracted assets
/// from `next_index`.
///
/// `save` receives `(index, format, bytes)` and returns the relative path
/// to substitute into the reference, or `None` when persisting failed. The
/// counter advances only when an image both decodes and saves; a failed
/// match keeps its original inline reference untouched.
///
/// Returns the rewritten content and the next unused index, so the counter
/// threads across all pages of a document without ever resetting.
pub fn rewrite_inline_images<F>(content: &str, next_index: usize, save: &mut F) -> (String, usize)
where
    F: FnMut(usize, &str, &[u8]) -> Option<String>,
{
    let mut index = next_index;
    let rewritten = RE_INLINE_IMAGE.replace_all(content, |caps: &Captures<'_>| {
        let alt = &caps[1];
        let format = &caps[2];
        let payload: String = caps[3].chars().filter(|c| !c.is_ascii_whitespace()).collect();

        let bytes = match STANDARD.decode(payload.as_bytes()) {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to decode inline image {index}: {e}");
                return caps[0].to_string();
            }
        };

        match save(index, format, &bytes) {
            Some(rel_path) => {
                debug!("Extracted image{index}.{format} ({} bytes)", bytes.len());
                let replacement = format!("![{alt}]({rel_path})");
                index += 1;
                replacement
            }
            None => caps[0].to_string(),
        }
    });

    (rewritten.into_owned(), index)
}

/// Result of a consolidation run, pointing at the staged (not yet
/// published) artifacts.
#[derive(Debug, Clone)]
pub struct Consolidated {
    /// Base name of the input directory; the document key downstream.
    pub document_name: String,

    /// The staged consolidated Markdown file.
    pub file: PathBuf,

    /// The staged assets directory next to it.
    pub assets_dir: PathBuf,

    /// Pages that contributed content.
    pub pages: usize,

    /// Successfully extracted images across the whole document.
    pub images_extracted: usize,
}

/// Merge the page artifacts of `input_dir` into one document under
/// `staging_root/<name>/`.
///
/// The output filename defaults to `<name>_consolidated.md` where `<name>`
/// is the input directory's base name. Consecutive pages are separated by a
/// horizontal rule (never before the first or after the last) and each page
/// opens with a page-number marker comment. Running this twice over an
/// unmodified input directory produces byte-identical output.
pub fn consolidate(
    input_dir: &Path,
    staging_root: &Path,
    output_filename: Option<&str>,
) -> Result<Consolidated, GatewayError> {
    let artifacts = select_artifacts(input_dir)?;

    let document_name = input_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let staging_dir = staging_root.join(&document_name);
    let assets_dir = staging_dir.join("assets");
    std::fs::create_dir_all(&assets_dir).map_err(|e| GatewayError::Postprocess {
        detail: format!("create staging '{}': {e}", assets_dir.display()),
    })?;

    info!(
        "Consolidating {} page artifacts from '{}'",
        artifacts.len(),
        input_dir.display()
    );

    let mut parts: Vec<String> = Vec::with_capacity(artifacts.len());
    let mut next_index = 1usize;

    for (page, path) in &artifacts {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Skipping unreadable artifact '{}': {e}", path.display());
                continue;
            }
        };

        let mut save = |index: usize, format: &str, bytes: &[u8]| {
            let filename = format!("image{index}.{format}");
            match std::fs::write(assets_dir.join(&filename), bytes) {
                Ok(()) => Some(format!("assets/{filename}")),
                Err(e) => {
                    warn!("Failed to save {filename}: {e}");
                    None
                }
            }
        };

        let (rewritten, advanced) = rewrite_inline_images(&content, next_index, &mut save);
        next_index = advanced;

        parts.push(format!("<!-- Page {page} -->\n{rewritten}"));
    }

    let output_name = output_filename
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("{document_name}_consolidated.md"));
    let file = staging_dir.join(&output_name);

    std::fs::write(&file, parts.join("\n\n---\n\n")).map_err(|e| GatewayError::Postprocess {
        detail: format!("write consolidated '{}': {e}", file.display()),
    })?;

    info!(
        "Consolidated {} pages, {} images into '{}'",
        parts.len(),
        next_index - 1,
        file.display()
    );

    Ok(Consolidated {
        document_name,
        file,
        assets_dir,
        pages: parts.len(),
        images_extracted: next_index - 1,
    })
}
