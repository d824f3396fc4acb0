//! Standalone consolidation entry point.
//!
//! Runs the Page Consolidator alone against an existing directory of
//! per-page Markdown artifacts, without the backend or the HTTP service.
//! Useful for reprocessing a document whose page output already exists.

use anyhow::{Context, Result};
use clap::Parser;
use ocr_gateway::consolidate;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Merge per-page Markdown artifacts into one consolidated document.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-consolidate",
    version,
    about = "Consolidate a directory of per-page Markdown artifacts",
    arg_required_else_help = true
)]
struct Cli {
    /// Directory containing the per-page `*_page_N.md` artifacts.
    input_dir: PathBuf,

    /// Output filename (default: `<dir-name>_consolidated.md`).
    output_filename: Option<String>,

    /// Staging tree to write into.
    #[arg(long, default_value = "output_consolidated")]
    staging_root: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = consolidate(
        &cli.input_dir,
        &cli.staging_root,
        cli.output_filename.as_deref(),
    )
    .with_context(|| format!("Consolidation of '{}' failed", cli.input_dir.display()))?;

    println!(
        "Consolidated {} pages, {} images",
        result.pages, result.images_extracted
    );
    println!("Document: {}", result.file.display());
    println!("Assets:   {}", result.assets_dir.display());

    Ok(())
}
