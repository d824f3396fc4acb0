//! Service binary for ocr-gateway.
//!
//! A thin shim over the library crate: maps CLI flags onto
//! [`GatewayConfig`] and serves until killed.

use anyhow::{Context, Result};
use clap::Parser;
use ocr_gateway::{start_server, AppState, GatewayConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve with defaults (backend on 127.0.0.1:8081, output under ./output)
  ocr-gateway

  # Point at a remote backend and a shared output root
  ocr-gateway --backend-url http://10.0.0.5:8081 --output-root /srv/ocr

  # Bind somewhere specific
  ocr-gateway --host 127.0.0.1 --port 9090

SUBMITTING DOCUMENTS:
  # JSON envelope with overrides
  curl -X POST localhost:8080/invocations \
    -H 'Content-Type: application/json' \
    -d "{\"file_data\": \"$(base64 -w0 scan.pdf)\", \"dpi\": 200}"

  # Raw bytes with header overrides
  curl -X POST localhost:8080/invocations \
    -H 'Content-Type: application/pdf' \
    -H 'X-Ocr-Prompt: prompt_ocr' \
    --data-binary @scan.pdf

ENVIRONMENT VARIABLES:
  OCRGATE_BACKEND_URL     Recognition backend base URL
  OCRGATE_OUTPUT_ROOT     Output root directory
  HEALTH_CHECK_TIMEOUT    Liveness probe timeout in seconds (default 30)
  OCRGATE_PROMPT          Default prompt identifier override
  OCRGATE_DPI             Default DPI override
  OCRGATE_NUM_THREADS     Default backend thread-count override
  OCRGATE_TEMPERATURE     Default sampling temperature override
  OCRGATE_TOP_P           Default nucleus sampling override
  OCRGATE_MAX_TOKENS      Default max completion tokens override

  Per-request overrides (JSON body fields or X-Ocr-* headers) take
  precedence over the environment defaults above.
"#;

/// Document-submission gateway for an OCR/layout-recognition backend.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-gateway",
    version,
    about = "Serve the document-submission endpoint for an OCR backend",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Recognition backend base URL (health + parse endpoints).
    #[arg(long)]
    backend_url: Option<String>,

    /// Bind address.
    #[arg(long)]
    host: Option<String>,

    /// Bind port.
    #[arg(long)]
    port: Option<u16>,

    /// Output root directory.
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // default < environment < flag
    let mut config = GatewayConfig::from_env();
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }
    if let Some(host) = cli.host {
        config.bind_host = host;
    }
    if let Some(port) = cli.port {
        config.bind_port = port;
    }
    if let Some(root) = cli.output_root {
        config.output_root = root;
    }

    std::fs::create_dir_all(&config.output_root).with_context(|| {
        format!(
            "Failed to create output root '{}'",
            config.output_root.display()
        )
    })?;

    let addr = format!("{}:{}", config.bind_host, config.bind_port);
    let state = AppState::new(config);
    start_server(&addr, state)
        .await
        .with_context(|| format!("Server failed on {addr}"))?;

    Ok(())
}
