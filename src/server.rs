//! HTTP surface: liveness probes and the document submission endpoint.
//!
//! Two submission modes are accepted on `POST /invocations`:
//!
//! 1. `application/json` — an envelope carrying the document as base64
//!    `file_data` plus optional per-request option overrides.
//! 2. any other content type — the raw document bytes as the body, with
//!    overrides supplied through `X-Ocr-*` headers.
//!
//! Both modes funnel into the same resolver and pipeline; the old pattern
//! of one handler per mode duplicated the option-merging logic and is gone.
//!
//! The handlers stay thin: decode the submission, resolve options, hand off
//! to [`process_submission`], wrap the result. Everything interesting lives
//! in the pipeline modules.

use crate::config::{GatewayConfig, OcrOptions, OptionOverrides};
use crate::error::GatewayError;
use crate::output::OcrResponse;
use crate::pipeline::finalize::PublishLocks;
use crate::pipeline::invoke::{probe_backend, HttpOcrBackend, OcrBackend};
use crate::process::process_submission;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub backend: Arc<dyn OcrBackend>,
    pub locks: Arc<PublishLocks>,
}

impl AppState {
    /// State wired to the HTTP backend named in `config`.
    pub fn new(config: GatewayConfig) -> Self {
        let backend = Arc::new(HttpOcrBackend::new(&config));
        Self::with_backend(config, backend)
    }

    /// State with a caller-supplied backend (tests substitute a double here).
    pub fn with_backend(config: GatewayConfig, backend: Arc<dyn OcrBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            locks: Arc::new(PublishLocks::new()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the router with all endpoints and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/invocations", post(invocations))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn start_server(addr: &str, state: AppState) -> Result<(), std::io::Error> {
    tracing::info!("Starting ocr-gateway on {addr}");
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

// ── Liveness ─────────────────────────────────────────────────────────────

async fn ping(State(state): State<AppState>) -> StatusCode {
    match probe_backend(&state.config).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn health(State(state): State<AppState>) -> Response {
    match probe_backend(&state.config).await {
        Ok(()) => Json(json!({ "status": "healthy", "backend": "ready" })).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "error": e.to_string() })),
        )
            .into_response(),
    }
}

// ── Submission ───────────────────────────────────────────────────────────

/// JSON submission envelope. Override fields stay raw [`Value`]s; the
/// resolver coerces them and drops what does not parse.
#[derive(Debug, Deserialize)]
struct SubmitEnvelope {
    file_data: Option<Value>,
    #[serde(default)]
    prompt: Option<Value>,
    #[serde(default)]
    dpi: Option<Value>,
    #[serde(default)]
    num_threads: Option<Value>,
    #[serde(default)]
    temperature: Option<Value>,
    #[serde(default)]
    top_p: Option<Value>,
    #[serde(default)]
    max_tokens: Option<Value>,
}

async fn invocations(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OcrResponse>, GatewayError> {
    let (raw, request_layer) = if is_json_submission(&headers) {
        decode_json_submission(&body)?
    } else {
        (body.to_vec(), header_overrides(&headers))
    };

    let env_layer = OptionOverrides::from_env();
    let options = OcrOptions::resolve(&[&env_layer, &request_layer]);

    let output = process_submission(
        &state.config,
        Arc::clone(&state.backend),
        &state.locks,
        &raw,
        &options,
    )
    .await?;

    Ok(Json(OcrResponse::from_output(&output, &options.model_name)))
}

/// Whether the request declared a JSON envelope body.
fn is_json_submission(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or("")
                .trim()
                .eq_ignore_ascii_case("application/json")
        })
        .unwrap_or(false)
}

/// Parse a JSON envelope into payload bytes plus its override layer.
fn decode_json_submission(body: &[u8]) -> Result<(Vec<u8>, OptionOverrides), GatewayError> {
    let envelope: SubmitEnvelope =
        serde_json::from_slice(body).map_err(|_| GatewayError::InvalidPayload {
            detail: "invalid JSON body".into(),
        })?;

    let file_data = match envelope.file_data {
        Some(Value::String(s)) => s,
        Some(_) => {
            return Err(GatewayError::InvalidPayload {
                detail: "'file_data' must be a base64 string".into(),
            })
        }
        None => {
            return Err(GatewayError::InvalidPayload {
                detail: "missing 'file_data' (base64 PDF or image)".into(),
            })
        }
    };

    let compact: String = file_data
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let raw = STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| GatewayError::InvalidPayload {
            detail: "'file_data' is not valid base64".into(),
        })?;

    let overrides = OptionOverrides {
        prompt: envelope.prompt,
        dpi: envelope.dpi,
        num_threads: envelope.num_threads,
        temperature: envelope.temperature,
        top_p: envelope.top_p,
        max_tokens: envelope.max_tokens,
    };

    Ok((raw, overrides))
}

/// Collect the `X-Ocr-*` override layer for raw-byte submissions.
fn header_overrides(headers: &HeaderMap) -> OptionOverrides {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| Value::String(s.to_string()))
    };
    OptionOverrides {
        prompt: get("x-ocr-prompt"),
        dpi: get("x-ocr-dpi"),
        num_threads: get("x-ocr-num-threads"),
        temperature: get("x-ocr-temperature"),
        top_p: get("x-ocr-top-p"),
        max_tokens: get("x-ocr-max-tokens"),
    }
}
