//! Configuration for the gateway process and for individual submissions.
//!
//! Two records with very different lifetimes live here:
//!
//! * [`GatewayConfig`] is built exactly once at process start (defaults,
//!   then environment, then CLI flags) and passed by reference into every
//!   handler. Nothing in the library reads process-global state after
//!   startup.
//! * [`OcrOptions`] is resolved per submission by layering overrides on the
//!   built-in defaults: default < environment < request body < request
//!   header. A later layer only wins a field when its value is present AND
//!   coerces to the field's type; a malformed override is dropped with a
//!   `warn!` and the previous layer's value survives. The request is never
//!   rejected over a bad override.
//!
//! The coercion helpers are pure functions over [`serde_json::Value`] so the
//! precedence rules are unit-testable without any HTTP plumbing.

use serde_json::Value;
use std::path::PathBuf;
use tracing::warn;

/// Process-level configuration, constructed once in the binary.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the recognition backend (health probe + parse endpoint).
    pub backend_url: String,

    /// Bind address for the HTTP service.
    pub bind_host: String,

    /// Bind port for the HTTP service.
    pub bind_port: u16,

    /// Root directory holding per-document working directories, the
    /// consolidation staging area, and the persistent `final/` tree.
    pub output_root: PathBuf,

    /// Timeout for the backend liveness probe, in seconds.
    ///
    /// The probe is bounded; the parse call is not. A hung backend fails
    /// `/ping` quickly while an in-flight submission keeps waiting.
    pub health_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8081".to_string(),
            bind_host: "0.0.0.0".to_string(),
            bind_port: 8080,
            output_root: PathBuf::from("output"),
            health_timeout_secs: 30,
        }
    }
}

impl GatewayConfig {
    /// Defaults with the environment layer applied on top.
    ///
    /// CLI flags are applied by the binary after this, completing the
    /// default < environment < flag precedence chain.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("OCRGATE_BACKEND_URL") {
            if !url.is_empty() {
                cfg.backend_url = url;
            }
        }
        if let Ok(root) = std::env::var("OCRGATE_OUTPUT_ROOT") {
            if !root.is_empty() {
                cfg.output_root = PathBuf::from(root);
            }
        }
        if let Ok(secs) = std::env::var("HEALTH_CHECK_TIMEOUT") {
            match secs.parse::<u64>() {
                Ok(v) => cfg.health_timeout_secs = v,
                Err(_) => warn!("Ignoring malformed HEALTH_CHECK_TIMEOUT {secs:?}"),
            }
        }
        cfg
    }

    /// URL of the backend liveness endpoint.
    pub fn backend_health_url(&self) -> String {
        format!("{}/health", self.backend_url.trim_end_matches('/'))
    }

    /// URL of the backend parse endpoint.
    pub fn backend_parse_url(&self) -> String {
        format!("{}/parse", self.backend_url.trim_end_matches('/'))
    }
}

/// Per-submission options forwarded to the recognition backend.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OcrOptions {
    /// Model identifier the backend serves.
    pub model_name: String,

    /// Prompt identifier selecting the backend's extraction mode.
    pub prompt: String,

    /// Rasterisation DPI used by the backend for PDF inputs.
    pub dpi: u32,

    /// Backend worker threads for multi-page documents.
    pub num_threads: usize,

    /// Sampling temperature. Low values keep the transcription faithful.
    pub temperature: f32,

    /// Nucleus sampling bound.
    pub top_p: f32,

    /// Maximum tokens the backend may generate per page.
    pub max_completion_tokens: usize,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            model_name: "model".to_string(),
            prompt: "prompt_layout_all_en".to_string(),
            dpi: 120,
            num_threads: 1,
            temperature: 0.1,
            top_p: 0.9,
            max_completion_tokens: 4096,
        }
    }
}

impl OcrOptions {
    /// Resolve options by applying override layers in precedence order
    /// (earliest = weakest).
    pub fn resolve(layers: &[&OptionOverrides]) -> Self {
        let mut opts = Self::default();
        for layer in layers {
            layer.apply_to(&mut opts);
        }
        opts
    }
}

/// One layer of raw, not-yet-validated option overrides.
///
/// Fields hold raw JSON values (the body layer) or strings wrapped as JSON
/// strings (the environment and header layers) so a single coercion path
/// serves all three sources.
#[derive(Debug, Clone, Default)]
pub struct OptionOverrides {
    pub prompt: Option<Value>,
    pub dpi: Option<Value>,
    pub num_threads: Option<Value>,
    pub temperature: Option<Value>,
    pub top_p: Option<Value>,
    pub max_tokens: Option<Value>,
}

impl OptionOverrides {
    /// Collect the environment layer from `OCRGATE_*` variables.
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .map(Value::String)
        };
        Self {
            prompt: var("OCRGATE_PROMPT"),
            dpi: var("OCRGATE_DPI"),
            num_threads: var("OCRGATE_NUM_THREADS"),
            temperature: var("OCRGATE_TEMPERATURE"),
            top_p: var("OCRGATE_TOP_P"),
            max_tokens: var("OCRGATE_MAX_TOKENS"),
        }
    }

    /// Apply this layer onto `opts`, field by field.
    ///
    /// A present-but-malformed value keeps the previous value. This matches
    /// the service's observed behavior: overrides are best-effort, never a
    /// reason to reject the submission.
    pub fn apply_to(&self, opts: &mut OcrOptions) {
        apply(&mut opts.prompt, &self.prompt, "prompt", coerce_string);
        apply(&mut opts.dpi, &self.dpi, "dpi", coerce_u32);
        apply(
            &mut opts.num_threads,
            &self.num_threads,
            "num_threads",
            coerce_usize,
        );
        apply(
            &mut opts.temperature,
            &self.temperature,
            "temperature",
            coerce_f32,
        );
        apply(&mut opts.top_p, &self.top_p, "top_p", coerce_f32);
        apply(
            &mut opts.max_completion_tokens,
            &self.max_tokens,
            "max_tokens",
            coerce_usize,
        );
    }
}

fn apply<T>(slot: &mut T, raw: &Option<Value>, field: &str, coerce: fn(&Value) -> Option<T>) {
    if let Some(value) = raw {
        match coerce(value) {
            Some(v) => *slot = v,
            None => warn!("Ignoring malformed override for '{field}': {value}"),
        }
    }
}

// ── Coercion helpers ─────────────────────────────────────────────────────
//
// JSON clients send numbers as numbers; header and environment layers send
// everything as strings. Both spellings are accepted for numeric fields.

fn coerce_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn coerce_u32(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_usize(v: &Value) -> Option<usize> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_f32(v: &Value) -> Option<f32> {
    match v {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
