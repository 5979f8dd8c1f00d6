//! Application wiring.
//!
//! - `dto.rs`: wire shapes of the JSON-lines protocol
//! - `errors.rs`: consistent error lines

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use serde_json::{Value, json};
use simdecide_core::{EngineConfig, EngineResult};
use simdecide_engine::{CancelToken, DecisionEngine, DecisionRequest};

pub mod dto;
pub mod errors;

use dto::{Control, Incoming, ServeStats};
use errors::{engine_error_to_json, json_error};

/// Path of a JSON config document; when unset, `SIMDECIDE_*` variables apply.
pub const CONFIG_PATH_ENV: &str = "SIMDECIDE_CONFIG";
/// Per-request deadline in milliseconds.
pub const REQUEST_TIMEOUT_ENV: &str = "SIMDECIDE_REQUEST_TIMEOUT_MS";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeOptions {
    pub request_timeout: Option<Duration>,
}

impl ServeOptions {
    pub fn from_env() -> anyhow::Result<Self> {
        let request_timeout = match std::env::var(REQUEST_TIMEOUT_ENV) {
            Ok(raw) => {
                let ms: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{REQUEST_TIMEOUT_ENV} must be a whole number of milliseconds"))?;
                Some(Duration::from_millis(ms))
            }
            Err(_) => None,
        };
        Ok(Self { request_timeout })
    }
}

/// Load the engine configuration from `SIMDECIDE_CONFIG` or the environment.
pub fn load_config() -> anyhow::Result<EngineConfig> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => {
            let document =
                std::fs::read_to_string(&path).with_context(|| format!("failed to read config file {path}"))?;
            EngineConfig::from_json_str(&document).with_context(|| format!("invalid config file {path}"))
        }
        Err(_) => EngineConfig::from_env().context("invalid SIMDECIDE_* environment"),
    }
}

/// Train every shipped domain. Returns once all of them can serve.
pub fn build_engine(config: EngineConfig) -> anyhow::Result<DecisionEngine> {
    let adapters = simdecide_domains::all().context("failed to declare domains")?;
    DecisionEngine::start(adapters, config).context("engine startup failed")
}

/// Read requests line by line from `input` and write one JSON line per
/// request to `output`. Per-request failures become error lines; only I/O
/// errors end the loop early.
pub fn serve<R: BufRead, W: Write>(
    engine: &DecisionEngine,
    input: R,
    mut output: W,
    options: ServeOptions,
) -> anyhow::Result<ServeStats> {
    let mut stats = ServeStats::default();

    for line in input.lines() {
        let line = line.context("failed to read request line")?;
        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;

        let reply = match Incoming::parse(&line) {
            Ok(Incoming::Decide(request)) => match decide(engine, &request, options) {
                Ok(body) => {
                    stats.decisions += 1;
                    body
                }
                Err(body) => {
                    stats.errors += 1;
                    body
                }
            },
            Ok(Incoming::Control(control)) => match control_reply(engine, control) {
                Ok(body) => body,
                Err(err) => {
                    stats.errors += 1;
                    engine_error_to_json(&err)
                }
            },
            Err(e) => {
                stats.errors += 1;
                tracing::warn!(error = %e, "unparseable request line");
                json_error("invalid_request", e.to_string())
            }
        };

        serde_json::to_writer(&mut output, &reply).context("failed to encode reply")?;
        output.write_all(b"\n").context("failed to write reply")?;
        output.flush().context("failed to flush reply")?;
    }

    tracing::info!(lines = stats.lines, decisions = stats.decisions, errors = stats.errors, "input exhausted");
    Ok(stats)
}

fn decide(engine: &DecisionEngine, request: &DecisionRequest, options: ServeOptions) -> Result<Value, Value> {
    let cancel = options.request_timeout.map_or_else(CancelToken::new, CancelToken::with_timeout);
    let response = engine.evaluate_with(request, &cancel).map_err(|err| {
        if err.is_fatal() {
            tracing::error!(domain = %request.domain, error = %err, "request hit a fatal error");
        } else {
            tracing::warn!(domain = %request.domain, code = err.code(), error = %err, "request failed");
        }
        engine_error_to_json(&err)
    })?;
    serde_json::to_value(&response).map_err(|e| json_error("encode_error", e.to_string()))
}

fn control_reply(engine: &DecisionEngine, control: Control) -> EngineResult<Value> {
    Ok(match control {
        Control::Health => json!({ "status": "ok" }),
        Control::Domains => json!({ "domains": engine.domains().collect::<Vec<_>>() }),
        Control::Scenarios { domain } => {
            let scenarios = engine.scenarios(&domain)?;
            json!({ "domain": domain, "scenarios": scenarios })
        }
        Control::Model { domain } => {
            let model = engine.active_model(&domain)?;
            json!({
                "domain": domain,
                "model_version": model.version(),
                "training_records": model.training_records(),
                "trained_at": model.trained_at(),
                "holdout": model.metrics(),
            })
        }
        Control::HotSwap { domain, seed } => {
            let version = match seed {
                Some(seed) => engine.reseed(&domain, seed)?,
                None => engine.hot_swap(&domain)?,
            };
            tracing::info!(domain = %domain, version = %version, "model hot-swapped");
            json!({ "domain": domain, "model_version": version })
        }
    })
}
