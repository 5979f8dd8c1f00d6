use serde_json::{Value, json};
use simdecide_core::EngineError;

/// Error line for a failed request: `{"error": code, "message": ...}`.
pub fn engine_error_to_json(err: &EngineError) -> Value {
    let mut body = json_error(err.code(), err.to_string());
    if let EngineError::Validation(issues) = err {
        body["issues"] = json!(issues);
    }
    body
}

pub fn json_error(code: &'static str, message: impl Into<String>) -> Value {
    json!({
        "error": code,
        "message": message.into(),
    })
}
