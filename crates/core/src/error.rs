//! Engine error model.

use thiserror::Error;

/// Result type used across the engine crates.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level error.
///
/// Variants map one-to-one onto the failure classes the engine distinguishes:
/// fatal configuration/startup problems versus recoverable per-request ones.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// Generated or stored data cannot satisfy the declared schema constraints.
    #[error("schema violation on `{field}`: {reason}")]
    SchemaViolation { field: String, reason: String },

    /// Caller-supplied features failed schema checks.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A scenario id is not published in the catalog.
    ///
    /// Only strict lookups surface this; the request path falls back to `baseline`.
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    /// Features presented to a model do not match the schema it was trained on.
    #[error("schema mismatch: model expects [{}], got [{}]", .expected.join(", "), .found.join(", "))]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Training produced a model known to be broken (degenerate data, no signal).
    #[error("training failed: {0}")]
    TrainingFailure(String),

    /// Static configuration is inconsistent (schema, blueprint, scenario rules, engine config).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No model/catalog is registered for the requested domain.
    #[error("unknown domain: {0}")]
    UnknownDomain(String),

    /// The request was cancelled or timed out between pipeline stages.
    #[error("request cancelled before stage `{stage}`")]
    Cancelled { stage: &'static str },
}

impl EngineError {
    pub fn schema_violation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(vec![msg.into()])
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::TrainingFailure(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Fatal errors abort startup or indicate a deployment bug; they must never
    /// be converted into a best-effort answer.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SchemaViolation { .. }
                | Self::SchemaMismatch { .. }
                | Self::TrainingFailure(_)
                | Self::Configuration(_)
        )
    }

    /// Stable machine-readable code for the outer layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SchemaViolation { .. } => "schema_violation",
            Self::Validation(_) => "validation_error",
            Self::UnknownScenario(_) => "unknown_scenario",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::TrainingFailure(_) => "training_failure",
            Self::Configuration(_) => "configuration_error",
            Self::UnknownDomain(_) => "unknown_domain",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}
