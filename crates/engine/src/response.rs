//! Request and response envelopes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use simdecide_core::{EngineResult, FeatureSchema, FeatureVector, ModelVersion};
use simdecide_scenarios::ScenarioLookup;
use uuid::Uuid;

use crate::explain::Explanation;
use crate::inference::Prediction;

/// Features as received: a raw JSON object, or a vector validated upstream.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FeatureInput {
    Json(JsonValue),
    Vector(FeatureVector),
}

impl FeatureInput {
    /// Validate against `schema`. Pre-built vectors are passed through; the
    /// inference step checks their layout.
    pub fn resolve(&self, schema: &Arc<FeatureSchema>) -> EngineResult<FeatureVector> {
        match self {
            Self::Json(json) => FeatureVector::from_json(Arc::clone(schema), json),
            Self::Vector(vector) => Ok(vector.clone()),
        }
    }
}

impl<'de> Deserialize<'de> for FeatureInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(Self::Json)
    }
}

impl From<JsonValue> for FeatureInput {
    fn from(value: JsonValue) -> Self {
        Self::Json(value)
    }
}

impl From<FeatureVector> for FeatureInput {
    fn from(value: FeatureVector) -> Self {
        Self::Vector(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub domain: String,
    pub features: FeatureInput,
    #[serde(default)]
    pub scenario_id: Option<String>,
}

impl DecisionRequest {
    pub fn new(domain: impl Into<String>, features: impl Into<FeatureInput>) -> Self {
        Self {
            domain: domain.into(),
            features: features.into(),
            scenario_id: None,
        }
    }

    pub fn scenario(mut self, id: impl Into<String>) -> Self {
        self.scenario_id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionResponse {
    pub request_id: Uuid,
    pub domain: String,
    pub prediction: Prediction,
    pub explanation: Explanation,
    pub scenario_applied: String,
    pub scenario_version: u32,
    pub fallback_used: bool,
    pub model_version: ModelVersion,
    pub generated_at: DateTime<Utc>,
}

/// Packs pipeline results into a [`DecisionResponse`]. Purely structural.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseAssembler;

impl ResponseAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(
        &self,
        domain: &str,
        lookup: &ScenarioLookup,
        prediction: Prediction,
        explanation: Explanation,
    ) -> DecisionResponse {
        DecisionResponse {
            request_id: Uuid::now_v7(),
            domain: domain.to_string(),
            model_version: prediction.model_version.clone(),
            scenario_applied: lookup.scenario.id().to_string(),
            scenario_version: lookup.scenario.version(),
            fallback_used: lookup.fallback_used,
            prediction,
            explanation,
            generated_at: Utc::now(),
        }
    }
}
