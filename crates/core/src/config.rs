//! Engine configuration surface.
//!
//! Every tunable is an explicit, named constant with a default. Values can be
//! supplied as a JSON document or through `SIMDECIDE_*` environment variables.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_RECORD_COUNT: usize = 5_000;
/// Relative tolerance for the realized positive-label rate.
pub const DEFAULT_RATE_TOLERANCE: f64 = 0.2;
/// Confidence strictly below this is "low".
pub const DEFAULT_LOW_CONFIDENCE_MAX: f64 = 0.5;
/// Confidence strictly above this is "high".
pub const DEFAULT_HIGH_CONFIDENCE_MIN: f64 = 0.8;
pub const DEFAULT_TOP_FACTORS: usize = 5;
/// Half-width of the decision-boundary band, as a fraction of the score range.
pub const DEFAULT_DECISION_EPSILON: f64 = 0.05;
/// Every n-th generated record is held out for evaluation.
pub const DEFAULT_HOLDOUT_EVERY: usize = 5;

pub const ENV_SEED: &str = "SIMDECIDE_SEED";
pub const ENV_RECORD_COUNT: &str = "SIMDECIDE_RECORD_COUNT";
pub const ENV_RARE_EVENT_RATE: &str = "SIMDECIDE_RARE_EVENT_RATE";
pub const ENV_CONFIDENCE_LOW_MAX: &str = "SIMDECIDE_CONFIDENCE_LOW_MAX";
pub const ENV_CONFIDENCE_HIGH_MIN: &str = "SIMDECIDE_CONFIDENCE_HIGH_MIN";
pub const ENV_TOP_FACTORS: &str = "SIMDECIDE_TOP_FACTORS";
pub const ENV_DECISION_EPSILON: &str = "SIMDECIDE_DECISION_EPSILON";
pub const ENV_TREES: &str = "SIMDECIDE_TREES";
pub const ENV_MAX_DEPTH: &str = "SIMDECIDE_MAX_DEPTH";

/// Confidence bucket.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Fixed thresholds bucketing a confidence score into a [`ConfidenceLevel`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub low_max: f64,
    pub high_min: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            low_max: DEFAULT_LOW_CONFIDENCE_MAX,
            high_min: DEFAULT_HIGH_CONFIDENCE_MIN,
        }
    }
}

impl ConfidenceThresholds {
    pub fn new(low_max: f64, high_min: f64) -> EngineResult<Self> {
        let t = Self { low_max, high_min };
        t.validate()?;
        Ok(t)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let in_unit = |x: f64| x.is_finite() && (0.0..=1.0).contains(&x);
        if !(in_unit(self.low_max) && in_unit(self.high_min) && self.low_max <= self.high_min) {
            return Err(EngineError::configuration(format!(
                "confidence thresholds need 0 <= low_max <= high_min <= 1 (got {} / {})",
                self.low_max, self.high_min
            )));
        }
        Ok(())
    }

    pub fn level(&self, confidence: f64) -> ConfidenceLevel {
        if confidence < self.low_max {
            ConfidenceLevel::Low
        } else if confidence > self.high_min {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::Medium
        }
    }
}

/// Tree-ensemble hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` uses all of them.
    pub max_features: Option<usize>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            trees: 40,
            max_depth: 8,
            min_samples_leaf: 5,
            max_features: None,
        }
    }
}

/// Process-wide engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Generator seed; every model trained from the same seed is identical.
    pub seed: u64,
    /// Training-set size per domain.
    pub record_count: usize,
    /// Overrides every binary domain's declared positive-label rate.
    pub rare_event_rate: Option<f64>,
    pub rate_tolerance: f64,
    pub confidence_thresholds: ConfidenceThresholds,
    pub top_factors: usize,
    pub decision_epsilon: f64,
    pub holdout_every: usize,
    pub forest: ForestConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            record_count: DEFAULT_RECORD_COUNT,
            rare_event_rate: None,
            rate_tolerance: DEFAULT_RATE_TOLERANCE,
            confidence_thresholds: ConfidenceThresholds::default(),
            top_factors: DEFAULT_TOP_FACTORS,
            decision_epsilon: DEFAULT_DECISION_EPSILON,
            holdout_every: DEFAULT_HOLDOUT_EVERY,
            forest: ForestConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.record_count < 50 {
            return Err(EngineError::configuration("record_count must be at least 50"));
        }
        if let Some(rate) = self.rare_event_rate {
            if !(rate.is_finite() && rate > 0.0 && rate < 1.0) {
                return Err(EngineError::configuration(format!(
                    "rare_event_rate must be in (0, 1), got {rate}"
                )));
            }
        }
        if !(self.rate_tolerance.is_finite() && self.rate_tolerance > 0.0 && self.rate_tolerance < 1.0) {
            return Err(EngineError::configuration("rate_tolerance must be in (0, 1)"));
        }
        self.confidence_thresholds.validate()?;
        if self.top_factors == 0 {
            return Err(EngineError::configuration("top_factors must be at least 1"));
        }
        if !(self.decision_epsilon.is_finite() && (0.0..0.5).contains(&self.decision_epsilon)) {
            return Err(EngineError::configuration("decision_epsilon must be in [0, 0.5)"));
        }
        if self.holdout_every < 2 {
            return Err(EngineError::configuration("holdout_every must be at least 2"));
        }
        if self.forest.trees == 0 || self.forest.max_depth == 0 || self.forest.min_samples_leaf == 0 {
            return Err(EngineError::configuration(
                "forest trees, max_depth and min_samples_leaf must be positive",
            ));
        }
        if self.forest.max_features == Some(0) {
            return Err(EngineError::configuration("forest max_features must be positive"));
        }
        Ok(())
    }

    /// Parse and validate a JSON document; missing keys take defaults.
    pub fn from_json_str(document: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(document)
            .map_err(|e| EngineError::configuration(format!("invalid config document: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SIMDECIDE_*` environment variables.
    pub fn from_env() -> EngineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `SIMDECIDE_*` key.
    pub fn from_lookup<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_key(&lookup, ENV_SEED)? {
            config.seed = v;
        }
        if let Some(v) = parse_key(&lookup, ENV_RECORD_COUNT)? {
            config.record_count = v;
        }
        if let Some(v) = parse_key(&lookup, ENV_RARE_EVENT_RATE)? {
            config.rare_event_rate = Some(v);
        }
        if let Some(v) = parse_key(&lookup, ENV_CONFIDENCE_LOW_MAX)? {
            config.confidence_thresholds.low_max = v;
        }
        if let Some(v) = parse_key(&lookup, ENV_CONFIDENCE_HIGH_MIN)? {
            config.confidence_thresholds.high_min = v;
        }
        if let Some(v) = parse_key(&lookup, ENV_TOP_FACTORS)? {
            config.top_factors = v;
        }
        if let Some(v) = parse_key(&lookup, ENV_DECISION_EPSILON)? {
            config.decision_epsilon = v;
        }
        if let Some(v) = parse_key(&lookup, ENV_TREES)? {
            config.forest.trees = v;
        }
        if let Some(v) = parse_key(&lookup, ENV_MAX_DEPTH)? {
            config.forest.max_depth = v;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_key<F, T>(lookup: &F, key: &str) -> EngineResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| EngineError::configuration(format!("{key}={raw:?}: {e}"))),
    }
}
