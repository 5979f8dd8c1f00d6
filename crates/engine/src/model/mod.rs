//! Trained models, training and the per-domain registry.

pub mod baseline;
pub mod forest;
pub mod registry;
pub mod trainer;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use simdecide_core::{FeatureSchema, ModelVersion};

use crate::domain::OutcomeSpec;

pub use baseline::FieldBaseline;
pub use forest::{Forest, ForestParams};
pub use registry::ModelRegistry;
pub use trainer::ModelTrainer;

/// Label statistics of the training population.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub positive_rate: Option<f64>,
}

/// Quality measured on the deterministic holdout split.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct HoldoutMetrics {
    pub records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r2: Option<f64>,
}

/// Ensemble output for one encoded input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleScore {
    pub mean: f64,
    /// Population standard deviation of the per-tree predictions.
    pub spread: f64,
}

/// A fitted model and everything explanations need from training.
///
/// Immutable; the registry hands out `Arc`s and replaces them wholesale.
#[derive(Debug, Clone, Serialize)]
pub struct TrainedModel {
    version: ModelVersion,
    #[serde(skip)]
    schema: Arc<FeatureSchema>,
    outcome: OutcomeSpec,
    #[serde(skip)]
    forest: Forest,
    baselines: Vec<FieldBaseline>,
    target: TargetStats,
    metrics: HoldoutMetrics,
    data_digest: String,
    training_records: usize,
    trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn version(&self) -> &ModelVersion {
        &self.version
    }

    pub fn domain(&self) -> &str {
        self.version.domain()
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn outcome(&self) -> &OutcomeSpec {
        &self.outcome
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    /// Normalized impurity importances in schema order.
    pub fn importances(&self) -> &[f64] {
        self.forest.importances()
    }

    pub fn baselines(&self) -> &[FieldBaseline] {
        &self.baselines
    }

    pub fn target(&self) -> &TargetStats {
        &self.target
    }

    pub fn metrics(&self) -> &HoldoutMetrics {
        &self.metrics
    }

    pub fn data_digest(&self) -> &str {
        &self.data_digest
    }

    pub fn training_records(&self) -> usize {
        self.training_records
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Valid range of a final score: `[0, 1]` for probabilities, the
    /// observed label range otherwise.
    pub fn score_range(&self) -> (f64, f64) {
        if self.outcome.is_binary() {
            (0.0, 1.0)
        } else {
            (self.target.min, self.target.max)
        }
    }

    pub fn score_encoded(&self, encoded: &[f64]) -> EnsembleScore {
        let each = self.forest.predict_each(encoded);
        let (mean, spread) = baseline::mean_std(&each);
        EnsembleScore { mean, spread }
    }
}
