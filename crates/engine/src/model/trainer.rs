//! Model training from synthetic data.

use std::sync::Arc;

use chrono::Utc;
use simdecide_core::{EngineConfig, EngineError, EngineResult, FeatureSchema, ModelVersion};
use simdecide_synthetic::{SyntheticDataGenerator, SyntheticDataset};

use crate::domain::{DomainAdapter, OutcomeSpec};
use crate::model::baseline::{self, mean_std};
use crate::model::{Forest, ForestParams, HoldoutMetrics, TargetStats, TrainedModel};

/// Length of the dataset-digest prefix carried in model versions.
const DIGEST_PREFIX: usize = 8;

/// Trains one model per call. Holds configuration only.
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: EngineConfig,
}

impl ModelTrainer {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Generate the domain's dataset and fit a model on it.
    pub fn train(&self, adapter: &dyn DomainAdapter, revision: u64) -> EngineResult<TrainedModel> {
        let schema = adapter.schema();
        let blueprint = adapter.blueprint()?;
        if !blueprint.schema().same_layout(&schema) {
            return Err(EngineError::schema_violation(
                adapter.key(),
                "blueprint is declared over a different schema",
            ));
        }
        let outcome = adapter.outcome();
        if outcome.is_binary() != blueprint.label().is_binary() {
            return Err(EngineError::configuration(format!(
                "domain `{}`: outcome and label model disagree on binary vs continuous",
                adapter.key()
            )));
        }

        let rate_override = if outcome.is_binary() {
            self.config.rare_event_rate
        } else {
            None
        };
        let dataset = SyntheticDataGenerator::new(self.config.seed)
            .with_rare_event_rate(rate_override)
            .with_rate_tolerance(self.config.rate_tolerance)
            .generate(&blueprint, self.config.record_count)?;

        self.fit(adapter.key(), schema, outcome, &dataset, revision)
    }

    /// Fit a model on an existing dataset.
    pub fn fit(
        &self,
        domain: &str,
        schema: Arc<FeatureSchema>,
        outcome: OutcomeSpec,
        dataset: &SyntheticDataset,
        revision: u64,
    ) -> EngineResult<TrainedModel> {
        let rows = dataset.encoded();
        let labels = dataset.labels();
        if rows.is_empty() {
            return Err(EngineError::training(format!("`{domain}`: empty training set")));
        }
        if labels.iter().any(|y| !y.is_finite()) {
            return Err(EngineError::training(format!("`{domain}`: non-finite labels")));
        }
        check_label_spread(domain, &outcome, &labels)?;

        let k = self.config.holdout_every;
        let (mut train_x, mut train_y, mut hold_x, mut hold_y) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
        for (i, (row, y)) in rows.iter().zip(&labels).enumerate() {
            if i % k == k - 1 {
                hold_x.push(row.clone());
                hold_y.push(*y);
            } else {
                train_x.push(row.clone());
                train_y.push(*y);
            }
        }
        check_label_spread(domain, &outcome, &train_y)?;

        let forest_config = &self.config.forest;
        let params = ForestParams {
            trees: forest_config.trees,
            max_depth: forest_config.max_depth,
            min_samples_leaf: forest_config.min_samples_leaf,
            max_features: forest_config.max_features,
            seed: self.config.seed,
        };
        let forest = Forest::fit(&train_x, &train_y, &params)?;
        if forest.split_count() == 0 {
            return Err(EngineError::training(format!("`{domain}`: ensemble learned no split")));
        }

        let predictions: Vec<f64> = hold_x.iter().map(|x| forest.predict(x)).collect();
        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(EngineError::training(format!("`{domain}`: non-finite predictions")));
        }
        let metrics = holdout_metrics(&outcome, &predictions, &hold_y);
        if let Some(auc) = metrics.auc.filter(|auc| *auc < 0.5) {
            return Err(EngineError::training(format!(
                "`{domain}`: holdout AUC {auc:.3} is worse than chance"
            )));
        }
        if let Some(r2) = metrics.r2.filter(|r2| *r2 < 0.0) {
            return Err(EngineError::training(format!(
                "`{domain}`: holdout R² {r2:.3} is worse than predicting the mean"
            )));
        }

        let baselines = baseline::compute(&schema, &train_x, &train_y);
        let (mean, std_dev) = mean_std(&labels);
        let target = TargetStats {
            mean,
            std_dev,
            min: labels.iter().copied().fold(f64::INFINITY, f64::min),
            max: labels.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            positive_rate: dataset.realized_positive_rate(),
        };

        let digest = dataset.digest();
        let version = ModelVersion::new(domain, revision, &digest[..DIGEST_PREFIX.min(digest.len())]);
        tracing::info!(
            domain,
            version = %version,
            records = dataset.len(),
            holdout = metrics.records,
            auc = metrics.auc,
            r2 = metrics.r2,
            splits = forest.split_count(),
            "model trained"
        );

        Ok(TrainedModel {
            version,
            schema,
            outcome,
            forest,
            baselines,
            target,
            metrics,
            data_digest: digest,
            training_records: train_x.len(),
            trained_at: Utc::now(),
        })
    }
}

fn check_label_spread(domain: &str, outcome: &OutcomeSpec, labels: &[f64]) -> EngineResult<()> {
    if outcome.is_binary() {
        let positives = labels.iter().filter(|y| **y >= 0.5).count();
        if positives == 0 || positives == labels.len() {
            return Err(EngineError::training(format!("`{domain}`: labels are all one class")));
        }
    } else if mean_std(labels).1 == 0.0 {
        return Err(EngineError::training(format!("`{domain}`: target has zero variance")));
    }
    Ok(())
}

fn holdout_metrics(outcome: &OutcomeSpec, predictions: &[f64], labels: &[f64]) -> HoldoutMetrics {
    let n = labels.len();
    let mut metrics = HoldoutMetrics {
        records: n,
        ..HoldoutMetrics::default()
    };
    if n == 0 {
        return metrics;
    }

    match outcome {
        OutcomeSpec::Binary {
            decision_threshold, ..
        } => {
            metrics.auc = auc(predictions, labels);
            metrics.brier = Some(predictions.iter().zip(labels).map(|(p, y)| (p - y).powi(2)).sum::<f64>() / n as f64);
            let correct = predictions
                .iter()
                .zip(labels)
                .filter(|(p, y)| (**p >= *decision_threshold) == (**y >= 0.5))
                .count();
            metrics.accuracy = Some(correct as f64 / n as f64);
        }
        OutcomeSpec::Continuous { .. } => {
            let sse: f64 = predictions.iter().zip(labels).map(|(p, y)| (p - y).powi(2)).sum();
            metrics.rmse = Some((sse / n as f64).sqrt());
            let (mean, _) = mean_std(labels);
            let sst: f64 = labels.iter().map(|y| (y - mean).powi(2)).sum();
            metrics.r2 = (sst > 0.0).then(|| 1.0 - sse / sst);
        }
    }
    metrics
}

/// Rank-based AUC with averaged ties; `None` without both classes.
fn auc(scores: &[f64], labels: &[f64]) -> Option<f64> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    let positives = labels.iter().filter(|y| **y >= 0.5).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }
    let rank_sum: f64 = ranks.iter().zip(labels).filter(|(_, y)| **y >= 0.5).map(|(r, _)| r).sum();
    let (p, q) = (positives as f64, negatives as f64);
    Some((rank_sum - p * (p + 1.0) / 2.0) / (p * q))
}
