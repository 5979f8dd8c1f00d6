//! Seeded dataset generation.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use simdecide_core::{EngineError, EngineResult, FeatureSchema, FeatureValue, FeatureVector, FieldKind};

use crate::blueprint::{Blueprint, LabelModel, LabelTerm, Marginal};
use crate::sampling::{
    logistic, mean_std, normal_cdf, poisson_quantile, round_to, sigmoid, standard_normal, unit_open,
};

/// Upper bound on redraws for a single record before giving up.
pub const MAX_RECORD_ATTEMPTS: usize = 64;

/// Below this size the realized rare-event rate is not checked.
pub const MIN_RATE_CHECK_COUNT: usize = 1_000;

#[derive(Debug, Clone, Serialize)]
pub struct LabeledRecord {
    pub features: FeatureVector,
    pub label: f64,
    pub regime: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetKind {
    Binary { target_rate: f64 },
    Continuous { min: f64, max: f64 },
}

/// A generated, labeled dataset. Immutable once built.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    schema: Arc<FeatureSchema>,
    records: Vec<LabeledRecord>,
    target: TargetKind,
    label_name: String,
    seed: u64,
}

impl SyntheticDataset {
    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn records(&self) -> &[LabeledRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn target(&self) -> TargetKind {
        self.target
    }

    pub fn label_name(&self) -> &str {
        &self.label_name
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn labels(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.label).collect()
    }

    /// Encoded feature rows in schema order.
    pub fn encoded(&self) -> Vec<Vec<f64>> {
        self.records.iter().map(|r| r.features.encode()).collect()
    }

    pub fn positive_count(&self) -> usize {
        self.records.iter().filter(|r| r.label >= 0.5).count()
    }

    /// Share of positive labels; `None` for continuous targets.
    pub fn realized_positive_rate(&self) -> Option<f64> {
        match self.target {
            TargetKind::Binary { .. } if !self.records.is_empty() => {
                Some(self.positive_count() as f64 / self.records.len() as f64)
            }
            _ => None,
        }
    }

    /// SHA-256 over field names, encoded values and labels.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.schema.domain().as_bytes());
        for name in self.schema.field_names() {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
        }
        for record in &self.records {
            for x in record.features.encode() {
                hasher.update(x.to_le_bytes());
            }
            hasher.update(record.label.to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Generates datasets from blueprints. Stateless apart from its options.
#[derive(Debug, Clone)]
pub struct SyntheticDataGenerator {
    seed: u64,
    rate_override: Option<f64>,
    rate_tolerance: f64,
}

impl SyntheticDataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rate_override: None,
            rate_tolerance: 0.2,
        }
    }

    pub fn with_rare_event_rate(mut self, rate: Option<f64>) -> Self {
        self.rate_override = rate;
        self
    }

    pub fn with_rate_tolerance(mut self, tolerance: f64) -> Self {
        self.rate_tolerance = tolerance;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn generate(&self, blueprint: &Blueprint, count: usize) -> EngineResult<SyntheticDataset> {
        let overridden;
        let blueprint = match self.rate_override {
            Some(rate) => {
                overridden = blueprint.with_target_rate(rate)?;
                &overridden
            }
            None => blueprint,
        };

        let schema = Arc::clone(blueprint.schema());
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut rows: Vec<Vec<FeatureValue>> = Vec::with_capacity(count);
        let mut regimes: Vec<Option<usize>> = Vec::with_capacity(count);
        for index in 0..count {
            let (row, regime) = draw_record(blueprint, index, &mut rng)?;
            rows.push(row);
            regimes.push(regime);
        }

        let scores = label_scores(blueprint, &rows, &regimes);
        let (labels, target) = match blueprint.label() {
            LabelModel::Binary {
                target_rate, noise, ..
            } => {
                let latent: Vec<f64> = scores.iter().map(|s| s + noise * logistic(&mut rng)).collect();
                (stratify(&latent, *target_rate), TargetKind::Binary {
                    target_rate: *target_rate,
                })
            }
            LabelModel::Continuous {
                noise_std,
                min,
                max,
                decimals,
                ..
            } => {
                let labels = scores
                    .iter()
                    .map(|s| {
                        let y = (s + noise_std * standard_normal(&mut rng)).clamp(*min, *max);
                        decimals.map_or(y, |d| round_to(y, d))
                    })
                    .collect();
                (labels, TargetKind::Continuous { min: *min, max: *max })
            }
        };

        let mut records = Vec::with_capacity(count);
        for ((values, label), regime) in rows.into_iter().zip(labels).zip(regimes) {
            let features = FeatureVector::from_values(Arc::clone(&schema), values).map_err(|e| {
                EngineError::schema_violation(schema.domain(), format!("generated record rejected: {e}"))
            })?;
            records.push(LabeledRecord {
                features,
                label,
                regime: regime.map(|r| blueprint.regimes()[r].name.clone()),
            });
        }

        let dataset = SyntheticDataset {
            schema,
            records,
            target,
            label_name: blueprint.label_name().to_string(),
            seed: self.seed,
        };
        self.check_rate(&dataset)?;

        tracing::debug!(
            domain = dataset.schema.domain(),
            records = dataset.len(),
            seed = self.seed,
            positive_rate = dataset.realized_positive_rate(),
            "synthetic dataset generated"
        );
        Ok(dataset)
    }

    fn check_rate(&self, dataset: &SyntheticDataset) -> EngineResult<()> {
        let TargetKind::Binary { target_rate } = dataset.target else {
            return Ok(());
        };
        if dataset.len() < MIN_RATE_CHECK_COUNT {
            return Ok(());
        }
        let realized = dataset.realized_positive_rate().unwrap_or(0.0);
        let lo = target_rate * (1.0 - self.rate_tolerance);
        let hi = target_rate * (1.0 + self.rate_tolerance);
        if realized < lo || realized > hi {
            return Err(EngineError::schema_violation(
                dataset.label_name.clone(),
                format!("realized rate {realized:.4} outside [{lo:.4}, {hi:.4}]"),
            ));
        }
        Ok(())
    }
}

/// Convenience wrapper around [`SyntheticDataGenerator`].
pub fn generate(blueprint: &Blueprint, count: usize, seed: u64) -> EngineResult<SyntheticDataset> {
    SyntheticDataGenerator::new(seed).generate(blueprint, count)
}

fn pick_regime(blueprint: &Blueprint, rng: &mut StdRng) -> Option<usize> {
    let regimes = blueprint.regimes();
    if regimes.is_empty() {
        return None;
    }
    let total: f64 = regimes.iter().map(|r| r.weight).sum();
    let mut u = unit_open(rng) * total;
    for (i, r) in regimes.iter().enumerate() {
        if u < r.weight {
            return Some(i);
        }
        u -= r.weight;
    }
    Some(regimes.len() - 1)
}

fn draw_record(
    blueprint: &Blueprint,
    index: usize,
    rng: &mut StdRng,
) -> EngineResult<(Vec<FeatureValue>, Option<usize>)> {
    let schema = blueprint.schema();
    let mut last_offender = String::new();

    for _ in 0..MAX_RECORD_ATTEMPTS {
        let regime = pick_regime(blueprint, rng);

        // Gaussian copula: mix independent normals along the declared correlations.
        let mut latent = vec![0.0; schema.len()];
        for (i, recipe) in blueprint.recipes().iter().enumerate() {
            if !recipe.marginal.is_latent() {
                continue;
            }
            let own = standard_normal(rng);
            let sources = &blueprint.mixing()[i];
            let explained: f64 = sources.iter().map(|(_, r)| r * r).sum();
            let mixed: f64 = sources.iter().map(|(s, r)| r * latent[*s]).sum();
            latent[i] = mixed + (1.0 - explained).sqrt() * own;
        }

        let mut row = Vec::with_capacity(schema.len());
        let mut accepted = true;
        for (i, (recipe, field)) in blueprint.recipes().iter().zip(schema.fields()).enumerate() {
            let mut x = inverse_transform(&recipe.marginal, latent[i], index);

            if let Some(r) = regime {
                for (name, shift) in &blueprint.regimes()[r].shifts {
                    if *name == field.name {
                        x = shift.apply(x);
                    }
                }
            }
            if let Some(season) = &recipe.seasonality {
                x *= season.factor(index);
            }
            if let Some(d) = recipe.decimals {
                x = round_to(x, d);
            }

            let value = match &field.kind {
                FieldKind::Continuous { min, max } => {
                    let x = if recipe.clip { x.clamp(*min, *max) } else { x };
                    (x >= *min && x <= *max).then_some(FeatureValue::Number(x))
                }
                FieldKind::Ordinal { min, max } => {
                    let (lo, hi) = (*min as f64, *max as f64);
                    let x = x.round();
                    let x = if recipe.clip { x.clamp(lo, hi) } else { x };
                    (x >= lo && x <= hi).then_some(FeatureValue::Integer(x as i64))
                }
                FieldKind::Categorical { categories } => Some(FeatureValue::Category(
                    categories[(x as usize).min(categories.len() - 1)].clone(),
                )),
                FieldKind::Boolean => Some(FeatureValue::Boolean(x >= 0.5)),
            };
            match value {
                Some(v) => row.push(v),
                None => {
                    last_offender = field.name.clone();
                    accepted = false;
                    break;
                }
            }
        }

        if accepted {
            return Ok((row, regime));
        }
    }

    Err(EngineError::schema_violation(
        last_offender,
        format!("no in-range draw after {MAX_RECORD_ATTEMPTS} attempts"),
    ))
}

fn inverse_transform(marginal: &Marginal, z: f64, index: usize) -> f64 {
    match marginal {
        Marginal::Normal { mean, std_dev } => mean + std_dev * z,
        Marginal::LogNormal { mu, sigma } => (mu + sigma * z).exp(),
        Marginal::LogitNormal { mu, sigma } => sigmoid(mu + sigma * z),
        Marginal::Uniform { low, high } => low + (high - low) * normal_cdf(z),
        Marginal::Poisson { lambda } => poisson_quantile(*lambda, normal_cdf(z)),
        Marginal::Categorical { weights } => {
            let total: f64 = weights.iter().sum();
            let u = normal_cdf(z) * total;
            let mut acc = 0.0;
            for (i, w) in weights.iter().enumerate() {
                acc += w;
                if u < acc {
                    return i as f64;
                }
            }
            (weights.len() - 1) as f64
        }
        // High latent values map to `true`, so positive correlations read naturally.
        Marginal::Bernoulli { p } => f64::from(u8::from(normal_cdf(z) > 1.0 - p)),
        Marginal::Cycle { period, offset } => (*offset + (index % *period as usize) as i64) as f64,
    }
}

/// Deterministic part of each record's label score.
fn label_scores(blueprint: &Blueprint, rows: &[Vec<FeatureValue>], regimes: &[Option<usize>]) -> Vec<f64> {
    let schema = blueprint.schema();
    let (intercept, terms) = match blueprint.label() {
        LabelModel::Binary { intercept, terms, .. } | LabelModel::Continuous { intercept, terms, .. } => {
            (*intercept, terms)
        }
    };

    // Linear terms are standardized against the generated population.
    let moments: Vec<Option<(f64, f64)>> = terms
        .iter()
        .map(|term| match term {
            LabelTerm::Linear { field, .. } => schema.index_of(field).map(|idx| {
                let spec = &schema.fields()[idx];
                let xs: Vec<f64> = rows.iter().map(|r| spec.encode(&r[idx])).collect();
                mean_std(&xs)
            }),
            _ => None,
        })
        .collect();

    rows.iter()
        .zip(regimes)
        .map(|(row, regime)| {
            let mut score = intercept;
            for (term, moment) in terms.iter().zip(&moments) {
                let Some(idx) = schema.index_of(term.field()) else {
                    continue;
                };
                let spec = &schema.fields()[idx];
                score += match term {
                    LabelTerm::Linear { weight, .. } => match moment {
                        Some((mean, std)) if *std > 0.0 => weight * (spec.encode(&row[idx]) - mean) / std,
                        _ => 0.0,
                    },
                    LabelTerm::Indicator { value, weight, .. } => {
                        if spec.validate(value).ok().as_ref() == Some(&row[idx]) {
                            *weight
                        } else {
                            0.0
                        }
                    }
                    LabelTerm::Threshold { above, weight, .. } => {
                        if spec.encode(&row[idx]) > *above {
                            *weight
                        } else {
                            0.0
                        }
                    }
                };
            }
            if let Some(r) = regime {
                score += blueprint.regimes()[*r].label_shift;
            }
            score
        })
        .collect()
}

/// Marks the `round(n * rate)` highest latent scores as positive.
fn stratify(latent: &[f64], rate: f64) -> Vec<f64> {
    let n = latent.len();
    let positives = ((n as f64) * rate).round() as usize;
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| latent[*b].total_cmp(&latent[*a]).then(a.cmp(b)));
    let mut labels = vec![0.0; n];
    for &i in order.iter().take(positives.min(n)) {
        labels[i] = 1.0;
    }
    labels
}
