//! Scoring validated vectors and turning scores into predictions.

use std::collections::BTreeMap;

use serde::Serialize;
use simdecide_core::{EngineError, EngineResult, FeatureVector, ModelVersion};
use simdecide_scenarios::{Scenario, ScenarioEffect};

use crate::domain::OutcomeSpec;
use crate::model::TrainedModel;

/// Raw model output for one vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelOutput {
    pub score: f64,
    pub spread: f64,
    pub confidence: f64,
}

/// Which guard held the pre-bias score at the reference score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreGuard {
    /// A score-raising scenario would otherwise have lowered the score.
    Floored,
    /// A score-lowering scenario would otherwise have raised the score.
    Capped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Class {
        label: String,
        positive: bool,
        probabilities: BTreeMap<String, f64>,
    },
    Value {
        value: f64,
        unit: String,
        decision: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Final score after guard and bias.
    pub score: f64,
    /// Model output for the transformed vector.
    pub raw_score: f64,
    /// Model output for the untransformed vector.
    pub reference_score: f64,
    pub bias_applied: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<ScoreGuard>,
    pub outcome: Outcome,
    pub confidence: f64,
    pub ensemble_spread: f64,
    pub model_version: ModelVersion,
}

/// Stateless scoring over a [`TrainedModel`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InferenceService;

impl InferenceService {
    pub fn new() -> Self {
        Self
    }

    /// Score a vector. Fails with `SchemaMismatch` unless the vector's
    /// schema matches the model's field for field.
    pub fn predict(&self, model: &TrainedModel, vector: &FeatureVector) -> EngineResult<ModelOutput> {
        if !model.schema().same_layout(vector.schema()) {
            return Err(EngineError::SchemaMismatch {
                expected: model.schema().field_names(),
                found: vector.schema().field_names(),
            });
        }
        Ok(self.predict_encoded(model, &vector.encode()))
    }

    /// Score an already-encoded row. Callers guarantee the layout.
    pub fn predict_encoded(&self, model: &TrainedModel, encoded: &[f64]) -> ModelOutput {
        let ensemble = model.score_encoded(encoded);
        ModelOutput {
            score: ensemble.mean,
            spread: ensemble.spread,
            confidence: confidence(model, ensemble.mean, ensemble.spread),
        }
    }

    /// Combine the transformed and reference outputs with the scenario's
    /// declared direction and bias into the final prediction.
    pub fn finalize(
        &self,
        model: &TrainedModel,
        reference: &ModelOutput,
        transformed: &ModelOutput,
        scenario: &Scenario,
    ) -> Prediction {
        let (score, guard) = adjust(model, reference.score, transformed.score, scenario.effect(), scenario.bias());
        Prediction {
            score,
            raw_score: transformed.score,
            reference_score: reference.score,
            bias_applied: scenario.bias(),
            guard,
            outcome: outcome(model.outcome(), score),
            confidence: confidence(model, score, transformed.spread),
            ensemble_spread: transformed.spread,
            model_version: model.version().clone(),
        }
    }
}

/// Guard the raw score against the reference in the scenario's declared
/// direction, then add the bias and clamp to the model's range.
pub(crate) fn adjust(
    model: &TrainedModel,
    reference: f64,
    raw: f64,
    effect: ScenarioEffect,
    bias: f64,
) -> (f64, Option<ScoreGuard>) {
    let (guarded, guard) = match effect {
        ScenarioEffect::Raises if raw < reference => (reference, Some(ScoreGuard::Floored)),
        ScenarioEffect::Lowers if raw > reference => (reference, Some(ScoreGuard::Capped)),
        _ => (raw, None),
    };
    let (lo, hi) = model.score_range();
    ((guarded + bias).clamp(lo, hi), guard)
}

fn confidence(model: &TrainedModel, score: f64, spread: f64) -> f64 {
    let c = match model.outcome() {
        OutcomeSpec::Binary {
            decision_threshold, ..
        } => {
            let t = *decision_threshold;
            let margin = if score >= t {
                (score - t) / (1.0 - t).max(f64::EPSILON)
            } else {
                (t - score) / t.max(f64::EPSILON)
            };
            let agreement = 1.0 - spread / 0.5;
            0.5 * margin.clamp(0.0, 1.0) + 0.5 * agreement.clamp(0.0, 1.0)
        }
        OutcomeSpec::Continuous { .. } => {
            let rmse = model.metrics().rmse.unwrap_or(model.target().std_dev);
            let agreement = if rmse > 0.0 { 1.0 / (1.0 + spread / rmse) } else { 1.0 };
            let quality = model.metrics().r2.unwrap_or(0.0).clamp(0.0, 1.0);
            0.5 * agreement + 0.5 * quality
        }
    };
    c.clamp(0.0, 1.0)
}

fn outcome(spec: &OutcomeSpec, score: f64) -> Outcome {
    match spec {
        OutcomeSpec::Binary {
            positive_label,
            negative_label,
            decision_threshold,
        } => {
            let positive = score >= *decision_threshold;
            Outcome::Class {
                label: if positive { positive_label } else { negative_label }.clone(),
                positive,
                probabilities: BTreeMap::from([
                    (positive_label.clone(), score),
                    (negative_label.clone(), 1.0 - score),
                ]),
            }
        }
        OutcomeSpec::Continuous { unit, .. } => Outcome::Value {
            value: score,
            unit: unit.clone(),
            decision: spec.decision(score).to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainAdapter;
    use crate::model::ModelTrainer;
    use crate::testing::{Lending, applicant, config};
    use proptest::prelude::*;
    use simdecide_core::{FeatureSchema, FieldSpec};
    use simdecide_scenarios::ScenarioCatalog;
    use std::sync::Arc;

    fn trained() -> (Lending, TrainedModel, ScenarioCatalog) {
        let adapter = Lending::new();
        let model = ModelTrainer::new(config()).train(&adapter, 1).unwrap();
        let catalog = ScenarioCatalog::load(adapter.schema(), adapter.scenarios()).unwrap();
        (adapter, model, catalog)
    }

    fn output(score: f64) -> ModelOutput {
        ModelOutput {
            score,
            spread: 0.05,
            confidence: 0.7,
        }
    }

    #[test]
    fn mismatched_schemas_are_refused() {
        let (_, model, _) = trained();
        let other = Arc::new(
            FeatureSchema::builder("lending")
                .field(FieldSpec::continuous("debt_ratio", 0.0, 1.0))
                .field(FieldSpec::continuous("income", 5_000.0, 500_000.0))
                .build()
                .unwrap(),
        );
        let v = FeatureVector::from_pairs(other, [("debt_ratio", 0.3.into()), ("income", 50_000.0.into())]).unwrap();
        let err = InferenceService::new().predict(&model, &v).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));
    }

    #[test]
    fn riskier_applicants_score_higher_with_bounded_confidence() {
        let (adapter, model, _) = trained();
        let service = InferenceService::new();
        let safe = service.predict(&model, &applicant(&adapter, 120_000.0, 0.1)).unwrap();
        let risky = service.predict(&model, &applicant(&adapter, 15_000.0, 0.8)).unwrap();
        assert!(risky.score > safe.score);
        for out in [&safe, &risky] {
            assert!((0.0..=1.0).contains(&out.score));
            assert!((0.0..=1.0).contains(&out.confidence));
        }
        assert_ne!(safe.confidence, risky.confidence);
    }

    #[test]
    fn raising_scenarios_floor_at_the_reference_score() {
        let (_, model, catalog) = trained();
        let stress = catalog.get("high_stress").unwrap();
        let p = InferenceService::new().finalize(&model, &output(0.30), &output(0.25), &stress);
        assert_eq!(p.guard, Some(ScoreGuard::Floored));
        assert!((p.score - 0.40).abs() < 1e-12);
        assert_eq!(p.raw_score, 0.25);
        assert_eq!(p.reference_score, 0.30);
        assert!(matches!(p.outcome, Outcome::Class { positive: true, .. }));
    }

    #[test]
    fn lowering_scenarios_cap_at_the_reference_score() {
        let (_, model, catalog) = trained();
        let relief = catalog.get("relief").unwrap();
        let p = InferenceService::new().finalize(&model, &output(0.20), &output(0.26), &relief);
        assert_eq!(p.guard, Some(ScoreGuard::Capped));
        assert!((p.score - 0.18).abs() < 1e-12);
    }

    #[test]
    fn bias_is_clamped_to_the_probability_range() {
        let (_, model, catalog) = trained();
        let stress = catalog.get("high_stress").unwrap();
        let p = InferenceService::new().finalize(&model, &output(0.95), &output(0.97), &stress);
        assert_eq!(p.score, 1.0);
        assert_eq!(p.guard, None);
        assert_eq!(p.bias_applied, 0.1);
    }

    #[test]
    fn confidence_follows_the_final_score() {
        let (adapter, model, catalog) = trained();
        let service = InferenceService::new();
        let raw = service.predict(&model, &applicant(&adapter, 120_000.0, 0.1)).unwrap();
        let stress = catalog.get("high_stress").unwrap();
        let p = service.finalize(&model, &raw, &raw, &stress);
        assert!(p.score > raw.score);
        assert!(p.score < 0.35);
        assert!(p.confidence < raw.confidence, "{} vs {}", p.confidence, raw.confidence);
        assert_eq!(p.confidence, confidence(&model, p.score, raw.spread));
    }

    #[test]
    fn baseline_passes_scores_through() {
        let (_, model, catalog) = trained();
        let p = InferenceService::new().finalize(&model, &output(0.12), &output(0.12), &catalog.baseline());
        assert_eq!(p.score, 0.12);
        let Outcome::Class { label, probabilities, .. } = &p.outcome else {
            panic!("binary domain");
        };
        assert_eq!(label, "approve");
        assert!((probabilities["decline"] - 0.12).abs() < 1e-12);
    }

    fn shared_model() -> &'static TrainedModel {
        static MODEL: std::sync::OnceLock<TrainedModel> = std::sync::OnceLock::new();
        MODEL.get_or_init(|| ModelTrainer::new(config()).train(&Lending::new(), 1).unwrap())
    }

    proptest! {
        #[test]
        fn raising_scenarios_never_lower_the_score(
            reference in 0.0f64..=1.0,
            raw in 0.0f64..=1.0,
            bias in 0.0f64..=0.5,
        ) {
            let (score, _) = adjust(shared_model(), reference, raw, ScenarioEffect::Raises, bias);
            prop_assert!(score >= reference);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn lowering_scenarios_never_raise_the_score(
            reference in 0.0f64..=1.0,
            raw in 0.0f64..=1.0,
            bias in -0.5f64..=0.0,
        ) {
            let (score, _) = adjust(shared_model(), reference, raw, ScenarioEffect::Lowers, bias);
            prop_assert!(score <= reference);
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
