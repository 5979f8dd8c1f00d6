//! Explanations attached to every prediction.
//!
//! Everything here is computed from the request itself and from aggregates
//! frozen into the [`TrainedModel`] at training time. Training records are
//! never consulted.

pub mod factors;
pub mod narrative;
pub mod sensitivity;

use serde::Serialize;
use simdecide_core::{
    ConfidenceLevel, ConfidenceThresholds, EngineConfig, EngineError, EngineResult, FeatureVector,
};
use simdecide_scenarios::{AppliedScenario, ScenarioLookup};

use crate::domain::{OutcomeSpec, Presentation};
use crate::inference::Prediction;
use crate::model::TrainedModel;

pub use factors::{ContributingFactor, Direction};
pub use narrative::{InformationCategory, ScenarioImpact, Walkthrough};
pub use sensitivity::{ProbePoint, SensitivityProbe, SensitivityTrigger};

use factors::Probe;
use narrative::{FlowContext, render_score};
use sensitivity::Sensitivity;

/// |z| beyond which a value sits in a sparsely populated region.
const SPARSE_Z: f64 = 3.0;

/// How many of the top factors get sensitivity triggers.
const TRIGGER_FACTORS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    InDistribution,
    SparseRegion,
    Extrapolated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceDescriptor {
    pub level: ConfidenceLevel,
    pub score: f64,
    pub data_quality: DataQuality,
    pub reason: String,
    pub limitations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionBandView {
    pub label: String,
    pub guidance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HumanReview {
    pub required: bool,
    pub reasons: Vec<String>,
}

/// The explanation contract: present on every successful response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub summary: String,
    pub decision: String,
    pub decision_band: DecisionBandView,
    pub confidence: ConfidenceDescriptor,
    pub factors: Vec<ContributingFactor>,
    pub sensitivity_triggers: Vec<SensitivityTrigger>,
    pub sensitivity_analysis: Vec<SensitivityProbe>,
    pub scenario_impact: ScenarioImpact,
    pub human_review: HumanReview,
    pub uncertainty_notes: Vec<String>,
    pub walkthrough: Walkthrough,
}

/// Everything one explanation is built from.
#[derive(Debug, Clone, Copy)]
pub struct ExplainInput<'a> {
    pub model: &'a TrainedModel,
    pub presentation: &'a Presentation,
    pub original: &'a FeatureVector,
    pub applied: &'a AppliedScenario,
    pub lookup: &'a ScenarioLookup,
    pub prediction: &'a Prediction,
}

#[derive(Debug, Clone)]
pub struct ExplanationEngine {
    thresholds: ConfidenceThresholds,
    top_factors: usize,
    decision_epsilon: f64,
}

impl ExplanationEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            thresholds: config.confidence_thresholds,
            top_factors: config.top_factors,
            decision_epsilon: config.decision_epsilon,
        }
    }

    /// Build the explanation for one prediction.
    ///
    /// Fails with `SchemaMismatch` if either vector does not share the
    /// model's layout.
    pub fn explain(&self, input: &ExplainInput<'_>) -> EngineResult<Explanation> {
        let model = input.model;
        let transformed = &input.applied.vector;
        for vector in [input.original, transformed] {
            if !model.schema().same_layout(vector.schema()) {
                return Err(EngineError::SchemaMismatch {
                    expected: model.schema().field_names(),
                    found: vector.schema().field_names(),
                });
            }
        }

        let presentation = input.presentation;
        let prediction = input.prediction;
        let subject = presentation.subject.as_str();
        let scenario = &input.lookup.scenario;
        let thresholds = presentation.confidence_thresholds.unwrap_or(self.thresholds);

        let probe = Probe::new(
            model,
            transformed,
            prediction.reference_score,
            scenario.effect(),
            scenario.bias(),
        );
        let factors = factors::rank(model, transformed, &probe, subject, self.top_factors);

        let sensitivity = Sensitivity {
            model,
            transformed,
            probe: &probe,
            score: prediction.score,
            subject,
        };
        let triggered = &factors[..factors.len().min(TRIGGER_FACTORS)];
        let mut sensitivity_triggers: Vec<SensitivityTrigger> =
            triggered.iter().filter_map(|f| sensitivity.trigger(f)).collect();
        let sensitivity_analysis: Vec<SensitivityProbe> =
            triggered.iter().filter_map(|f| sensitivity.analysis(f)).collect();

        let scenario_impact = ScenarioImpact::new(input.lookup, &input.applied.changes, prediction, model, subject);
        if !scenario.is_identity() || scenario.bias() != 0.0 {
            sensitivity_triggers.push(SensitivityTrigger {
                field: None,
                description: format!(
                    "Without scenario `{}` the {subject} would be {}; with it, {}",
                    scenario.name(),
                    render_score(model.outcome(), prediction.reference_score),
                    render_score(model.outcome(), prediction.score),
                ),
                flips_at: None,
            });
        }

        let quality = assess_inputs(model, transformed);
        let confidence = self.confidence(model, presentation, prediction, thresholds, &quality);
        let human_review = self.human_review(model, input, &confidence, &quality);

        let band = presentation.band(prediction.score);
        let decision_band = DecisionBandView {
            label: band.map(|b| b.label.clone()).unwrap_or_default(),
            guidance: band.map(|b| b.guidance.clone()).unwrap_or_default(),
        };

        let walkthrough = Walkthrough {
            objective: presentation.objective.clone(),
            information_considered: narrative::information_considered(model),
            decision_flow: narrative::decision_flow(&FlowContext {
                model,
                impact: &scenario_impact,
                prediction,
                band: &decision_band.label,
                review_required: human_review.required,
            }),
        };

        let uncertainty_notes = uncertainty_notes(model, input, &quality);
        let summary = narrative::summary(model, subject, &decision_band.label, prediction.score, &factors);

        tracing::debug!(
            domain = model.domain(),
            factors = factors.len(),
            review = human_review.required,
            "explanation built"
        );

        Ok(Explanation {
            summary,
            decision: model.outcome().decision(prediction.score).to_string(),
            decision_band,
            confidence,
            factors,
            sensitivity_triggers,
            sensitivity_analysis,
            scenario_impact,
            human_review,
            uncertainty_notes,
            walkthrough,
        })
    }

    fn confidence(
        &self,
        model: &TrainedModel,
        presentation: &Presentation,
        prediction: &Prediction,
        thresholds: ConfidenceThresholds,
        quality: &InputQuality,
    ) -> ConfidenceDescriptor {
        let level = thresholds.level(prediction.confidence);
        let agreement = match level {
            ConfidenceLevel::High => "the trees agree closely and the score is clear of the decision boundary",
            ConfidenceLevel::Medium => "the trees broadly agree but the score is not far from the decision boundary",
            ConfidenceLevel::Low => "the trees disagree or the score sits near the decision boundary",
        };
        let reason = format!(
            "Confidence {:.2} ({}): {agreement} (ensemble spread {:.3})",
            prediction.confidence,
            level.as_str(),
            prediction.ensemble_spread,
        );

        let mut limitations = presentation.limitations.clone();
        limitations.push("The model was trained only on synthetic records drawn from a declared population model".into());
        limitations.push(format!(
            "Feature importances are fixed at training time (model {})",
            model.version()
        ));
        if !quality.extrapolated.is_empty() {
            limitations.push(format!(
                "Outside the training range: {}; the model extrapolates there",
                quality.extrapolated.join(", ")
            ));
        }

        ConfidenceDescriptor {
            level,
            score: prediction.confidence,
            data_quality: quality.tag(),
            reason,
            limitations,
        }
    }

    fn human_review(
        &self,
        model: &TrainedModel,
        input: &ExplainInput<'_>,
        confidence: &ConfidenceDescriptor,
        quality: &InputQuality,
    ) -> HumanReview {
        let mut reasons = Vec::new();
        if confidence.level == ConfidenceLevel::Low {
            reasons.push(format!("Low confidence ({:.2})", confidence.score));
        }
        let scenario = &input.lookup.scenario;
        if scenario.is_high_impact() {
            reasons.push(format!("High-impact scenario `{}` applied", scenario.id()));
        }
        if let Some(t) = model.outcome().decision_threshold() {
            let (lo, hi) = model.score_range();
            let margin = self.decision_epsilon * (hi - lo);
            if (input.prediction.score - t).abs() <= margin {
                reasons.push(format!(
                    "Score {} is within {} of the decision threshold {}",
                    render_score(model.outcome(), input.prediction.score),
                    render_margin(model.outcome(), margin),
                    render_score(model.outcome(), t),
                ));
            }
        }
        if !quality.extrapolated.is_empty() {
            reasons.push(format!(
                "Inputs outside the training range: {}",
                quality.extrapolated.join(", ")
            ));
        }
        HumanReview {
            required: !reasons.is_empty(),
            reasons,
        }
    }
}

fn render_margin(outcome: &OutcomeSpec, margin: f64) -> String {
    match outcome {
        OutcomeSpec::Binary { .. } => format!("{:.1} points", margin * 100.0),
        OutcomeSpec::Continuous { unit, .. } => format!("{margin:.1} {unit}"),
    }
}

/// Labels of inputs outside the dense part of the training population.
struct InputQuality {
    sparse: Vec<String>,
    extrapolated: Vec<String>,
}

impl InputQuality {
    fn tag(&self) -> DataQuality {
        if !self.extrapolated.is_empty() {
            DataQuality::Extrapolated
        } else if !self.sparse.is_empty() {
            DataQuality::SparseRegion
        } else {
            DataQuality::InDistribution
        }
    }
}

fn assess_inputs(model: &TrainedModel, vector: &FeatureVector) -> InputQuality {
    let mut quality = InputQuality {
        sparse: Vec::new(),
        extrapolated: Vec::new(),
    };
    for ((spec, value), baseline) in vector.iter().zip(model.baselines()) {
        if !baseline.is_numeric() {
            continue;
        }
        let x = spec.encode(value);
        if baseline.is_extrapolated(x) {
            quality.extrapolated.push(spec.label.clone());
        } else if baseline.z_score(x).abs() > SPARSE_Z {
            quality.sparse.push(spec.label.clone());
        }
    }
    quality
}

fn uncertainty_notes(model: &TrainedModel, input: &ExplainInput<'_>, quality: &InputQuality) -> Vec<String> {
    let prediction = input.prediction;
    let metrics = model.metrics();
    let mut notes = vec![format!(
        "Individual trees spread ±{:.3} around the ensemble mean",
        prediction.ensemble_spread
    )];
    match model.outcome() {
        OutcomeSpec::Binary { .. } => {
            if let (Some(auc), Some(brier)) = (metrics.auc, metrics.brier) {
                notes.push(format!(
                    "Holdout AUC {auc:.2}, Brier score {brier:.3} on {} synthetic records",
                    metrics.records
                ));
            }
        }
        OutcomeSpec::Continuous { unit, .. } => {
            if let (Some(rmse), Some(r2)) = (metrics.rmse, metrics.r2) {
                notes.push(format!(
                    "Holdout RMSE {rmse:.1} {unit}, R² {r2:.2} on {} synthetic records",
                    metrics.records
                ));
            }
        }
    }
    if input.lookup.fallback_used {
        notes.push(format!(
            "Scenario `{}` was requested but is not published; no scenario adjustments were made",
            input.lookup.requested
        ));
    }
    if input.lookup.scenario.is_high_impact() {
        notes.push(format!(
            "Scenario `{}` describes stressed conditions that may lie outside the training population",
            input.lookup.scenario.id()
        ));
    }
    if !quality.sparse.is_empty() {
        notes.push(format!(
            "Few training records resemble the values of: {}",
            quality.sparse.join(", ")
        ));
    }
    if input.applied.changes.iter().any(|c| c.saturated) {
        notes.push("Some scenario adjustments were held at the edge of the valid range".into());
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainAdapter;
    use crate::inference::InferenceService;
    use crate::model::ModelTrainer;
    use crate::testing::{Lending, applicant, config};
    use simdecide_core::FeatureValue;
    use simdecide_scenarios::ScenarioCatalog;

    struct Fixture {
        adapter: Lending,
        model: TrainedModel,
        catalog: ScenarioCatalog,
        presentation: Presentation,
    }

    fn fixture() -> Fixture {
        let adapter = Lending::new();
        let model = ModelTrainer::new(config()).train(&adapter, 1).unwrap();
        let catalog = ScenarioCatalog::load(adapter.schema(), adapter.scenarios()).unwrap();
        let presentation = adapter.presentation();
        Fixture {
            adapter,
            model,
            catalog,
            presentation,
        }
    }

    fn explain(fx: &Fixture, original: &FeatureVector, scenario: Option<&str>) -> (Prediction, Explanation) {
        let service = InferenceService::new();
        let lookup = fx.catalog.lookup(scenario);
        let applied = fx.catalog.apply(&lookup.scenario, original).unwrap();
        let reference = service.predict(&fx.model, original).unwrap();
        let raw = service.predict(&fx.model, &applied.vector).unwrap();
        let prediction = service.finalize(&fx.model, &reference, &raw, &lookup.scenario);
        let explanation = ExplanationEngine::new(&config())
            .explain(&ExplainInput {
                model: &fx.model,
                presentation: &fx.presentation,
                original,
                applied: &applied,
                lookup: &lookup,
                prediction: &prediction,
            })
            .unwrap();
        (prediction, explanation)
    }

    #[test]
    fn factors_are_ranked_by_absolute_impact_and_capped() {
        let fx = fixture();
        let (_, e) = explain(&fx, &applicant(&fx.adapter, 18_000.0, 0.75), None);
        assert!(!e.factors.is_empty());
        assert!(e.factors.len() <= config().top_factors);
        assert!(e.factors.windows(2).all(|w| w[0].impact.abs() >= w[1].impact.abs()));
        for f in &e.factors {
            let sign_matches = match f.direction {
                Direction::Increases => f.impact > 0.0,
                Direction::Decreases => f.impact < 0.0,
            };
            assert!(sign_matches, "{f:?}");
            assert!((f.impact.abs() - f.importance * f.deviation).abs() < 1e-12);
        }
    }

    #[test]
    fn factors_only_reference_schema_fields_and_frozen_baselines() {
        let fx = fixture();
        let original = applicant(&fx.adapter, 30_000.0, 0.6);
        let (_, e) = explain(&fx, &original, Some("high_stress"));
        for f in &e.factors {
            let idx = fx.model.schema().index_of(&f.field).expect("schema field");
            assert_eq!(f.reference, fx.model.baselines()[idx].reference);
            let seen = e
                .scenario_impact
                .changes
                .iter()
                .find(|c| c.field == f.field)
                .map(|c| &c.after)
                .or(original.get(&f.field));
            assert_eq!(Some(&f.observed), seen);
        }
    }

    #[test]
    fn high_debt_ratio_increases_risk() {
        let fx = fixture();
        let (_, e) = explain(&fx, &applicant(&fx.adapter, 60_000.0, 0.85), None);
        let debt = e.factors.iter().find(|f| f.field == "debt_ratio").expect("debt_ratio ranked");
        assert_eq!(debt.direction, Direction::Increases);
        assert!(debt.reason.contains("Debt-to-income ratio"));
    }

    #[test]
    fn high_impact_scenarios_require_review_and_disclose_bias() {
        let fx = fixture();
        let (p, e) = explain(&fx, &applicant(&fx.adapter, 50_000.0, 0.3), Some("high_stress"));
        assert!(e.human_review.required);
        assert!(e.human_review.reasons.iter().any(|r| r.contains("high_stress")));
        assert_eq!(e.scenario_impact.bias, 0.1);
        assert_eq!(e.scenario_impact.final_score, p.score);
        assert!(p.score >= p.reference_score);
        assert!(e.sensitivity_triggers.iter().any(|t| t.field.is_none()));
        let change = &e.scenario_impact.changes[0];
        assert_eq!(change.field, "debt_ratio");
        assert!(matches!(change.after, FeatureValue::Number(x) if (x - 0.42).abs() < 1e-9));
    }

    #[test]
    fn fallback_is_reported_in_impact_notes_and_flow() {
        let fx = fixture();
        let (_, e) = explain(&fx, &applicant(&fx.adapter, 50_000.0, 0.3), Some("does_not_exist"));
        assert!(e.scenario_impact.fallback_used);
        assert_eq!(e.scenario_impact.requested, "does_not_exist");
        assert_eq!(e.scenario_impact.scenario_id, "baseline");
        assert!(e.uncertainty_notes.iter().any(|n| n.contains("does_not_exist")));
        assert!(e.walkthrough.decision_flow.iter().any(|s| s.contains("does_not_exist")));
    }

    #[test]
    fn baseline_requests_have_no_scenario_trigger() {
        let fx = fixture();
        let (_, e) = explain(&fx, &applicant(&fx.adapter, 50_000.0, 0.3), None);
        assert!(e.sensitivity_triggers.iter().all(|t| t.field.is_some()));
        assert!(e.scenario_impact.changes.is_empty());
        assert_eq!(e.scenario_impact.guard, None);
    }

    #[test]
    fn walkthrough_lists_schema_groups() {
        let fx = fixture();
        let (_, e) = explain(&fx, &applicant(&fx.adapter, 50_000.0, 0.3), None);
        let names: Vec<&str> = e.walkthrough.information_considered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["capacity", "leverage", "history"]);
        assert_eq!(e.walkthrough.objective, fx.presentation.objective);
        assert!(e.walkthrough.decision_flow.len() >= 4);
    }

    #[test]
    fn extrapolated_inputs_are_flagged() {
        let fx = fixture();
        let max = fx.model.baselines()[0].max;
        let income = (max * 1.5).min(500_000.0);
        let (_, e) = explain(&fx, &applicant(&fx.adapter, income, 0.3), None);
        if income > max {
            assert_eq!(e.confidence.data_quality, DataQuality::Extrapolated);
            assert!(e.human_review.required);
            assert!(e.human_review.reasons.iter().any(|r| r.contains("outside the training range")));
        }
    }

    #[test]
    fn sensitivity_probes_straddle_the_observed_value() {
        let fx = fixture();
        let (_, e) = explain(&fx, &applicant(&fx.adapter, 25_000.0, 0.55), None);
        for probe in &e.sensitivity_analysis {
            assert!(e.factors.iter().any(|f| f.field == probe.field));
            assert!((0.0..=1.0).contains(&probe.low.score));
            assert!((0.0..=1.0).contains(&probe.high.score));
        }
    }

    #[test]
    fn mismatched_layouts_are_refused() {
        let fx = fixture();
        let original = applicant(&fx.adapter, 50_000.0, 0.3);
        let lookup = fx.catalog.lookup(None);
        let applied = fx.catalog.apply(&lookup.scenario, &original).unwrap();
        let service = InferenceService::new();
        let out = service.predict(&fx.model, &original).unwrap();
        let prediction = service.finalize(&fx.model, &out, &out, &lookup.scenario);

        let other = std::sync::Arc::new(
            simdecide_core::FeatureSchema::builder("lending")
                .field(simdecide_core::FieldSpec::continuous("income", 5_000.0, 500_000.0))
                .build()
                .unwrap(),
        );
        let stranger = FeatureVector::from_pairs(other, [("income", 50_000.0.into())]).unwrap();
        let err = ExplanationEngine::new(&config())
            .explain(&ExplainInput {
                model: &fx.model,
                presentation: &fx.presentation,
                original: &stranger,
                applied: &applied,
                lookup: &lookup,
                prediction: &prediction,
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));
    }
}
