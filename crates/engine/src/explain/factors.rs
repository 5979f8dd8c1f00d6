//! Ranked contributing factors.

use serde::Serialize;
use simdecide_core::{FeatureValue, FeatureVector};
use simdecide_scenarios::ScenarioEffect;

use crate::inference::adjust;
use crate::model::TrainedModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increases,
    Decreases,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increases => "increases",
            Self::Decreases => "decreases",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContributingFactor {
    pub field: String,
    pub label: String,
    /// `importance × deviation`, signed by the factor's effect on the score.
    pub impact: f64,
    pub direction: Direction,
    pub importance: f64,
    pub deviation: f64,
    pub observed: FeatureValue,
    pub reference: FeatureValue,
    pub reason: String,
}

/// Re-scores the transformed input with single fields replaced.
pub(crate) struct Probe<'a> {
    model: &'a TrainedModel,
    base: Vec<f64>,
    reference_score: f64,
    effect: ScenarioEffect,
    bias: f64,
}

impl<'a> Probe<'a> {
    pub(crate) fn new(
        model: &'a TrainedModel,
        transformed: &FeatureVector,
        reference_score: f64,
        effect: ScenarioEffect,
        bias: f64,
    ) -> Self {
        Self {
            model,
            base: transformed.encode(),
            reference_score,
            effect,
            bias,
        }
    }

    pub(crate) fn encoded(&self, idx: usize) -> f64 {
        self.base[idx]
    }

    /// Model output with field `idx` set to `x`.
    pub(crate) fn raw_at(&self, idx: usize, x: f64) -> f64 {
        let mut row = self.base.clone();
        row[idx] = x;
        self.model.score_encoded(&row).mean
    }

    /// Final score (guard and bias included) with field `idx` set to `x`.
    pub(crate) fn final_at(&self, idx: usize, x: f64) -> f64 {
        adjust(self.model, self.reference_score, self.raw_at(idx, x), self.effect, self.bias).0
    }
}

/// Rank every field of `transformed` by its contribution, strongest first.
pub(crate) fn rank(
    model: &TrainedModel,
    transformed: &FeatureVector,
    probe: &Probe<'_>,
    subject: &str,
    top: usize,
) -> Vec<ContributingFactor> {
    let raw = model.score_encoded(&transformed.encode()).mean;

    let mut scored: Vec<(usize, ContributingFactor)> = Vec::new();
    for (idx, (spec, value)) in transformed.iter().enumerate() {
        let baseline = &model.baselines()[idx];
        let importance = model.importances()[idx];
        let encoded = probe.encoded(idx);
        let deviation = baseline.deviation(encoded);
        let magnitude = importance * deviation;
        if magnitude <= 0.0 {
            continue;
        }

        // Counterfactual: what does resetting this field to its baseline do?
        let delta = raw - probe.raw_at(idx, baseline.reference_encoded());
        let sign = if delta.abs() > 1e-9 {
            delta.signum()
        } else {
            baseline.correlation_sign()
        };
        let direction = if sign > 0.0 { Direction::Increases } else { Direction::Decreases };

        let observed = spec.render(value);
        let typical = spec.render(&baseline.reference);
        let reason = if baseline.is_numeric() {
            let z = baseline.z_score(encoded);
            format!(
                "{} of {observed} is {} the typical {typical} ({z:+.1} std), which {} the {subject}",
                spec.label,
                if z >= 0.0 { "above" } else { "below" },
                direction.as_str(),
            )
        } else {
            format!(
                "{} is {observed} rather than the usual {typical}, which {} the {subject}",
                spec.label,
                direction.as_str(),
            )
        };

        scored.push((
            idx,
            ContributingFactor {
                field: spec.name.clone(),
                label: spec.label.clone(),
                impact: sign * magnitude,
                direction,
                importance,
                deviation,
                observed: value.clone(),
                reference: baseline.reference.clone(),
                reason,
            },
        ));
    }

    scored.sort_by(|(ia, a), (ib, b)| b.impact.abs().total_cmp(&a.impact.abs()).then(ia.cmp(ib)));
    scored.into_iter().take(top).map(|(_, f)| f).collect()
}
