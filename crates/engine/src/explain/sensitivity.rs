//! What would change the outcome.

use serde::Serialize;
use simdecide_core::{FeatureVector, FieldKind};

use crate::domain::OutcomeSpec;
use crate::explain::factors::{ContributingFactor, Probe};
use crate::explain::narrative::render_score;
use crate::model::TrainedModel;

/// Grid resolution of the decision-flip search.
const FLIP_GRID: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityTrigger {
    /// `None` for scenario-level triggers.
    pub field: Option<String>,
    pub description: String,
    /// Rendered value at which the decision flips, when one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flips_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbePoint {
    pub value: String,
    pub score: f64,
}

/// Scores one standard deviation either side of the observed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityProbe {
    pub field: String,
    pub label: String,
    pub observed: String,
    pub low: ProbePoint,
    pub high: ProbePoint,
}

pub(crate) struct Sensitivity<'a> {
    pub model: &'a TrainedModel,
    pub transformed: &'a FeatureVector,
    pub probe: &'a Probe<'a>,
    pub score: f64,
    pub subject: &'a str,
}

impl Sensitivity<'_> {
    fn index_of(&self, factor: &ContributingFactor) -> Option<usize> {
        self.model.schema().index_of(&factor.field)
    }

    pub(crate) fn trigger(&self, factor: &ContributingFactor) -> Option<SensitivityTrigger> {
        let idx = self.index_of(factor)?;
        let spec = &self.model.schema().fields()[idx];
        let outcome = self.model.outcome();
        let current = self.probe.encoded(idx);

        if let Some(x) = self.find_flip(idx) {
            let flipped = self.probe.final_at(idx, x);
            let value = spec.render_number(x);
            return Some(SensitivityTrigger {
                field: Some(spec.name.clone()),
                description: format!(
                    "If {} were {value} instead of {}, the decision would change from {} to {}",
                    spec.label,
                    spec.render_number(current),
                    outcome.decision(self.score),
                    outcome.decision(flipped),
                ),
                flips_at: Some(value),
            });
        }

        let baseline = &self.model.baselines()[idx];
        let at_reference = self.probe.final_at(idx, baseline.reference_encoded());
        Some(SensitivityTrigger {
            field: Some(spec.name.clone()),
            description: format!(
                "Moving {} to its typical value {} would change the {} by {:+.3} (to {})",
                spec.label,
                spec.render(&baseline.reference),
                self.subject,
                at_reference - self.score,
                render_score(outcome, at_reference),
            ),
            flips_at: None,
        })
    }

    /// Closest value (within the training range) at which the decision flips.
    fn find_flip(&self, idx: usize) -> Option<f64> {
        let outcome: &OutcomeSpec = self.model.outcome();
        outcome.decision_threshold()?;
        let spec = &self.model.schema().fields()[idx];
        let baseline = &self.model.baselines()[idx];
        let current = self.probe.encoded(idx);

        let candidates: Vec<f64> = match &spec.kind {
            FieldKind::Categorical { categories } => (0..categories.len()).map(|i| i as f64).collect(),
            FieldKind::Boolean => vec![0.0, 1.0],
            kind => {
                let (lo_bound, hi_bound) = kind.encoded_bounds();
                let lo = baseline.min.max(lo_bound);
                let hi = baseline.max.min(hi_bound);
                if hi <= lo {
                    return None;
                }
                let step = (hi - lo) / FLIP_GRID as f64;
                let round = matches!(kind, FieldKind::Ordinal { .. });
                (0..=FLIP_GRID)
                    .map(|i| lo + step * i as f64)
                    .map(|x| if round { x.round() } else { x })
                    .collect()
            }
        };

        candidates
            .into_iter()
            .filter(|x| (x - current).abs() > 1e-9)
            .filter(|x| outcome.flips(self.score, self.probe.final_at(idx, *x)))
            .min_by(|a, b| (a - current).abs().total_cmp(&(b - current).abs()))
    }

    pub(crate) fn analysis(&self, factor: &ContributingFactor) -> Option<SensitivityProbe> {
        let idx = self.index_of(factor)?;
        let spec = &self.model.schema().fields()[idx];
        let baseline = &self.model.baselines()[idx];
        if !baseline.is_numeric() || baseline.std_dev <= 0.0 {
            return None;
        }
        let (lo_bound, hi_bound) = spec.kind.encoded_bounds();
        let x = self.probe.encoded(idx);
        let point = |v: f64| {
            let v = if matches!(spec.kind, FieldKind::Ordinal { .. }) { v.round() } else { v };
            ProbePoint {
                value: spec.render_number(v),
                score: self.probe.final_at(idx, v),
            }
        };
        Some(SensitivityProbe {
            field: spec.name.clone(),
            label: spec.label.clone(),
            observed: spec.render(self.transformed.value_at(idx)),
            low: point((x - baseline.std_dev).max(lo_bound)),
            high: point((x + baseline.std_dev).min(hi_bound)),
        })
    }
}
