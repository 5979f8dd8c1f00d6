//! Sentences and structured narrative around a prediction.

use serde::Serialize;
use simdecide_scenarios::{FieldChange, ScenarioEffect, ScenarioLookup};

use crate::domain::OutcomeSpec;
use crate::explain::factors::ContributingFactor;
use crate::inference::{Prediction, ScoreGuard};
use crate::model::TrainedModel;

const UNGROUPED: &str = "Other inputs";

/// Render a final score the way the domain talks about it.
pub(crate) fn render_score(outcome: &OutcomeSpec, score: f64) -> String {
    match outcome {
        OutcomeSpec::Binary { .. } => format!("{:.1}%", score * 100.0),
        OutcomeSpec::Continuous { unit, .. } => format!("{score:.1} {unit}"),
    }
}

/// What the scenario did to this request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioImpact {
    pub scenario_id: String,
    pub scenario_name: String,
    pub version: u32,
    /// The id the caller asked for; differs from `scenario_id` on fallback.
    pub requested: String,
    pub fallback_used: bool,
    pub bias: f64,
    pub effect: ScenarioEffect,
    pub high_impact: bool,
    pub changes: Vec<FieldChange>,
    pub reference_score: f64,
    pub raw_score: f64,
    pub final_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<ScoreGuard>,
    pub summary: String,
}

impl ScenarioImpact {
    pub(crate) fn new(
        lookup: &ScenarioLookup,
        changes: &[FieldChange],
        prediction: &Prediction,
        model: &TrainedModel,
        subject: &str,
    ) -> Self {
        let scenario = &lookup.scenario;
        let outcome = model.outcome();
        let summary = if lookup.fallback_used {
            format!(
                "Scenario `{}` is not published for this domain; the request was evaluated under `{}`",
                lookup.requested,
                scenario.id()
            )
        } else if scenario.is_identity() && scenario.bias() == 0.0 {
            "No scenario adjustments; inputs were evaluated as given".to_string()
        } else {
            let changed: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
            let inputs = if changed.is_empty() {
                "changed no inputs".to_string()
            } else {
                format!("changed {}", changed.join(", "))
            };
            let mut sentence = format!(
                "Scenario `{}` {inputs} and applied a bias of {:+.3}; the {subject} moved from {} to {}",
                scenario.name(),
                scenario.bias(),
                render_score(outcome, prediction.reference_score),
                render_score(outcome, prediction.score),
            );
            match prediction.guard {
                Some(ScoreGuard::Floored) => {
                    sentence.push_str(" (the adjusted inputs scored lower, so the unadjusted score was kept before bias)")
                }
                Some(ScoreGuard::Capped) => {
                    sentence.push_str(" (the adjusted inputs scored higher, so the unadjusted score was kept before bias)")
                }
                None => {}
            }
            sentence
        };

        Self {
            scenario_id: scenario.id().to_string(),
            scenario_name: scenario.name().to_string(),
            version: scenario.version(),
            requested: lookup.requested.clone(),
            fallback_used: lookup.fallback_used,
            bias: scenario.bias(),
            effect: scenario.effect(),
            high_impact: scenario.is_high_impact(),
            changes: changes.to_vec(),
            reference_score: prediction.reference_score,
            raw_score: prediction.raw_score,
            final_score: prediction.score,
            guard: prediction.guard,
            summary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InformationCategory {
    pub name: String,
    pub fields: Vec<String>,
}

/// Plain-language account of how the decision was reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Walkthrough {
    pub objective: String,
    pub information_considered: Vec<InformationCategory>,
    pub decision_flow: Vec<String>,
}

/// Schema groups with the labels of their fields. A field in several groups
/// is listed under each; fields without a group land in one trailing bucket.
pub(crate) fn information_considered(model: &TrainedModel) -> Vec<InformationCategory> {
    let schema = model.schema();
    let mut categories: Vec<InformationCategory> = schema
        .groups()
        .into_iter()
        .map(|group| InformationCategory {
            name: group.to_string(),
            fields: schema
                .fields()
                .iter()
                .filter(|f| f.belongs_to(group))
                .map(|f| f.label.clone())
                .collect(),
        })
        .collect();

    let ungrouped: Vec<String> = schema
        .fields()
        .iter()
        .filter(|f| f.groups.is_empty())
        .map(|f| f.label.clone())
        .collect();
    if !ungrouped.is_empty() {
        categories.push(InformationCategory {
            name: UNGROUPED.to_string(),
            fields: ungrouped,
        });
    }
    categories
}

pub(crate) struct FlowContext<'a> {
    pub model: &'a TrainedModel,
    pub impact: &'a ScenarioImpact,
    pub prediction: &'a Prediction,
    pub band: &'a str,
    pub review_required: bool,
}

/// One line per pipeline step actually taken for this request.
pub(crate) fn decision_flow(ctx: &FlowContext<'_>) -> Vec<String> {
    let model = ctx.model;
    let schema = model.schema();
    let outcome = model.outcome();
    let mut steps = vec![format!(
        "Checked {} inputs against the `{}` schema (version {})",
        schema.len(),
        schema.domain(),
        schema.version()
    )];

    let impact = ctx.impact;
    if impact.fallback_used {
        steps.push(format!(
            "Requested scenario `{}` was not found; continued with `{}`",
            impact.requested, impact.scenario_id
        ));
    } else if impact.changes.is_empty() {
        steps.push(format!("Applied scenario `{}` without changing any input", impact.scenario_id));
    } else {
        let changes: Vec<String> = impact
            .changes
            .iter()
            .map(|c| format!("{} {}", c.field, c.rule))
            .collect();
        steps.push(format!(
            "Applied scenario `{}` v{}: {}",
            impact.scenario_id,
            impact.version,
            changes.join(", ")
        ));
    }

    steps.push(format!(
        "Scored the inputs with model {} ({} trees, {} synthetic training records)",
        model.version(),
        model.forest().tree_count(),
        model.training_records()
    ));

    if impact.bias != 0.0 || impact.guard.is_some() {
        let guard = match impact.guard {
            Some(ScoreGuard::Floored) => ", holding the score at its unadjusted level first",
            Some(ScoreGuard::Capped) => ", capping the score at its unadjusted level first",
            None => "",
        };
        steps.push(format!("Added the scenario bias of {:+.3}{guard}", impact.bias));
    }

    steps.push(format!(
        "Placed {} in the `{}` band with decision `{}`",
        render_score(outcome, ctx.prediction.score),
        ctx.band,
        outcome.decision(ctx.prediction.score)
    ));
    steps.push(if ctx.review_required {
        "Flagged the decision for human review".to_string()
    } else {
        "No review triggers fired; the decision can be processed automatically".to_string()
    });
    steps
}

/// One-sentence decision summary naming the strongest drivers.
pub(crate) fn summary(
    model: &TrainedModel,
    subject: &str,
    band: &str,
    score: f64,
    factors: &[ContributingFactor],
) -> String {
    let outcome = model.outcome();
    let mut sentence = format!(
        "{band}: {subject} of {} (decision: {})",
        render_score(outcome, score),
        outcome.decision(score)
    );
    if factors.is_empty() {
        sentence.push_str(". All inputs are at their typical values");
    } else {
        let drivers: Vec<String> = factors
            .iter()
            .take(3)
            .map(|f| format!("{} ({})", f.label, f.direction.as_str()))
            .collect();
        sentence.push_str(". Main drivers: ");
        sentence.push_str(&drivers.join(", "));
    }
    sentence
}
