//! Scenario definitions, compiled scenarios and their application.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use simdecide_core::{EngineError, EngineResult, FeatureSchema, FeatureValue, FeatureVector, FieldKind, FieldSpec};

use crate::rule::{self, FieldTransform, Perturbation, ScenarioRule};

/// Documented direction a scenario moves the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioEffect {
    #[default]
    Neutral,
    /// Stress scenario: never lowers the score below the untransformed input's.
    Raises,
    /// Relief scenario: never raises the score above the untransformed input's.
    Lowers,
}

/// Scenario as authored by a domain or loaded from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub id: String,
    #[serde(default = "first_version")]
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<ScenarioRule>,
    /// Additive adjustment to the model score, applied after inference.
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub effect: ScenarioEffect,
    #[serde(default)]
    pub high_impact: bool,
}

fn first_version() -> u32 {
    1
}

impl ScenarioDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 1,
            name: name.into(),
            description: String::new(),
            rules: Vec::new(),
            bias: 0.0,
            effect: ScenarioEffect::Neutral,
            high_impact: false,
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn field(mut self, field: impl Into<String>, perturbation: Perturbation) -> Self {
        self.rules.push(ScenarioRule::field(field, perturbation));
        self
    }

    pub fn group(mut self, group: impl Into<String>, perturbation: Perturbation) -> Self {
        self.rules.push(ScenarioRule::group(group, perturbation));
        self
    }

    pub fn bias(mut self, bias: f64) -> Self {
        self.bias = bias;
        self
    }

    pub fn effect(mut self, effect: ScenarioEffect) -> Self {
        self.effect = effect;
        self
    }

    pub fn high_impact(mut self) -> Self {
        self.high_impact = true;
        self
    }
}

/// Listing entry for a published scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioSummary {
    pub id: String,
    pub version: u32,
    pub name: String,
    pub description: String,
    pub bias: f64,
    pub effect: ScenarioEffect,
    pub high_impact: bool,
    pub changes: Vec<String>,
}

/// One field altered by a scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub before: FeatureValue,
    pub after: FeatureValue,
    /// The raw transform result fell outside the field range and was
    /// held at the bound.
    pub saturated: bool,
    pub rule: String,
}

/// Result of applying a scenario to one vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedScenario {
    pub vector: FeatureVector,
    pub bias: f64,
    pub changes: Vec<FieldChange>,
}

/// A published, compiled scenario. Immutable.
#[derive(Debug, Clone)]
pub struct Scenario {
    definition: ScenarioDefinition,
    schema: Arc<FeatureSchema>,
    transforms: Vec<Option<FieldTransform>>,
}

impl Scenario {
    pub(crate) fn compile(definition: ScenarioDefinition, schema: Arc<FeatureSchema>) -> EngineResult<Self> {
        if definition.id.trim().is_empty() {
            return Err(EngineError::configuration("scenario id must not be empty"));
        }
        if !definition.bias.is_finite() {
            return Err(EngineError::configuration(format!(
                "scenario `{}` has a non-finite bias",
                definition.id
            )));
        }
        match definition.effect {
            ScenarioEffect::Raises if definition.bias < 0.0 => {
                return Err(EngineError::configuration(format!(
                    "scenario `{}` raises the score but carries a negative bias",
                    definition.id
                )));
            }
            ScenarioEffect::Lowers if definition.bias > 0.0 => {
                return Err(EngineError::configuration(format!(
                    "scenario `{}` lowers the score but carries a positive bias",
                    definition.id
                )));
            }
            _ => {}
        }

        let transforms = rule::compile(&definition.id, &schema, &definition.rules)?;
        Ok(Self {
            definition,
            schema,
            transforms,
        })
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn version(&self) -> u32 {
        self.definition.version
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn description(&self) -> &str {
        &self.definition.description
    }

    pub fn bias(&self) -> f64 {
        self.definition.bias
    }

    pub fn effect(&self) -> ScenarioEffect {
        self.definition.effect
    }

    pub fn is_high_impact(&self) -> bool {
        self.definition.high_impact
    }

    pub fn definition(&self) -> &ScenarioDefinition {
        &self.definition
    }

    /// No transform and no bias.
    pub fn is_identity(&self) -> bool {
        self.definition.bias == 0.0 && self.transforms.iter().flatten().all(FieldTransform::is_identity)
    }

    /// Resolved transforms as `(field, transform)` in schema order.
    pub fn transforms(&self) -> impl Iterator<Item = (&FieldSpec, &FieldTransform)> {
        self.schema
            .fields()
            .iter()
            .zip(&self.transforms)
            .filter_map(|(f, t)| t.as_ref().map(|t| (f, t)))
    }

    pub fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            id: self.definition.id.clone(),
            version: self.definition.version,
            name: self.definition.name.clone(),
            description: self.definition.description.clone(),
            bias: self.definition.bias,
            effect: self.definition.effect,
            high_impact: self.definition.high_impact,
            changes: self
                .transforms()
                .map(|(f, t)| format!("{} {}", f.label, t.describe(f)))
                .collect(),
        }
    }

    /// Derive the transformed vector. The input is left untouched.
    pub fn apply(&self, vector: &FeatureVector) -> EngineResult<AppliedScenario> {
        if !self.schema.same_layout(vector.schema()) {
            return Err(EngineError::SchemaMismatch {
                expected: self.schema.field_names(),
                found: vector.schema().field_names(),
            });
        }

        let mut values = vector.values().to_vec();
        let mut changes = Vec::new();
        for (idx, (field, transform)) in self.schema.fields().iter().zip(&self.transforms).enumerate() {
            let Some(transform) = transform else {
                continue;
            };
            let before = &values[idx];
            let (after, saturated) = match transform {
                FieldTransform::Set { value } => (value.clone(), false),
                numeric => {
                    let x = field.encode(before);
                    let raw = numeric.apply_numeric(x);
                    saturate(field, raw)
                }
            };
            if after != *before || saturated {
                changes.push(FieldChange {
                    field: field.name.clone(),
                    before: before.clone(),
                    after: after.clone(),
                    saturated,
                    rule: transform.describe(field),
                });
            }
            values[idx] = after;
        }

        let transformed = FeatureVector::from_values(Arc::clone(vector.schema()), values)?;
        Ok(AppliedScenario {
            vector: transformed,
            bias: self.definition.bias,
            changes,
        })
    }
}

/// Hold a numeric transform result inside the field range; ordinals round.
fn saturate(field: &FieldSpec, raw: f64) -> (FeatureValue, bool) {
    let (lo, hi) = field.kind.encoded_bounds();
    let x = match field.kind {
        FieldKind::Ordinal { .. } => raw.round(),
        _ => raw,
    };
    let saturated = x < lo || x > hi;
    (field.decode(x), saturated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use simdecide_core::FieldSpec;

    fn schema() -> Arc<FeatureSchema> {
        Arc::new(
            FeatureSchema::builder("lending")
                .field(FieldSpec::continuous("income", 0.0, 1_000_000.0).in_group("capacity"))
                .field(FieldSpec::continuous("debt_ratio", 0.0, 1.0).in_group("capacity"))
                .field(FieldSpec::ordinal("open_loans", 0, 20))
                .field(FieldSpec::categorical("employment", &["salaried", "self_employed"]))
                .build()
                .unwrap(),
        )
    }

    fn vector(schema: &Arc<FeatureSchema>) -> FeatureVector {
        FeatureVector::from_pairs(
            Arc::clone(schema),
            [
                ("income", FeatureValue::from(50_000.0)),
                ("debt_ratio", FeatureValue::from(0.3)),
                ("open_loans", FeatureValue::from(2_i64)),
                ("employment", FeatureValue::from("salaried")),
            ],
        )
        .unwrap()
    }

    #[test]
    fn apply_is_pure_and_records_changes() {
        let schema = schema();
        let scenario = Scenario::compile(
            ScenarioDefinition::new("tight", "Tight credit")
                .field("debt_ratio", Perturbation::Scale { by: 1.4 })
                .field("open_loans", Perturbation::Shift { by: 1.4 })
                .bias(0.1)
                .effect(ScenarioEffect::Raises),
            Arc::clone(&schema),
        )
        .unwrap();

        let input = vector(&schema);
        let snapshot = input.clone();
        let applied = scenario.apply(&input).unwrap();

        assert_eq!(input, snapshot);
        let ratio = applied.vector.get("debt_ratio").and_then(FeatureValue::as_f64).unwrap();
        assert!((ratio - 0.42).abs() < 1e-12);
        assert_eq!(applied.vector.get("open_loans"), Some(&FeatureValue::Integer(3)));
        assert_eq!(applied.bias, 0.1);
        assert_eq!(applied.changes.len(), 2);
        assert!(applied.changes.iter().all(|c| !c.saturated));
    }

    #[test]
    fn out_of_range_results_saturate_at_the_bound() {
        let schema = schema();
        let scenario = Scenario::compile(
            ScenarioDefinition::new("extreme", "Extreme").field("debt_ratio", Perturbation::Scale { by: 5.0 }),
            Arc::clone(&schema),
        )
        .unwrap();
        let applied = scenario.apply(&vector(&schema)).unwrap();
        assert_eq!(applied.vector.get("debt_ratio"), Some(&FeatureValue::Number(1.0)));
        assert!(applied.changes[0].saturated);
    }

    #[test]
    fn set_rules_replace_categories() {
        let schema = schema();
        let scenario = Scenario::compile(
            ScenarioDefinition::new("gig", "Gig economy")
                .field("employment", Perturbation::Set { value: "self_employed".into() }),
            Arc::clone(&schema),
        )
        .unwrap();
        let applied = scenario.apply(&vector(&schema)).unwrap();
        assert_eq!(applied.vector.get("employment"), Some(&FeatureValue::from("self_employed")));
    }

    #[test]
    fn declared_direction_must_match_bias_sign() {
        let err = Scenario::compile(
            ScenarioDefinition::new("relief", "Relief")
                .bias(0.05)
                .effect(ScenarioEffect::Lowers),
            schema(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn vectors_of_another_schema_are_refused() {
        let scenario = Scenario::compile(ScenarioDefinition::new("noop", "No-op"), schema()).unwrap();
        let other = Arc::new(
            FeatureSchema::builder("other")
                .field(FieldSpec::continuous("x", 0.0, 1.0))
                .build()
                .unwrap(),
        );
        let v = FeatureVector::from_pairs(other, [("x", FeatureValue::from(0.5))]).unwrap();
        assert!(matches!(scenario.apply(&v), Err(EngineError::SchemaMismatch { .. })));
    }

    #[test]
    fn summary_lists_resolved_changes() {
        let scenario = Scenario::compile(
            ScenarioDefinition::new("squeeze", "Squeeze").group("capacity", Perturbation::Scale { by: 0.9 }),
            schema(),
        )
        .unwrap();
        let summary = scenario.summary();
        assert_eq!(summary.changes, vec!["Income ×0.90", "Debt ratio ×0.90"]);
    }
}
