//! Perturbation rules and their per-field compilation.

use serde::{Deserialize, Serialize};
use simdecide_core::{EngineError, EngineResult, FeatureSchema, FeatureValue, FieldSpec};

/// What a rule applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum RuleTarget {
    Field(String),
    /// Every field tagged with this group in the schema.
    Group(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Perturbation {
    Shift { by: f64 },
    Scale { by: f64 },
    Clamp { min: f64, max: f64 },
    Set { value: FeatureValue },
}

impl Perturbation {
    fn kind(&self) -> &'static str {
        match self {
            Self::Shift { .. } => "additive",
            Self::Scale { .. } => "multiplicative",
            Self::Clamp { .. } => "clamp",
            Self::Set { .. } => "set",
        }
    }

    fn is_arithmetic(&self) -> bool {
        !matches!(self, Self::Set { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRule {
    pub target: RuleTarget,
    pub perturbation: Perturbation,
}

impl ScenarioRule {
    pub fn field(name: impl Into<String>, perturbation: Perturbation) -> Self {
        Self {
            target: RuleTarget::Field(name.into()),
            perturbation,
        }
    }

    pub fn group(name: impl Into<String>, perturbation: Perturbation) -> Self {
        Self {
            target: RuleTarget::Group(name.into()),
            perturbation,
        }
    }
}

/// The single resolved transform for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FieldTransform {
    Shift { by: f64 },
    Scale { by: f64 },
    Clamp { min: f64, max: f64 },
    Set { value: FeatureValue },
}

impl FieldTransform {
    /// Apply to a numeric value. `Set` is handled by the caller.
    pub(crate) fn apply_numeric(&self, x: f64) -> f64 {
        match self {
            Self::Shift { by } => x + by,
            Self::Scale { by } => x * by,
            Self::Clamp { min, max } => x.clamp(*min, *max),
            Self::Set { value } => value.as_f64().unwrap_or(x),
        }
    }

    pub fn is_identity(&self) -> bool {
        match self {
            Self::Shift { by } => *by == 0.0,
            Self::Scale { by } => *by == 1.0,
            _ => false,
        }
    }

    /// Short human phrase, e.g. "×1.40" or "+0.05".
    pub fn describe(&self, field: &FieldSpec) -> String {
        match self {
            Self::Shift { by } if *by >= 0.0 => format!("+{}", field.render_number(*by)),
            Self::Shift { by } => format!("-{}", field.render_number(by.abs())),
            Self::Scale { by } => format!("×{by:.2}"),
            Self::Clamp { min, max } => {
                format!("limited to {}..{}", field.render_number(*min), field.render_number(*max))
            }
            Self::Set { value } => format!("set to {}", field.render(value)),
        }
    }
}

/// Resolve every rule of one scenario into at most one transform per field.
///
/// Field-level rules replace group-level rules for the same field. Within one
/// level, shifts add, scales multiply, clamps intersect; mixing kinds on the
/// same field is rejected.
pub(crate) fn compile(
    scenario_id: &str,
    schema: &FeatureSchema,
    rules: &[ScenarioRule],
) -> EngineResult<Vec<Option<FieldTransform>>> {
    let config = |msg: String| EngineError::configuration(format!("scenario `{scenario_id}`: {msg}"));

    let mut field_level: Vec<Vec<&Perturbation>> = vec![Vec::new(); schema.len()];
    let mut group_level: Vec<Vec<&Perturbation>> = vec![Vec::new(); schema.len()];

    for rule in rules {
        check_finite(&rule.perturbation).map_err(config)?;
        match &rule.target {
            RuleTarget::Field(name) => {
                let idx = schema
                    .index_of(name)
                    .ok_or_else(|| config(format!("unknown field `{name}`")))?;
                let spec = &schema.fields()[idx];
                if rule.perturbation.is_arithmetic() && !spec.kind.is_numeric() {
                    return Err(config(format!(
                        "{} rule on non-numeric field `{name}`",
                        rule.perturbation.kind()
                    )));
                }
                field_level[idx].push(&rule.perturbation);
            }
            RuleTarget::Group(group) => {
                if !schema.has_group(group) {
                    return Err(config(format!("unknown group `{group}`")));
                }
                let mut touched = 0;
                for (idx, spec) in schema.fields().iter().enumerate() {
                    if !spec.belongs_to(group) {
                        continue;
                    }
                    // Arithmetic group rules reach only the numeric members.
                    if rule.perturbation.is_arithmetic() && !spec.kind.is_numeric() {
                        continue;
                    }
                    group_level[idx].push(&rule.perturbation);
                    touched += 1;
                }
                if touched == 0 {
                    return Err(config(format!(
                        "{} rule on group `{group}` reaches no compatible field",
                        rule.perturbation.kind()
                    )));
                }
            }
        }
    }

    schema
        .fields()
        .iter()
        .zip(field_level.iter().zip(&group_level))
        .map(|(spec, (own, inherited))| {
            let chosen = if own.is_empty() { inherited } else { own };
            resolve(spec, chosen).map_err(config)
        })
        .collect()
}

fn check_finite(p: &Perturbation) -> Result<(), String> {
    let ok = match p {
        Perturbation::Shift { by } | Perturbation::Scale { by } => by.is_finite(),
        Perturbation::Clamp { min, max } => min.is_finite() && max.is_finite(),
        Perturbation::Set { value } => value.as_f64().is_none_or(f64::is_finite),
    };
    if ok {
        Ok(())
    } else {
        Err(format!("non-finite {} parameter", p.kind()))
    }
}

fn resolve(spec: &FieldSpec, rules: &[&Perturbation]) -> Result<Option<FieldTransform>, String> {
    let Some(first) = rules.first() else {
        return Ok(None);
    };
    if let Some(other) = rules.iter().find(|p| p.kind() != first.kind()) {
        return Err(format!(
            "{} and {} rules on the same field `{}`",
            first.kind(),
            other.kind(),
            spec.name
        ));
    }

    let transform = match first {
        Perturbation::Shift { .. } => FieldTransform::Shift {
            by: rules
                .iter()
                .map(|p| match p {
                    Perturbation::Shift { by } => *by,
                    _ => 0.0,
                })
                .sum(),
        },
        Perturbation::Scale { .. } => FieldTransform::Scale {
            by: rules
                .iter()
                .map(|p| match p {
                    Perturbation::Scale { by } => *by,
                    _ => 1.0,
                })
                .product(),
        },
        Perturbation::Clamp { .. } => {
            let (mut lo, mut hi) = (f64::NEG_INFINITY, f64::INFINITY);
            for p in rules {
                if let Perturbation::Clamp { min, max } = p {
                    lo = lo.max(*min);
                    hi = hi.min(*max);
                }
            }
            if lo > hi {
                return Err(format!("clamps on `{}` do not overlap", spec.name));
            }
            FieldTransform::Clamp { min: lo, max: hi }
        }
        Perturbation::Set { value } => {
            let canonical = spec.validate(value)?;
            for p in &rules[1..] {
                if let Perturbation::Set { value: other } = p {
                    if spec.validate(other).ok().as_ref() != Some(&canonical) {
                        return Err(format!("conflicting set rules on `{}`", spec.name));
                    }
                }
            }
            FieldTransform::Set { value: canonical }
        }
    };
    Ok(Some(transform))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::builder("lending")
            .field(FieldSpec::continuous("income", 0.0, 1_000_000.0).in_group("capacity"))
            .field(
                FieldSpec::continuous("debt_ratio", 0.0, 1.0)
                    .in_group("capacity")
                    .in_group("leverage"),
            )
            .field(FieldSpec::ordinal("open_loans", 0, 20).in_group("leverage"))
            .field(FieldSpec::categorical("employment", &["salaried", "self_employed"]).in_group("capacity"))
            .build()
            .unwrap()
    }

    #[test]
    fn field_rules_replace_group_rules() {
        let rules = vec![
            ScenarioRule::group("leverage", Perturbation::Scale { by: 1.5 }),
            ScenarioRule::field("debt_ratio", Perturbation::Scale { by: 1.1 }),
        ];
        let compiled = compile("s", &schema(), &rules).unwrap();
        assert_eq!(compiled[1], Some(FieldTransform::Scale { by: 1.1 }));
        assert_eq!(compiled[2], Some(FieldTransform::Scale { by: 1.5 }));
        assert_eq!(compiled[0], None);
    }

    #[test]
    fn group_rules_compose_by_kind() {
        let rules = vec![
            ScenarioRule::group("capacity", Perturbation::Scale { by: 1.2 }),
            ScenarioRule::group("leverage", Perturbation::Scale { by: 1.5 }),
        ];
        let compiled = compile("s", &schema(), &rules).unwrap();
        let Some(FieldTransform::Scale { by }) = compiled[1] else {
            panic!("expected a scale");
        };
        assert!((by - 1.8).abs() < 1e-12);
        // Arithmetic group rules skip the categorical member.
        assert_eq!(compiled[3], None);

        let clamps = vec![
            ScenarioRule::group("capacity", Perturbation::Clamp { min: 0.1, max: 0.9 }),
            ScenarioRule::group("leverage", Perturbation::Clamp { min: 0.2, max: 5.0 }),
        ];
        let compiled = compile("s", &schema(), &clamps).unwrap();
        assert_eq!(compiled[1], Some(FieldTransform::Clamp { min: 0.2, max: 0.9 }));
    }

    #[test]
    fn additive_and_multiplicative_on_one_field_is_rejected() {
        let rules = vec![
            ScenarioRule::group("capacity", Perturbation::Shift { by: 0.1 }),
            ScenarioRule::group("leverage", Perturbation::Scale { by: 1.5 }),
        ];
        let err = compile("s", &schema(), &rules).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(ref m) if m.contains("debt_ratio")));
    }

    #[test]
    fn arithmetic_on_categorical_field_is_rejected() {
        let rules = vec![ScenarioRule::field("employment", Perturbation::Shift { by: 1.0 })];
        assert!(compile("s", &schema(), &rules).is_err());
    }

    #[test]
    fn set_values_are_validated() {
        let ok = vec![ScenarioRule::field("employment", Perturbation::Set { value: "self_employed".into() })];
        assert!(compile("s", &schema(), &ok).is_ok());
        let bad = vec![ScenarioRule::field("employment", Perturbation::Set { value: "retired".into() })];
        assert!(compile("s", &schema(), &bad).is_err());
    }

    #[test]
    fn unknown_targets_and_non_finite_values_are_rejected() {
        let unknown = vec![ScenarioRule::group("liquidity", Perturbation::Scale { by: 1.1 })];
        assert!(compile("s", &schema(), &unknown).is_err());
        let nan = vec![ScenarioRule::field("income", Perturbation::Shift { by: f64::NAN })];
        assert!(compile("s", &schema(), &nan).is_err());
    }

    #[test]
    fn transforms_describe_themselves() {
        let s = schema();
        let ratio = s.field("debt_ratio").unwrap();
        assert_eq!(FieldTransform::Scale { by: 1.4 }.describe(ratio), "×1.40");
        assert_eq!(FieldTransform::Shift { by: -0.05 }.describe(ratio), "-0.05");
    }
}
