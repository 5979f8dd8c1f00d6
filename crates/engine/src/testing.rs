//! Small lending domain shared by the unit tests of this crate.

use std::sync::Arc;

use serde_json::json;
use simdecide_core::{EngineConfig, EngineResult, FeatureSchema, FeatureValue, FeatureVector, FieldSpec, ForestConfig, ValueFormat};
use simdecide_scenarios::{Perturbation, ScenarioDefinition, ScenarioEffect};
use simdecide_synthetic::{Blueprint, FieldRecipe, LabelModel, LabelTerm, Marginal};

use crate::domain::{DecisionBand, DomainAdapter, OutcomeSpec, Presentation};

pub(crate) struct Lending {
    schema: Arc<FeatureSchema>,
}

impl Lending {
    pub(crate) fn new() -> Self {
        let schema = FeatureSchema::builder("lending")
            .field(
                FieldSpec::continuous("income", 5_000.0, 500_000.0)
                    .format(ValueFormat::Currency)
                    .in_group("capacity"),
            )
            .field(
                FieldSpec::continuous("debt_ratio", 0.0, 1.0)
                    .label("Debt-to-income ratio")
                    .format(ValueFormat::Percent)
                    .in_group("capacity")
                    .in_group("leverage"),
            )
            .field(FieldSpec::ordinal("open_loans", 0, 15).in_group("leverage"))
            .field(FieldSpec::boolean("prior_default").in_group("history"))
            .build()
            .expect("static schema");
        Self {
            schema: Arc::new(schema),
        }
    }
}

impl DomainAdapter for Lending {
    fn key(&self) -> &str {
        "lending"
    }

    fn schema(&self) -> Arc<FeatureSchema> {
        Arc::clone(&self.schema)
    }

    fn blueprint(&self) -> EngineResult<Blueprint> {
        Blueprint::builder(self.schema())
            .recipe(FieldRecipe::new("income", Marginal::LogNormal { mu: 10.8, sigma: 0.5 }).clipped().decimals(0))
            .recipe(FieldRecipe::new("debt_ratio", Marginal::LogitNormal { mu: -1.0, sigma: 0.7 }).decimals(3))
            .recipe(FieldRecipe::new("open_loans", Marginal::Poisson { lambda: 2.0 }).clipped())
            .recipe(FieldRecipe::new("prior_default", Marginal::Bernoulli { p: 0.1 }))
            .correlate("income", "debt_ratio", -0.3)
            .correlate("debt_ratio", "open_loans", 0.4)
            .label(
                "default",
                LabelModel::Binary {
                    target_rate: 0.12,
                    intercept: 0.0,
                    terms: vec![
                        LabelTerm::Linear {
                            field: "debt_ratio".into(),
                            weight: 2.0,
                        },
                        LabelTerm::Linear {
                            field: "income".into(),
                            weight: -0.8,
                        },
                        LabelTerm::Indicator {
                            field: "prior_default".into(),
                            value: FeatureValue::Boolean(true),
                            weight: 1.5,
                        },
                    ],
                    noise: 0.4,
                },
            )
            .build()
    }

    fn scenarios(&self) -> Vec<ScenarioDefinition> {
        vec![
            ScenarioDefinition::new("high_stress", "High stress")
                .field("debt_ratio", Perturbation::Scale { by: 1.4 })
                .bias(0.1)
                .effect(ScenarioEffect::Raises)
                .high_impact(),
            ScenarioDefinition::new("relief", "Debt relief")
                .group("leverage", Perturbation::Scale { by: 0.8 })
                .bias(-0.02)
                .effect(ScenarioEffect::Lowers),
        ]
    }

    fn outcome(&self) -> OutcomeSpec {
        OutcomeSpec::Binary {
            positive_label: "decline".into(),
            negative_label: "approve".into(),
            decision_threshold: 0.35,
        }
    }

    fn presentation(&self) -> Presentation {
        Presentation {
            objective: "Decide whether to approve a loan application.".into(),
            subject: "probability of default".into(),
            bands: vec![
                DecisionBand::new(0.0, "low risk", "Approve."),
                DecisionBand::new(0.2, "elevated risk", "Approve with conditions."),
                DecisionBand::new(0.35, "high risk", "Decline or refer."),
            ],
            confidence_thresholds: None,
            limitations: vec!["Toy domain.".into()],
        }
    }
}

pub(crate) fn config() -> EngineConfig {
    EngineConfig {
        record_count: 1_200,
        forest: ForestConfig {
            trees: 12,
            max_depth: 5,
            min_samples_leaf: 5,
            max_features: None,
        },
        ..EngineConfig::default()
    }
}

pub(crate) fn applicant(adapter: &Lending, income: f64, debt_ratio: f64) -> FeatureVector {
    FeatureVector::from_json(
        adapter.schema(),
        &json!({
            "income": income,
            "debt_ratio": debt_ratio,
            "open_loans": 2,
            "prior_default": false
        }),
    )
    .expect("valid applicant")
}
