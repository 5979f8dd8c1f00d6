//! Consumer credit risk: probability of default within twelve months.

use std::sync::Arc;

use simdecide_core::{EngineResult, FeatureSchema, FeatureValue, FieldSpec, ValueFormat};
use simdecide_engine::{DecisionBand, DomainAdapter, OutcomeSpec, Presentation};
use simdecide_scenarios::{Perturbation, ScenarioDefinition, ScenarioEffect};
use simdecide_synthetic::{Blueprint, FieldRecipe, FieldShift, LabelModel, LabelTerm, Marginal, Regime};

pub const KEY: &str = "credit_risk";

/// Share of borrowers who default in the generated population.
const DEFAULT_RATE: f64 = 0.08;

#[derive(Debug, Clone)]
pub struct CreditRisk {
    schema: Arc<FeatureSchema>,
}

impl CreditRisk {
    pub fn new() -> EngineResult<Self> {
        let schema = FeatureSchema::builder(KEY)
            .field(FieldSpec::ordinal("age", 18, 80).in_group("profile"))
            .field(
                FieldSpec::categorical("employment_type", &["full_time", "part_time", "self_employed", "unemployed"])
                    .label("Employment type")
                    .in_group("profile"),
            )
            .field(
                FieldSpec::continuous("employment_stability", 0.0, 1.0)
                    .label("Employment stability")
                    .format(ValueFormat::Decimal(2))
                    .in_group("profile"),
            )
            .field(
                FieldSpec::continuous("income", 10_000.0, 1_000_000.0)
                    .label("Annual income")
                    .format(ValueFormat::Currency)
                    .in_group("capacity"),
            )
            .field(
                FieldSpec::ordinal("credit_score", 300, 850)
                    .label("Credit score")
                    .in_group("history"),
            )
            .field(
                FieldSpec::ordinal("delinquency_count", 0, 12)
                    .label("Delinquencies (12 months)")
                    .in_group("history"),
            )
            .field(
                FieldSpec::boolean("prior_default")
                    .label("Prior default")
                    .in_group("history"),
            )
            .field(
                FieldSpec::continuous("debt_ratio", 0.0, 1.0)
                    .label("Debt-to-income ratio")
                    .format(ValueFormat::Percent)
                    .in_group("capacity")
                    .in_group("leverage"),
            )
            .field(
                FieldSpec::continuous("utilization", 0.0, 1.0)
                    .label("Credit utilization")
                    .format(ValueFormat::Percent)
                    .in_group("leverage"),
            )
            .field(
                FieldSpec::ordinal("open_loans", 0, 20)
                    .label("Open loans")
                    .in_group("leverage"),
            )
            .field(
                FieldSpec::continuous("interest_rate", 0.0, 15.0)
                    .label("Policy interest rate")
                    .format(ValueFormat::Decimal(2))
                    .in_group("macro"),
            )
            .field(
                FieldSpec::continuous("unemployment_rate", 0.0, 0.3)
                    .label("Regional unemployment")
                    .format(ValueFormat::Percent)
                    .in_group("macro"),
            )
            .build()?;
        Ok(Self {
            schema: Arc::new(schema),
        })
    }
}

fn linear(field: &str, weight: f64) -> LabelTerm {
    LabelTerm::Linear {
        field: field.into(),
        weight,
    }
}

impl DomainAdapter for CreditRisk {
    fn key(&self) -> &str {
        KEY
    }

    fn schema(&self) -> Arc<FeatureSchema> {
        Arc::clone(&self.schema)
    }

    fn blueprint(&self) -> EngineResult<Blueprint> {
        Blueprint::builder(self.schema())
            .recipe(FieldRecipe::new("age", Marginal::Normal { mean: 42.0, std_dev: 12.0 }).clipped())
            .recipe(FieldRecipe::new(
                "employment_type",
                Marginal::Categorical {
                    weights: vec![0.6, 0.15, 0.2, 0.05],
                },
            ))
            .recipe(FieldRecipe::new("employment_stability", Marginal::LogitNormal { mu: 0.8, sigma: 0.9 }).decimals(3))
            .recipe(
                FieldRecipe::new("income", Marginal::LogNormal { mu: 10.8, sigma: 0.5 })
                    .clipped()
                    .decimals(0),
            )
            .recipe(FieldRecipe::new("credit_score", Marginal::Normal { mean: 680.0, std_dev: 70.0 }).clipped())
            .recipe(FieldRecipe::new("delinquency_count", Marginal::Poisson { lambda: 0.6 }).clipped())
            .recipe(FieldRecipe::new("prior_default", Marginal::Bernoulli { p: 0.04 }))
            .recipe(FieldRecipe::new("debt_ratio", Marginal::LogitNormal { mu: -1.0, sigma: 0.6 }).decimals(3))
            .recipe(FieldRecipe::new("utilization", Marginal::LogitNormal { mu: -0.8, sigma: 0.9 }).decimals(3))
            .recipe(FieldRecipe::new("open_loans", Marginal::Poisson { lambda: 2.0 }).clipped())
            .recipe(
                FieldRecipe::new("interest_rate", Marginal::Normal { mean: 3.5, std_dev: 1.2 })
                    .clipped()
                    .decimals(2),
            )
            .recipe(
                FieldRecipe::new("unemployment_rate", Marginal::Normal { mean: 0.05, std_dev: 0.015 })
                    .clipped()
                    .decimals(3),
            )
            .correlate("age", "income", 0.3)
            .correlate("employment_stability", "credit_score", 0.3)
            .correlate("income", "credit_score", 0.35)
            .correlate("credit_score", "delinquency_count", -0.5)
            .correlate("income", "debt_ratio", -0.25)
            .correlate("credit_score", "debt_ratio", -0.35)
            .correlate("credit_score", "utilization", -0.45)
            .correlate("income", "open_loans", 0.3)
            .correlate("debt_ratio", "open_loans", 0.3)
            .correlate("interest_rate", "unemployment_rate", 0.2)
            .regime(Regime::new("expansion", 0.7))
            .regime(
                Regime::new("downturn", 0.3)
                    .shift("interest_rate", FieldShift::Add(1.5))
                    .shift("unemployment_rate", FieldShift::Add(0.03))
                    .label_shift(0.8),
            )
            .label(
                "default_within_12m",
                LabelModel::Binary {
                    target_rate: DEFAULT_RATE,
                    intercept: 0.0,
                    terms: vec![
                        linear("debt_ratio", 1.2),
                        linear("utilization", 0.7),
                        linear("credit_score", -1.1),
                        linear("delinquency_count", 0.5),
                        linear("income", -0.5),
                        linear("employment_stability", -0.4),
                        linear("unemployment_rate", 0.4),
                        linear("interest_rate", 0.3),
                        LabelTerm::Indicator {
                            field: "prior_default".into(),
                            value: FeatureValue::Boolean(true),
                            weight: 1.5,
                        },
                        LabelTerm::Indicator {
                            field: "employment_type".into(),
                            value: FeatureValue::Category("unemployed".into()),
                            weight: 1.0,
                        },
                        LabelTerm::Threshold {
                            field: "debt_ratio".into(),
                            above: 0.6,
                            weight: 1.5,
                        },
                    ],
                    noise: 0.5,
                },
            )
            .build()
    }

    fn scenarios(&self) -> Vec<ScenarioDefinition> {
        vec![
            ScenarioDefinition::new("high_stress", "High financial stress")
                .description("Debt burden rises 40% across the book")
                .field("debt_ratio", Perturbation::Scale { by: 1.4 })
                .bias(0.1)
                .effect(ScenarioEffect::Raises)
                .high_impact(),
            ScenarioDefinition::new("rising_interest_rates", "Rising interest rates")
                .description("Rising rates increase borrowing costs and default risk")
                .field("interest_rate", Perturbation::Shift { by: 2.0 })
                .field("utilization", Perturbation::Scale { by: 1.1 })
                .bias(0.03)
                .effect(ScenarioEffect::Raises),
            ScenarioDefinition::new("economic_downturn", "Economic downturn")
                .description("Recession with rising unemployment and falling incomes")
                .field("unemployment_rate", Perturbation::Shift { by: 0.04 })
                .field("income", Perturbation::Scale { by: 0.9 })
                .field("debt_ratio", Perturbation::Scale { by: 1.15 })
                .bias(0.05)
                .effect(ScenarioEffect::Raises)
                .high_impact(),
            ScenarioDefinition::new("economic_downturn", "Economic downturn")
                .version(2)
                .description("Recession with rising unemployment, falling incomes and tighter credit")
                .field("unemployment_rate", Perturbation::Shift { by: 0.05 })
                .field("income", Perturbation::Scale { by: 0.85 })
                .field("debt_ratio", Perturbation::Scale { by: 1.2 })
                .field("credit_score", Perturbation::Shift { by: -20.0 })
                .bias(0.06)
                .effect(ScenarioEffect::Raises)
                .high_impact(),
            ScenarioDefinition::new("high_inflation", "High inflation")
                .description("Inflation erodes purchasing power and pushes up card balances")
                .field("interest_rate", Perturbation::Shift { by: 3.0 })
                .field("utilization", Perturbation::Scale { by: 1.2 })
                .bias(0.04)
                .effect(ScenarioEffect::Raises),
            ScenarioDefinition::new("deleveraging", "Household deleveraging")
                .description("Borrowers pay down balances and close loans")
                .group("leverage", Perturbation::Scale { by: 0.85 })
                .bias(-0.02)
                .effect(ScenarioEffect::Lowers),
        ]
    }

    fn outcome(&self) -> OutcomeSpec {
        OutcomeSpec::Binary {
            positive_label: "decline".into(),
            negative_label: "approve".into(),
            decision_threshold: 0.25,
        }
    }

    fn presentation(&self) -> Presentation {
        Presentation {
            objective: "Decide whether to approve a consumer loan based on the risk of default within twelve months"
                .into(),
            subject: "probability of default".into(),
            bands: vec![
                DecisionBand::new(0.0, "low risk", "Approve on standard terms"),
                DecisionBand::new(0.1, "moderate risk", "Approve; consider pricing or limit adjustments"),
                DecisionBand::new(0.25, "high risk", "Decline or refer to an underwriter"),
                DecisionBand::new(0.5, "very high risk", "Decline"),
            ],
            confidence_thresholds: None,
            limitations: vec![
                "Macroeconomic conditions are represented by two indicators only".into(),
                "Affordability rules and regulatory lending criteria are not assessed".into(),
            ],
        }
    }
}
