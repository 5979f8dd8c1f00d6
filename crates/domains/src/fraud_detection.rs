//! Card transaction fraud screening.

use std::sync::Arc;

use simdecide_core::{EngineResult, FeatureSchema, FeatureValue, FieldSpec, ValueFormat};
use simdecide_engine::{DecisionBand, DomainAdapter, OutcomeSpec, Presentation};
use simdecide_scenarios::{Perturbation, ScenarioDefinition, ScenarioEffect};
use simdecide_synthetic::{Blueprint, FieldRecipe, FieldShift, LabelModel, LabelTerm, Marginal, Regime};

pub const KEY: &str = "fraud_detection";

/// Fraud is rare: two transactions in a hundred.
const FRAUD_RATE: f64 = 0.02;

const CHANNELS: &[&str] = &["pos", "online", "mobile", "atm"];
const MERCHANTS: &[&str] = &["grocery", "retail", "restaurant", "gas", "travel", "entertainment", "electronics"];

#[derive(Debug, Clone)]
pub struct FraudDetection {
    schema: Arc<FeatureSchema>,
}

impl FraudDetection {
    pub fn new() -> EngineResult<Self> {
        let schema = FeatureSchema::builder(KEY)
            .field(
                FieldSpec::continuous("amount", 0.5, 50_000.0)
                    .label("Transaction amount")
                    .format(ValueFormat::Currency)
                    .in_group("transaction"),
            )
            .field(
                FieldSpec::ordinal("hour", 0, 23)
                    .label("Hour of day")
                    .in_group("transaction"),
            )
            .field(
                FieldSpec::categorical("channel", CHANNELS)
                    .label("Channel")
                    .in_group("transaction"),
            )
            .field(
                FieldSpec::categorical("merchant_category", MERCHANTS)
                    .label("Merchant category")
                    .in_group("transaction"),
            )
            .field(
                FieldSpec::ordinal("account_age_days", 1, 3_650)
                    .label("Account age (days)")
                    .in_group("account"),
            )
            .field(
                FieldSpec::continuous("amount_vs_typical", 0.0, 50.0)
                    .label("Amount relative to typical spend")
                    .format(ValueFormat::Decimal(2))
                    .in_group("behavior"),
            )
            .field(
                FieldSpec::ordinal("velocity_1h", 0, 50)
                    .label("Transactions in the last hour")
                    .in_group("behavior"),
            )
            .field(
                FieldSpec::continuous("geo_distance_km", 0.0, 20_000.0)
                    .label("Distance from usual location (km)")
                    .format(ValueFormat::Decimal(0))
                    .in_group("behavior")
                    .in_group("location"),
            )
            .field(
                FieldSpec::boolean("foreign")
                    .label("Foreign transaction")
                    .in_group("location"),
            )
            .field(
                FieldSpec::continuous("device_trust", 0.0, 1.0)
                    .label("Device trust score")
                    .format(ValueFormat::Decimal(2))
                    .in_group("device"),
            )
            .field(
                FieldSpec::boolean("new_device")
                    .label("New device")
                    .in_group("device"),
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

fn indicator(field: &str, value: FeatureValue, weight: f64) -> LabelTerm {
    LabelTerm::Indicator {
        field: field.into(),
        value,
        weight,
    }
}

impl DomainAdapter for FraudDetection {
    fn key(&self) -> &str {
        KEY
    }

    fn schema(&self) -> Arc<FeatureSchema> {
        Arc::clone(&self.schema)
    }

    fn blueprint(&self) -> EngineResult<Blueprint> {
        Blueprint::builder(self.schema())
            .recipe(
                FieldRecipe::new("amount", Marginal::LogNormal { mu: 4.5, sigma: 1.0 })
                    .clipped()
                    .decimals(2),
            )
            .recipe(FieldRecipe::new("hour", Marginal::Uniform { low: 0.0, high: 23.0 }).clipped())
            .recipe(FieldRecipe::new(
                "channel",
                Marginal::Categorical {
                    weights: vec![0.4, 0.3, 0.2, 0.1],
                },
            ))
            .recipe(FieldRecipe::new(
                "merchant_category",
                Marginal::Categorical {
                    weights: vec![0.25, 0.2, 0.15, 0.12, 0.08, 0.1, 0.1],
                },
            ))
            .recipe(FieldRecipe::new("account_age_days", Marginal::LogNormal { mu: 6.3, sigma: 0.9 }).clipped())
            .recipe(
                FieldRecipe::new("amount_vs_typical", Marginal::LogNormal { mu: 0.0, sigma: 0.5 })
                    .clipped()
                    .decimals(2),
            )
            .recipe(FieldRecipe::new("velocity_1h", Marginal::Poisson { lambda: 1.2 }).clipped())
            .recipe(
                FieldRecipe::new("geo_distance_km", Marginal::LogNormal { mu: 2.5, sigma: 1.5 })
                    .clipped()
                    .decimals(1),
            )
            .recipe(FieldRecipe::new("foreign", Marginal::Bernoulli { p: 0.06 }))
            .recipe(FieldRecipe::new("device_trust", Marginal::LogitNormal { mu: 1.5, sigma: 1.0 }).decimals(3))
            .recipe(FieldRecipe::new("new_device", Marginal::Bernoulli { p: 0.08 }))
            .correlate("amount", "amount_vs_typical", 0.6)
            .correlate("geo_distance_km", "foreign", 0.6)
            .correlate("account_age_days", "device_trust", 0.3)
            .correlate("device_trust", "new_device", -0.5)
            .regime(Regime::new("routine", 0.9))
            .regime(
                Regime::new("attack_wave", 0.1)
                    .shift("velocity_1h", FieldShift::Scale(2.0))
                    .shift("amount_vs_typical", FieldShift::Scale(1.5))
                    .label_shift(1.0),
            )
            .label(
                "fraud_flag",
                LabelModel::Binary {
                    target_rate: FRAUD_RATE,
                    intercept: 0.0,
                    terms: vec![
                        linear("amount_vs_typical", 1.0),
                        linear("velocity_1h", 0.8),
                        linear("geo_distance_km", 0.6),
                        linear("device_trust", -0.9),
                        linear("account_age_days", -0.5),
                        indicator("new_device", FeatureValue::Boolean(true), 1.0),
                        indicator("foreign", FeatureValue::Boolean(true), 0.8),
                        indicator("channel", FeatureValue::Category("online".into()), 0.4),
                        LabelTerm::Threshold {
                            field: "velocity_1h".into(),
                            above: 5.0,
                            weight: 1.5,
                        },
                        LabelTerm::Threshold {
                            field: "hour".into(),
                            above: 22.5,
                            weight: 0.8,
                        },
                    ],
                    noise: 0.3,
                },
            )
            .build()
    }

    fn scenarios(&self) -> Vec<ScenarioDefinition> {
        vec![
            ScenarioDefinition::new("velocity_spike", "Sudden velocity spike")
                .description("Unusual transaction velocity indicating potential card testing")
                .field("velocity_1h", Perturbation::Scale { by: 3.0 })
                .bias(0.15)
                .effect(ScenarioEffect::Raises),
            ScenarioDefinition::new("geo_shift", "Geo-location shift")
                .description("Transaction from an unusual geographic location")
                .field("geo_distance_km", Perturbation::Shift { by: 3_000.0 })
                .field(
                    "foreign",
                    Perturbation::Set {
                        value: FeatureValue::Boolean(true),
                    },
                )
                .bias(0.2)
                .effect(ScenarioEffect::Raises),
            ScenarioDefinition::new("coordinated_fraud", "Coordinated fraud pattern")
                .description("Pattern suggesting a coordinated attack across many accounts")
                .group("behavior", Perturbation::Scale { by: 2.0 })
                .field("device_trust", Perturbation::Scale { by: 0.5 })
                .bias(0.25)
                .effect(ScenarioEffect::Raises)
                .high_impact(),
            ScenarioDefinition::new("trusted_device", "Trusted device")
                .description("Transaction from an enrolled, long-used device")
                .field(
                    "device_trust",
                    Perturbation::Set {
                        value: FeatureValue::Number(0.95),
                    },
                )
                .field(
                    "new_device",
                    Perturbation::Set {
                        value: FeatureValue::Boolean(false),
                    },
                )
                .bias(-0.05)
                .effect(ScenarioEffect::Lowers),
        ]
    }

    fn outcome(&self) -> OutcomeSpec {
        OutcomeSpec::Binary {
            positive_label: "block".into(),
            negative_label: "allow".into(),
            decision_threshold: 0.3,
        }
    }

    fn presentation(&self) -> Presentation {
        Presentation {
            objective: "Decide whether to allow a card transaction or block it as suspected fraud".into(),
            subject: "fraud probability".into(),
            bands: vec![
                DecisionBand::new(0.0, "routine", "Allow"),
                DecisionBand::new(0.1, "unusual", "Allow and monitor the account"),
                DecisionBand::new(0.3, "suspicious", "Block and request step-up authentication"),
                DecisionBand::new(0.6, "likely fraud", "Block and alert the cardholder"),
            ],
            confidence_thresholds: Some(simdecide_core::ConfidenceThresholds {
                low_max: 0.55,
                high_min: 0.85,
            }),
            limitations: vec![
                "Merchant-level and network-level fraud signals are not modeled".into(),
                "Fraud typologies are not distinguished".into(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simdecide_scenarios::ScenarioCatalog;
    use simdecide_synthetic::SyntheticDataGenerator;

    #[test]
    fn blueprint_and_scenarios_are_consistent_with_the_schema() {
        let domain = FraudDetection::new().unwrap();
        domain.blueprint().unwrap();
        ScenarioCatalog::load(domain.schema(), domain.scenarios()).unwrap();
        domain.presentation().validate(KEY).unwrap();
    }

    #[test]
    fn fraud_stays_rare() {
        let domain = FraudDetection::new().unwrap();
        let ds = SyntheticDataGenerator::new(11).generate(&domain.blueprint().unwrap(), 5_000).unwrap();
        assert_eq!(ds.positive_count(), 100);
    }

    #[test]
    fn rate_override_applies_to_the_population() {
        let domain = FraudDetection::new().unwrap();
        let ds = SyntheticDataGenerator::new(11)
            .with_rare_event_rate(Some(0.05))
            .generate(&domain.blueprint().unwrap(), 2_000)
            .unwrap();
        assert_eq!(ds.positive_count(), 100);
    }
}
