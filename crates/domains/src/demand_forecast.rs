//! Nightly booking demand for a travel property.

use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use simdecide_core::{EngineResult, FeatureSchema, FeatureValue, FieldSpec, ValueFormat};
use simdecide_engine::{DecisionBand, DomainAdapter, OutcomeSpec, Presentation};
use simdecide_scenarios::{Perturbation, ScenarioDefinition, ScenarioEffect};
use simdecide_synthetic::{Blueprint, FieldRecipe, FieldShift, LabelModel, LabelTerm, Marginal, Regime};

pub const KEY: &str = "demand_forecast";

/// Bookings at or above this level call for extra capacity.
const CAPACITY_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct DemandForecast {
    schema: Arc<FeatureSchema>,
}

impl DemandForecast {
    pub fn new() -> EngineResult<Self> {
        let schema = FeatureSchema::builder(KEY)
            .field(FieldSpec::ordinal("month", 1, 12).label("Travel month").in_group("calendar"))
            .field(FieldSpec::boolean("holiday").label("Holiday period").in_group("calendar"))
            .field(FieldSpec::boolean("local_event").label("Local event").in_group("calendar"))
            .field(
                FieldSpec::ordinal("lead_time_days", 0, 365)
                    .label("Booking lead time (days)")
                    .in_group("market"),
            )
            .field(
                FieldSpec::continuous("avg_price", 20.0, 2_000.0)
                    .label("Average nightly price")
                    .format(ValueFormat::Currency)
                    .in_group("market"),
            )
            .field(
                FieldSpec::continuous("competitor_price", 20.0, 2_000.0)
                    .label("Competitor nightly price")
                    .format(ValueFormat::Currency)
                    .in_group("market"),
            )
            .field(
                FieldSpec::continuous("search_volume", 0.0, 100_000.0)
                    .label("Search volume")
                    .format(ValueFormat::Integer)
                    .in_group("demand"),
            )
            .field(
                FieldSpec::continuous("weather_index", -1.0, 1.0)
                    .label("Weather outlook")
                    .format(ValueFormat::Decimal(2))
                    .in_group("conditions"),
            )
            .field(
                FieldSpec::continuous("occupancy_rate", 0.0, 1.0)
                    .label("Current occupancy")
                    .format(ValueFormat::Percent)
                    .in_group("demand"),
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

impl DomainAdapter for DemandForecast {
    fn key(&self) -> &str {
        KEY
    }

    fn schema(&self) -> Arc<FeatureSchema> {
        Arc::clone(&self.schema)
    }

    fn blueprint(&self) -> EngineResult<Blueprint> {
        Blueprint::builder(self.schema())
            .recipe(FieldRecipe::new("month", Marginal::Cycle { period: 12, offset: 1 }))
            .recipe(FieldRecipe::new("holiday", Marginal::Bernoulli { p: 0.15 }))
            .recipe(FieldRecipe::new("local_event", Marginal::Bernoulli { p: 0.1 }))
            .recipe(FieldRecipe::new("lead_time_days", Marginal::LogNormal { mu: 3.2, sigma: 0.8 }).clipped())
            .recipe(
                FieldRecipe::new("avg_price", Marginal::LogNormal { mu: 5.0, sigma: 0.35 })
                    .clipped()
                    .decimals(2),
            )
            .recipe(
                FieldRecipe::new("competitor_price", Marginal::LogNormal { mu: 5.0, sigma: 0.3 })
                    .clipped()
                    .decimals(2),
            )
            // Peaks in July: record index 6 carries month 7.
            .recipe(
                FieldRecipe::new("search_volume", Marginal::LogNormal { mu: 8.0, sigma: 0.5 })
                    .clipped()
                    .decimals(0)
                    .seasonal(12, 0.35, -FRAC_PI_2),
            )
            .recipe(
                FieldRecipe::new("weather_index", Marginal::Normal { mean: 0.0, std_dev: 0.3 })
                    .clipped()
                    .decimals(2),
            )
            .recipe(FieldRecipe::new("occupancy_rate", Marginal::LogitNormal { mu: 0.3, sigma: 0.8 }).decimals(3))
            .correlate("holiday", "search_volume", 0.2)
            .correlate("avg_price", "competitor_price", 0.7)
            .correlate("lead_time_days", "occupancy_rate", 0.2)
            .correlate("search_volume", "occupancy_rate", 0.5)
            .regime(Regime::new("normal", 0.85))
            .regime(
                Regime::new("soft_market", 0.15)
                    .shift("search_volume", FieldShift::Scale(0.75))
                    .label_shift(-8.0),
            )
            .label(
                "bookings",
                LabelModel::Continuous {
                    intercept: 40.0,
                    terms: vec![
                        linear("search_volume", 9.0),
                        linear("occupancy_rate", 5.0),
                        linear("avg_price", -4.0),
                        linear("competitor_price", 3.0),
                        linear("weather_index", 2.0),
                        linear("lead_time_days", 1.5),
                        LabelTerm::Indicator {
                            field: "holiday".into(),
                            value: FeatureValue::Boolean(true),
                            weight: 12.0,
                        },
                        LabelTerm::Indicator {
                            field: "local_event".into(),
                            value: FeatureValue::Boolean(true),
                            weight: 9.0,
                        },
                    ],
                    noise_std: 4.0,
                    min: 0.0,
                    max: 150.0,
                    decimals: Some(0),
                },
            )
            .build()
    }

    fn scenarios(&self) -> Vec<ScenarioDefinition> {
        vec![
            ScenarioDefinition::new("holiday_boost", "Holiday period")
                .description("An upcoming holiday period is expected to boost demand")
                .field(
                    "holiday",
                    Perturbation::Set {
                        value: FeatureValue::Boolean(true),
                    },
                )
                .field("search_volume", Perturbation::Scale { by: 1.3 })
                .bias(3.0)
                .effect(ScenarioEffect::Raises),
            ScenarioDefinition::new("event_boost", "Special event")
                .description("A special event in the area is expected to increase demand")
                .field(
                    "local_event",
                    Perturbation::Set {
                        value: FeatureValue::Boolean(true),
                    },
                )
                .bias(2.0)
                .effect(ScenarioEffect::Raises),
            ScenarioDefinition::new("economic_downturn", "Economic downturn")
                .description("Economic conditions reduce travel demand")
                .group("demand", Perturbation::Scale { by: 0.8 })
                .bias(-4.0)
                .effect(ScenarioEffect::Lowers)
                .high_impact(),
            ScenarioDefinition::new("price_cut", "Price cut")
                .description("Nightly prices are cut by 15%")
                .field("avg_price", Perturbation::Scale { by: 0.85 }),
            ScenarioDefinition::new("seasonal_transition", "Seasonal transition")
                .description("Weather turns between peak and off-peak seasons")
                .field("weather_index", Perturbation::Shift { by: -0.2 })
                .field("weather_index", Perturbation::Clamp { min: -0.8, max: 0.8 }),
        ]
    }

    fn outcome(&self) -> OutcomeSpec {
        OutcomeSpec::Continuous {
            unit: "bookings".into(),
            decision_threshold: Some(CAPACITY_THRESHOLD),
            above_label: "add capacity".into(),
            below_label: "standard capacity".into(),
        }
    }

    fn presentation(&self) -> Presentation {
        Presentation {
            objective: "Forecast nightly bookings to plan capacity and staffing".into(),
            subject: "expected bookings".into(),
            bands: vec![
                DecisionBand::new(f64::NEG_INFINITY, "low demand", "Consider promotions"),
                DecisionBand::new(30.0, "normal demand", "Standard operations"),
                DecisionBand::new(CAPACITY_THRESHOLD, "high demand", "Add capacity and review pricing"),
                DecisionBand::new(80.0, "surge", "Maximize capacity and review staffing"),
            ],
            confidence_thresholds: None,
            limitations: vec![
                "Demand is modeled for a single representative property".into(),
                "Cancellations and overbooking are not modeled".into(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simdecide_scenarios::ScenarioCatalog;
    use simdecide_synthetic::{SyntheticDataGenerator, TargetKind};

    #[test]
    fn blueprint_and_scenarios_are_consistent_with_the_schema() {
        let domain = DemandForecast::new().unwrap();
        domain.blueprint().unwrap();
        ScenarioCatalog::load(domain.schema(), domain.scenarios()).unwrap();
        domain.presentation().validate(KEY).unwrap();
    }

    #[test]
    fn bookings_follow_the_search_volume_season() {
        let domain = DemandForecast::new().unwrap();
        let ds = SyntheticDataGenerator::new(3).generate(&domain.blueprint().unwrap(), 2_400).unwrap();
        assert!(matches!(ds.target(), TargetKind::Continuous { .. }));

        let month_mean = |month: i64| {
            let ys: Vec<f64> = ds
                .records()
                .iter()
                .filter(|r| r.features.get("month") == Some(&FeatureValue::Integer(month)))
                .map(|r| r.label)
                .collect();
            ys.iter().sum::<f64>() / ys.len() as f64
        };
        assert!(month_mean(7) > month_mean(1));
        assert!(ds.labels().iter().all(|y| (0.0..=150.0).contains(y)));
    }
}
