use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use proptest::prelude::*;
use serde_json::{Value, json};
use simdecide_core::{
    EngineConfig, EngineError, EngineResult, FeatureSchema, FeatureValue, FeatureVector, FieldSpec, ForestConfig,
};
use simdecide_domains::{CreditRisk, DemandForecast, FraudDetection};
use simdecide_engine::{
    CancelToken, DecisionBand, DecisionEngine, DecisionRequest, DomainAdapter, OutcomeSpec, Presentation,
};
use simdecide_scenarios::ScenarioDefinition;
use simdecide_synthetic::{Blueprint, FieldRecipe, LabelModel, Marginal};

fn config() -> EngineConfig {
    EngineConfig {
        record_count: 2_000,
        forest: ForestConfig {
            trees: 16,
            max_depth: 6,
            min_samples_leaf: 5,
            max_features: None,
        },
        ..EngineConfig::default()
    }
}

fn shared() -> &'static DecisionEngine {
    static ENGINE: OnceLock<DecisionEngine> = OnceLock::new();
    ENGINE.get_or_init(|| DecisionEngine::start(simdecide_domains::all().unwrap(), config()).unwrap())
}

fn applicant(debt_ratio: f64) -> Value {
    json!({
        "age": 35, "employment_type": "full_time", "employment_stability": 0.7,
        "income": 50000, "credit_score": 690, "delinquency_count": 0,
        "prior_default": false, "debt_ratio": debt_ratio, "utilization": 0.3,
        "open_loans": 2, "interest_rate": 3.5, "unemployment_rate": 0.05
    })
}

fn transaction() -> Value {
    json!({
        "amount": 120.0, "hour": 14, "channel": "pos", "merchant_category": "grocery",
        "account_age_days": 900, "amount_vs_typical": 1.1, "velocity_1h": 1,
        "geo_distance_km": 8.0, "foreign": false, "device_trust": 0.85, "new_device": false
    })
}

fn night() -> Value {
    json!({
        "month": 7, "holiday": false, "local_event": false, "lead_time_days": 30,
        "avg_price": 150.0, "competitor_price": 160.0, "search_volume": 3500,
        "weather_index": 0.2, "occupancy_rate": 0.6
    })
}

#[test]
fn every_domain_answers_with_a_complete_explanation() {
    let engine = shared();
    assert_eq!(
        engine.domains().collect::<Vec<_>>(),
        ["credit_risk", "demand_forecast", "fraud_detection"]
    );

    for (domain, features) in [
        ("credit_risk", applicant(0.3)),
        ("fraud_detection", transaction()),
        ("demand_forecast", night()),
    ] {
        let resp = engine.evaluate(&DecisionRequest::new(domain, features)).unwrap();
        assert_eq!(resp.domain, domain);
        assert_eq!(resp.scenario_applied, "baseline");
        assert!(!resp.fallback_used);
        let ex = &resp.explanation;
        assert!(!ex.summary.is_empty());
        assert!(!ex.decision.is_empty());
        assert!(!ex.factors.is_empty() && ex.factors.len() <= engine.config().top_factors);
        assert!(!ex.walkthrough.information_considered.is_empty());
        assert!(!ex.walkthrough.decision_flow.is_empty());
        assert!((0.0..=1.0).contains(&ex.confidence.score));
    }
}

#[test]
fn unknown_scenarios_fall_back_to_baseline() {
    let engine = shared();
    let plain = engine.evaluate(&DecisionRequest::new("credit_risk", applicant(0.3))).unwrap();
    let resp = engine
        .evaluate(&DecisionRequest::new("credit_risk", applicant(0.3)).scenario("alien_invasion"))
        .unwrap();
    assert!(resp.fallback_used);
    assert_eq!(resp.scenario_applied, "baseline");
    assert_eq!(resp.explanation.scenario_impact.requested, "alien_invasion");
    assert_eq!(resp.prediction.score, plain.prediction.score);
}

#[test]
fn factors_are_ranked_and_grounded_in_the_input() {
    let engine = shared();
    let input = applicant(0.55);
    let resp = engine.evaluate(&DecisionRequest::new("credit_risk", input.clone())).unwrap();
    let schema = engine.schema("credit_risk").unwrap();
    let vector = FeatureVector::from_json(Arc::clone(&schema), &input).unwrap();

    let factors = &resp.explanation.factors;
    for pair in factors.windows(2) {
        assert!(pair[0].impact.abs() >= pair[1].impact.abs());
    }
    for factor in factors {
        assert!(schema.field(&factor.field).is_some());
        assert_eq!(Some(&factor.observed), vector.get(&factor.field));
    }
}

#[test]
fn scenario_changes_are_reported_against_the_input() {
    let engine = shared();
    let resp = engine
        .evaluate(&DecisionRequest::new("demand_forecast", night()).scenario("holiday_boost"))
        .unwrap();
    let impact = &resp.explanation.scenario_impact;
    assert!(!impact.fallback_used);
    let holiday = impact.changes.iter().find(|c| c.field == "holiday").unwrap();
    assert_eq!(holiday.before, FeatureValue::Boolean(false));
    assert_eq!(holiday.after, FeatureValue::Boolean(true));
    assert!(resp.prediction.score >= resp.prediction.reference_score);
}

#[test]
fn high_impact_scenarios_require_review() {
    let engine = shared();
    let resp = engine
        .evaluate(&DecisionRequest::new("fraud_detection", transaction()).scenario("coordinated_fraud"))
        .unwrap();
    assert!(resp.explanation.scenario_impact.high_impact);
    assert!(resp.explanation.human_review.required);
}

#[test]
fn lowering_scenarios_never_raise_the_forecast() {
    let engine = shared();
    let resp = engine
        .evaluate(&DecisionRequest::new("demand_forecast", night()).scenario("economic_downturn"))
        .unwrap();
    assert!(resp.prediction.score <= resp.prediction.reference_score);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn stress_never_lowers_the_default_probability(debt_ratio in 0.0f64..1.0) {
        let engine = shared();
        let base = engine.evaluate(&DecisionRequest::new("credit_risk", applicant(debt_ratio))).unwrap();
        let stressed = engine
            .evaluate(&DecisionRequest::new("credit_risk", applicant(debt_ratio)).scenario("high_stress"))
            .unwrap();
        prop_assert!(stressed.prediction.score >= base.prediction.score);
        prop_assert!((0.0..=1.0).contains(&stressed.prediction.score));
    }
}

#[test]
fn invalid_features_are_rejected_with_every_issue() {
    let engine = shared();
    let err = engine
        .evaluate(&DecisionRequest::new(
            "credit_risk",
            json!({"age": 12, "employment_type": "astronaut"}),
        ))
        .unwrap_err();
    let EngineError::Validation(issues) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert!(issues.len() > 2);
}

#[test]
fn vectors_from_another_domain_are_a_schema_mismatch() {
    let engine = shared();
    let fraud = FeatureVector::from_json(engine.schema("fraud_detection").unwrap(), &transaction()).unwrap();
    let err = engine.evaluate(&DecisionRequest::new("credit_risk", fraud)).unwrap_err();
    assert!(matches!(err, EngineError::SchemaMismatch { .. }));
    assert!(err.is_fatal());
}

#[test]
fn unknown_domains_are_refused() {
    let err = shared().evaluate(&DecisionRequest::new("weather", json!({}))).unwrap_err();
    assert_eq!(err, EngineError::UnknownDomain("weather".into()));
}

#[test]
fn cancelled_requests_stop_before_the_first_stage() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = shared()
        .evaluate_with(&DecisionRequest::new("credit_risk", applicant(0.3)), &cancel)
        .unwrap_err();
    assert_eq!(err, EngineError::Cancelled { stage: "validate" });
}

#[test]
fn identical_configs_give_identical_decisions() {
    let a = DecisionEngine::start(vec![Arc::new(FraudDetection::new().unwrap())], config()).unwrap();
    let b = DecisionEngine::start(vec![Arc::new(FraudDetection::new().unwrap())], config()).unwrap();
    let req = DecisionRequest::new("fraud_detection", transaction()).scenario("geo_shift");
    let (ra, rb) = (a.evaluate(&req).unwrap(), b.evaluate(&req).unwrap());
    assert_eq!(ra.model_version, rb.model_version);
    assert_eq!(ra.prediction, rb.prediction);
    assert_eq!(ra.explanation, rb.explanation);
    assert_ne!(ra.request_id, rb.request_id);
}

#[test]
fn reseeding_is_invisible_to_concurrent_readers() {
    let engine = DecisionEngine::start(vec![Arc::new(CreditRisk::new().unwrap())], config()).unwrap();
    let before = engine.active_model("credit_risk").unwrap().version().clone();
    let served = AtomicUsize::new(0);

    let swapped = thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..10 {
                    let resp = engine.evaluate(&DecisionRequest::new("credit_risk", applicant(0.4))).unwrap();
                    assert!(matches!(resp.model_version.revision(), 1 | 2));
                    assert_eq!(resp.model_version, resp.prediction.model_version);
                    served.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
        s.spawn(|| engine.reseed("credit_risk", 7).unwrap()).join().unwrap()
    });

    assert_eq!(served.load(Ordering::Relaxed), 40);
    assert_eq!(swapped.revision(), 2);
    assert_ne!(swapped.digest(), before.digest());
    assert_eq!(engine.active_model("credit_risk").unwrap().version(), &swapped);
}

#[test]
fn scenario_listing_puts_baseline_first() {
    let listed = shared().scenarios("demand_forecast").unwrap();
    assert_eq!(listed[0].id, "baseline");
    assert!(listed.iter().any(|s| s.id == "economic_downturn" && s.high_impact));
}

/// A domain whose target never moves.
#[derive(Debug)]
struct Flatline {
    schema: Arc<FeatureSchema>,
}

impl Flatline {
    fn new() -> Self {
        let schema = FeatureSchema::builder("flatline")
            .field(FieldSpec::continuous("x", 0.0, 1.0).in_group("inputs"))
            .build()
            .unwrap();
        Self {
            schema: Arc::new(schema),
        }
    }
}

impl DomainAdapter for Flatline {
    fn key(&self) -> &str {
        "flatline"
    }

    fn schema(&self) -> Arc<FeatureSchema> {
        Arc::clone(&self.schema)
    }

    fn blueprint(&self) -> EngineResult<Blueprint> {
        Blueprint::builder(self.schema())
            .recipe(FieldRecipe::new("x", Marginal::Uniform { low: 0.0, high: 1.0 }))
            .label(
                "y",
                LabelModel::Continuous {
                    intercept: 5.0,
                    terms: Vec::new(),
                    noise_std: 0.0,
                    min: 0.0,
                    max: 10.0,
                    decimals: None,
                },
            )
            .build()
    }

    fn scenarios(&self) -> Vec<ScenarioDefinition> {
        Vec::new()
    }

    fn outcome(&self) -> OutcomeSpec {
        OutcomeSpec::Continuous {
            unit: "units".into(),
            decision_threshold: None,
            above_label: "high".into(),
            below_label: "low".into(),
        }
    }

    fn presentation(&self) -> Presentation {
        Presentation {
            objective: "Predict y".into(),
            subject: "y".into(),
            bands: vec![DecisionBand::new(f64::NEG_INFINITY, "any", "None")],
            confidence_thresholds: None,
            limitations: Vec::new(),
        }
    }
}

#[test]
fn degenerate_training_data_aborts_startup() {
    let adapters: Vec<Arc<dyn DomainAdapter>> = vec![Arc::new(DemandForecast::new().unwrap()), Arc::new(Flatline::new())];
    let err = DecisionEngine::start(adapters, config()).unwrap_err();
    assert!(matches!(err, EngineError::TrainingFailure(_)));
    assert!(err.is_fatal());
}
