use std::io::Cursor;
use std::sync::OnceLock;
use std::time::Duration;

use serde_json::{Value, json};
use simdecide_cli::app::{self, ServeOptions};
use simdecide_cli::app::dto::ServeStats;
use simdecide_core::{EngineConfig, ForestConfig};
use simdecide_engine::DecisionEngine;

fn config() -> EngineConfig {
    EngineConfig {
        record_count: 2_000,
        forest: ForestConfig {
            trees: 10,
            max_depth: 6,
            min_samples_leaf: 5,
            max_features: None,
        },
        ..EngineConfig::default()
    }
}

fn engine() -> &'static DecisionEngine {
    static ENGINE: OnceLock<DecisionEngine> = OnceLock::new();
    ENGINE.get_or_init(|| app::build_engine(config()).unwrap())
}

fn run(lines: &[Value], options: ServeOptions) -> (Vec<Value>, ServeStats) {
    let input: String = lines.iter().map(|l| format!("{l}\n")).collect();
    let mut output = Vec::new();
    let stats = app::serve(engine(), Cursor::new(input), &mut output, options).unwrap();
    let replies = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    (replies, stats)
}

fn applicant() -> Value {
    json!({
        "age": 41, "employment_type": "self_employed", "employment_stability": 0.5,
        "income": 72000, "credit_score": 640, "delinquency_count": 1,
        "prior_default": false, "debt_ratio": 0.45, "utilization": 0.6,
        "open_loans": 4, "interest_rate": 4.0, "unemployment_rate": 0.06
    })
}

#[test]
fn decision_lines_get_full_responses() {
    let (replies, stats) = run(
        &[json!({"domain": "credit_risk", "features": applicant(), "scenario_id": "high_stress"})],
        ServeOptions::default(),
    );
    assert_eq!(stats, ServeStats { lines: 1, decisions: 1, errors: 0 });
    let reply = &replies[0];
    assert_eq!(reply["scenario_applied"], "high_stress");
    assert_eq!(reply["fallback_used"], false);
    assert!(reply["request_id"].is_string());
    assert!(reply["model_version"].as_str().unwrap().starts_with("credit_risk-r1-"));
    assert!(reply["explanation"]["factors"].as_array().is_some_and(|f| !f.is_empty()));
    assert!(reply["explanation"]["walkthrough"]["decision_flow"].is_array());
}

#[test]
fn failures_become_error_lines_and_the_loop_continues() {
    let (replies, stats) = run(
        &[
            json!({"domain": "credit_risk", "features": {"age": 200}}),
            json!({"domain": "weather", "features": {}}),
            json!({"op": "bogus"}),
            json!({"op": "health"}),
        ],
        ServeOptions::default(),
    );
    assert_eq!(stats, ServeStats { lines: 4, decisions: 0, errors: 3 });
    assert_eq!(replies[0]["error"], "validation_error");
    assert!(replies[0]["issues"].as_array().is_some_and(|i| i.len() > 1));
    assert_eq!(replies[1]["error"], "unknown_domain");
    assert_eq!(replies[2]["error"], "invalid_request");
    assert_eq!(replies[3], json!({"status": "ok"}));
}

#[test]
fn blank_lines_are_skipped() {
    let mut output = Vec::new();
    let stats = app::serve(engine(), Cursor::new("\n  \n{\"op\":\"domains\"}\n"), &mut output, ServeOptions::default())
        .unwrap();
    assert_eq!(stats.lines, 1);
    let reply: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(reply["domains"], json!(["credit_risk", "demand_forecast", "fraud_detection"]));
}

#[test]
fn control_lines_expose_catalogs_and_models() {
    let (replies, _) = run(
        &[
            json!({"op": "scenarios", "domain": "fraud_detection"}),
            json!({"op": "model", "domain": "demand_forecast"}),
        ],
        ServeOptions::default(),
    );
    let scenarios = replies[0]["scenarios"].as_array().unwrap();
    assert_eq!(scenarios[0]["id"], "baseline");
    assert!(scenarios.iter().any(|s| s["id"] == "trusted_device"));
    assert!(replies[1]["holdout"]["r2"].is_number());
}

#[test]
fn expired_deadlines_cancel_requests() {
    let (replies, stats) = run(
        &[json!({"domain": "credit_risk", "features": applicant()})],
        ServeOptions {
            request_timeout: Some(Duration::ZERO),
        },
    );
    assert_eq!(stats.errors, 1);
    assert_eq!(replies[0]["error"], "cancelled");
}

#[test]
fn malformed_decision_lines_name_the_missing_field() {
    let (replies, stats) = run(&[json!({"domain": "credit_risk", "scenario_id": "high_stress"})], ServeOptions::default());
    assert_eq!(stats.errors, 1);
    assert_eq!(replies[0]["error"], "invalid_request");
    assert!(replies[0]["message"].as_str().unwrap().contains("features"));
}

#[test]
fn seeded_hot_swaps_publish_a_retrained_model() {
    // Private engine: swapping the shared one would race the other tests.
    let engine = app::build_engine(config()).unwrap();
    let before = engine.active_model("demand_forecast").unwrap().version().clone();

    let input = "{\"op\": \"hot_swap\", \"domain\": \"demand_forecast\", \"seed\": 77}\n";
    let mut output = Vec::new();
    app::serve(&engine, Cursor::new(input), &mut output, ServeOptions::default()).unwrap();
    let reply: Value = serde_json::from_slice(&output).unwrap();

    let version = reply["model_version"].as_str().unwrap();
    assert!(version.starts_with("demand_forecast-r2-"));
    assert!(!version.ends_with(before.digest()));
    assert_eq!(engine.active_model("demand_forecast").unwrap().version().to_string(), version);
}
