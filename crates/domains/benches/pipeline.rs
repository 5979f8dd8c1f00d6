use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use serde_json::json;
use simdecide_core::{EngineConfig, ForestConfig};
use simdecide_domains::{CreditRisk, FraudDetection};
use simdecide_engine::{DecisionEngine, DecisionRequest, DomainAdapter};
use simdecide_synthetic::SyntheticDataGenerator;

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

fn applicant() -> serde_json::Value {
    json!({
        "age": 35, "employment_type": "full_time", "employment_stability": 0.7,
        "income": 50000, "credit_score": 690, "delinquency_count": 0,
        "prior_default": false, "debt_ratio": 0.35, "utilization": 0.3,
        "open_loans": 2, "interest_rate": 3.5, "unemployment_rate": 0.05
    })
}

fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("synthetic_generation");
    group.sample_size(20);
    let blueprint = FraudDetection::new().unwrap().blueprint().unwrap();

    for count in [1_000usize, 5_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("fraud_detection", count), &count, |b, &n| {
            let generator = SyntheticDataGenerator::new(42);
            b.iter(|| black_box(generator.generate(&blueprint, n).unwrap()));
        });
    }

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let engine = DecisionEngine::start(vec![std::sync::Arc::new(CreditRisk::new().unwrap())], config()).unwrap();
    let mut group = c.benchmark_group("evaluate");

    // Baseline requests skip the transform; stressed ones add a guard and a scenario trigger.
    for scenario in [None, Some("high_stress")] {
        let mut req = DecisionRequest::new("credit_risk", applicant());
        req.scenario_id = scenario.map(str::to_string);
        group.bench_function(scenario.unwrap_or("baseline"), |b| {
            b.iter(|| black_box(engine.evaluate(black_box(&req)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_generation, bench_evaluate);
criterion_main!(benches);
