//! The decision pipeline behind one entry point.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use simdecide_core::{EngineConfig, EngineError, EngineResult, FeatureSchema, ModelVersion};
use simdecide_scenarios::{ScenarioCatalog, ScenarioSummary};

use crate::domain::{DomainAdapter, Presentation};
use crate::explain::{ExplainInput, ExplanationEngine};
use crate::inference::InferenceService;
use crate::model::{ModelRegistry, TrainedModel};
use crate::response::{DecisionRequest, DecisionResponse, ResponseAssembler};

/// Cooperative cancellation, checked between pipeline stages.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Cancelled { stage })` if the request must not enter `stage`.
    pub fn check(&self, stage: &'static str) -> EngineResult<()> {
        if self.is_cancelled() {
            tracing::debug!(stage, "request cancelled");
            return Err(EngineError::Cancelled { stage });
        }
        Ok(())
    }
}

struct DomainRuntime {
    adapter: Arc<dyn DomainAdapter>,
    catalog: ScenarioCatalog,
    presentation: Presentation,
}

/// Shared, thread-safe entry point: one pipeline for every domain.
pub struct DecisionEngine {
    config: EngineConfig,
    domains: BTreeMap<String, DomainRuntime>,
    registry: ModelRegistry,
    inference: InferenceService,
    explainer: ExplanationEngine,
    assembler: ResponseAssembler,
}

impl fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("domains", &self.domains.keys().collect::<Vec<_>>())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl DecisionEngine {
    /// Validate every domain, load its scenario catalog and train its model.
    /// Returns only once every domain can serve requests.
    pub fn start(adapters: Vec<Arc<dyn DomainAdapter>>, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        if adapters.is_empty() {
            return Err(EngineError::configuration("no domains registered"));
        }

        let mut domains = BTreeMap::new();
        for adapter in &adapters {
            let key = adapter.key().to_string();
            let presentation = adapter.presentation();
            presentation.validate(&key)?;
            let catalog = ScenarioCatalog::load(adapter.schema(), adapter.scenarios())?;
            let runtime = DomainRuntime {
                adapter: Arc::clone(adapter),
                catalog,
                presentation,
            };
            if domains.insert(key.clone(), runtime).is_some() {
                return Err(EngineError::configuration(format!("domain `{key}` registered twice")));
            }
        }

        let registry = ModelRegistry::initialize(&adapters, config.clone())?;
        tracing::info!(domains = domains.len(), "decision engine ready");

        Ok(Self {
            explainer: ExplanationEngine::new(&config),
            config,
            domains,
            registry,
            inference: InferenceService::new(),
            assembler: ResponseAssembler::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    fn runtime(&self, domain: &str) -> EngineResult<&DomainRuntime> {
        self.domains
            .get(domain)
            .ok_or_else(|| EngineError::UnknownDomain(domain.to_string()))
    }

    pub fn schema(&self, domain: &str) -> EngineResult<Arc<FeatureSchema>> {
        Ok(Arc::clone(self.runtime(domain)?.catalog.schema()))
    }

    /// Published scenarios of `domain`, baseline first.
    pub fn scenarios(&self, domain: &str) -> EngineResult<Vec<ScenarioSummary>> {
        Ok(self.runtime(domain)?.catalog.list())
    }

    pub fn active_model(&self, domain: &str) -> EngineResult<Arc<TrainedModel>> {
        self.registry.active(domain)
    }

    /// Retrain `domain` and publish the new model. In-flight requests finish
    /// on the model they started with.
    pub fn hot_swap(&self, domain: &str) -> EngineResult<ModelVersion> {
        let runtime = self.runtime(domain)?;
        let model = self.registry.hot_swap(runtime.adapter.as_ref())?;
        Ok(model.version().clone())
    }

    /// Retrain `domain` under `config` and publish the new model.
    pub fn hot_swap_with(&self, domain: &str, config: EngineConfig) -> EngineResult<ModelVersion> {
        let runtime = self.runtime(domain)?;
        let model = self.registry.hot_swap_with(runtime.adapter.as_ref(), config)?;
        Ok(model.version().clone())
    }

    /// Retrain `domain` on a dataset drawn from `seed`.
    pub fn reseed(&self, domain: &str, seed: u64) -> EngineResult<ModelVersion> {
        self.hot_swap_with(domain, EngineConfig {
            seed,
            ..self.config.clone()
        })
    }

    pub fn evaluate(&self, request: &DecisionRequest) -> EngineResult<DecisionResponse> {
        self.evaluate_with(request, &CancelToken::new())
    }

    /// Run the pipeline, checking `cancel` before every stage.
    pub fn evaluate_with(&self, request: &DecisionRequest, cancel: &CancelToken) -> EngineResult<DecisionResponse> {
        let started = Instant::now();

        cancel.check("validate")?;
        let runtime = self.runtime(&request.domain)?;
        let model = self.registry.active(&request.domain)?;
        let original = request.features.resolve(runtime.catalog.schema())?;

        cancel.check("scenario")?;
        let lookup = runtime.catalog.lookup(request.scenario_id.as_deref());
        let applied = runtime.catalog.apply(&lookup.scenario, &original)?;

        cancel.check("inference")?;
        let reference = self.inference.predict(&model, &original)?;
        let raw = self.inference.predict(&model, &applied.vector)?;
        let prediction = self.inference.finalize(&model, &reference, &raw, &lookup.scenario);

        cancel.check("explain")?;
        let explanation = self.explainer.explain(&ExplainInput {
            model: &model,
            presentation: &runtime.presentation,
            original: &original,
            applied: &applied,
            lookup: &lookup,
            prediction: &prediction,
        })?;

        cancel.check("assemble")?;
        let response = self.assembler.assemble(&request.domain, &lookup, prediction, explanation);

        tracing::debug!(
            domain = %request.domain,
            request_id = %response.request_id,
            scenario = lookup.scenario.id(),
            fallback = lookup.fallback_used,
            score = response.prediction.score,
            elapsed_us = started.elapsed().as_micros() as u64,
            "request evaluated"
        );
        Ok(response)
    }
}
