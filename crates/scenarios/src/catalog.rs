//! Per-domain registry of published scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;

use simdecide_core::{EngineError, EngineResult, FeatureSchema, FeatureVector};

use crate::scenario::{AppliedScenario, Scenario, ScenarioDefinition, ScenarioEffect, ScenarioSummary};

/// Identity scenario, always published.
pub const BASELINE_ID: &str = "baseline";

/// Outcome of a tolerant lookup.
#[derive(Debug, Clone)]
pub struct ScenarioLookup {
    pub scenario: Arc<Scenario>,
    /// The id the caller asked for (empty when none was given).
    pub requested: String,
    pub fallback_used: bool,
}

/// Compiled scenarios of one domain, keyed by id then version.
#[derive(Debug, Clone)]
pub struct ScenarioCatalog {
    schema: Arc<FeatureSchema>,
    scenarios: BTreeMap<String, BTreeMap<u32, Arc<Scenario>>>,
    baseline: Arc<Scenario>,
}

impl ScenarioCatalog {
    /// Compile and publish every definition. Any inconsistency fails the
    /// whole load; a catalog is never partially published.
    pub fn load(
        schema: Arc<FeatureSchema>,
        definitions: impl IntoIterator<Item = ScenarioDefinition>,
    ) -> EngineResult<Self> {
        let mut scenarios: BTreeMap<String, BTreeMap<u32, Arc<Scenario>>> = BTreeMap::new();

        for definition in definitions {
            let (id, version) = (definition.id.clone(), definition.version);
            let scenario = Scenario::compile(definition, Arc::clone(&schema))?;
            if id == BASELINE_ID && !(scenario.is_identity() && scenario.effect() == ScenarioEffect::Neutral) {
                return Err(EngineError::configuration(
                    "`baseline` is reserved for the identity scenario",
                ));
            }
            let versions = scenarios.entry(id.clone()).or_default();
            if versions.contains_key(&version) {
                return Err(EngineError::configuration(format!(
                    "scenario `{id}` version {version} is defined twice"
                )));
            }
            versions.insert(version, Arc::new(scenario));
        }

        let published = scenarios
            .get(BASELINE_ID)
            .and_then(|versions| versions.values().next_back())
            .cloned();
        let baseline = match published {
            Some(b) => b,
            None => {
                let b = Arc::new(Scenario::compile(
                    ScenarioDefinition::new(BASELINE_ID, "Baseline")
                        .description("Inputs evaluated as given, with no adjustment."),
                    Arc::clone(&schema),
                )?);
                scenarios
                    .entry(BASELINE_ID.to_string())
                    .or_default()
                    .insert(b.version(), Arc::clone(&b));
                b
            }
        };

        tracing::info!(
            domain = schema.domain(),
            scenarios = scenarios.len(),
            versions = scenarios.values().map(BTreeMap::len).sum::<usize>(),
            "scenario catalog loaded"
        );
        Ok(Self {
            schema,
            scenarios,
            baseline,
        })
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    /// Latest version of the baseline scenario.
    pub fn baseline(&self) -> Arc<Scenario> {
        Arc::clone(&self.baseline)
    }

    fn latest(&self, id: &str) -> Option<Arc<Scenario>> {
        self.scenarios
            .get(id)
            .and_then(|versions| versions.values().next_back())
            .cloned()
    }

    /// Resolve an id to its latest version. Never fails: a missing or
    /// unknown id resolves to `baseline` and is flagged as a fallback.
    pub fn lookup(&self, id: Option<&str>) -> ScenarioLookup {
        let requested = id.map(str::trim).unwrap_or_default();
        if requested.is_empty() {
            return ScenarioLookup {
                scenario: self.baseline(),
                requested: String::new(),
                fallback_used: false,
            };
        }
        match self.latest(requested) {
            Some(scenario) => ScenarioLookup {
                scenario,
                requested: requested.to_string(),
                fallback_used: false,
            },
            None => {
                tracing::warn!(
                    domain = self.schema.domain(),
                    requested,
                    "unknown scenario, falling back to baseline"
                );
                ScenarioLookup {
                    scenario: self.baseline(),
                    requested: requested.to_string(),
                    fallback_used: true,
                }
            }
        }
    }

    /// Strict lookup of one published version.
    pub fn lookup_version(&self, id: &str, version: u32) -> EngineResult<Arc<Scenario>> {
        self.scenarios
            .get(id)
            .and_then(|versions| versions.get(&version))
            .cloned()
            .ok_or_else(|| EngineError::UnknownScenario(format!("{id}@{version}")))
    }

    /// Strict lookup of the latest version.
    pub fn get(&self, id: &str) -> EngineResult<Arc<Scenario>> {
        self.latest(id)
            .ok_or_else(|| EngineError::UnknownScenario(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scenarios.contains_key(id)
    }

    /// Latest version of every scenario, baseline first, then by id.
    pub fn list(&self) -> Vec<ScenarioSummary> {
        let mut out: Vec<ScenarioSummary> = self
            .scenarios
            .keys()
            .filter_map(|id| self.latest(id))
            .map(|s| s.summary())
            .collect();
        out.sort_by(|a, b| (a.id != BASELINE_ID, &a.id).cmp(&(b.id != BASELINE_ID, &b.id)));
        out
    }

    /// Apply a scenario to a vector. Pure; see [`Scenario::apply`].
    pub fn apply(&self, scenario: &Scenario, vector: &FeatureVector) -> EngineResult<AppliedScenario> {
        scenario.apply(vector)
    }
}
