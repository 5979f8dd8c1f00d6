//! Active model per domain with copy-on-write replacement.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use simdecide_core::{EngineConfig, EngineError, EngineResult};

use crate::domain::DomainAdapter;
use crate::model::{ModelTrainer, TrainedModel};

/// Owns the active [`TrainedModel`] of every domain.
///
/// Readers clone an `Arc` under a brief read lock and keep using it even if a
/// replacement is published meanwhile. Replacements are trained outside the
/// slot lock and serialized among themselves so revisions stay monotonic.
#[derive(Debug)]
pub struct ModelRegistry {
    trainer: ModelTrainer,
    slots: BTreeMap<String, RwLock<Arc<TrainedModel>>>,
    swap: Mutex<()>,
}

impl ModelRegistry {
    /// Train every domain synchronously. Any failure aborts initialization.
    pub fn initialize(adapters: &[Arc<dyn DomainAdapter>], config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let trainer = ModelTrainer::new(config);
        let mut slots = BTreeMap::new();
        for adapter in adapters {
            let key = adapter.key().to_string();
            if slots.contains_key(&key) {
                return Err(EngineError::configuration(format!("domain `{key}` registered twice")));
            }
            let model = trainer.train(adapter.as_ref(), 1)?;
            slots.insert(key, RwLock::new(Arc::new(model)));
        }
        Ok(Self {
            trainer,
            slots,
            swap: Mutex::new(()),
        })
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn active(&self, domain: &str) -> EngineResult<Arc<TrainedModel>> {
        let slot = self
            .slots
            .get(domain)
            .ok_or_else(|| EngineError::UnknownDomain(domain.to_string()))?;
        let guard = slot.read().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(&guard))
    }

    /// Retrain `adapter`'s domain with the startup configuration and publish
    /// the result as the next revision.
    ///
    /// On failure the previous model stays active.
    pub fn hot_swap(&self, adapter: &dyn DomainAdapter) -> EngineResult<Arc<TrainedModel>> {
        self.swap_in(adapter, &self.trainer)
    }

    /// Like [`hot_swap`](Self::hot_swap), but trains with `config`, e.g. a
    /// different seed or forest shape. Later plain swaps go back to the
    /// startup configuration.
    pub fn hot_swap_with(&self, adapter: &dyn DomainAdapter, config: EngineConfig) -> EngineResult<Arc<TrainedModel>> {
        config.validate()?;
        self.swap_in(adapter, &ModelTrainer::new(config))
    }

    fn swap_in(&self, adapter: &dyn DomainAdapter, trainer: &ModelTrainer) -> EngineResult<Arc<TrainedModel>> {
        let slot = self
            .slots
            .get(adapter.key())
            .ok_or_else(|| EngineError::UnknownDomain(adapter.key().to_string()))?;

        let _serialized = self.swap.lock().unwrap_or_else(PoisonError::into_inner);
        let revision = self.active(adapter.key())?.version().revision() + 1;
        let model = Arc::new(trainer.train(adapter, revision)?);

        let mut guard = slot.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *guard, Arc::clone(&model));
        drop(guard);

        tracing::info!(
            domain = adapter.key(),
            from = %previous.version(),
            to = %model.version(),
            seed = trainer.config().seed,
            "model hot-swapped"
        );
        Ok(model)
    }
}
