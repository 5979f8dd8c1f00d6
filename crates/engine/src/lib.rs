//! `simdecide-engine`
//!
//! **Responsibility:** the shared decision pipeline.
//!
//! - Trains one model per domain at startup from synthetic data.
//! - Applies a named scenario, scores the transformed input and explains the
//!   result against statistics frozen at training time.
//! - Domains plug in through [`DomainAdapter`] and carry data only.

pub mod domain;
pub mod engine;
pub mod explain;
pub mod inference;
pub mod model;
pub mod response;

#[cfg(test)]
mod testing;

pub use domain::{DecisionBand, DomainAdapter, OutcomeSpec, Presentation};
pub use engine::{CancelToken, DecisionEngine};
pub use explain::{ContributingFactor, DataQuality, Direction, Explanation, ExplanationEngine, HumanReview};
pub use inference::{InferenceService, ModelOutput, Outcome, Prediction, ScoreGuard};
pub use model::{ModelRegistry, ModelTrainer, TrainedModel};
pub use response::{DecisionRequest, DecisionResponse, FeatureInput, ResponseAssembler};
