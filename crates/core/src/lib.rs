//! Shared building blocks of the decision engine.
//!
//! This crate is pure data: schemas, validated feature vectors, the error
//! taxonomy, configuration and model versions. No I/O, no global state.

pub mod config;
pub mod error;
pub mod schema;
pub mod vector;
pub mod version;

pub use config::{ConfidenceLevel, ConfidenceThresholds, EngineConfig, ForestConfig};
pub use error::{EngineError, EngineResult};
pub use schema::{FeatureSchema, FieldKind, FieldSpec, SchemaBuilder, ValueFormat};
pub use vector::{FeatureValue, FeatureVector};
pub use version::ModelVersion;
