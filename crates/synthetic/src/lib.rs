//! Seeded synthetic datasets for model training.
//!
//! Domains describe their population with a [`Blueprint`]; the
//! [`SyntheticDataGenerator`] turns it into a labeled dataset that is
//! bit-identical for a given seed.

pub mod blueprint;
pub mod generator;
pub mod sampling;

pub use blueprint::{
    Blueprint, BlueprintBuilder, Correlation, FieldRecipe, FieldShift, LabelModel, LabelTerm, Marginal, Regime,
    Seasonality,
};
pub use generator::{LabeledRecord, SyntheticDataGenerator, SyntheticDataset, TargetKind, generate};
