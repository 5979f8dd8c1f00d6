//! Named, versioned "what-if" transforms.
//!
//! Scenario definitions are compiled against a domain schema when the
//! [`ScenarioCatalog`] is loaded. After that, lookup never fails and applying a
//! scenario is a pure function of the scenario and the input vector.

pub mod catalog;
pub mod rule;
pub mod scenario;

pub use catalog::{BASELINE_ID, ScenarioCatalog, ScenarioLookup};
pub use rule::{FieldTransform, Perturbation, RuleTarget, ScenarioRule};
pub use scenario::{AppliedScenario, FieldChange, Scenario, ScenarioDefinition, ScenarioEffect, ScenarioSummary};
