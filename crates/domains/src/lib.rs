//! Decision domains.
//!
//! Each module declares one domain as data for the shared pipeline in
//! `simdecide-engine`: a schema, the population model its training data is
//! drawn from, published scenarios and how decisions are presented. No
//! domain carries pipeline logic.

pub mod credit_risk;
pub mod demand_forecast;
pub mod fraud_detection;

use std::sync::Arc;

use simdecide_core::EngineResult;
use simdecide_engine::DomainAdapter;

pub use credit_risk::CreditRisk;
pub use demand_forecast::DemandForecast;
pub use fraud_detection::FraudDetection;

/// Every domain shipped with the workspace.
pub fn all() -> EngineResult<Vec<Arc<dyn DomainAdapter>>> {
    Ok(vec![
        Arc::new(CreditRisk::new()?),
        Arc::new(FraudDetection::new()?),
        Arc::new(DemandForecast::new()?),
    ])
}
