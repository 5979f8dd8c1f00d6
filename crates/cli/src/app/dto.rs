//! Wire shapes of the JSON-lines protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use simdecide_engine::DecisionRequest;

/// Control lines carry an `op`; anything else is a decision request.
#[derive(Debug, Clone)]
pub enum Incoming {
    Control(Control),
    Decide(DecisionRequest),
}

impl Incoming {
    /// Parse one request line. Errors name the offending field of whichever
    /// shape the line was meant to have.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(line)?;
        if value.get("op").is_some() {
            Control::deserialize(value).map(Self::Control)
        } else {
            DecisionRequest::deserialize(value).map(Self::Decide)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Control {
    Health,
    Domains,
    Scenarios { domain: String },
    Model { domain: String },
    /// Retrain `domain`; a `seed` draws the training data from a new stream.
    HotSwap {
        domain: String,
        #[serde(default)]
        seed: Option<u64>,
    },
}

/// Counts reported when the input stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ServeStats {
    pub lines: usize,
    pub decisions: usize,
    pub errors: usize,
}
