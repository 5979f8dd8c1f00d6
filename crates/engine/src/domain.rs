use std::sync::Arc;

use serde::{Deserialize, Serialize};
use simdecide_core::{ConfidenceThresholds, EngineError, EngineResult, FeatureSchema};
use simdecide_scenarios::ScenarioDefinition;
use simdecide_synthetic::Blueprint;

/// What the model predicts and how a score turns into a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomeSpec {
    /// Probability of the positive class.
    Binary {
        positive_label: String,
        negative_label: String,
        decision_threshold: f64,
    },
    /// A quantity in `unit`, optionally split into two decisions.
    Continuous {
        unit: String,
        decision_threshold: Option<f64>,
        above_label: String,
        below_label: String,
    },
}

impl OutcomeSpec {
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary { .. })
    }

    pub fn decision_threshold(&self) -> Option<f64> {
        match self {
            Self::Binary {
                decision_threshold, ..
            } => Some(*decision_threshold),
            Self::Continuous {
                decision_threshold, ..
            } => *decision_threshold,
        }
    }

    /// Decision label for a final score.
    pub fn decision(&self, score: f64) -> &str {
        match self {
            Self::Binary {
                positive_label,
                negative_label,
                decision_threshold,
            } => {
                if score >= *decision_threshold {
                    positive_label
                } else {
                    negative_label
                }
            }
            Self::Continuous {
                decision_threshold,
                above_label,
                below_label,
                ..
            } => match decision_threshold {
                Some(t) if score < *t => below_label,
                _ => above_label,
            },
        }
    }

    /// Whether two scores fall on different sides of the decision threshold.
    pub fn flips(&self, a: f64, b: f64) -> bool {
        self.decision_threshold().is_some_and(|t| (a >= t) != (b >= t))
    }
}

/// A named score band with reviewer guidance. Applies from `min` upward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionBand {
    pub min: f64,
    pub label: String,
    pub guidance: String,
}

impl DecisionBand {
    pub fn new(min: f64, label: impl Into<String>, guidance: impl Into<String>) -> Self {
        Self {
            min,
            label: label.into(),
            guidance: guidance.into(),
        }
    }
}

/// How a domain talks about its decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    /// What the decision is for, in one sentence.
    pub objective: String,
    /// What the score measures, e.g. "probability of default".
    pub subject: String,
    /// Ascending by `min`.
    pub bands: Vec<DecisionBand>,
    #[serde(default)]
    pub confidence_thresholds: Option<ConfidenceThresholds>,
    #[serde(default)]
    pub limitations: Vec<String>,
}

impl Presentation {
    pub fn validate(&self, domain: &str) -> EngineResult<()> {
        if self.bands.is_empty() {
            return Err(EngineError::configuration(format!("domain `{domain}` declares no decision bands")));
        }
        if self.bands.windows(2).any(|w| w[0].min >= w[1].min) {
            return Err(EngineError::configuration(format!(
                "decision bands of `{domain}` must be strictly ascending"
            )));
        }
        if let Some(thresholds) = &self.confidence_thresholds {
            thresholds.validate()?;
        }
        Ok(())
    }

    /// Highest band whose `min` the score reaches; the first band otherwise.
    pub fn band(&self, score: f64) -> Option<&DecisionBand> {
        self.bands
            .iter()
            .rev()
            .find(|b| score >= b.min)
            .or_else(|| self.bands.first())
    }
}

/// A decision domain: pure data the engine runs one shared pipeline over.
///
/// Implementations describe their inputs, population and scenarios; they never
/// carry pipeline logic of their own.
pub trait DomainAdapter: Send + Sync + 'static {
    /// Stable routing key, e.g. `credit_risk`.
    fn key(&self) -> &str;

    fn schema(&self) -> Arc<FeatureSchema>;

    /// Generation recipe for the training population. Must use [`schema`](Self::schema).
    fn blueprint(&self) -> EngineResult<Blueprint>;

    fn scenarios(&self) -> Vec<ScenarioDefinition>;

    fn outcome(&self) -> OutcomeSpec;

    fn presentation(&self) -> Presentation;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands() -> Presentation {
        Presentation {
            objective: "Decide".into(),
            subject: "risk".into(),
            bands: vec![
                DecisionBand::new(0.0, "low", "approve"),
                DecisionBand::new(0.2, "medium", "review"),
                DecisionBand::new(0.5, "high", "decline"),
            ],
            confidence_thresholds: None,
            limitations: vec![],
        }
    }

    #[test]
    fn bands_pick_the_highest_reached() {
        let p = bands();
        assert_eq!(p.band(0.1).unwrap().label, "low");
        assert_eq!(p.band(0.2).unwrap().label, "medium");
        assert_eq!(p.band(0.99).unwrap().label, "high");
        assert!(p.validate("x").is_ok());
    }

    #[test]
    fn unordered_bands_are_rejected() {
        let mut p = bands();
        p.bands.swap(0, 2);
        assert!(matches!(p.validate("x"), Err(EngineError::Configuration(_))));
    }

    #[test]
    fn binary_decisions_follow_the_threshold() {
        let outcome = OutcomeSpec::Binary {
            positive_label: "decline".into(),
            negative_label: "approve".into(),
            decision_threshold: 0.35,
        };
        assert_eq!(outcome.decision(0.34), "approve");
        assert_eq!(outcome.decision(0.35), "decline");
        assert!(outcome.flips(0.3, 0.4));
        assert!(!outcome.flips(0.1, 0.2));
    }

    #[test]
    fn continuous_without_threshold_never_flips() {
        let outcome = OutcomeSpec::Continuous {
            unit: "bookings".into(),
            decision_threshold: None,
            above_label: "forecast".into(),
            below_label: "forecast".into(),
        };
        assert!(!outcome.flips(10.0, 300.0));
        assert_eq!(outcome.decision(5.0), "forecast");
    }
}
