//! Model version identifiers.

use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::EngineError;

/// Version of a trained model: `<domain>-r<revision>-<digest>`.
///
/// `revision` increases monotonically per domain for the lifetime of a
/// registry; `digest` is a prefix of the training-data digest, so two
/// processes that trained from the same seed report the same version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelVersion {
    domain: String,
    revision: u64,
    digest: String,
}

impl ModelVersion {
    pub fn new(domain: impl Into<String>, revision: u64, digest: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            revision,
            digest: digest.into(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl core::fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-r{}-{}", self.domain, self.revision, self.digest)
    }
}

impl FromStr for ModelVersion {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::configuration(format!("invalid model version: {s:?}"));

        let (rest, digest) = s.rsplit_once('-').ok_or_else(invalid)?;
        let (domain, revision) = rest.rsplit_once("-r").ok_or_else(invalid)?;
        let revision = revision.parse::<u64>().map_err(|_| invalid())?;
        if domain.is_empty() || digest.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(domain, revision, digest))
    }
}

impl Serialize for ModelVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
