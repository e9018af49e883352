//! Aggregate configuration
//!
//! Every component reads its own section. Missing sections and fields take
//! their defaults, so a partial JSON document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::audit::AuditConfig;
use crate::consensus::QuorumPolicy;
use crate::erasure::ErasureConfig;
use crate::placement::RedistributionConfig;
use crate::reputation::ReputationConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration of the whole integrity layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    pub erasure: ErasureConfig,
    pub quorum: QuorumPolicy,
    pub reputation: ReputationConfig,
    pub audit: AuditConfig,
    pub redistribution: RedistributionConfig,
}

impl IntegrityConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.erasure
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let reputation = &self.reputation;
        if !reputation.blend.is_valid() {
            return Err(invalid("reputation blend weights must be finite and non-negative, retain within [0, 1]"));
        }
        if !(reputation.max_score.is_finite() && reputation.max_score > 0.0) {
            return Err(invalid("reputation.max_score must be positive"));
        }
        if !(reputation.initial_stake.is_finite() && reputation.initial_stake >= 0.0) {
            return Err(invalid("reputation.initial_stake must be non-negative"));
        }
        if reputation
            .reward_tiers
            .iter()
            .any(|t| !t.min_score.is_finite() || !t.multiplier.is_finite())
        {
            return Err(invalid("reward tiers must be finite"));
        }

        let slash = &self.audit.slash;
        if !(0.0..=1.0).contains(&slash.slash_fraction) {
            return Err(invalid("audit.slash.slash_fraction must be within [0, 1]"));
        }
        if !slash.reputation_threshold.is_finite() {
            return Err(invalid("audit.slash.reputation_threshold must be finite"));
        }
        if self.audit.kdf_iterations == 0 {
            return Err(invalid("audit.kdf_iterations must be at least 1"));
        }
        if !self.audit.assumed_latency_ms.is_finite() {
            return Err(invalid("audit.assumed_latency_ms must be finite"));
        }

        if self.redistribution.redundancy_factor == 0 {
            return Err(invalid("redistribution.redundancy_factor must be at least 1"));
        }
        if !self.redistribution.min_reputation.is_finite() {
            return Err(invalid("redistribution.min_reputation must be finite"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = IntegrityConfig::default();
        config.validate().unwrap();
        assert_eq!(config.erasure.data_shards, 29);
        assert_eq!(config.erasure.parity_shards, 55);
        assert_eq!(config.quorum.max_faulty, 1);
        assert_eq!(config.audit.kdf_iterations, 100_000);
        assert_eq!(config.redistribution.redundancy_factor, 3);
    }

    #[test]
    fn test_partial_document() {
        let config = IntegrityConfig::from_json_str(
            r#"{ "erasure": { "data_shards": 4, "parity_shards": 2, "block_size": 1 },
                 "reputation": { "blacklist_threshold": 40.0 } }"#,
        )
        .unwrap();

        assert_eq!(config.erasure.total_shards(), 6);
        assert_eq!(config.reputation.blacklist_threshold, 40.0);
        assert_eq!(config.reputation.initial_score, 100.0);
        assert_eq!(config.audit, AuditConfig::default());
    }

    #[test]
    fn test_rejects_invalid_values() {
        let cases = [
            r#"{ "erasure": { "data_shards": 0 } }"#,
            r#"{ "erasure": { "data_shards": 200, "parity_shards": 100 } }"#,
            r#"{ "reputation": { "blend": { "retain": 1.2 } } }"#,
            r#"{ "audit": { "kdf_iterations": 0 } }"#,
            r#"{ "audit": { "slash": { "slash_fraction": 1.5 } } }"#,
            r#"{ "redistribution": { "redundancy_factor": 0 } }"#,
        ];
        for json in cases {
            assert!(
                matches!(IntegrityConfig::from_json_str(json), Err(ConfigError::Invalid(_))),
                "accepted {}",
                json
            );
        }
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            IntegrityConfig::from_json_str("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrity.json");

        let mut config = IntegrityConfig::default();
        config.quorum.max_faulty = 2;
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(config.to_json_pretty().unwrap().as_bytes()).unwrap();

        assert_eq!(IntegrityConfig::from_json_file(&path).unwrap(), config);
        assert!(matches!(
            IntegrityConfig::from_json_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
