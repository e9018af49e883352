//! Stake slashing policy

use serde::{Deserialize, Serialize};

use crate::crypto::NodeId;

/// When and how much stake to slash
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlashPolicy {
    /// Nodes scoring below this are slashed
    pub reputation_threshold: f64,
    /// Fraction of the stake taken
    pub slash_fraction: f64,
}

impl Default for SlashPolicy {
    fn default() -> Self {
        Self {
            reputation_threshold: 50.0,
            slash_fraction: 0.1,
        }
    }
}

impl SlashPolicy {
    /// Fraction of stake to slash for a node with `score`
    pub fn fraction_for(&self, score: f64) -> f64 {
        if score < self.reputation_threshold && self.slash_fraction.is_finite() {
            self.slash_fraction.max(0.0)
        } else {
            0.0
        }
    }
}

/// Result of processing one audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditOutcome {
    pub node: NodeId,
    pub failures: u32,
    /// Stake actually removed
    pub slashed: f64,
    pub score_before: f64,
    pub score: f64,
    /// Stake remaining
    pub stake: f64,
    /// The slash asked for more than the balance and was clamped
    pub stake_underflow: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_for() {
        let policy = SlashPolicy::default();
        assert_eq!(policy.fraction_for(49.9), 0.1);
        assert_eq!(policy.fraction_for(50.0), 0.0);
        assert_eq!(policy.fraction_for(100.0), 0.0);

        let broken = SlashPolicy {
            slash_fraction: f64::NAN,
            ..Default::default()
        };
        assert_eq!(broken.fraction_for(0.0), 0.0);
    }
}
