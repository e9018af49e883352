//! Reputation blend formula
//!
//! The one place the decay-and-blend update is defined. The ledger uses it
//! for ordinary updates and the auditor uses it when an audit fails.

use serde::{Deserialize, Serialize};

/// Weights of the reputation update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendWeights {
    /// Share of the decayed old score kept on each update
    pub retain: f64,
    /// Weight of the audit-pass indicator in the evidence term
    pub audit_weight: f64,
    /// Weight of the inverse-latency term in the evidence term
    pub latency_weight: f64,
    /// Multiplier applied to the evidence term
    pub evidence_scale: f64,
    /// Exponential decay per elapsed hour
    pub decay_rate: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            retain: 0.7,
            audit_weight: 0.8,
            latency_weight: 0.2,
            evidence_scale: 1.0,
            decay_rate: 0.01,
        }
    }
}

impl BlendWeights {
    /// Whether every weight is finite and `retain` lies in [0, 1]
    pub fn is_valid(&self) -> bool {
        [
            self.retain,
            self.audit_weight,
            self.latency_weight,
            self.evidence_scale,
            self.decay_rate,
        ]
        .iter()
        .all(|w| w.is_finite() && *w >= 0.0)
            && self.retain <= 1.0
    }
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Decay `old_score` over `elapsed_hours`, then blend in new evidence
///
/// ```text
/// decayed  = old * e^(-decay_rate * hours)
/// evidence = audit_weight * [passed] + latency_weight / max(latency_ms, 1)
/// new      = retain * decayed + (1 - retain) * evidence_scale * evidence
/// ```
///
/// Non-finite inputs count as zero. The caller clamps the result.
pub fn blend_score(
    old_score: f64,
    elapsed_hours: f64,
    audit_passed: bool,
    latency_ms: f64,
    weights: &BlendWeights,
) -> f64 {
    let hours = finite_or_zero(elapsed_hours).max(0.0);
    let decayed = finite_or_zero(old_score) * (-weights.decay_rate * hours).exp();

    let audit_term = if audit_passed { 1.0 } else { 0.0 };
    let latency_term = if latency_ms.is_finite() {
        1.0 / latency_ms.max(1.0)
    } else {
        0.0
    };
    let evidence = weights.audit_weight * audit_term + weights.latency_weight * latency_term;

    weights.retain * decayed + (1.0 - weights.retain) * weights.evidence_scale * evidence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_failed_audit_without_elapsed_time() {
        let w = BlendWeights::default();
        // 0.7 * 100 + 0.3 * (0.2 / 50)
        assert!(close(blend_score(100.0, 0.0, false, 50.0, &w), 70.0012));
    }

    #[test]
    fn test_passed_audit_with_decay() {
        let w = BlendWeights::default();
        let expected = 0.7 * 80.0 * (-0.01_f64 * 24.0).exp() + 0.3 * (0.8 + 0.2);
        assert!(close(blend_score(80.0, 24.0, true, 0.5, &w), expected));
    }

    #[test]
    fn test_latency_floor_and_non_finite_inputs() {
        let w = BlendWeights::default();
        // Latencies under 1ms count as 1ms
        assert!(close(
            blend_score(0.0, 0.0, false, 0.0, &w),
            blend_score(0.0, 0.0, false, 1.0, &w)
        ));
        assert!(close(blend_score(0.0, 0.0, false, f64::INFINITY, &w), 0.0));
        assert!(close(blend_score(f64::NAN, f64::NAN, false, f64::NAN, &w), 0.0));
    }

    #[test]
    fn test_weight_validation() {
        assert!(BlendWeights::default().is_valid());
        assert!(!BlendWeights { retain: 1.5, ..Default::default() }.is_valid());
        assert!(!BlendWeights { decay_rate: -0.1, ..Default::default() }.is_valid());
        assert!(!BlendWeights { audit_weight: f64::NAN, ..Default::default() }.is_valid());
    }
}
