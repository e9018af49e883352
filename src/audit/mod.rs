//! Storage Auditor
//!
//! Issues proof-of-storage challenges, checks responses and turns failed
//! audits into reputation penalties and stake slashing.

mod challenge;
mod slashing;

pub use challenge::{
    compute_response, verify_response, ChallengeResponse, ChallengeToken, Nonce, NonceSource,
    NONCE_LEN, RESPONSE_LEN,
};
pub use slashing::{AuditOutcome, SlashPolicy};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::elapsed_hours;
use crate::crypto::{self, AuditKey, KeyDerivationError, NodeId, DEFAULT_KDF_ITERATIONS};
use crate::reputation::{blend_score, ReputationLedger};

/// Configuration for the storage auditor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub slash: SlashPolicy,
    /// Latency fed into the reputation blend for a failed audit
    pub assumed_latency_ms: f64,
    /// PBKDF2 iterations for audit key derivation
    pub kdf_iterations: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            slash: SlashPolicy::default(),
            assumed_latency_ms: 1.0,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
        }
    }
}

/// Counters reported by [`StorageAuditor::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub challenges_issued: u64,
    pub audits_processed: u64,
    pub slashes: u64,
    /// Issued challenges not yet redeemed or revoked
    pub outstanding: u64,
}

/// Challenges nodes and penalizes the ones that fail
///
/// Every issued challenge is remembered until a response redeems it, so a
/// token the auditor never issued, or one already answered, counts as a
/// failed challenge.
pub struct StorageAuditor {
    ledger: Arc<ReputationLedger>,
    config: AuditConfig,
    nonces: NonceSource,
    issued: Mutex<HashMap<Nonce, ChallengeToken>>,
    audits_processed: AtomicU64,
    slashes: AtomicU64,
}

impl StorageAuditor {
    pub fn new(ledger: Arc<ReputationLedger>, config: AuditConfig) -> Self {
        Self {
            ledger,
            config,
            nonces: NonceSource::new(),
            issued: Mutex::new(HashMap::new()),
            audits_processed: AtomicU64::new(0),
            slashes: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<ReputationLedger> {
        &self.ledger
    }

    /// Issue a challenge for a shard the auditor holds a copy of
    pub fn generate_challenge(&self, shard: &[u8]) -> ChallengeToken {
        let nonce = self.nonces.next_nonce();
        let token = ChallengeToken {
            nonce,
            expected: compute_response(&nonce, shard),
        };
        self.issued.lock().insert(nonce, token.clone());
        debug!("Issued challenge {:?} over {} bytes", nonce, shard.len());
        token
    }

    /// Withdraw an outstanding challenge, returns false if it was not pending
    pub fn revoke(&self, nonce: &Nonce) -> bool {
        self.issued.lock().remove(nonce).is_some()
    }

    pub fn outstanding_challenges(&self) -> usize {
        self.issued.lock().len()
    }

    /// Consume the issued challenge behind `response` and check the answer
    ///
    /// The answer is compared against the value recorded at issue time,
    /// never the one carried in the returned token.
    fn redeem(&self, node: &NodeId, response: &ChallengeResponse) -> bool {
        let Some(issued) = self.issued.lock().remove(&response.token.nonce) else {
            warn!(
                "Node {} answered challenge {:?} that is not outstanding",
                node, response.token.nonce
            );
            return false;
        };
        if issued.expected != response.token.expected {
            warn!("Node {} returned an altered token for {:?}", node, issued.nonce);
        }
        issued.accepts(&response.response)
    }

    /// What an honest node holding `shard` answers to `nonce`
    pub fn respond(nonce: &Nonce, shard: &[u8]) -> Vec<u8> {
        compute_response(nonce, shard).to_vec()
    }

    /// Check a node's response against the shard content
    pub fn verify_response(&self, nonce: &Nonce, shard: &[u8], claimed: &[u8]) -> bool {
        verify_response(nonce, shard, claimed)
    }

    /// Apply the result of an audit with `failures` failed challenges
    ///
    /// Slashing is decided on the score held before this audit. A failed
    /// audit then blends a failed observation into the score.
    pub fn process_audit(&self, node: &NodeId, failures: u32) -> AuditOutcome {
        let policy = self.config.slash;
        let assumed_latency = self.config.assumed_latency_ms;
        let reputation = self.ledger.config();

        let outcome = self.ledger.with_record(node, |record, now| {
            let score_before = record.score;
            let fraction = policy.fraction_for(score_before);

            if failures > 0 {
                let hours = elapsed_hours(record.last_update_ms, now);
                let blended = blend_score(score_before, hours, false, assumed_latency, &reputation.blend);
                record.score = reputation.clamp_score(blended);
                record.last_update_ms = now;
            }

            let requested = record.stake * fraction;
            let slashed = requested.min(record.stake).max(0.0);
            record.stake = (record.stake - slashed).max(0.0);

            AuditOutcome {
                node: node.clone(),
                failures,
                slashed,
                score_before,
                score: record.score,
                stake: record.stake,
                stake_underflow: requested > slashed,
            }
        });

        self.audits_processed.fetch_add(1, Ordering::Relaxed);
        if outcome.slashed > 0.0 {
            self.slashes.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Node {} SLASHED {:.3} stake (score {:.3}, {} failures)",
                node, outcome.slashed, outcome.score_before, failures
            );
        }
        if outcome.stake_underflow {
            warn!("Node {} slash exceeded its stake, clamped to zero", node);
        }
        if failures > 0 {
            info!(
                "Node {} failed {} challenges, score {:.3} -> {:.3}",
                node, failures, outcome.score_before, outcome.score
            );
        }

        outcome
    }

    /// Check a batch of responses and process the resulting audit
    ///
    /// Each response redeems its challenge. Forged, replayed and revoked
    /// challenges count as failures.
    pub fn audit_node(&self, node: &NodeId, responses: &[ChallengeResponse]) -> AuditOutcome {
        let failures = responses.iter().filter(|r| !self.redeem(node, r)).count();
        let failures = u32::try_from(failures).unwrap_or(u32::MAX);
        debug!("Audit of {}: {}/{} challenges failed", node, failures, responses.len());
        self.process_audit(node, failures)
    }

    /// Derive an audit key with the configured iteration count
    pub fn derive_audit_key(&self, passphrase: &str, salt: &[u8]) -> Result<AuditKey, KeyDerivationError> {
        crypto::derive_audit_key(passphrase, salt, self.config.kdf_iterations)
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            challenges_issued: self.nonces.issued(),
            audits_processed: self.audits_processed.load(Ordering::Relaxed),
            slashes: self.slashes.load(Ordering::Relaxed),
            outstanding: u64::try_from(self.outstanding_challenges()).unwrap_or(u64::MAX),
        }
    }
}
