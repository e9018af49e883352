//! Reputation Ledger
//!
//! Holds the trust score and stake balance of every node. Each node's
//! record sits behind its own lock so updates to one node are serialized
//! while different nodes proceed in parallel.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::blend::{blend_score, BlendWeights};
use crate::clock::{elapsed_hours, Clock, SystemClock};
use crate::crypto::NodeId;

/// One step of the reward multiplier table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardTier {
    /// Lowest score that earns this multiplier
    pub min_score: f64,
    pub multiplier: f64,
}

/// Configuration for the reputation ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// Score of a node never seen before
    pub initial_score: f64,
    /// Upper clamp for scores
    pub max_score: f64,
    /// Stake balance of a node never seen before
    pub initial_stake: f64,
    /// Decay and blend weights
    pub blend: BlendWeights,
    /// Nodes scoring below this are blacklisted
    pub blacklist_threshold: f64,
    /// Reward tiers; the highest tier the score reaches applies
    pub reward_tiers: Vec<RewardTier>,
    /// Multiplier when no tier applies
    pub base_multiplier: f64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            initial_score: 100.0,
            max_score: 100.0,
            initial_stake: 100.0,
            blend: BlendWeights::default(),
            blacklist_threshold: 50.0,
            reward_tiers: vec![RewardTier {
                min_score: 90.0,
                multiplier: 1.15,
            }],
            base_multiplier: 1.0,
        }
    }
}

impl ReputationConfig {
    /// Reward multiplier for a score
    pub fn multiplier_for(&self, score: f64) -> f64 {
        self.reward_tiers
            .iter()
            .filter(|tier| score >= tier.min_score)
            .max_by(|a, b| a.min_score.total_cmp(&b.min_score))
            .map_or(self.base_multiplier, |tier| tier.multiplier)
    }

    /// Clamp a score into `[0, max_score]`
    pub fn clamp_score(&self, score: f64) -> f64 {
        if score.is_nan() {
            return 0.0;
        }
        score.clamp(0.0, self.max_score.max(0.0))
    }
}

/// Trust and stake state of a single node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: NodeId,
    /// Trust score, clamped to `[0, max_score]`
    pub score: f64,
    /// Time of the last score update (ms since epoch)
    pub last_update_ms: u64,
    /// Stake balance, never negative
    pub stake: f64,
}

impl NodeRecord {
    fn new(node_id: NodeId, config: &ReputationConfig, now_ms: u64) -> Self {
        Self {
            node_id,
            score: config.clamp_score(config.initial_score),
            last_update_ms: now_ms,
            stake: config.initial_stake.max(0.0),
        }
    }

    fn clamp(&mut self, config: &ReputationConfig) {
        self.score = config.clamp_score(self.score);
        if self.stake.is_nan() || self.stake < 0.0 {
            self.stake = 0.0;
        }
    }
}

/// Ledger of node reputations and stakes
pub struct ReputationLedger {
    config: ReputationConfig,
    clock: Arc<dyn Clock>,
    records: RwLock<HashMap<NodeId, Arc<Mutex<NodeRecord>>>>,
}

impl ReputationLedger {
    /// Create a ledger on the system clock
    pub fn new(config: ReputationConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ReputationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ReputationConfig {
        &self.config
    }

    /// Current time on the ledger's clock
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Get or create the record cell for a node
    fn cell(&self, node: &NodeId) -> Arc<Mutex<NodeRecord>> {
        if let Some(cell) = self.records.read().get(node) {
            return Arc::clone(cell);
        }

        let mut records = self.records.write();
        let cell = records.entry(node.clone()).or_insert_with(|| {
            debug!("New reputation record for: {}", node);
            Arc::new(Mutex::new(NodeRecord::new(
                node.clone(),
                &self.config,
                self.clock.now_ms(),
            )))
        });
        Arc::clone(cell)
    }

    fn existing(&self, node: &NodeId) -> Option<NodeRecord> {
        let cell = self.records.read().get(node).map(Arc::clone)?;
        let record = cell.lock().clone();
        Some(record)
    }

    /// Run `f` with exclusive access to a node's record
    ///
    /// The record is created if missing. `f` receives the current time,
    /// read while the record is locked. Score and stake are clamped
    /// after `f` returns.
    pub fn with_record<R>(&self, node: &NodeId, f: impl FnOnce(&mut NodeRecord, u64) -> R) -> R {
        let cell = self.cell(node);
        let mut record = cell.lock();
        let now = self.clock.now_ms();
        let result = f(&mut *record, now);
        record.clamp(&self.config);
        result
    }

    /// Apply decay and blend in a new observation; returns the new score
    pub fn update(&self, node: &NodeId, audit_passed: bool, latency_ms: f64) -> f64 {
        let config = &self.config;
        self.with_record(node, |record, now| {
            let hours = elapsed_hours(record.last_update_ms, now);
            let old = record.score;
            record.score = config.clamp_score(blend_score(old, hours, audit_passed, latency_ms, &config.blend));
            record.last_update_ms = now;
            debug!(
                "Reputation {}: {:.3} -> {:.3} (passed={}, latency={}ms)",
                node, old, record.score, audit_passed, latency_ms
            );
            record.score
        })
    }

    /// Current score; unseen nodes report the initial score
    pub fn get(&self, node: &NodeId) -> f64 {
        self.existing(node)
            .map_or(self.config.clamp_score(self.config.initial_score), |r| r.score)
    }

    /// Copy of a node's record, if one exists
    pub fn record(&self, node: &NodeId) -> Option<NodeRecord> {
        self.existing(node)
    }

    /// Check if node is below the blacklist threshold
    pub fn blacklisted(&self, node: &NodeId) -> bool {
        self.get(node) < self.config.blacklist_threshold
    }

    /// Reward multiplier earned by the node's current score
    pub fn reward_multiplier(&self, node: &NodeId) -> f64 {
        self.config.multiplier_for(self.get(node))
    }

    /// Current stake; unseen nodes report the initial stake
    pub fn stake(&self, node: &NodeId) -> f64 {
        self.existing(node)
            .map_or(self.config.initial_stake.max(0.0), |r| r.stake)
    }

    /// Add to a node's stake; negative or non-finite amounts are ignored
    pub fn deposit_stake(&self, node: &NodeId, amount: f64) -> f64 {
        self.with_record(node, |record, _| {
            if amount.is_finite() && amount > 0.0 {
                record.stake += amount;
            }
            record.stake
        })
    }

    /// Get all nodes sorted by score, highest first
    pub fn ranked_nodes(&self) -> Vec<(NodeId, f64)> {
        let mut result: Vec<_> = self
            .snapshot()
            .into_iter()
            .map(|r| (r.node_id, r.score))
            .collect();

        result.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        result
    }

    /// Nodes currently below the blacklist threshold
    pub fn blacklisted_nodes(&self) -> Vec<NodeId> {
        self.snapshot()
            .into_iter()
            .filter(|r| r.score < self.config.blacklist_threshold)
            .map(|r| r.node_id)
            .collect()
    }

    /// Calculate average score over tracked nodes
    pub fn average_score(&self) -> f64 {
        let records = self.snapshot();
        if records.is_empty() {
            return self.config.clamp_score(self.config.initial_score);
        }
        records.iter().map(|r| r.score).sum::<f64>() / records.len() as f64
    }

    /// Get number of tracked nodes
    pub fn node_count(&self) -> usize {
        self.records.read().len()
    }

    /// Remove node from the ledger
    pub fn remove_node(&self, node: &NodeId) -> Option<NodeRecord> {
        let cell = self.records.write().remove(node)?;
        let record = cell.lock().clone();
        Some(record)
    }

    /// Copy of every record, sorted by node
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        let cells: Vec<_> = self.records.read().values().map(Arc::clone).collect();
        let mut records: Vec<NodeRecord> = cells.iter().map(|c| c.lock().clone()).collect();
        records.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        records
    }

    /// Load records, replacing any existing entry for the same node
    pub fn restore(&self, records: impl IntoIterator<Item = NodeRecord>) {
        let mut map = self.records.write();
        for mut record in records {
            record.clamp(&self.config);
            map.insert(record.node_id.clone(), Arc::new(Mutex::new(record)));
        }
    }
}
