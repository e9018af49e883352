//! Shard Redistributor
//!
//! Re-homes the shards of a failed node onto trusted nodes. Each shard gets
//! a primary copy plus replicas on distinct nodes, always picking the node
//! with the lowest load accumulated during the current call.

mod plan;

pub use plan::{DegradedShard, RedistributionPlan, ShardLocation};

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crypto::{NodeId, ShardId};
use crate::reputation::ReputationLedger;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedistributionError {
    #[error("No eligible nodes to receive shards of {failed}")]
    NoEligibleNodes { failed: NodeId },
}

/// Configuration for shard redistribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedistributionConfig {
    /// Lowest reputation a node may have to receive shards
    pub min_reputation: f64,
    /// Copies wanted per shard, primary included
    pub redundancy_factor: usize,
}

impl Default for RedistributionConfig {
    fn default() -> Self {
        Self {
            min_reputation: 80.0,
            redundancy_factor: 3,
        }
    }
}

/// Candidate node and its in-call load
struct Candidate {
    node: NodeId,
    capacity: u64,
    load: u64,
}

impl Candidate {
    fn has_room(&self) -> bool {
        self.load < self.capacity
    }
}

/// Shard redistributor
pub struct ShardRedistributor {
    ledger: Arc<ReputationLedger>,
    config: RedistributionConfig,
}

impl ShardRedistributor {
    pub fn new(ledger: Arc<ReputationLedger>, config: RedistributionConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &RedistributionConfig {
        &self.config
    }

    /// Nodes allowed to receive shards, sorted by id
    fn candidates(&self, failed: &NodeId, capacities: &HashMap<NodeId, u64>) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = capacities
            .iter()
            .filter(|(node, capacity)| {
                if *node == failed || **capacity == 0 {
                    return false;
                }
                let score = self.ledger.get(node);
                if score < self.config.min_reputation {
                    debug!("Skipping {} for placement: score {:.3}", node, score);
                    return false;
                }
                true
            })
            .map(|(node, capacity)| Candidate {
                node: node.clone(),
                capacity: *capacity,
                load: 0,
            })
            .collect();

        candidates.sort_by(|a, b| a.node.cmp(&b.node));
        candidates
    }

    /// Plan new homes for the shards held by `failed`
    ///
    /// `capacities` gives the number of shard copies each node can take.
    /// Load counters live only for this call. When fewer eligible nodes
    /// than the redundancy factor exist the shard is placed with fewer
    /// replicas instead of failing.
    pub fn redistribute(
        &self,
        failed: &NodeId,
        shard_ids: &[ShardId],
        capacities: &HashMap<NodeId, u64>,
    ) -> Result<RedistributionPlan, RedistributionError> {
        self.redistribute_around(failed, shard_ids, capacities, &HashSet::new())
    }

    /// Like [`redistribute`](Self::redistribute), keeping clear of copies
    /// that still exist elsewhere
    ///
    /// `shard_ids` are the storage keys the failed node held, primaries or
    /// replicas. Each lost key is re-homed under its own name and the
    /// shard is topped up to the redundancy factor with replica keys
    /// numbered past the highest ordinal in use, so no key in the plan
    /// collides with another or with a key listed in `live`. Repeated
    /// keys are placed once.
    pub fn redistribute_around(
        &self,
        failed: &NodeId,
        shard_ids: &[ShardId],
        capacities: &HashMap<NodeId, u64>,
        live: &HashSet<ShardId>,
    ) -> Result<RedistributionPlan, RedistributionError> {
        let mut candidates = self.candidates(failed, capacities);
        if candidates.is_empty() {
            warn!("No eligible nodes to take over shards of {}", failed);
            return Err(RedistributionError::NoEligibleNodes { failed: failed.clone() });
        }

        let timestamp_ms = self.ledger.now_ms();
        let mut plan = RedistributionPlan::default();

        for (base, lost) in group_lost_keys(shard_ids, live) {
            let keys = copy_keys(&base, lost, live, self.config.redundancy_factor.max(1));
            let wanted = keys.len();
            let mut chosen: Vec<usize> = Vec::with_capacity(wanted);

            for key in keys {
                let pick = candidates
                    .iter()
                    .enumerate()
                    .filter(|(i, c)| c.has_room() && !chosen.contains(i))
                    .min_by_key(|(i, c)| (c.load, *i))
                    .map(|(i, _)| i);

                let Some(i) = pick else { break };
                chosen.push(i);

                let candidate = &mut candidates[i];
                candidate.load += 1;

                plan.assignments
                    .entry(candidate.node.clone())
                    .or_default()
                    .push(key.clone());
                plan.metadata_updates.insert(
                    key,
                    ShardLocation {
                        location: candidate.node.clone(),
                        timestamp_ms,
                    },
                );
            }

            match chosen.len() {
                0 => {
                    warn!("Shard {} UNPLACED: no node has capacity left", base);
                    plan.unplaced.push(base);
                }
                placed if placed < wanted => {
                    warn!("Shard {} DEGRADED: {} of {} copies placed", base, placed, wanted);
                    plan.degraded.push(DegradedShard {
                        shard_id: base,
                        placed,
                        wanted,
                    });
                }
                _ => {}
            }
        }

        info!(
            "Redistributed {} shards from {} as {} copies on {} nodes",
            shard_ids.len(),
            failed,
            plan.placed_copies(),
            plan.assignments.len()
        );
        Ok(plan)
    }
}

/// Lost keys grouped by primary id, first-seen order, duplicates and live
/// keys dropped
fn group_lost_keys(shard_ids: &[ShardId], live: &HashSet<ShardId>) -> Vec<(ShardId, Vec<ShardId>)> {
    let mut groups: Vec<(ShardId, Vec<ShardId>)> = Vec::new();
    let mut seen: HashSet<&ShardId> = HashSet::new();

    for id in shard_ids {
        if live.contains(id) || !seen.insert(id) {
            debug!("Skipping {}: repeated or still live", id);
            continue;
        }
        let base = id.base();
        match groups.iter_mut().find(|(b, _)| *b == base) {
            Some((_, lost)) => lost.push(id.clone()),
            None => groups.push((base, vec![id.clone()])),
        }
    }
    groups
}

/// Storage keys to place for one shard: the lost keys, then fresh replica
/// keys until `redundancy` copies are reached
fn copy_keys(base: &ShardId, lost: Vec<ShardId>, live: &HashSet<ShardId>, redundancy: usize) -> Vec<ShardId> {
    let highest = lost
        .iter()
        .chain(live.iter().filter(|k| k.base() == *base))
        .map(|k| k.replica_ordinal().unwrap_or(0))
        .max()
        .unwrap_or(0);

    let mut keys = lost;
    let mut next = highest + 1;
    while keys.len() < redundancy {
        keys.push(base.replica(next));
        next += 1;
    }
    keys
}
