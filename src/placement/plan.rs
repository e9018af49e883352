//! Redistribution plans

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crypto::{NodeId, ShardId};

/// Where a copy of a shard now lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardLocation {
    pub location: NodeId,
    /// Time of placement (ms since epoch)
    pub timestamp_ms: u64,
}

/// Shard that received fewer copies than the redundancy factor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedShard {
    pub shard_id: ShardId,
    pub placed: usize,
    pub wanted: usize,
}

/// Output of one redistribution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedistributionPlan {
    /// Node to the copies assigned to it, in assignment order
    pub assignments: BTreeMap<NodeId, Vec<ShardId>>,
    /// Location of every placed copy, keyed by its storage id
    pub metadata_updates: BTreeMap<ShardId, ShardLocation>,
    /// Shards placed with reduced redundancy
    pub degraded: Vec<DegradedShard>,
    /// Shards no node had room for
    pub unplaced: Vec<ShardId>,
}

impl RedistributionPlan {
    /// Total copies placed
    pub fn placed_copies(&self) -> usize {
        self.metadata_updates.len()
    }

    /// Nodes holding a copy of `shard_id` (primary or replica)
    pub fn holders(&self, shard_id: &ShardId) -> Vec<&NodeId> {
        self.metadata_updates
            .iter()
            .filter(|(id, _)| id.base() == *shard_id)
            .map(|(_, loc)| &loc.location)
            .collect()
    }

    /// Whether every shard got its full redundancy
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty() && self.unplaced.is_empty()
    }
}
