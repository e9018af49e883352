//! Consensus Module
//!
//! Byzantine-tolerant shard retrieval. Each node-supplied proof is
//! validated on its own against the known Merkle root; the validated
//! contents are then tallied and the majority value is returned only if
//! enough replicas agree on it.

mod validation;
mod voting;

pub use validation::{LeafAnchor, ReplicaValidation, ValidationFailure, ValidationStatus};
pub use voting::{ContentTally, QuorumPolicy};

use crate::crypto::{NodeId, ShardId};
use crate::merkle::{MerkleProof, MerkleRoot};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Result of a retrieval attempt
///
/// Falling below quorum is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// Enough validated replicas agreed on one content
    Accepted {
        shard_id: ShardId,
        content: Vec<u8>,
        agreeing: usize,
        required: usize,
        excluded: Vec<(NodeId, ValidationFailure)>,
    },
    /// No content reached the required agreement
    BelowQuorum {
        shard_id: ShardId,
        agreeing: usize,
        required: usize,
        excluded: Vec<(NodeId, ValidationFailure)>,
    },
}

impl RetrievalOutcome {
    /// Check if the retrieval produced content
    pub fn is_accepted(&self) -> bool {
        matches!(self, RetrievalOutcome::Accepted { .. })
    }

    /// The agreed content, if any
    pub fn content(&self) -> Option<&[u8]> {
        match self {
            RetrievalOutcome::Accepted { content, .. } => Some(content),
            RetrievalOutcome::BelowQuorum { .. } => None,
        }
    }

    pub fn into_content(self) -> Option<Vec<u8>> {
        match self {
            RetrievalOutcome::Accepted { content, .. } => Some(content),
            RetrievalOutcome::BelowQuorum { .. } => None,
        }
    }

    /// Replicas agreeing on the leading content
    pub fn agreeing(&self) -> usize {
        match self {
            RetrievalOutcome::Accepted { agreeing, .. } => *agreeing,
            RetrievalOutcome::BelowQuorum { agreeing, .. } => *agreeing,
        }
    }

    pub fn required(&self) -> usize {
        match self {
            RetrievalOutcome::Accepted { required, .. } => *required,
            RetrievalOutcome::BelowQuorum { required, .. } => *required,
        }
    }

    /// Replicas excluded by validation, sorted by node
    pub fn excluded(&self) -> &[(NodeId, ValidationFailure)] {
        match self {
            RetrievalOutcome::Accepted { excluded, .. } => excluded,
            RetrievalOutcome::BelowQuorum { excluded, .. } => excluded,
        }
    }
}

/// Quorum-validated shard retrieval
pub struct ByzantineRetriever {
    policy: QuorumPolicy,
    anchors: RwLock<HashMap<ShardId, LeafAnchor>>,
    accepted: AtomicU64,
    below_quorum: AtomicU64,
    replicas_excluded: AtomicU64,
}

impl ByzantineRetriever {
    /// Create a new retriever
    pub fn new(policy: QuorumPolicy) -> Self {
        Self {
            policy,
            anchors: RwLock::new(HashMap::new()),
            accepted: AtomicU64::new(0),
            below_quorum: AtomicU64::new(0),
            replicas_excluded: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &QuorumPolicy {
        &self.policy
    }

    /// Record the trusted root and leaf position for a shard
    pub fn register_root(&self, shard_id: ShardId, anchor: LeafAnchor) {
        debug!(
            "Registered root {} for shard {} at leaf {}",
            anchor.root, shard_id, anchor.index
        );
        self.anchors.write().insert(shard_id, anchor);
    }

    /// Record every shard of a block, in leaf order, under one root
    pub fn register_block<'a>(&self, shard_ids: impl IntoIterator<Item = &'a ShardId>, root: MerkleRoot) {
        let ids: Vec<&ShardId> = shard_ids.into_iter().collect();
        let leaf_count = ids.len();
        let mut anchors = self.anchors.write();
        for (index, id) in ids.into_iter().enumerate() {
            anchors.insert(id.clone(), LeafAnchor::new(root, index, leaf_count));
        }
    }

    /// Forget a shard's root; later retrievals of it fail closed
    pub fn forget_root(&self, shard_id: &ShardId) -> bool {
        self.anchors.write().remove(shard_id).is_some()
    }

    pub fn known_root(&self, shard_id: &ShardId) -> Option<MerkleRoot> {
        self.anchor(shard_id).map(|a| a.root)
    }

    pub fn anchor(&self, shard_id: &ShardId) -> Option<LeafAnchor> {
        self.anchors.read().get(shard_id).copied()
    }

    /// Retrieve a shard from the proofs returned by nodes
    ///
    /// Every proof is validated independently; rejected replicas are
    /// excluded and reported. The most common validated content is
    /// returned if at least `policy.required_agreement(n)` replicas agree.
    pub fn retrieve_shard(
        &self,
        shard_id: &ShardId,
        replicas: &HashMap<NodeId, MerkleProof>,
    ) -> RetrievalOutcome {
        let anchor = self.anchor(shard_id);
        let required = self.policy.required_agreement(replicas.len());

        let mut checked: Vec<(ReplicaValidation, &MerkleProof)> = replicas
            .par_iter()
            .map(|(node, proof)| (ReplicaValidation::check(shard_id, anchor.as_ref(), node, proof), proof))
            .collect();
        checked.sort_by(|a, b| a.0.node.cmp(&b.0.node));

        let mut tally = ContentTally::new();
        let mut excluded = Vec::new();

        for (validation, proof) in &checked {
            match validation.status {
                ValidationStatus::Validated { content_digest } => {
                    tally.add(content_digest, &proof.content);
                }
                ValidationStatus::Rejected(failure) => {
                    debug!("Excluding replica from {} for {}: {}", validation.node, shard_id, failure);
                    excluded.push((validation.node.clone(), failure));
                }
            }
        }

        self.replicas_excluded
            .fetch_add(excluded.len() as u64, Ordering::Relaxed);

        match tally.leader() {
            Some((content, agreeing)) if agreeing >= required => {
                info!(
                    "Shard {} ACCEPTED with {}/{} agreeing replicas",
                    shard_id, agreeing, required
                );
                self.accepted.fetch_add(1, Ordering::Relaxed);
                RetrievalOutcome::Accepted {
                    shard_id: shard_id.clone(),
                    content: content.to_vec(),
                    agreeing,
                    required,
                    excluded,
                }
            }
            leader => {
                let agreeing = leader.map_or(0, |(_, count)| count);
                warn!(
                    "Shard {} BELOW QUORUM: {}/{} agreeing, {} excluded",
                    shard_id,
                    agreeing,
                    required,
                    excluded.len()
                );
                self.below_quorum.fetch_add(1, Ordering::Relaxed);
                RetrievalOutcome::BelowQuorum {
                    shard_id: shard_id.clone(),
                    agreeing,
                    required,
                    excluded,
                }
            }
        }
    }

    /// Get statistics about retrievals so far
    pub fn stats(&self) -> RetrievalStats {
        RetrievalStats {
            known_roots: self.anchors.read().len(),
            accepted: self.accepted.load(Ordering::Relaxed),
            below_quorum: self.below_quorum.load(Ordering::Relaxed),
            replicas_excluded: self.replicas_excluded.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about the retriever
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalStats {
    pub known_roots: usize,
    pub accepted: u64,
    pub below_quorum: u64,
    pub replicas_excluded: u64,
}
