//! Replica Validation Module
//!
//! Checks one node-supplied proof against the known root for a shard.
//! A failed check only excludes that replica from the quorum.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{Digest, NodeId, ShardId};
use crate::merkle::{self, tree_depth, MerkleProof, MerkleRoot};

/// Where a shard sits in its block's Merkle tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafAnchor {
    pub root: MerkleRoot,
    /// Leaf index of the shard
    pub index: usize,
    /// Levels between the leaf and the root
    pub depth: usize,
}

impl LeafAnchor {
    /// Anchor for leaf `index` of a tree over `leaf_count` leaves
    pub fn new(root: MerkleRoot, index: usize, leaf_count: usize) -> Self {
        Self {
            root,
            index,
            depth: tree_depth(leaf_count),
        }
    }

    /// Whether the proof's path has this leaf's depth and side pattern
    pub fn admits(&self, proof: &MerkleProof) -> bool {
        proof.depth() == self.depth && proof.leaf_index() == Some(self.index)
    }
}

/// Why a replica was excluded from the quorum
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationFailure {
    /// No root is registered for the requested shard, so nothing can be trusted
    #[error("No known root for shard")]
    UnknownShard,
    /// The proof is for a different shard than the one requested
    #[error("Proof names a different shard")]
    ShardIdMismatch,
    /// The path leads from a different leaf than the one registered
    #[error("Proof path does not lead from the registered leaf")]
    PositionMismatch,
    /// Rehashing content and path does not reproduce the root
    #[error("Proof does not reproduce the root")]
    RootMismatch,
}

/// Status of one replica after validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    /// Proof checked out; content is identified by its digest
    Validated { content_digest: Digest },
    /// Proof rejected
    Rejected(ValidationFailure),
}

/// Validation report for a single replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaValidation {
    /// Node that supplied the replica
    pub node: NodeId,
    pub status: ValidationStatus,
}

impl ReplicaValidation {
    /// Check `proof` from `node` for `requested` against its anchor
    ///
    /// The proof must name the requested shard, lead from the anchored
    /// leaf position and reproduce the anchored root.
    pub fn check(
        requested: &ShardId,
        anchor: Option<&LeafAnchor>,
        node: &NodeId,
        proof: &MerkleProof,
    ) -> Self {
        let status = match anchor {
            None => ValidationStatus::Rejected(ValidationFailure::UnknownShard),
            Some(_) if proof.shard_id != *requested => {
                ValidationStatus::Rejected(ValidationFailure::ShardIdMismatch)
            }
            Some(anchor) if !anchor.admits(proof) => {
                ValidationStatus::Rejected(ValidationFailure::PositionMismatch)
            }
            Some(anchor) if !merkle::validate(&anchor.root, proof) => {
                ValidationStatus::Rejected(ValidationFailure::RootMismatch)
            }
            Some(_) => ValidationStatus::Validated {
                content_digest: Digest::of(&proof.content),
            },
        };

        Self {
            node: node.clone(),
            status,
        }
    }

    /// Check if this replica passed validation
    pub fn is_valid(&self) -> bool {
        matches!(self.status, ValidationStatus::Validated { .. })
    }

    pub fn failure(&self) -> Option<ValidationFailure> {
        match self.status {
            ValidationStatus::Rejected(f) => Some(f),
            ValidationStatus::Validated { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::MerkleTree;

    fn fixture() -> (LeafAnchor, MerkleProof) {
        let leaves = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
        let tree = MerkleTree::build(&leaves).unwrap();
        let proof = tree.proof(1, ShardId::for_index(1), b"b".to_vec()).unwrap();
        (LeafAnchor::new(tree.root(), 1, leaves.len()), proof)
    }

    #[test]
    fn test_validated_replica() {
        let (anchor, proof) = fixture();
        let node = NodeId::from("node-1");

        let v = ReplicaValidation::check(&ShardId::for_index(1), Some(&anchor), &node, &proof);
        assert!(v.is_valid());
        assert_eq!(
            v.status,
            ValidationStatus::Validated {
                content_digest: Digest::of(b"b")
            }
        );
    }

    #[test]
    fn test_rejections() {
        let (anchor, proof) = fixture();
        let node = NodeId::from("node-1");
        let wanted = ShardId::for_index(1);

        let unknown = ReplicaValidation::check(&wanted, None, &node, &proof);
        assert_eq!(unknown.failure(), Some(ValidationFailure::UnknownShard));

        let other = ReplicaValidation::check(&ShardId::for_index(2), Some(&anchor), &node, &proof);
        assert_eq!(other.failure(), Some(ValidationFailure::ShardIdMismatch));

        let mut tampered = proof.clone();
        tampered.content = b"B".to_vec();
        let bad = ReplicaValidation::check(&wanted, Some(&anchor), &node, &tampered);
        assert_eq!(bad.failure(), Some(ValidationFailure::RootMismatch));
    }

    #[test]
    fn test_proof_for_another_leaf_rejected() {
        let leaves: Vec<Vec<u8>> = (0..4).map(|i| vec![i as u8; 8]).collect();
        let tree = MerkleTree::build(&leaves).unwrap();
        let node = NodeId::from("node-1");
        let wanted = ShardId::for_index(2);
        let anchor = LeafAnchor::new(tree.root(), 2, leaves.len());

        // leaf 3's genuine proof, relabelled as shard 2
        let mut moved = tree.proof(3, ShardId::for_index(3), leaves[3].clone()).unwrap();
        assert!(merkle::validate(&tree.root(), &moved));
        moved.shard_id = wanted.clone();

        let v = ReplicaValidation::check(&wanted, Some(&anchor), &node, &moved);
        assert_eq!(v.failure(), Some(ValidationFailure::PositionMismatch));

        // a truncated path cannot pass an interior node off as a leaf
        let mut shallow = tree.proof(2, wanted.clone(), leaves[2].clone()).unwrap();
        shallow.path.pop();
        let v = ReplicaValidation::check(&wanted, Some(&anchor), &node, &shallow);
        assert_eq!(v.failure(), Some(ValidationFailure::PositionMismatch));
    }
}
