//! Binary hash tree over shard contents
//!
//! Leaves are BLAKE3 hashes of shard content. Each level hashes adjacent
//! pairs left to right; a trailing node without a partner is hashed with an
//! empty right-hand side rather than duplicated.

use thiserror::Error;

use super::proof::{MerkleProof, MerkleRoot, ProofStep};
use crate::crypto::{Digest, ShardId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("Cannot build a tree with no leaves")]
    EmptyTree,
    #[error("Leaf {index} out of range for {leaves} leaves")]
    LeafOutOfRange { index: usize, leaves: usize },
    #[error("Content does not hash to leaf {index}")]
    ContentMismatch { index: usize },
}

/// Every level of a Merkle tree, leaves first
#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree over the given leaf contents
    pub fn build<L: AsRef<[u8]>>(leaves: &[L]) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyTree);
        }

        let mut levels = vec![leaves.iter().map(|l| Digest::of(l.as_ref())).collect::<Vec<_>>()];

        while let Some(level) = levels.last().filter(|l| l.len() > 1) {
            let next = level
                .chunks(2)
                .map(|pair| match pair.get(1) {
                    Some(right) => Digest::of_pair(pair[0].as_bytes(), right.as_bytes()),
                    None => Digest::of_pair(pair[0].as_bytes(), &[]),
                })
                .collect();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    pub fn root(&self) -> MerkleRoot {
        // build() guarantees a final level with exactly one digest
        MerkleRoot(self.levels[self.levels.len() - 1][0])
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Levels between a leaf and the root
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn leaf(&self, index: usize) -> Option<&Digest> {
        self.levels[0].get(index)
    }

    /// Sibling path for the leaf at `index`
    pub fn path(&self, index: usize) -> Result<Vec<ProofStep>, MerkleError> {
        if index >= self.leaf_count() {
            return Err(MerkleError::LeafOutOfRange {
                index,
                leaves: self.leaf_count(),
            });
        }

        let mut path = Vec::with_capacity(self.levels.len() - 1);
        let mut i = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if i % 2 == 1 {
                ProofStep::Left(level[i - 1])
            } else {
                match level.get(i + 1) {
                    Some(sibling) => ProofStep::Right(*sibling),
                    None => ProofStep::Unpaired,
                }
            };
            path.push(step);
            i /= 2;
        }

        Ok(path)
    }

    /// Proof for the leaf at `index`, carrying its content
    pub fn proof(&self, index: usize, shard_id: ShardId, content: Vec<u8>) -> Result<MerkleProof, MerkleError> {
        let path = self.path(index)?;
        if self.leaf(index) != Some(&Digest::of(&content)) {
            return Err(MerkleError::ContentMismatch { index });
        }
        Ok(MerkleProof::new(shard_id, content, path))
    }
}

/// Depth of a tree over `leaf_count` leaves
pub fn tree_depth(leaf_count: usize) -> usize {
    let mut width = leaf_count;
    let mut depth = 0;
    while width > 1 {
        width = width.div_ceil(2);
        depth += 1;
    }
    depth
}

/// Root of the tree over `leaves`
pub fn build_root<L: AsRef<[u8]>>(leaves: &[L]) -> Result<MerkleRoot, MerkleError> {
    Ok(MerkleTree::build(leaves)?.root())
}
