//! Merkle proofs and their validation

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Digest, ShardId};

/// Root hash of the tree built over one encoded block
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MerkleRoot(pub Digest);

impl MerkleRoot {
    pub fn digest(&self) -> &Digest {
        &self.0
    }

    /// Constant-time comparison against a recomputed digest
    pub fn matches(&self, computed: &Digest) -> bool {
        self.0.ct_eq(computed)
    }
}

impl fmt::Display for MerkleRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for MerkleRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MerkleRoot({}...)", &self.0.to_hex()[..8])
    }
}

/// One level of a leaf-to-root path
///
/// The side says where the sibling sat when the parent was hashed, so the
/// fold reproduces the exact byte order used while building the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofStep {
    /// Sibling was on the left: parent = H(sibling || current)
    Left(Digest),
    /// Sibling was on the right: parent = H(current || sibling)
    Right(Digest),
    /// Trailing node without a partner: parent = H(current || "")
    Unpaired,
}

impl ProofStep {
    fn fold(&self, current: &Digest) -> Digest {
        match self {
            ProofStep::Left(sibling) => Digest::of_pair(sibling.as_bytes(), current.as_bytes()),
            ProofStep::Right(sibling) => Digest::of_pair(current.as_bytes(), sibling.as_bytes()),
            ProofStep::Unpaired => Digest::of_pair(current.as_bytes(), &[]),
        }
    }

    /// Sibling digest, if this level had one
    pub fn sibling(&self) -> Option<&Digest> {
        match self {
            ProofStep::Left(d) | ProofStep::Right(d) => Some(d),
            ProofStep::Unpaired => None,
        }
    }
}

/// Proof that `content` is a leaf of the tree with a given root
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub shard_id: ShardId,
    pub content: Vec<u8>,
    /// Sibling steps in leaf-to-root order
    pub path: Vec<ProofStep>,
}

impl MerkleProof {
    pub fn new(shard_id: ShardId, content: Vec<u8>, path: Vec<ProofStep>) -> Self {
        Self {
            shard_id,
            content,
            path,
        }
    }

    /// Leaf index the path leads from, read off the sibling sides
    ///
    /// A `Left` sibling at level `i` means bit `i` of the index is set.
    /// Returns `None` if the path is too deep for the index to fit.
    pub fn leaf_index(&self) -> Option<usize> {
        self.path.iter().enumerate().try_fold(0usize, |index, (level, step)| match step {
            ProofStep::Left(_) => u32::try_from(level)
                .ok()
                .and_then(|shift| 1usize.checked_shl(shift))
                .map(|bit| index | bit),
            ProofStep::Right(_) | ProofStep::Unpaired => Some(index),
        })
    }

    /// Number of levels between the leaf and the root
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Root obtained by rehashing the content and folding in each sibling
    pub fn computed_root(&self) -> Digest {
        self.path
            .iter()
            .fold(Digest::of(&self.content), |current, step| step.fold(&current))
    }
}

/// Check a proof against a known root
pub fn validate(root: &MerkleRoot, proof: &MerkleProof) -> bool {
    root.matches(&proof.computed_root())
}
