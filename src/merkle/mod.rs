//! Merkle authentication of shard content
//!
//! Builds the hash tree over the shards of an encoded block and validates
//! the leaf-to-root proofs nodes return alongside shard content.

mod proof;
mod tree;

pub use proof::{validate, MerkleProof, MerkleRoot, ProofStep};
pub use tree::{build_root, tree_depth, MerkleError, MerkleTree};
