//! Erasure coding module
//!
//! Handles stripe padding, Reed-Solomon encoding and reconstruction,
//! and the durability estimate.

pub mod coder;
pub mod durability;
pub mod padding;

pub use coder::{ErasureCoder, ErasureConfig, ErasureError, ReconstructionSet, Shard, MAX_TOTAL_SHARDS};
pub use durability::durability_probability;
