//! Reputation Module
//!
//! Tracks a decaying trust score and a stake balance per node. The score
//! update formula lives in [`blend`] and is shared with the auditor.

mod blend;
mod ledger;

pub use blend::{blend_score, BlendWeights};
pub use ledger::{NodeRecord, ReputationConfig, ReputationLedger, RewardTier};
