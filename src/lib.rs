//! Shard Integrity - verification layer for an erasure-coded object store
//!
//! Sits between the clients of a distributed store and untrusted storage
//! nodes:
//! - Blocks are Reed-Solomon encoded so any `k` of `k + m` shards rebuild them
//! - Every shard is authenticated by a Merkle proof against the block root
//! - Shards are fetched from several replicas and accepted only by Byzantine quorum
//! - Nodes carry a decaying reputation score and a stake balance
//! - Storage is audited with HMAC challenges, failures are slashed
//! - Shards of failed nodes are re-homed onto trusted nodes with redundancy

pub mod audit;
pub mod clock;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod erasure;
pub mod integrity;
pub mod merkle;
pub mod placement;
pub mod reputation;
pub mod storage;
pub mod telemetry;

// Re-export commonly used types
pub use crypto::{derive_audit_key, AuditKey, Digest, NodeId, ShardId};
pub use config::{ConfigError, IntegrityConfig};
pub use integrity::{EncodedBlock, IntegrityError, IntegrityLayer};

// Erasure coding
pub use erasure::{ErasureCoder, ErasureConfig, ErasureError, ReconstructionSet, Shard};

// Authentication and retrieval
pub use merkle::{build_root, validate, MerkleError, MerkleProof, MerkleRoot, MerkleTree};
pub use consensus::{ByzantineRetriever, LeafAnchor, QuorumPolicy, RetrievalOutcome, ValidationFailure};

// Reputation, audits and placement
pub use reputation::{blend_score, BlendWeights, NodeRecord, ReputationConfig, ReputationLedger};
pub use audit::{AuditConfig, AuditOutcome, ChallengeResponse, ChallengeToken, SlashPolicy, StorageAuditor};
pub use placement::{RedistributionConfig, RedistributionError, RedistributionPlan, ShardRedistributor};
pub use storage::{RecordStore, StoreError};
