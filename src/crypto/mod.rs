//! Cryptography module
//!
//! Provides content digests, shard/node identifiers and audit-key derivation.

pub mod hashing;
pub mod keys;

pub use hashing::{Digest, NodeId, ShardId, DIGEST_LEN};
pub use keys::{derive_audit_key, generate_salt, AuditKey, KeyDerivationError, DEFAULT_KDF_ITERATIONS};
