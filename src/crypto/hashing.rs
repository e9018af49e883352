//! Content hashing and identifiers using BLAKE3
//!
//! Every leaf, interior Merkle node and content tally is keyed by a
//! 32-byte BLAKE3 digest. Shards and nodes are named by string
//! identifiers so collaborators can map them onto their own addressing.

use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Length of every digest produced by this crate
pub const DIGEST_LEN: usize = 32;

/// A 32-byte BLAKE3 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    /// Hash a single byte string
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash the concatenation `left || right` without allocating
    pub fn of_pair(left: &[u8], right: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(left);
        hasher.update(right);
        Self(*hasher.finalize().as_bytes())
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Constant-time equality
    pub fn ct_eq(&self, other: &Digest) -> bool {
        self.0.ct_eq(&other.0).into()
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}...)", &self.to_hex()[..8])
    }
}

/// Separator between a shard id and its replica ordinal
const REPLICA_SEPARATOR: &str = "#r";

/// Identifier of a shard (or of one stored copy of it)
///
/// Primary ids are derived from the shard's index in its encoded block,
/// optionally scoped by a block label. Replica copies are distinct storage
/// keys of the form `{primary}#r{n}` so every copy has its own metadata
/// entry; [`ShardId::base`] recovers the primary id.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId(String);

impl ShardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id of the shard at `index` within an unlabelled block
    pub fn for_index(index: usize) -> Self {
        Self(format!("shard-{}", index))
    }

    /// Id of the shard at `index` within the block named `block`
    pub fn scoped(block: &str, index: usize) -> Self {
        Self(format!("{}/shard-{}", block, index))
    }

    /// Storage key of the `ordinal`-th replica (1-based) of this shard
    pub fn replica(&self, ordinal: usize) -> Self {
        Self(format!("{}{}{}", self.base().0, REPLICA_SEPARATOR, ordinal))
    }

    /// Whether this key names a replica copy rather than the primary
    pub fn is_replica(&self) -> bool {
        self.replica_ordinal().is_some()
    }

    /// Replica ordinal, if this key names a replica
    pub fn replica_ordinal(&self) -> Option<usize> {
        let (_, suffix) = self.0.rsplit_once(REPLICA_SEPARATOR)?;
        suffix.parse().ok()
    }

    /// The primary id this key refers to
    pub fn base(&self) -> ShardId {
        match self.0.rsplit_once(REPLICA_SEPARATOR) {
            Some((base, suffix)) if suffix.parse::<usize>().is_ok() => ShardId(base.to_string()),
            _ => self.clone(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShardId({})", self.0)
    }
}

impl From<&str> for ShardId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a storage node
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_content_same_hash() {
        assert_eq!(Digest::of(b"test data"), Digest::of(b"test data"));
        assert_ne!(Digest::of(b"data1"), Digest::of(b"data2"));
    }

    #[test]
    fn test_pair_matches_concatenation() {
        let joined = [b"left".as_slice(), b"right".as_slice()].concat();
        assert_eq!(Digest::of_pair(b"left", b"right"), Digest::of(&joined));
        // An empty right-hand side is the same as hashing the left alone
        assert_eq!(Digest::of_pair(b"left", b""), Digest::of(b"left"));
    }

    #[test]
    fn test_hex_roundtrip() {
        let id = Digest::of(b"test");
        let parsed = Digest::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
        assert!(id.ct_eq(&parsed));
    }

    #[test]
    fn test_replica_keys() {
        let primary = ShardId::scoped("blk", 3);
        assert_eq!(primary.as_str(), "blk/shard-3");
        assert!(!primary.is_replica());

        let replica = primary.replica(2);
        assert_eq!(replica.as_str(), "blk/shard-3#r2");
        assert_eq!(replica.replica_ordinal(), Some(2));
        assert_eq!(replica.base(), primary);

        // Asking for a replica of a replica keys off the primary
        assert_eq!(replica.replica(1).as_str(), "blk/shard-3#r1");
    }
}
