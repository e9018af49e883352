//! Challenge/response proofs of storage
//!
//! A challenge is an HMAC-SHA256 of the shard content keyed by a fresh
//! nonce. The nonce is the big-endian value of a strictly increasing
//! counter followed by 24 random bytes, so it is never reused within a
//! process and cannot be predicted by a node.

use hmac::digest::Key;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Length of a challenge nonce in bytes
pub const NONCE_LEN: usize = 32;

/// Length of a challenge response in bytes
pub const RESPONSE_LEN: usize = 32;

/// Key of one challenge
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nonce(pub [u8; NONCE_LEN]);

impl Nonce {
    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }

    /// Counter value embedded in the nonce
    pub fn sequence(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(prefix)
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({}...)", &hex::encode(self.0)[..16])
    }
}

/// Source of never-reused nonces
#[derive(Debug, Default)]
pub struct NonceSource {
    counter: AtomicU64,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_nonce(&self) -> Nonce {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst);
        let mut bytes = [0u8; NONCE_LEN];
        bytes[..8].copy_from_slice(&sequence.to_be_bytes());
        OsRng.fill_bytes(&mut bytes[8..]);
        Nonce(bytes)
    }

    /// Number of nonces handed out so far
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// HMAC keyed by the nonce
///
/// The nonce is shorter than the SHA-256 block, so zero-padding it to a
/// full block key gives the same MAC as keying with the raw nonce.
fn keyed(nonce: &Nonce) -> HmacSha256 {
    let mut key = Key::<HmacSha256>::default();
    key[..NONCE_LEN].copy_from_slice(nonce.as_bytes());
    HmacSha256::new(&key)
}

/// Response a node holding `shard` gives to the challenge keyed by `nonce`
pub fn compute_response(nonce: &Nonce, shard: &[u8]) -> [u8; RESPONSE_LEN] {
    let mut mac = keyed(nonce);
    mac.update(shard);
    mac.finalize().into_bytes().into()
}

/// Recompute the HMAC for `shard` and compare in constant time
pub fn verify_response(nonce: &Nonce, shard: &[u8], claimed: &[u8]) -> bool {
    let mut mac = keyed(nonce);
    mac.update(shard);
    mac.verify_slice(claimed).is_ok()
}

/// An issued challenge
///
/// Keeps the nonce so the response can be checked later, plus the
/// expected response for checks without the shard at hand.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeToken {
    pub nonce: Nonce,
    pub expected: [u8; RESPONSE_LEN],
}

impl ChallengeToken {
    /// Constant-time check of a node's response against the expected value
    pub fn accepts(&self, claimed: &[u8]) -> bool {
        claimed.len() == RESPONSE_LEN && bool::from(self.expected.ct_eq(claimed))
    }
}

impl fmt::Debug for ChallengeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeToken")
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

/// A node's answer to one issued challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub token: ChallengeToken,
    pub response: Vec<u8>,
}
