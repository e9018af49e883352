//! Systematic Reed-Solomon erasure coding over GF(2^8)
//!
//! A payload is zero-padded to whole stripes, split into `data_shards`
//! equal shards and extended with `parity_shards` parity shards. Any
//! `data_shards` of the resulting shards reconstruct the payload.

use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::durability;
use super::padding::{pad_to_stripe, strip_padding};
use crate::crypto::{NodeId, ShardId};

/// Largest shard set GF(2^8) can address
pub const MAX_TOTAL_SHARDS: usize = 256;

#[derive(Error, Debug)]
pub enum ErasureError {
    #[error("Not enough shards to reconstruct (have {have}, need {need})")]
    InsufficientShards { have: usize, need: usize },
    #[error("Shard index {index} out of range for {total} shards")]
    ShardIndexOutOfRange { index: usize, total: usize },
    #[error("Reconstruction set has {have} slots, expected {expected}")]
    SlotCountMismatch { have: usize, expected: usize },
    #[error("Shard {index} is {len} bytes, expected {expected}")]
    InconsistentShardLength {
        index: usize,
        len: usize,
        expected: usize,
    },
    #[error("Invalid erasure configuration: {0}")]
    InvalidConfig(String),
    #[error("Reed-Solomon failure: {0}")]
    Codec(#[from] reed_solomon_erasure::Error),
}

/// Erasure coding configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErasureConfig {
    /// Number of data shards (k)
    pub data_shards: usize,
    /// Number of parity shards (m)
    pub parity_shards: usize,
    /// Bytes each shard contributes per stripe
    pub block_size: usize,
}

impl Default for ErasureConfig {
    fn default() -> Self {
        // 29 data + 55 parity, 256-byte blocks
        Self {
            data_shards: 29,
            parity_shards: 55,
            block_size: 256,
        }
    }
}

impl ErasureConfig {
    pub fn new(data_shards: usize, parity_shards: usize, block_size: usize) -> Self {
        Self {
            data_shards,
            parity_shards,
            block_size,
        }
    }

    /// Total number of shards (k + m)
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Bytes of payload covered by one stripe
    pub fn stripe_len(&self) -> usize {
        self.data_shards * self.block_size
    }

    pub fn validate(&self) -> Result<(), ErasureError> {
        if self.data_shards == 0 {
            return Err(ErasureError::InvalidConfig("data_shards must be at least 1".into()));
        }
        if self.parity_shards == 0 {
            return Err(ErasureError::InvalidConfig("parity_shards must be at least 1".into()));
        }
        if self.total_shards() > MAX_TOTAL_SHARDS {
            return Err(ErasureError::InvalidConfig(format!(
                "{} total shards exceeds the GF(2^8) limit of {}",
                self.total_shards(),
                MAX_TOTAL_SHARDS
            )));
        }
        if self.block_size == 0 {
            return Err(ErasureError::InvalidConfig("block_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// One erasure-coded fragment of a block
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Index-derived identifier
    pub id: ShardId,
    /// Position in the encoded block (data shards first)
    pub index: usize,
    pub content: Vec<u8>,
    /// Node currently responsible for this shard, if placed
    pub owner: Option<NodeId>,
}

impl Shard {
    /// Whether this is one of the systematic data shards
    pub fn is_data(&self, config: &ErasureConfig) -> bool {
        self.index < config.data_shards
    }

    /// Rename this shard into the scope of a block
    pub fn scoped_to(mut self, block: &str) -> Self {
        self.id = ShardId::scoped(block, self.index);
        self
    }
}

#[derive(Clone, Debug)]
enum Slot {
    Absent,
    Present { content: Vec<u8>, validated: bool },
}

/// Shards of one block gathered for reconstruction
///
/// Holds one slot per shard index; missing shards stay explicitly absent.
/// Shards marked validated (for example, after a Merkle proof check) are
/// preferred when more than enough shards are present.
#[derive(Clone, Debug)]
pub struct ReconstructionSet {
    slots: Vec<Slot>,
}

impl ReconstructionSet {
    /// Empty set with `total` absent slots
    pub fn new(total: usize) -> Self {
        Self {
            slots: vec![Slot::Absent; total],
        }
    }

    /// Build from an ordered sequence where `None` marks a missing shard
    pub fn from_slots(slots: impl IntoIterator<Item = Option<Vec<u8>>>) -> Self {
        Self {
            slots: slots
                .into_iter()
                .map(|s| match s {
                    Some(content) => Slot::Present {
                        content,
                        validated: false,
                    },
                    None => Slot::Absent,
                })
                .collect(),
        }
    }

    /// Add an unvalidated shard
    pub fn insert(&mut self, index: usize, content: Vec<u8>) -> Result<(), ErasureError> {
        self.put(index, content, false)
    }

    /// Add a shard whose content has been authenticated
    pub fn insert_validated(&mut self, index: usize, content: Vec<u8>) -> Result<(), ErasureError> {
        self.put(index, content, true)
    }

    fn put(&mut self, index: usize, content: Vec<u8>, validated: bool) -> Result<(), ErasureError> {
        let total = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(ErasureError::ShardIndexOutOfRange { index, total })?;
        *slot = Slot::Present { content, validated };
        Ok(())
    }

    /// Mark a slot absent again
    pub fn remove(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Slot::Absent;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_present(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Slot::Present { .. }))
    }

    pub fn present_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Present { .. }))
            .count()
    }

    /// Pick `need` present slots, validated ones first, then by index
    fn select(&self, need: usize) -> Vec<usize> {
        let mut present: Vec<(bool, usize)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Slot::Present { validated, .. } => Some((!*validated, i)),
                Slot::Absent => None,
            })
            .collect();
        present.sort_unstable();
        present.into_iter().take(need).map(|(_, i)| i).collect()
    }

    fn content(&self, index: usize) -> Option<&[u8]> {
        match self.slots.get(index) {
            Some(Slot::Present { content, .. }) => Some(content),
            _ => None,
        }
    }
}

/// Reed-Solomon encoder/decoder for a fixed shard layout
pub struct ErasureCoder {
    config: ErasureConfig,
    rs: ReedSolomon,
}

impl std::fmt::Debug for ErasureCoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasureCoder")
            .field("config", &self.config)
            .finish()
    }
}

impl ErasureCoder {
    /// Create a coder for the given configuration
    pub fn new(config: ErasureConfig) -> Result<Self, ErasureError> {
        config.validate()?;
        let rs = ReedSolomon::new(config.data_shards, config.parity_shards)?;
        Ok(Self { config, rs })
    }

    pub fn config(&self) -> &ErasureConfig {
        &self.config
    }

    /// Encode a payload into `data_shards + parity_shards` shards
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<Shard>, ErasureError> {
        let padded = pad_to_stripe(payload, self.config.stripe_len());
        let shard_len = padded.len() / self.config.data_shards;

        let mut shards: Vec<Vec<u8>> = padded.chunks(shard_len).map(|c| c.to_vec()).collect();
        shards.resize(self.config.total_shards(), vec![0u8; shard_len]);

        self.rs.encode(&mut shards)?;

        debug!(
            "Encoded {} bytes into {} shards of {} bytes",
            payload.len(),
            shards.len(),
            shard_len
        );

        Ok(shards
            .into_iter()
            .enumerate()
            .map(|(index, content)| Shard {
                id: ShardId::for_index(index),
                index,
                content,
                owner: None,
            })
            .collect())
    }

    /// Reconstruct the payload from any `data_shards` present shards
    ///
    /// Trailing zero bytes are stripped, so a payload that itself ends in
    /// zeros comes back shorter.
    pub fn decode(&self, set: &ReconstructionSet) -> Result<Vec<u8>, ErasureError> {
        let total = self.config.total_shards();
        let need = self.config.data_shards;

        if set.len() != total {
            return Err(ErasureError::SlotCountMismatch {
                have: set.len(),
                expected: total,
            });
        }

        let have = set.present_count();
        if have < need {
            return Err(ErasureError::InsufficientShards { have, need });
        }

        let chosen = set.select(need);
        let mut slots: Vec<Option<Vec<u8>>> = vec![None; total];
        let mut shard_len = None;

        for &index in &chosen {
            let Some(content) = set.content(index) else {
                continue;
            };
            let expected = *shard_len.get_or_insert(content.len());
            if content.len() != expected || expected == 0 {
                return Err(ErasureError::InconsistentShardLength {
                    index,
                    len: content.len(),
                    expected,
                });
            }
            slots[index] = Some(content.to_vec());
        }

        debug!("Reconstructing from shards {:?}", chosen);
        self.rs.reconstruct_data(&mut slots)?;

        let mut payload = Vec::with_capacity(need * shard_len.unwrap_or(0));
        for shard in slots.into_iter().take(need) {
            match shard {
                Some(data) => payload.extend_from_slice(&data),
                None => return Err(ErasureError::InsufficientShards { have, need }),
            }
        }

        Ok(strip_padding(payload))
    }

    /// Poisson estimate of simultaneous loss at the data-shard threshold
    pub fn durability_probability(&self, node_count: usize, shard_total: usize, failure_rate: f64) -> f64 {
        durability::durability_probability(self.config.data_shards, node_count, shard_total, failure_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn small_coder() -> ErasureCoder {
        ErasureCoder::new(ErasureConfig::new(4, 2, 1)).unwrap()
    }

    fn set_without(shards: &[Shard], dropped: &[usize]) -> ReconstructionSet {
        ReconstructionSet::from_slots(shards.iter().map(|s| {
            if dropped.contains(&s.index) {
                None
            } else {
                Some(s.content.clone())
            }
        }))
    }

    #[test]
    fn test_encode_decode_no_loss() {
        let coder = ErasureCoder::new(ErasureConfig::default()).unwrap();
        let data = b"Hello, World! This is test data for erasure coding.";

        let shards = coder.encode(data).unwrap();
        assert_eq!(shards.len(), 84);

        let decoded = coder.decode(&set_without(&shards, &[])).unwrap();
        assert_eq!(data.as_slice(), decoded.as_slice());
    }

    #[test]
    fn test_helloworld_any_two_lost() {
        let coder = small_coder();
        let shards = coder.encode(b"HELLOWORLD").unwrap();
        assert_eq!(shards.len(), 6);
        // "HELLOWORLD" pads to 12 bytes, 3 per shard
        assert!(shards.iter().all(|s| s.content.len() == 3));
        assert_eq!(&shards[0].content, b"HEL");

        for a in 0..6 {
            for b in (a + 1)..6 {
                let decoded = coder.decode(&set_without(&shards, &[a, b])).unwrap();
                assert_eq!(decoded, b"HELLOWORLD".to_vec(), "dropped {} and {}", a, b);
            }
        }
    }

    #[test]
    fn test_insufficient_shards() {
        let coder = small_coder();
        let shards = coder.encode(b"HELLOWORLD").unwrap();

        let result = coder.decode(&set_without(&shards, &[0, 2, 5]));
        assert!(matches!(
            result,
            Err(ErasureError::InsufficientShards { have: 3, need: 4 })
        ));
    }

    #[test]
    fn test_trailing_zeros_are_stripped() {
        // Genuine trailing zeros cannot be told apart from padding
        let coder = small_coder();
        let shards = coder.encode(b"ABC\0\0").unwrap();
        let decoded = coder.decode(&set_without(&shards, &[1])).unwrap();
        assert_eq!(decoded, b"ABC".to_vec());
    }

    #[test]
    fn test_empty_payload() {
        let coder = small_coder();
        let shards = coder.encode(&[]).unwrap();
        assert!(shards.iter().all(|s| s.content.len() == 1));
        assert!(coder.decode(&set_without(&shards, &[0, 1])).unwrap().is_empty());
    }

    #[test]
    fn test_prefers_validated_shards() {
        let coder = small_coder();
        let shards = coder.encode(b"HELLOWORLD").unwrap();

        // Shard 0 is corrupted but unvalidated; the other five are validated
        let mut set = ReconstructionSet::new(6);
        set.insert(0, b"XXX".to_vec()).unwrap();
        for shard in &shards[1..] {
            set.insert_validated(shard.index, shard.content.clone()).unwrap();
        }

        assert_eq!(coder.decode(&set).unwrap(), b"HELLOWORLD".to_vec());
    }

    #[test]
    fn test_inconsistent_lengths_rejected() {
        let coder = small_coder();
        let shards = coder.encode(b"HELLOWORLD").unwrap();

        let mut set = set_without(&shards, &[4, 5]);
        set.insert(1, b"TOO LONG".to_vec()).unwrap();

        assert!(matches!(
            coder.decode(&set),
            Err(ErasureError::InconsistentShardLength { index: 1, .. })
        ));
    }

    #[test]
    fn test_slot_bounds() {
        let mut set = ReconstructionSet::new(6);
        assert!(matches!(
            set.insert(6, vec![1]),
            Err(ErasureError::ShardIndexOutOfRange { index: 6, total: 6 })
        ));

        let coder = small_coder();
        assert!(matches!(
            coder.decode(&ReconstructionSet::new(5)),
            Err(ErasureError::SlotCountMismatch { have: 5, expected: 6 })
        ));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(ErasureCoder::new(ErasureConfig::new(0, 2, 1)).is_err());
        assert!(ErasureCoder::new(ErasureConfig::new(4, 0, 1)).is_err());
        assert!(ErasureCoder::new(ErasureConfig::new(200, 57, 1)).is_err());
        assert!(ErasureCoder::new(ErasureConfig::new(4, 2, 0)).is_err());
    }

    proptest! {
        #[test]
        fn prop_any_qualifying_subset_reconstructs(
            (data, parity, payload, kept) in (1usize..6, 1usize..4, prop::collection::vec(any::<u8>(), 0..200))
                .prop_flat_map(|(data, parity, payload)| {
                    let total = data + parity;
                    (
                        Just(data),
                        Just(parity),
                        Just(payload),
                        prop::sample::subsequence((0..total).collect::<Vec<_>>(), data..=total),
                    )
                })
        ) {
            // Keep the payload clear of the trailing-zero limitation
            let mut payload = payload;
            payload.push(0xA5);

            let coder = ErasureCoder::new(ErasureConfig::new(data, parity, 3)).unwrap();
            let shards = coder.encode(&payload).unwrap();

            let mut set = ReconstructionSet::new(data + parity);
            for &i in &kept {
                set.insert(i, shards[i].content.clone()).unwrap();
            }

            prop_assert_eq!(coder.decode(&set).unwrap(), payload);
        }
    }
}
