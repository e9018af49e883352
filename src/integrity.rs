//! Integrity layer facade
//!
//! Wires the erasure coder, the Merkle authenticator, the Byzantine
//! retriever, the auditor and the redistributor around one shared
//! reputation ledger.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditOutcome, ChallengeResponse, ChallengeToken, StorageAuditor};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, IntegrityConfig};
use crate::consensus::{ByzantineRetriever, RetrievalOutcome};
use crate::crypto::{Digest, NodeId, ShardId};
use crate::erasure::{ErasureCoder, ErasureError, ReconstructionSet, Shard};
use crate::merkle::{MerkleError, MerkleProof, MerkleRoot, MerkleTree};
use crate::placement::{RedistributionError, RedistributionPlan, ShardRedistributor};
use crate::reputation::ReputationLedger;

/// Hex characters of the payload digest used as block id
const BLOCK_ID_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Erasure(#[from] ErasureError),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    #[error(transparent)]
    Redistribution(#[from] RedistributionError),
}

/// An encoded block ready to be handed to storage nodes
#[derive(Debug, Clone)]
pub struct EncodedBlock {
    pub block_id: String,
    /// Shards in index order, with block-scoped ids
    pub shards: Vec<Shard>,
    pub root: MerkleRoot,
    /// Proof for each shard, same order as `shards`
    pub proofs: Vec<MerkleProof>,
}

impl EncodedBlock {
    pub fn shard_ids(&self) -> Vec<ShardId> {
        self.shards.iter().map(|s| s.id.clone()).collect()
    }

    pub fn proof(&self, index: usize) -> Option<&MerkleProof> {
        self.proofs.get(index)
    }
}

/// The integrity layer
pub struct IntegrityLayer {
    config: IntegrityConfig,
    ledger: Arc<ReputationLedger>,
    coder: ErasureCoder,
    retriever: ByzantineRetriever,
    auditor: StorageAuditor,
    redistributor: ShardRedistributor,
}

impl IntegrityLayer {
    /// Build every component from a validated configuration
    pub fn new(config: IntegrityConfig) -> Result<Self, IntegrityError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: IntegrityConfig, clock: Arc<dyn Clock>) -> Result<Self, IntegrityError> {
        config.validate()?;

        let ledger = Arc::new(ReputationLedger::with_clock(config.reputation.clone(), clock));
        let coder = ErasureCoder::new(config.erasure)?;
        let retriever = ByzantineRetriever::new(config.quorum);
        let auditor = StorageAuditor::new(Arc::clone(&ledger), config.audit.clone());
        let redistributor = ShardRedistributor::new(Arc::clone(&ledger), config.redistribution.clone());

        info!(
            "Integrity layer ready: {}+{} shards, tolerating {} faulty replicas",
            config.erasure.data_shards, config.erasure.parity_shards, config.quorum.max_faulty
        );

        Ok(Self {
            config,
            ledger,
            coder,
            retriever,
            auditor,
            redistributor,
        })
    }

    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<ReputationLedger> {
        &self.ledger
    }

    pub fn coder(&self) -> &ErasureCoder {
        &self.coder
    }

    pub fn retriever(&self) -> &ByzantineRetriever {
        &self.retriever
    }

    pub fn auditor(&self) -> &StorageAuditor {
        &self.auditor
    }

    pub fn redistributor(&self) -> &ShardRedistributor {
        &self.redistributor
    }

    /// Encode a payload, authenticate its shards and register the root
    pub fn store_block(&self, payload: &[u8]) -> Result<EncodedBlock, IntegrityError> {
        let digest = Digest::of(payload).to_hex();
        let block_id = digest[..BLOCK_ID_LEN].to_string();

        let shards: Vec<Shard> = self
            .coder
            .encode(payload)?
            .into_iter()
            .map(|s| s.scoped_to(&block_id))
            .collect();

        let contents: Vec<&[u8]> = shards.iter().map(|s| s.content.as_slice()).collect();
        let tree = MerkleTree::build(&contents)?;
        let root = tree.root();

        let proofs = shards
            .iter()
            .map(|s| tree.proof(s.index, s.id.clone(), s.content.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        self.retriever.register_block(shards.iter().map(|s| &s.id), root);
        info!("Stored block {} as {} shards, root {}", block_id, shards.len(), root);

        Ok(EncodedBlock {
            block_id,
            shards,
            root,
            proofs,
        })
    }

    /// Reconstruct a payload from gathered shards
    pub fn recover_block(&self, set: &ReconstructionSet) -> Result<Vec<u8>, IntegrityError> {
        Ok(self.coder.decode(set)?)
    }

    /// Retrieve one shard by Byzantine quorum
    pub fn retrieve_shard(&self, shard_id: &ShardId, replicas: &HashMap<NodeId, MerkleProof>) -> RetrievalOutcome {
        self.retriever.retrieve_shard(shard_id, replicas)
    }

    /// Retrieve every shard of a block by quorum, then reconstruct it
    ///
    /// `replicas` maps each shard id to the proofs nodes returned for it.
    /// Shards below quorum are left absent; decoding fails only if too
    /// few shards were accepted.
    pub fn retrieve_block(
        &self,
        shard_ids: &[ShardId],
        replicas: &HashMap<ShardId, HashMap<NodeId, MerkleProof>>,
    ) -> Result<Vec<u8>, IntegrityError> {
        let mut set = ReconstructionSet::new(shard_ids.len());
        for (index, shard_id) in shard_ids.iter().enumerate() {
            let Some(proofs) = replicas.get(shard_id) else {
                continue;
            };
            if let Some(content) = self.retriever.retrieve_shard(shard_id, proofs).into_content() {
                set.insert_validated(index, content)?;
            }
        }

        if set.present_count() < self.coder.config().data_shards {
            warn!(
                "Only {} of {} shards passed quorum",
                set.present_count(),
                shard_ids.len()
            );
        }
        self.recover_block(&set)
    }

    /// Issue a storage challenge over a shard
    pub fn challenge(&self, shard: &[u8]) -> ChallengeToken {
        self.auditor.generate_challenge(shard)
    }

    /// Check a node's challenge responses and apply the result
    pub fn audit(&self, node: &NodeId, responses: &[ChallengeResponse]) -> AuditOutcome {
        self.auditor.audit_node(node, responses)
    }

    /// Plan new homes for the shards of a failed node
    pub fn redistribute(
        &self,
        failed: &NodeId,
        shard_ids: &[ShardId],
        capacities: &HashMap<NodeId, u64>,
    ) -> Result<RedistributionPlan, IntegrityError> {
        Ok(self.redistributor.redistribute(failed, shard_ids, capacities)?)
    }

    /// Probability of losing too many shards, see [`ErasureCoder::durability_probability`]
    pub fn durability_probability(&self, node_count: usize, failure_rate: f64) -> f64 {
        self.coder
            .durability_probability(node_count, self.config.erasure.total_shards(), failure_rate)
    }
}
