//! End-to-end scenarios through the integrity layer

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use shard_integrity::clock::ManualClock;
use shard_integrity::erasure::ReconstructionSet;
use shard_integrity::{
    ChallengeResponse, ErasureConfig, IntegrityConfig, IntegrityLayer, MerkleProof, NodeId,
    RetrievalOutcome, ShardId, StorageAuditor, ValidationFailure,
};

fn small_layer() -> IntegrityLayer {
    let config = IntegrityConfig {
        erasure: ErasureConfig::new(4, 2, 1),
        ..Default::default()
    };
    IntegrityLayer::with_clock(config, Arc::new(ManualClock::new(1_700_000_000_000))).unwrap()
}

fn node(n: usize) -> NodeId {
    NodeId::new(format!("node-{}", n))
}

#[test]
fn test_helloworld_survives_any_two_losses() {
    let layer = small_layer();
    let block = layer.store_block(b"HELLOWORLD").unwrap();
    assert_eq!(block.shards.len(), 6);

    for a in 0..6 {
        for b in (a + 1)..6 {
            let set = ReconstructionSet::from_slots(block.shards.iter().map(|s| {
                if s.index == a || s.index == b {
                    None
                } else {
                    Some(s.content.clone())
                }
            }));
            assert_eq!(layer.recover_block(&set).unwrap(), b"HELLOWORLD", "dropped {} and {}", a, b);
        }
    }
}

#[test]
fn test_three_failed_audits_blacklist_node() {
    let layer = small_layer();
    let ledger = layer.ledger();
    let n = node(1);

    assert_eq!(ledger.get(&n), 100.0);
    let scores: Vec<f64> = (0..3).map(|_| ledger.update(&n, false, 50.0)).collect();

    assert!(scores.windows(2).all(|w| w[1] < w[0]));
    assert!((scores[0] - 70.0012).abs() < 1e-9);
    assert!(scores[2] < 50.0);
    assert!(ledger.blacklisted(&n));
    assert_eq!(ledger.reward_multiplier(&n), 1.0);
}

#[test]
fn test_retrieval_tolerates_corrupted_replica() {
    let layer = small_layer();
    let block = layer.store_block(b"HELLOWORLD").unwrap();
    let id = &block.shards[2].id;
    let honest = block.proofs[2].clone();

    let mut forged = honest.clone();
    forged.content[0] ^= 0xff;

    let mut replicas: HashMap<NodeId, MerkleProof> = (0..3).map(|n| (node(n), honest.clone())).collect();
    replicas.insert(node(3), forged.clone());

    let outcome = layer.retrieve_shard(id, &replicas);
    assert_eq!(outcome.content(), Some(block.shards[2].content.as_slice()));
    assert_eq!(outcome.excluded(), &[(node(3), ValidationFailure::RootMismatch)]);

    replicas.insert(node(2), forged);
    let outcome = layer.retrieve_shard(id, &replicas);
    assert!(matches!(outcome, RetrievalOutcome::BelowQuorum { agreeing: 2, required: 3, .. }));
}

#[test]
fn test_failed_node_is_audited_then_replaced() {
    let layer = small_layer();
    let block = layer.store_block(b"HELLOWORLD").unwrap();
    let failing = node(0);

    // node-0 lost every shard it held, each round gets fresh challenges
    let round = || -> Vec<ChallengeResponse> {
        block
            .shards
            .iter()
            .map(|shard| {
                let token = layer.challenge(&shard.content);
                let response = StorageAuditor::respond(&token.nonce, b"");
                ChallengeResponse { token, response }
            })
            .collect()
    };

    let first = layer.audit(&failing, &round());
    assert_eq!(first.failures, 6);
    assert_eq!(first.slashed, 0.0);

    let second = layer.audit(&failing, &round());
    let third = layer.audit(&failing, &round());
    assert_eq!(layer.auditor().outstanding_challenges(), 0);
    assert!(second.score < 50.0);
    assert!(third.slashed > 0.0);
    assert!(layer.ledger().blacklisted(&failing));

    let capacities: HashMap<NodeId, u64> = (0..5).map(|n| (node(n), 10)).collect();
    let plan = layer.redistribute(&failing, &block.shard_ids(), &capacities).unwrap();

    assert!(plan.is_complete());
    assert!(!plan.assignments.contains_key(&failing));
    for id in block.shard_ids() {
        let holders: HashSet<_> = plan.holders(&id).into_iter().collect();
        assert_eq!(holders.len(), 3);
    }
    assert_eq!(plan.metadata_updates.values().next().unwrap().timestamp_ms, 1_700_000_000_000);
}

#[test]
fn test_second_failure_rehomes_replica_keys() {
    let layer = small_layer();
    let block = layer.store_block(b"HELLOWORLD").unwrap();
    let capacities: HashMap<NodeId, u64> = (0..6).map(|n| (node(n), 20)).collect();
    let first = layer.redistribute(&node(0), &block.shard_ids(), &capacities).unwrap();

    // the busiest new holder fails in turn, taking primaries and replicas
    let (victim, lost) = first
        .assignments
        .iter()
        .max_by_key(|(_, keys)| keys.len())
        .map(|(n, keys)| (n.clone(), keys.clone()))
        .unwrap();
    assert!(lost.iter().any(ShardId::is_replica));

    let live: HashSet<ShardId> = first
        .metadata_updates
        .iter()
        .filter(|(_, loc)| loc.location != victim)
        .map(|(key, _)| key.clone())
        .collect();
    let second = layer
        .redistributor()
        .redistribute_around(&victim, &lost, &capacities, &live)
        .unwrap();

    let assigned: usize = second.assignments.values().map(Vec::len).sum();
    assert_eq!(second.placed_copies(), assigned);
    assert!(!second.assignments.contains_key(&victim));
    for key in &lost {
        assert!(second.metadata_updates.contains_key(key));
    }
    for key in second.metadata_updates.keys() {
        assert!(!live.contains(key));
    }
}
