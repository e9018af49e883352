//! Voting Module
//!
//! Quorum policy and the content tally used to pick a majority value
//! among validated replicas.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::crypto::Digest;

/// Byzantine quorum policy
///
/// For `n` supplied replicas of which up to `f = max_faulty` may be
/// Byzantine, a value is trusted only when more than `(n + f) / 2`
/// validated replicas agree on it. With `n >= 3f + 1` that is at least
/// `2f + 1`, so two quorums always share an honest replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumPolicy {
    /// Number of Byzantine replicas tolerated (f)
    pub max_faulty: usize,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self { max_faulty: 1 }
    }
}

impl QuorumPolicy {
    pub fn new(max_faulty: usize) -> Self {
        Self { max_faulty }
    }

    /// Agreeing validated replicas required out of `replicas` supplied
    pub fn required_agreement(&self, replicas: usize) -> usize {
        (replicas + self.max_faulty) / 2 + 1
    }

    /// Smallest replica set that can tolerate `max_faulty` faults
    pub fn min_replicas(&self) -> usize {
        3 * self.max_faulty + 1
    }
}

/// Count of validated replicas per distinct content
///
/// Keyed by content digest, with one sample of the content per digest
/// for the final answer.
#[derive(Debug, Default)]
pub struct ContentTally<'a> {
    counts: HashMap<Digest, usize>,
    samples: HashMap<Digest, &'a [u8]>,
}

impl<'a> ContentTally<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one validated replica
    pub fn add(&mut self, digest: Digest, content: &'a [u8]) {
        *self.counts.entry(digest).or_insert(0) += 1;
        self.samples.entry(digest).or_insert(content);
    }

    /// Number of distinct contents seen
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Total validated replicas recorded
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Content with the highest count
    ///
    /// Ties go to the lexicographically smallest content.
    pub fn leader(&self) -> Option<(&'a [u8], usize)> {
        let mut best: Option<(&'a [u8], usize)> = None;

        for (digest, &count) in &self.counts {
            let Some(&content) = self.samples.get(digest) else {
                continue;
            };
            best = match best {
                Some((best_content, best_count))
                    if best_count > count || (best_count == count && best_content <= content) =>
                {
                    Some((best_content, best_count))
                }
                _ => Some((content, count)),
            };
        }

        best
    }
}
