//! Poisson durability estimate
//!
//! A diagnostic only. It assumes independent node failures spread evenly
//! over the shards of a block and says nothing about correlated outages.

/// Poisson estimate for simultaneous shard loss
///
/// With `λ = node_count * failure_rate / shard_total`, returns
/// `1 - e^-λ * Σ_{i < data_shards} λ^i / i!`, the probability that at
/// least `data_shards` losses occur at once. Returns 0.0 when
/// `shard_total` is zero.
pub fn durability_probability(
    data_shards: usize,
    node_count: usize,
    shard_total: usize,
    failure_rate: f64,
) -> f64 {
    if shard_total == 0 || !failure_rate.is_finite() {
        return 0.0;
    }

    let lambda = node_count as f64 * failure_rate.clamp(0.0, 1.0) / shard_total as f64;

    // Incremental term λ^i / i! keeps large thresholds from overflowing
    let mut term = 1.0;
    let mut below_threshold = 0.0;
    for i in 0..data_shards {
        below_threshold += term;
        term *= lambda / (i + 1) as f64;
    }

    (1.0 - (-lambda).exp() * below_threshold).clamp(0.0, 1.0)
}
