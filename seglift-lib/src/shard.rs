use crate::{consts::MAX_SHARD_PERIOD, errors::SegliftError, layout::next_shard_segment_index};
use serde::{Deserialize, Serialize};

/// Portion of segment index space, a storage node is responsible for:
/// every segment index `i` such that `i % num_shard == shard_id`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ShardConfig {
    pub shard_id: usize,
    pub num_shard: usize,
}

impl ShardConfig {
    pub fn new(shard_id: usize, num_shard: usize) -> Result<Self, SegliftError> {
        let config = ShardConfig { shard_id, num_shard };
        config.validate().map(|_| config)
    }

    pub fn validate(&self) -> Result<(), SegliftError> {
        if self.num_shard == 0 || self.shard_id >= self.num_shard {
            return Err(SegliftError::InvalidShardConfig(self.shard_id, self.num_shard));
        }

        Ok(())
    }

    /// Smallest segment index `>= from_index`, owned by this shard.
    pub fn next_segment_index(&self, from_index: usize) -> usize {
        next_shard_segment_index(self.shard_id, self.num_shard, from_index)
    }

    pub fn owns(&self, segment_index: usize) -> bool {
        segment_index % self.num_shard == self.shard_id
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Number of full copies of segment index space, the given shards hold together.
///
/// Segment indices repeat their shard assignment every `lcm(num_shard)` segments, so coverage is
/// counted over one such period, and the least covered residue decides.
///
/// # Arguments
///
/// * `configs` - Shard configs, as reported by storage nodes.
///
/// # Returns
///
/// * `Result<usize, SegliftError>` - Number of replicas, zero for an empty set of shards. Fails with
///   `SegliftError::InvalidShardConfig` naming the offending config, if one is malformed or pushes the period
///   beyond `MAX_SHARD_PERIOD`.
pub fn replica_count(configs: &[ShardConfig]) -> Result<usize, SegliftError> {
    if configs.is_empty() {
        return Ok(0);
    }

    let mut period = 1usize;
    for config in configs {
        config.validate()?;

        period = (period / gcd(period, config.num_shard))
            .checked_mul(config.num_shard)
            .filter(|&period| period <= MAX_SHARD_PERIOD)
            .ok_or(SegliftError::InvalidShardConfig(config.shard_id, config.num_shard))?;
    }

    let mut coverage = vec![0usize; period];
    for config in configs {
        coverage.iter_mut().skip(config.shard_id).step_by(config.num_shard).for_each(|count| *count += 1);
    }

    Ok(coverage.into_iter().min().unwrap_or(0))
}

/// Fails with `SegliftError::InsufficientReplicas`, unless the given shards hold at least `expected_replica` copies.
pub fn check_replica(configs: &[ShardConfig], expected_replica: usize) -> Result<(), SegliftError> {
    let available = replica_count(configs)?;
    if available < expected_replica {
        return Err(SegliftError::InsufficientReplicas {
            required: expected_replica,
            available,
        });
    }

    Ok(())
}
