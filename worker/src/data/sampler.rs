use std::ops::Range;

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

/// Splits `total` samples among `world_size` ranks and returns the shard for `rank`.
///
/// Properties:
/// - Ranges are contiguous, disjoint and cover `[0..total)`.
/// - Sizes differ by at most 1 (balanced partition).
pub fn shard_range(total: usize, rank: usize, world_size: usize) -> Range<usize> {
    assert!(world_size > 0);
    assert!(rank < world_size);

    let base = total / world_size;
    let rem = total % world_size;

    let start = rank * base + rank.min(rem);
    let extra = if rank < rem { 1 } else { 0 };
    let end = start + base + extra;

    start..end
}

/// What happens to the samples left over when the ranks can't split the dataset evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Remainder {
    /// Wraps around the permutation until every rank gets the same amount of samples,
    /// repeating a few of them.
    #[default]
    Pad,
    /// Leaves the trailing samples out of the epoch.
    Drop,
}

/// Deterministically assigns every rank a disjoint, equally sized shard of a dataset.
///
/// Every rank builds the same global permutation, seeded with `seed + epoch`, and keeps its
/// own contiguous range of it.
#[derive(Debug, Clone)]
pub struct DistributedSampler {
    len: usize,
    rank: usize,
    world_size: usize,
    shuffle: bool,
    seed: u64,
    remainder: Remainder,
    epoch: usize,
}

impl DistributedSampler {
    /// Creates a new shuffling, padding sampler over `len` samples.
    ///
    /// # Panics
    /// If `rank` is outside the world.
    pub fn new(len: usize, rank: usize, world_size: usize) -> Self {
        assert!(rank < world_size, "rank out of range");

        Self {
            len,
            rank,
            world_size,
            shuffle: true,
            seed: 0,
            remainder: Remainder::Pad,
            epoch: 0,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_remainder(mut self, remainder: Remainder) -> Self {
        self.remainder = remainder;
        self
    }

    /// Sets the epoch the next permutation is drawn for, must be the same on every rank.
    pub fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The amount of samples drawn by the whole group in one epoch.
    pub fn total_size(&self) -> usize {
        match self.remainder {
            Remainder::Pad => self.len.div_ceil(self.world_size) * self.world_size,
            Remainder::Drop => self.len / self.world_size * self.world_size,
        }
    }

    /// The amount of samples this rank draws in one epoch.
    pub fn num_samples(&self) -> usize {
        self.total_size() / self.world_size
    }

    /// The dataset indices this rank visits in the current epoch, in order.
    pub fn indices(&self) -> Vec<usize> {
        if self.len == 0 {
            return Vec::new();
        }

        let mut permutation: Vec<_> = (0..self.len).collect();
        if self.shuffle {
            let seed = self.seed.wrapping_add(self.epoch as u64);
            permutation.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        let total = self.total_size();
        let shard = shard_range(total, self.rank, self.world_size);

        shard.map(|i| permutation[i % self.len]).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn shards(sampler: &DistributedSampler) -> Vec<Vec<usize>> {
        (0..sampler.world_size)
            .map(|rank| DistributedSampler { rank, ..sampler.clone() }.indices())
            .collect()
    }

    #[test]
    fn shard_range_balanced() {
        // total 10, ranks 3 => sizes 4,3,3
        assert_eq!(shard_range(10, 0, 3), 0..4);
        assert_eq!(shard_range(10, 1, 3), 4..7);
        assert_eq!(shard_range(10, 2, 3), 7..10);
    }

    #[test]
    fn shards_partition_the_dataset() {
        for world_size in 1..=7 {
            for len in [0, 1, 5, 12, 13, 100] {
                let sampler = DistributedSampler::new(len, 0, world_size).with_seed(3);
                let shards = shards(&sampler);

                let union: HashSet<_> = shards.iter().flatten().copied().collect();
                assert_eq!(
                    union,
                    (0..len).collect::<HashSet<_>>(),
                    "{len} samples, {world_size} ranks"
                );

                for shard in &shards {
                    assert_eq!(shard.len(), sampler.num_samples());
                }

                if len % world_size == 0 {
                    assert_eq!(shards.iter().flatten().count(), len);
                }
            }
        }
    }

    #[test]
    fn padding_wraps_around_the_permutation() {
        let sampler = DistributedSampler::new(5, 0, 3).with_shuffle(false);
        assert_eq!(sampler.total_size(), 6);
        assert_eq!(shards(&sampler), vec![vec![0, 1], vec![2, 3], vec![4, 0]]);
    }

    #[test]
    fn drop_truncates_the_permutation() {
        let sampler = DistributedSampler::new(5, 0, 3)
            .with_shuffle(false)
            .with_remainder(Remainder::Drop);

        assert_eq!(sampler.num_samples(), 1);
        assert_eq!(shards(&sampler), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn permutation_is_deterministic_per_epoch() {
        let mut a = DistributedSampler::new(50, 1, 2).with_seed(7);
        let mut b = DistributedSampler::new(50, 1, 2).with_seed(7);
        assert_eq!(a.indices(), b.indices());

        let first = a.indices();
        a.set_epoch(1);
        b.set_epoch(1);
        assert_eq!(a.indices(), b.indices());
        assert_ne!(a.indices(), first);
    }

    #[test]
    fn without_shuffle_shards_are_contiguous() {
        let sampler = DistributedSampler::new(10, 1, 2).with_shuffle(false);
        assert_eq!(sampler.indices(), vec![5, 6, 7, 8, 9]);
    }
}
