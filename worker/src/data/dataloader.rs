use super::dataset::{Batch, Dataset};

/// Sampler-driven DataLoader producing owned batches.
#[derive(Debug, Clone)]
pub struct DataLoader<'d> {
    dataset: &'d Dataset,
    indices: Vec<usize>,
    batch_size: usize,
    drop_last: bool,
    cursor: usize,
}

impl<'d> DataLoader<'d> {
    /// Creates a loader visiting `indices` of `dataset` in order.
    ///
    /// # Arguments
    /// * `dataset` - Where the samples are copied from.
    /// * `indices` - The dataset positions to visit, usually a sampler's shard.
    /// * `batch_size` - The amount of samples per batch.
    /// * `drop_last` - Whether a trailing batch smaller than `batch_size` is skipped.
    pub fn new(
        dataset: &'d Dataset,
        indices: Vec<usize>,
        batch_size: usize,
        drop_last: bool,
    ) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");

        Self {
            dataset,
            indices,
            batch_size,
            drop_last,
            cursor: 0,
        }
    }

    /// The amount of batches in a full pass.
    pub fn len(&self) -> usize {
        if self.drop_last {
            self.indices.len() / self.batch_size
        } else {
            self.indices.len().div_ceil(self.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Returns the next batch, or None if exhausted.
    pub fn next_batch(&mut self) -> Option<Batch> {
        let remaining = self.indices.len() - self.cursor;
        if remaining == 0 || (self.drop_last && remaining < self.batch_size) {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.indices.len());
        let batch = self.dataset.batch(&self.indices[self.cursor..end]);

        self.cursor = end;
        Some(batch)
    }
}

impl Iterator for DataLoader<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}
