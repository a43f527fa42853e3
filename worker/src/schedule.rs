use std::num::NonZeroUsize;

/// Defines when rank 0 reports the training loss.
#[derive(Debug, Clone)]
pub struct LogSchedule {
    pub interval: NonZeroUsize,
}

impl LogSchedule {
    pub fn new(interval: NonZeroUsize) -> Self {
        Self { interval }
    }

    /// Returns true if the batch at `batch_idx` is reported, the first one always is.
    #[inline]
    pub fn should_log(&self, batch_idx: usize) -> bool {
        batch_idx % self.interval.get() == 0
    }
}
