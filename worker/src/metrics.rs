use std::{collections::VecDeque, time::Duration};

/// Tracks a scalar over a fixed window of recent values and over its whole history.
#[derive(Debug, Clone)]
pub struct ScalarMeter {
    window: VecDeque<f32>,
    capacity: usize,
    total: f64,
    count: u64,
}

impl ScalarMeter {
    /// Creates a meter whose window holds at most `capacity` values.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");

        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            total: 0.,
            count: 0,
        }
    }

    /// Records `value`, evicting the oldest one if the window is full.
    pub fn push(&mut self, value: f32) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }

        self.window.push_back(value);
        self.total += value as f64;
        self.count += 1;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The window's values, oldest first.
    pub fn window(&self) -> impl Iterator<Item = f32> + '_ {
        self.window.iter().copied()
    }

    /// The median of the window, the mean of the two middle values for an even count.
    pub fn win_median(&self) -> Option<f32> {
        let mut sorted: Vec<_> = self.window().collect();
        sorted.sort_by(f32::total_cmp);

        let n = sorted.len();
        match n {
            0 => None,
            _ if n % 2 == 1 => Some(sorted[n / 2]),
            _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.),
        }
    }

    pub fn win_avg(&self) -> Option<f32> {
        if self.window.is_empty() {
            return None;
        }

        Some(self.window().sum::<f32>() / self.window.len() as f32)
    }

    /// The mean of every value ever pushed.
    pub fn global_avg(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.total / self.count as f64) as f32)
    }
}

/// Time and volume counters of one rank's training.
#[derive(Debug, Default, Clone)]
pub struct WorkerMetrics {
    pub compute_time: Duration,
    pub sync_time: Duration,

    pub steps: u64,
    pub samples: u64,
}

impl WorkerMetrics {
    #[inline]
    pub fn bump_step(&mut self) {
        self.steps += 1;
    }

    #[inline]
    pub fn add_samples(&mut self, n: usize) {
        self.samples += n as u64;
    }

    /// The share of the step time spent waiting on the group.
    pub fn sync_ratio(&self) -> f64 {
        let total = (self.compute_time + self.sync_time).as_secs_f64();
        if total == 0. {
            return 0.;
        }

        self.sync_time.as_secs_f64() / total
    }
}
