use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::Result;

/// Generates the initial values of a model's parameters.
pub trait ParamGen {
    /// Samples up to `n` values.
    ///
    /// # Returns
    /// `None` once the generator is exhausted, otherwise at most `n` values.
    fn sample(&mut self, n: usize) -> Option<Vec<f32>>;

    /// Fills `out` with freshly sampled values.
    ///
    /// # Returns
    /// Whether `out` was filled completely.
    fn fill(&mut self, out: &mut [f32]) -> bool {
        match self.sample(out.len()) {
            Some(sample) if sample.len() == out.len() => {
                out.copy_from_slice(&sample);
                true
            }
            _ => out.is_empty(),
        }
    }
}

/// A parameter generator that follows a certain probabilistic distribution.
pub struct RandParamGen<'r, R: Rng, D: Distribution<f32>> {
    rng: &'r mut R,
    distribution: D,
    remaining: usize,
}

impl<'r, R: Rng, D: Distribution<f32>> RandParamGen<'r, R, D> {
    /// Creates a new `RandParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `distribution` - The distribution to sample the random numbers from.
    /// * `limit` - The maximum amount of numbers to generate.
    pub fn new(rng: &'r mut R, distribution: D, limit: usize) -> Self {
        Self {
            rng,
            distribution,
            remaining: limit,
        }
    }
}

impl<'r, R: Rng> RandParamGen<'r, R, Uniform<f32>> {
    /// Creates a new `RandParamGen` parameter generator with a uniform distribution.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `low` - The inclusive lower limit.
    /// * `high` - The exclusive upper limit.
    ///
    /// # Returns
    /// An error if the range is invalid (low >= high).
    pub fn uniform(rng: &'r mut R, limit: usize, low: f32, high: f32) -> Result<Self> {
        Ok(Self::new(rng, Uniform::new(low, high)?, limit))
    }

    /// Creates a new `RandParamGen` sampling from `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`.
    ///
    /// This is the default initialization of both convolutional and dense layers, for their
    /// weights as well as their biases.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `fan_in` - The number of inputs of each output unit.
    pub fn fan_in_uniform(rng: &'r mut R, limit: usize, fan_in: usize) -> Result<Self> {
        let bound = 1. / (fan_in as f32).sqrt();
        Self::uniform(rng, limit, -bound, bound)
    }
}

impl<R: Rng, D: Distribution<f32>> ParamGen for RandParamGen<'_, R, D> {
    fn sample(&mut self, mut n: usize) -> Option<Vec<f32>> {
        if self.remaining == 0 {
            return None;
        }

        n = n.min(self.remaining);
        self.remaining -= n;

        let sample = (0..n)
            .map(|_| self.distribution.sample(&mut *self.rng))
            .collect();
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn exhausts_after_limit() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut param_gen = RandParamGen::uniform(&mut rng, 10, -1., 1.).unwrap();

        assert_eq!(param_gen.sample(4).unwrap().len(), 4);
        assert_eq!(param_gen.sample(10).unwrap().len(), 6);
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn fan_in_bound() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut param_gen = RandParamGen::fan_in_uniform(&mut rng, 1000, 16).unwrap();
        let sample = param_gen.sample(1000).unwrap();

        assert!(sample.iter().all(|x| x.abs() <= 0.25));
        assert!(sample.iter().any(|x| x.abs() > 0.1));
    }

    #[test]
    fn same_seed_same_values() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);

        let x = RandParamGen::fan_in_uniform(&mut a, 8, 4)
            .unwrap()
            .sample(8);
        let y = RandParamGen::fan_in_uniform(&mut b, 8, 4)
            .unwrap()
            .sample(8);

        assert_eq!(x, y);
    }

    #[test]
    fn fill_reports_short_samples() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut param_gen = RandParamGen::uniform(&mut rng, 3, 0., 1.).unwrap();

        let mut out = [0.; 4];
        assert!(!param_gen.fill(&mut out));
    }

    #[test]
    fn invalid_range() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(RandParamGen::uniform(&mut rng, 1, 1., 1.).is_err());
    }
}
