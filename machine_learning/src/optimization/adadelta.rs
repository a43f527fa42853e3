use rayon::prelude::*;

use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// The Adadelta optimizer.
///
/// Keeps running averages of the squared gradients and of the squared updates, the ratio of
/// their roots scales each step:
///
/// ```text
/// s = rho * s + (1 - rho) * g²
/// u = sqrt(a + eps) / sqrt(s + eps) * g
/// a = rho * a + (1 - rho) * u²
/// p = p - lr * u
/// ```
#[derive(Debug, Clone)]
pub struct Adadelta {
    learning_rate: f32,
    rho: f32,
    epsilon: f32,
    square_avg: Box<[f32]>,
    acc_delta: Box<[f32]>,
}

impl Adadelta {
    pub const RHO: f32 = 0.9;
    pub const EPSILON: f32 = 1e-6;

    /// Creates a new `Adadelta` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The coefficient applied to every update.
    /// * `rho`, `epsilon` - Hyperparameters to the optimization algorithm.
    pub fn new(len: usize, learning_rate: f32, rho: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            rho,
            epsilon,
            square_avg: vec![0.; len].into_boxed_slice(),
            acc_delta: vec![0.; len].into_boxed_slice(),
        }
    }

    /// Creates a new `Adadelta` with the default `rho` and `epsilon`.
    pub fn with_defaults(len: usize, learning_rate: f32) -> Self {
        Self::new(len, learning_rate, Self::RHO, Self::EPSILON)
    }
}

impl Optimizer for Adadelta {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        check_sizes(params, grad)?;
        check_sizes(params, &self.square_avg)?;

        let Self {
            learning_rate: lr,
            rho,
            epsilon: eps,
            ..
        } = *self;

        params
            .par_iter_mut()
            .zip(grad)
            .zip(self.square_avg.par_iter_mut())
            .zip(self.acc_delta.par_iter_mut())
            .for_each(|(((p, g), s), a)| {
                *s = rho * *s + (1. - rho) * g * g;
                let u = (*a + eps).sqrt() / (*s + eps).sqrt() * g;
                *a = rho * *a + (1. - rho) * u * u;
                *p -= lr * u;
            });

        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_matches_the_update_rule() {
        let mut optimizer = Adadelta::with_defaults(2, 1.);
        let mut params = [1., -1.];
        let grad = [0.5, -2.];

        optimizer.update_params(&mut params, &grad).unwrap();

        for (i, g) in grad.iter().enumerate() {
            let s: f32 = 0.1 * g * g;
            let u = (1e-6f32).sqrt() / (s + 1e-6).sqrt() * g;
            let expected = [1., -1.][i] - u;
            assert!((params[i] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn state_accumulates_across_steps() {
        let mut once = Adadelta::with_defaults(1, 1.);
        let mut twice = Adadelta::with_defaults(1, 1.);
        let (mut a, mut b) = ([0.], [0.]);

        once.update_params(&mut a, &[1.]).unwrap();
        twice.update_params(&mut b, &[1.]).unwrap();
        twice.update_params(&mut b, &[1.]).unwrap();

        // The second step is larger since the accumulated updates grew.
        assert!((b[0] - a[0]).abs() > a[0].abs());
    }

    #[test]
    fn zero_learning_rate_keeps_params() {
        let mut optimizer = Adadelta::with_defaults(3, 0.);
        let mut params = [1., 2., 3.];
        optimizer.update_params(&mut params, &[1., 1., 1.]).unwrap();
        assert_eq!(params, [1., 2., 3.]);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut optimizer = Adadelta::with_defaults(2, 1.);
        assert!(optimizer.update_params(&mut [0.; 3], &[0.; 3]).is_err());
    }
}
