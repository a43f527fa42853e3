use ndarray::ArrayD;
use ndarray_rand::{RandomExt, rand_distr::Bernoulli};
use rand::{SeedableRng, rngs::StdRng};

use crate::{MlErr, Result};

/// Zeroes each input with probability `p` while training and scales the survivors by
/// `1 / (1 - p)`. Outside of training it is the identity.
#[derive(Debug, Clone)]
pub struct Dropout {
    p: f32,
    training: bool,
    rng: StdRng,

    // Forward metadata
    mask: Option<ArrayD<f32>>,
}

impl Dropout {
    /// Creates a new `Dropout` layer.
    ///
    /// # Arguments
    /// * `p` - The probability of dropping each value.
    /// * `seed` - The seed of the layer's own mask generator.
    pub fn new(p: f32, seed: u64) -> Self {
        Self {
            p,
            training: true,
            rng: StdRng::seed_from_u64(seed),
            mask: None,
        }
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        if !self.training || self.p == 0. {
            self.mask = None;
            return Ok(x);
        }

        let keep = 1. - self.p;
        let mask = if keep <= 0. {
            ArrayD::zeros(x.raw_dim())
        } else {
            let bernoulli = Bernoulli::new(keep as f64)?;
            let scale = 1. / keep;
            ArrayD::random_using(x.raw_dim(), bernoulli, &mut self.rng)
                .mapv(|kept: bool| if kept { scale } else { 0. })
        };

        let y = x * &mask;
        self.mask = Some(mask);
        Ok(y)
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let Some(mask) = &self.mask else {
            return Ok(d);
        };

        if d.shape() != mask.shape() {
            return Err(MlErr::ShapeMismatch {
                what: "dropout delta",
                got: d.shape().to_vec(),
                expected: mask.shape().to_vec(),
            });
        }

        Ok(d * mask)
    }
}
