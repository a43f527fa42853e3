use ndarray::{Array2, ArrayView2};

use super::LossFn;
use crate::{MlErr, Result};

/// Negative log likelihood loss, averaged over the batch.
///
/// Expects log-probabilities, so paired with a `LogSoftmax` output it is the cross entropy.
#[derive(Debug, Default, Clone, Copy)]
pub struct NllLoss;

impl NllLoss {
    /// Returns a new `NllLoss`.
    pub fn new() -> Self {
        Self
    }

    fn check(y_pred: &ArrayView2<f32>, y: &[u32]) -> Result<()> {
        if y_pred.nrows() != y.len() {
            return Err(MlErr::SizeMismatch {
                a: "predictions",
                b: "labels",
                got: y_pred.nrows(),
                expected: y.len(),
            });
        }

        let classes = y_pred.ncols();
        match y.iter().find(|&&label| label as usize >= classes) {
            Some(&label) => Err(MlErr::LabelOutOfRange { label, classes }),
            None => Ok(()),
        }
    }
}

impl LossFn for NllLoss {
    fn loss(&self, y_pred: ArrayView2<f32>, y: &[u32]) -> Result<f32> {
        Self::check(&y_pred, y)?;
        if y.is_empty() {
            return Ok(0.);
        }

        let total: f32 = y
            .iter()
            .enumerate()
            .map(|(i, &label)| -y_pred[[i, label as usize]])
            .sum();

        Ok(total / y.len() as f32)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: &[u32]) -> Result<Array2<f32>> {
        Self::check(&y_pred, y)?;

        let mut d = Array2::zeros(y_pred.raw_dim());
        let scale = -1. / y.len().max(1) as f32;
        for (i, &label) in y.iter().enumerate() {
            d[[i, label as usize]] = scale;
        }

        Ok(d)
    }
}
