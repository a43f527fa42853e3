use ndarray::{Array2, ArrayView2};

use crate::Result;

/// A loss over a batch of predictions and their class labels.
pub trait LossFn {
    fn loss(&self, y_pred: ArrayView2<f32>, y: &[u32]) -> Result<f32>;
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: &[u32]) -> Result<Array2<f32>>;
}
