use ndarray::{ArrayD, IxDyn};

use super::standard_layout;
use crate::{MlErr, Result};

/// Collapses every axis but the first one.
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    input_shape: Option<IxDyn>,
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = standard_layout(x);
        let n = x.shape().first().copied().unwrap_or_default();
        let features = x.shape().iter().skip(1).product::<usize>();

        self.input_shape = Some(x.raw_dim());
        Ok(x.into_shape_with_order(IxDyn(&[n, features]))?)
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let shape = self
            .input_shape
            .clone()
            .ok_or(MlErr::BackwardBeforeForward("flatten"))?;

        Ok(standard_layout(d).into_shape_with_order(shape)?)
    }
}
