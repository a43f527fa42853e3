use ndarray::{Array2, ArrayD, Axis, Ix2};

use crate::{MlErr, Result};

/// Log-softmax over the class axis of a `(batch, classes)` input.
#[derive(Debug, Clone, Default)]
pub struct LogSoftmax {
    // Forward metadata
    y: Option<Array2<f32>>,
}

impl LogSoftmax {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let mut y = x.into_dimensionality::<Ix2>()?;

        for mut row in y.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let lse = max + row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln();
            row.mapv_inplace(|v| v - lse);
        }

        self.y = Some(y.clone());
        Ok(y.into_dyn())
    }

    /// `dx = d - softmax(x) * sum(d)`, row by row.
    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let y = self
            .y
            .as_ref()
            .ok_or(MlErr::BackwardBeforeForward("log softmax"))?;

        let mut d = d.into_dimensionality::<Ix2>()?;
        if d.dim() != y.dim() {
            return Err(MlErr::ShapeMismatch {
                what: "log softmax delta",
                got: d.shape().to_vec(),
                expected: y.shape().to_vec(),
            });
        }

        let sums = d.sum_axis(Axis(1));
        for ((mut d, y), sum) in d.rows_mut().into_iter().zip(y.rows()).zip(sums) {
            d.zip_mut_with(&y, |d, &y| *d -= y.exp() * sum);
        }

        Ok(d.into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn rows_are_log_probabilities() {
        let mut layer = LogSoftmax::new();
        let y = layer
            .forward(array![[1., 2., 3.], [1000., 1000., 1000.]].into_dyn())
            .unwrap();
        let y = y.into_dimensionality::<Ix2>().unwrap();

        for row in y.rows() {
            let total: f32 = row.iter().map(|v| v.exp()).sum();
            assert!((total - 1.).abs() < 1e-5);
        }
        assert!((y[[1, 0]] + 3f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn backward_subtracts_the_probabilities() {
        let mut layer = LogSoftmax::new();
        let y = layer.forward(array![[0.5, -1., 2.]].into_dyn()).unwrap();
        let p: Vec<f32> = y.iter().map(|v| v.exp()).collect();

        let dx = layer.backward(array![[1., 0., 0.]].into_dyn()).unwrap();
        let expected = [1. - p[0], -p[1], -p[2]];

        for (g, e) in dx.iter().zip(expected) {
            assert!((g - e).abs() < 1e-6);
        }
    }
}
