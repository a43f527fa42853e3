use ndarray::{Array4, ArrayD, ArrayView3, Ix4, Zip};

use crate::{MlErr, Result};

/// Max pooling over non-overlapping `kernel` by `kernel` windows.
///
/// Trailing rows and columns that do not fill a whole window are dropped.
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    kernel: usize,
    training: bool,

    // Forward metadata
    input_dim: (usize, usize, usize, usize),
    argmax: Option<Array4<usize>>,
}

impl MaxPool2d {
    pub fn new(kernel: usize) -> Self {
        Self {
            kernel,
            training: true,
            input_dim: (0, 0, 0, 0),
            argmax: None,
        }
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
        if !training {
            self.argmax = None;
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix4>()?;
        let (n, c, h, w) = x.dim();
        let k = self.kernel;
        let (oh, ow) = (h / k, w / k);

        if oh == 0 || ow == 0 {
            return Err(MlErr::ShapeMismatch {
                what: "max pool input",
                got: x.shape().to_vec(),
                expected: vec![n, c, h.max(k), w.max(k)],
            });
        }

        let mut out = Array4::zeros((n, c, oh, ow));

        if !self.training {
            Zip::from(out.outer_iter_mut())
                .and(x.outer_iter())
                .par_for_each(|mut out, x| {
                    for ((ci, i, j), o) in out.indexed_iter_mut() {
                        *o = window_max(x, ci, i, j, k).0;
                    }
                });

            return Ok(out.into_dyn());
        }

        let mut argmax = Array4::zeros((n, c, oh, ow));
        Zip::from(out.outer_iter_mut())
            .and(argmax.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut out, mut argmax, x| {
                for ((ci, i, j), o) in out.indexed_iter_mut() {
                    let (best, at) = window_max(x, ci, i, j, k);
                    *o = best;
                    argmax[[ci, i, j]] = at;
                }
            });

        self.input_dim = (n, c, h, w);
        self.argmax = Some(argmax);
        Ok(out.into_dyn())
    }

    /// Routes every delta to the position that won its window.
    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let argmax = self
            .argmax
            .as_ref()
            .ok_or(MlErr::BackwardBeforeForward("max pool"))?;

        let d = d.into_dimensionality::<Ix4>()?;
        if d.dim() != argmax.dim() {
            return Err(MlErr::ShapeMismatch {
                what: "max pool delta",
                got: d.shape().to_vec(),
                expected: argmax.shape().to_vec(),
            });
        }

        let (n, c, h, w) = self.input_dim;
        let mut dx = Array4::zeros((n, c, h, w));

        Zip::from(dx.outer_iter_mut())
            .and(d.outer_iter())
            .and(argmax.outer_iter())
            .par_for_each(|mut dx, d, argmax| {
                for ((ci, i, j), &g) in d.indexed_iter() {
                    let at = argmax[[ci, i, j]];
                    dx[[ci, at / w, at % w]] += g;
                }
            });

        Ok(dx.into_dyn())
    }
}

/// The maximum of window `(i, j)` of channel `ci` and its flat position in the channel,
/// the first one on ties.
fn window_max(x: ArrayView3<f32>, ci: usize, i: usize, j: usize, k: usize) -> (f32, usize) {
    let w = x.dim().2;
    let (mut best, mut at) = (x[[ci, i * k, j * k]], i * k * w + j * k);

    for r in i * k..(i + 1) * k {
        for s in j * k..(j + 1) * k {
            if x[[ci, r, s]] > best {
                best = x[[ci, r, s]];
                at = r * w + s;
            }
        }
    }

    (best, at)
}

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;

    fn input() -> ArrayD<f32> {
        #[rustfmt::skip]
        let values = vec![
            1., 5., 2., 0., 9.,
            3., 4., 8., 1., 9.,
            0., 0., 7., 6., 9.,
            2., 1., 0., 7., 9.,
        ];

        Array::from_shape_vec((1, 1, 4, 5), values).unwrap().into_dyn()
    }

    #[test]
    fn forward_takes_window_maxima() {
        let mut pool = MaxPool2d::new(2);
        let y = pool.forward(input()).unwrap();

        assert_eq!(y.shape(), &[1, 1, 2, 2]);
        assert_eq!(y.iter().copied().collect::<Vec<_>>(), vec![5., 8., 2., 7.]);
    }

    #[test]
    fn backward_routes_to_the_winners() {
        let mut pool = MaxPool2d::new(2);
        pool.forward(input()).unwrap();

        let d = Array::from_shape_vec((1, 1, 2, 2), vec![1., 2., 3., 4.])
            .unwrap()
            .into_dyn();
        let dx = pool.backward(d).unwrap();

        #[rustfmt::skip]
        let expected = vec![
            0., 1., 0., 0., 0.,
            0., 0., 2., 0., 0.,
            0., 0., 4., 0., 0.,
            3., 0., 0., 0., 0.,
        ];
        assert_eq!(dx.iter().copied().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn eval_forward_keeps_no_winners() {
        let mut pool = MaxPool2d::new(2);
        let trained = pool.forward(input()).unwrap();

        pool.set_training(false);
        assert!(pool.argmax.is_none());

        assert_eq!(pool.forward(input()).unwrap(), trained);
        assert!(pool.argmax.is_none());
        assert!(matches!(
            pool.backward(Array::zeros((1, 1, 2, 2)).into_dyn()),
            Err(MlErr::BackwardBeforeForward(_))
        ));
    }

    #[test]
    fn ties_keep_the_first_position() {
        let mut pool = MaxPool2d::new(2);
        let x = Array::from_elem((1, 1, 2, 2), 1.).into_dyn();
        pool.forward(x).unwrap();

        let dx = pool
            .backward(Array::from_elem((1, 1, 1, 1), 1.).into_dyn())
            .unwrap();
        assert_eq!(dx.iter().copied().collect::<Vec<_>>(), vec![1., 0., 0., 0.]);
    }
}
