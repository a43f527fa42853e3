use ndarray::{
    Array2, Array3, Array4, ArrayD, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, ArrayViewMut2,
    ArrayViewMut3, Axis, Ix4, Zip, linalg, s,
};

use super::standard_layout;
use crate::{MlErr, Result, arch::activations::ActFn};

/// A 2D convolution with a square kernel, stride 1 and no padding.
///
/// The weights are laid out as `(out_channels, in_channels, kernel, kernel)` followed by the
/// `out_channels` biases. Each sample is unrolled into columns (im2col) so that the
/// convolution becomes a single matrix product, samples are processed in parallel.
///
/// Outside of training nothing is kept for the backward pass and each sample's columns only
/// live while that sample is being convolved.
#[derive(Debug, Clone)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    act_fn: Option<ActFn>,
    size: usize,
    training: bool,

    // Forward metadata
    input_dim: (usize, usize, usize, usize),
    cols: Option<Array3<f32>>,
    z: Option<Array4<f32>>,
}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        act_fn: Option<ActFn>,
    ) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            act_fn,
            size: out_channels * (in_channels * kernel * kernel + 1),
            training: true,
            input_dim: (0, 0, 0, 0),
            cols: None,
            z: None,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fan_in(&self) -> usize {
        self.in_channels * self.kernel * self.kernel
    }

    /// The shapes of the weights and the biases.
    pub fn param_shapes(&self) -> [Vec<usize>; 2] {
        let k = self.kernel;
        [
            vec![self.out_channels, self.in_channels, k, k],
            vec![self.out_channels],
        ]
    }

    /// Switches between keeping the backward data and dropping it, dropping the current one.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
        if !training {
            self.cols = None;
            self.z = None;
        }
    }

    /// The spatial size of the output for an input of `h` by `w`.
    pub fn output_hw(&self, h: usize, w: usize) -> Option<(usize, usize)> {
        let k = self.kernel;
        Some(((h + 1).checked_sub(k)?, (w + 1).checked_sub(k)?))
            .filter(|&(oh, ow)| oh > 0 && ow > 0)
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix4>()?;
        let (n, c, h, w) = x.dim();
        let k = self.kernel;

        let Some((oh, ow)) = self.output_hw(h, w).filter(|_| c == self.in_channels) else {
            return Err(MlErr::ShapeMismatch {
                what: "convolution input",
                got: x.shape().to_vec(),
                expected: vec![n, self.in_channels, h.max(k), w.max(k)],
            });
        };

        let (weights, biases) = self.view_params(params)?;
        let biases = biases.insert_axis(Axis(1));

        let fan_in = self.fan_in();
        let mut z = Array3::zeros((n, self.out_channels, oh * ow));

        if !self.training {
            Zip::from(z.outer_iter_mut())
                .and(x.outer_iter())
                .par_for_each(|mut z, x| {
                    let mut cols = Array2::zeros((fan_in, oh * ow));
                    im2col(x, k, cols.view_mut());
                    linalg::general_mat_mul(1., &weights, &cols, 0., &mut z);
                    z += &biases;
                });

            let mut z = z.into_shape_with_order((n, self.out_channels, oh, ow))?;
            if let Some(act_fn) = self.act_fn {
                z.mapv_inplace(|z| act_fn.f(z));
            }

            return Ok(z.into_dyn());
        }

        let mut cols = Array3::zeros((n, fan_in, oh * ow));
        Zip::from(cols.outer_iter_mut())
            .and(z.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut cols, mut z, x| {
                im2col(x, k, cols.view_mut());
                linalg::general_mat_mul(1., &weights, &cols, 0., &mut z);
                z += &biases;
            });

        let z = z.into_shape_with_order((n, self.out_channels, oh, ow))?;
        self.input_dim = (n, c, h, w);
        self.cols = Some(cols);

        let Some(act_fn) = self.act_fn else {
            self.z = None;
            return Ok(z.into_dyn());
        };

        let a = z.mapv(|z| act_fn.f(z));
        self.z = Some(z);
        Ok(a.into_dyn())
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        let cols = self
            .cols
            .as_ref()
            .ok_or(MlErr::BackwardBeforeForward("convolution"))?;

        let (n, c, h, w) = self.input_dim;
        let (oh, ow) = (h + 1 - self.kernel, w + 1 - self.kernel);

        let mut d = standard_layout(d).into_dimensionality::<Ix4>()?;
        if d.dim() != (n, self.out_channels, oh, ow) {
            return Err(MlErr::ShapeMismatch {
                what: "convolution delta",
                got: d.shape().to_vec(),
                expected: vec![n, self.out_channels, oh, ow],
            });
        }

        if let (Some(act_fn), Some(z)) = (&self.act_fn, &self.z) {
            d.zip_mut_with(z, |d, &z| *d *= act_fn.df(z));
        }

        let d = d.into_shape_with_order((n, self.out_channels, oh * ow))?;

        let (mut dw, mut db) = self.view_grad(grad)?;
        dw.fill(0.);
        for (d, cols) in d.outer_iter().zip(cols.outer_iter()) {
            linalg::general_mat_mul(1., &d, &cols.t(), 1., &mut dw);
        }
        db.assign(&d.sum_axis(Axis(2)).sum_axis(Axis(0)));

        let (weights, _) = self.view_params(params)?;
        let k = self.kernel;
        let mut dx = Array4::zeros((n, c, h, w));

        Zip::from(dx.outer_iter_mut())
            .and(d.outer_iter())
            .par_for_each(|mut dx, d| {
                let dcols = weights.t().dot(&d);
                col2im(dcols.view(), k, dx.view_mut());
            });

        Ok(dx.into_dyn())
    }

    /// Views the gradient as `(out, in * k * k)` delta weights and the delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        let w_shape = (self.out_channels, self.fan_in());
        let (dw_raw, db_raw) = grad.split_at_mut(w_shape.0 * w_shape.1);
        let dw = ArrayViewMut2::from_shape(w_shape, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.out_channels, db_raw)?;
        Ok((dw, db))
    }

    /// Views the parameters as `(out, in * k * k)` weights and the biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let w_shape = (self.out_channels, self.fan_in());
        let (w_raw, b_raw) = params.split_at(w_shape.0 * w_shape.1);
        let weights = ArrayView2::from_shape(w_shape, w_raw)?;
        let biases = ArrayView1::from_shape(self.out_channels, b_raw)?;
        Ok((weights, biases))
    }
}

/// Unrolls every `k` by `k` window of `x` into the columns of `cols`.
///
/// Row `(c * k + i) * k + j` of `cols` holds the input value at offset `(i, j)` of channel
/// `c` for every output position, matching the weight layout.
fn im2col(x: ArrayView3<f32>, k: usize, mut cols: ArrayViewMut2<f32>) {
    let (c, h, w) = x.dim();
    let (oh, ow) = (h + 1 - k, w + 1 - k);

    for ci in 0..c {
        for ki in 0..k {
            for kj in 0..k {
                let window = x.slice(s![ci, ki..ki + oh, kj..kj + ow]);
                cols.row_mut((ci * k + ki) * k + kj)
                    .iter_mut()
                    .zip(window.iter())
                    .for_each(|(dst, &src)| *dst = src);
            }
        }
    }
}

/// The adjoint of `im2col`, accumulates the columns back onto their input positions.
fn col2im(cols: ArrayView2<f32>, k: usize, mut dx: ArrayViewMut3<f32>) {
    let (c, h, w) = dx.dim();
    let (oh, ow) = (h + 1 - k, w + 1 - k);

    for ci in 0..c {
        for ki in 0..k {
            for kj in 0..k {
                let mut window = dx.slice_mut(s![ci, ki..ki + oh, kj..kj + ow]);
                window
                    .iter_mut()
                    .zip(cols.row((ci * k + ki) * k + kj))
                    .for_each(|(dst, &src)| *dst += src);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array, Ix4};

    use super::*;

    #[test]
    fn single_channel_convolution() {
        let mut conv = Conv2d::new(1, 1, 2, None);
        // kernel [[1, 0], [0, -1]], bias 0.5
        let params = [1., 0., 0., -1., 0.5];
        let x = Array::from_shape_vec((1, 1, 3, 3), (1..=9).map(|v| v as f32).collect()).unwrap();

        let y = conv.forward(&params, x.into_dyn()).unwrap();
        let y = y.into_dimensionality::<Ix4>().unwrap();

        // Every window computes top-left minus bottom-right, which is always -4, plus the bias.
        assert_eq!(y.dim(), (1, 1, 2, 2));
        assert!(y.iter().all(|&v| v == -3.5));
    }

    #[test]
    fn channels_are_summed_per_filter() {
        let mut conv = Conv2d::new(2, 2, 1, None);
        // filter 0 = [1, 1], filter 1 = [2, -1], biases [0, 1]
        let params = [1., 1., 2., -1., 0., 1.];
        let x = Array::from_shape_vec((1, 2, 1, 2), vec![1., 2., 3., 4.]).unwrap();

        let y = conv.forward(&params, x.into_dyn()).unwrap();
        let y = y.into_dimensionality::<Ix4>().unwrap();

        assert_eq!(y.as_slice().unwrap(), &[4., 6., 0., 1.]);
    }

    #[test]
    fn backward_accumulates_over_windows() {
        let mut conv = Conv2d::new(1, 1, 2, None);
        let params = [1., 2., 3., 4., 0.];
        let mut grad = [0.; 5];
        let x = Array::from_shape_vec((1, 1, 3, 3), (1..=9).map(|v| v as f32).collect()).unwrap();

        conv.forward(&params, x.into_dyn()).unwrap();
        let d = Array::from_elem((1, 1, 2, 2), 1.).into_dyn();
        let dx = conv.backward(&params, &mut grad, d).unwrap();
        let dx = dx.into_dimensionality::<Ix4>().unwrap();

        // dw[i, j] sums the inputs each kernel tap saw.
        assert_eq!(grad, [12., 16., 24., 28., 4.]);
        // The center pixel is seen by every tap once.
        assert_eq!(dx[[0, 0, 1, 1]], 10.);
        assert_eq!(dx[[0, 0, 0, 0]], 1.);
        assert_eq!(dx[[0, 0, 2, 2]], 4.);
    }

    #[test]
    fn eval_forward_keeps_nothing_for_backward() {
        let mut conv = Conv2d::new(2, 3, 2, Some(ActFn::relu()));
        let params: Vec<f32> = (0..conv.size()).map(|i| (i as f32 * 0.3).sin()).collect();
        let x = Array::from_shape_fn((4, 2, 5, 5), |(s, c, i, j)| {
            ((s * 50 + c * 25 + i * 5 + j) as f32 * 0.1).cos()
        });

        let trained = conv.forward(&params, x.clone().into_dyn()).unwrap();
        assert!(conv.cols.is_some() && conv.z.is_some());

        conv.set_training(false);
        assert!(conv.cols.is_none() && conv.z.is_none());

        let evaluated = conv.forward(&params, x.into_dyn()).unwrap();
        assert!(conv.cols.is_none() && conv.z.is_none());
        assert_eq!(evaluated, trained);

        let mut grad = vec![0.; conv.size()];
        let d = Array::zeros((4, 3, 4, 4)).into_dyn();
        assert!(matches!(
            conv.backward(&params, &mut grad, d),
            Err(MlErr::BackwardBeforeForward(_))
        ));
    }

    #[test]
    fn kernel_larger_than_input_fails() {
        let mut conv = Conv2d::new(1, 1, 3, None);
        let params = [0.; 10];
        let x = Array::zeros((1, 1, 2, 2)).into_dyn();
        assert!(conv.forward(&params, x).is_err());
    }
}
