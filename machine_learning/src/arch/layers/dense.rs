use ndarray::{
    Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis, Ix2,
};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer, `y = act(x · Wᵀ + b)`.
///
/// The weights are laid out as `(out, in)` followed by the `out` biases.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,
    training: bool,

    // Forward metadata
    x: Option<Array2<f32>>,
    z: Option<Array2<f32>>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs of the layer.
    /// * `act_fn` - An optional activation applied to the outputs.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            training: true,
            x: None,
            z: None,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fan_in(&self) -> usize {
        self.dim.0
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
        if !training {
            self.x = None;
            self.z = None;
        }
    }

    /// The shapes of the weights and the biases.
    pub fn param_shapes(&self) -> [Vec<usize>; 2] {
        let (n_in, n_out) = self.dim;
        [vec![n_out, n_in], vec![n_out]]
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix2>()?;
        if x.ncols() != self.dim.0 {
            return Err(MlErr::ShapeMismatch {
                what: "dense input",
                got: x.shape().to_vec(),
                expected: vec![x.nrows(), self.dim.0],
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = x.dot(&w.t());
        z += &b;

        if !self.training {
            if let Some(act_fn) = self.act_fn {
                z.mapv_inplace(|z| act_fn.f(z));
            }
            return Ok(z.into_dyn());
        }

        self.x = Some(x);

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
        let mut d = d.into_dimensionality::<Ix2>()?;
        let x = self
            .x
            .as_ref()
            .ok_or(MlErr::BackwardBeforeForward("dense"))?;

        if d.dim() != (x.nrows(), self.dim.1) {
            return Err(MlErr::ShapeMismatch {
                what: "dense delta",
                got: d.shape().to_vec(),
                expected: vec![x.nrows(), self.dim.1],
            });
        }

        if let (Some(act_fn), Some(z)) = (&self.act_fn, &self.z) {
            d.zip_mut_with(z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        dw.assign(&d.t().dot(x));
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w).into_dyn())
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        let (n_in, n_out) = self.dim;
        let (dw_raw, db_raw) = grad.split_at_mut(n_in * n_out);
        let dw = ArrayViewMut2::from_shape((n_out, n_in), dw_raw)?;
        let db = ArrayViewMut1::from_shape(n_out, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let (n_in, n_out) = self.dim;
        let (w_raw, b_raw) = params.split_at(n_in * n_out);
        let weights = ArrayView2::from_shape((n_out, n_in), w_raw)?;
        let biases = ArrayView1::from_shape(n_out, b_raw)?;
        Ok((weights, biases))
    }
}
