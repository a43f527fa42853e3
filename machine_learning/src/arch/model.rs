use ndarray::{Array2, ArrayD};
use rand::Rng;

use crate::{ParamStore, Result, arch::loss::LossFn};

pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Writes freshly sampled initial parameters into `store`.
    fn init_params<R: Rng>(&self, store: &mut ParamStore, rng: &mut R) -> Result<()>;

    /// Makes a forward pass through the model.
    ///
    /// # Arguments
    /// * `store` - The model's parameters.
    /// * `x` - A batch of inputs, the first axis being the batch.
    ///
    /// # Returns
    /// The `(batch, outputs)` prediction or an error if occurred.
    fn forward(&mut self, store: &ParamStore, x: ArrayD<f32>) -> Result<Array2<f32>>;

    /// Propagates `d`, the derivative of the loss with respect to the last forward's output,
    /// back through the model, writing the gradient into `store`.
    fn backward(&mut self, store: &mut ParamStore, d: Array2<f32>) -> Result<()>;

    /// Switches between training and evaluation behavior (dropout).
    fn set_training(&mut self, training: bool);

    /// The name and shape of every parameter tensor, in the order they are laid out in the
    /// parameter store.
    fn named_params(&self) -> Vec<(String, Vec<usize>)>;

    /// Computes the gradient of the loss over a single batch, the parameters are left as they
    /// are.
    ///
    /// # Arguments
    /// * `store` - The model's parameters, its gradient gets overwritten.
    /// * `loss_fn` - The loss function.
    /// * `x` - The batch inputs.
    /// * `y` - The batch labels.
    ///
    /// # Returns
    /// The batch loss.
    fn compute_grad<L: LossFn>(
        &mut self,
        store: &mut ParamStore,
        loss_fn: &L,
        x: ArrayD<f32>,
        y: &[u32],
    ) -> Result<f32> {
        store.zero_grad();

        let y_pred = self.forward(store, x)?;
        let loss = loss_fn.loss(y_pred.view(), y)?;
        let d = loss_fn.loss_prime(y_pred.view(), y)?;
        self.backward(store, d)?;

        Ok(loss)
    }
}
