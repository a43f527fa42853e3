use std::mem;

use crate::{MlErr, Result, optimization::Optimizer};

/// Holds every parameter of a model and its gradient in two flat buffers.
///
/// The layers of a model own no parameters, they take their slice of the store in order when
/// going forward through the `FrontIter` and in reverse order when going backward through the
/// `BackIter`. Keeping them contiguous lets a whole replica be synchronized, optimized or
/// persisted in a single pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamStore {
    params: Vec<f32>,
    grad: Vec<f32>,
}

impl ParamStore {
    /// Creates a new `ParamStore` with `size` zeroed parameters.
    pub fn new(size: usize) -> Self {
        Self {
            params: vec![0.0; size],
            grad: vec![0.0; size],
        }
    }

    /// Creates a new `ParamStore` holding the given parameters and a zeroed gradient.
    pub fn from_params(params: Vec<f32>) -> Self {
        let grad = vec![0.0; params.len()];
        Self { params, grad }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    pub fn grad_mut(&mut self) -> &mut [f32] {
        &mut self.grad
    }

    /// Zeros out the gradient.
    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Applies the gradient onto the parameters.
    ///
    /// # Arguments
    /// * `optimizer` - The update rule to follow.
    pub fn optimize<O: Optimizer>(&mut self, optimizer: &mut O) -> Result<()> {
        optimizer.update_params(&mut self.params, &self.grad)
    }

    /// Checks that this store can hold the parameters of a model of `size` parameters.
    pub fn check_size(&self, size: usize) -> Result<()> {
        if self.len() != size {
            return Err(MlErr::SizeMismatch {
                a: "parameter store",
                b: "model",
                got: self.len(),
                expected: size,
            });
        }

        Ok(())
    }

    /// Creates a new iterator over the parameters, front to back.
    pub fn front(&self) -> FrontIter<'_> {
        FrontIter {
            params: &self.params,
        }
    }

    /// Creates a new iterator over the parameters and gradient, back to front.
    pub fn back(&mut self) -> BackIter<'_> {
        BackIter {
            params: &self.params,
            grad: &mut self.grad,
        }
    }
}

/// The layers' parameter iterator.
pub struct FrontIter<'ps> {
    params: &'ps [f32],
}

impl<'ps> FrontIter<'ps> {
    /// Takes the next batch of `n` parameters.
    ///
    /// # Returns
    /// A slice of parameters or `None` if there are less than `n` left.
    pub fn take(&mut self, n: usize) -> Option<&'ps [f32]> {
        if n > self.params.len() {
            return None;
        }

        let (head, tail) = self.params.split_at(n);
        self.params = tail;
        Some(head)
    }
}

/// The reversed layers' parameter iterator.
pub struct BackIter<'ps> {
    params: &'ps [f32],
    grad: &'ps mut [f32],
}

impl<'ps> BackIter<'ps> {
    /// Takes the last `n` parameters and their gradient that were not yet taken.
    ///
    /// # Returns
    /// The parameters and gradient slices or `None` if there are less than `n` left.
    pub fn take(&mut self, n: usize) -> Option<(&'ps [f32], &'ps mut [f32])> {
        let len = self.params.len();
        if n > len {
            return None;
        }

        let (head, params) = self.params.split_at(len - n);
        self.params = head;

        let grad = mem::take(&mut self.grad);
        let (head, grad) = grad.split_at_mut(len - n);
        self.grad = head;

        Some((params, grad))
    }
}
