use super::{Adadelta, GradientDescent};
use crate::{MlErr, Result};

pub trait Optimizer {
    /// Updates `params` in place following the optimizer's learning rule.
    ///
    /// # Errors
    /// `MlErr::SizeMismatch` if `params` and `grad` differ in length.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, learning_rate: f32);
}

/// Checks that a gradient can be applied onto a parameter slice.
pub(super) fn check_sizes(params: &[f32], grad: &[f32]) -> Result<()> {
    if params.len() != grad.len() {
        return Err(MlErr::SizeMismatch {
            a: "parameters",
            b: "gradient",
            got: grad.len(),
            expected: params.len(),
        });
    }

    Ok(())
}

/// Any of the available optimizers, chosen at runtime.
#[derive(Debug, Clone)]
pub enum AnyOptimizer {
    Adadelta(Adadelta),
    GradientDescent(GradientDescent),
}

impl Optimizer for AnyOptimizer {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        match self {
            Self::Adadelta(o) => o.update_params(params, grad),
            Self::GradientDescent(o) => o.update_params(params, grad),
        }
    }

    fn learning_rate(&self) -> f32 {
        match self {
            Self::Adadelta(o) => o.learning_rate(),
            Self::GradientDescent(o) => o.learning_rate(),
        }
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        match self {
            Self::Adadelta(o) => o.set_learning_rate(learning_rate),
            Self::GradientDescent(o) => o.set_learning_rate(learning_rate),
        }
    }
}
