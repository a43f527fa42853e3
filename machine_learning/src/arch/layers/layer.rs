use ndarray::ArrayD;
use rand::Rng;

use super::{Conv2d, Dense, Dropout, Flatten, LogSoftmax, MaxPool2d};
use crate::{
    MlErr, Result,
    arch::activations::ActFn,
    initialization::{ParamGen, RandParamGen},
};

#[derive(Debug, Clone)]
pub enum Layer {
    Conv2d(Conv2d),
    Dense(Dense),
    MaxPool2d(MaxPool2d),
    Dropout(Dropout),
    Flatten(Flatten),
    LogSoftmax(LogSoftmax),
}

impl Layer {
    pub fn conv2d(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        act_fn: Option<ActFn>,
    ) -> Self {
        Self::Conv2d(Conv2d::new(in_channels, out_channels, kernel, act_fn))
    }

    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self::Dense(Dense::new(dim, act_fn))
    }

    pub fn max_pool2d(kernel: usize) -> Self {
        Self::MaxPool2d(MaxPool2d::new(kernel))
    }

    pub fn dropout(p: f32, seed: u64) -> Self {
        Self::Dropout(Dropout::new(p, seed))
    }

    pub fn flatten() -> Self {
        Self::Flatten(Flatten::new())
    }

    pub fn log_softmax() -> Self {
        Self::LogSoftmax(LogSoftmax::new())
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        match self {
            Self::Conv2d(l) => l.size(),
            Self::Dense(l) => l.size(),
            _ => 0,
        }
    }

    /// The name prefix of this layer's tensors, for the layers that have parameters.
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Self::Conv2d(_) => Some("conv"),
            Self::Dense(_) => Some("fc"),
            _ => None,
        }
    }

    /// The shapes of the weights and biases of this layer, if it has any.
    pub fn param_shapes(&self) -> Option<[Vec<usize>; 2]> {
        match self {
            Self::Conv2d(l) => Some(l.param_shapes()),
            Self::Dense(l) => Some(l.param_shapes()),
            _ => None,
        }
    }

    /// Samples this layer's initial parameters from `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`.
    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let fan_in = match self {
            Self::Conv2d(l) => l.fan_in(),
            Self::Dense(l) => l.fan_in(),
            _ => return Ok(()),
        };

        let mut param_gen = RandParamGen::fan_in_uniform(rng, params.len(), fan_in)?;
        if !param_gen.fill(params) {
            return Err(MlErr::SizeMismatch {
                a: "layer",
                b: "initial parameters",
                got: params.len(),
                expected: self.size(),
            });
        }

        Ok(())
    }

    /// Outside of training the layers keep nothing for a backward pass.
    pub fn set_training(&mut self, training: bool) {
        match self {
            Self::Conv2d(l) => l.set_training(training),
            Self::Dense(l) => l.set_training(training),
            Self::MaxPool2d(l) => l.set_training(training),
            Self::Dropout(l) => l.set_training(training),
            Self::Flatten(_) | Self::LogSoftmax(_) => {}
        }
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        match self {
            Self::Conv2d(l) => l.forward(params, x),
            Self::Dense(l) => l.forward(params, x),
            Self::MaxPool2d(l) => l.forward(x),
            Self::Dropout(l) => l.forward(x),
            Self::Flatten(l) => l.forward(x),
            Self::LogSoftmax(l) => l.forward(x),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        match self {
            Self::Conv2d(l) => l.backward(params, grad, d),
            Self::Dense(l) => l.backward(params, grad, d),
            Self::MaxPool2d(l) => l.backward(d),
            Self::Dropout(l) => l.backward(d),
            Self::Flatten(l) => l.backward(d),
            Self::LogSoftmax(l) => l.backward(d),
        }
    }
}
