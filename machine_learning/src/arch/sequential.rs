use std::{collections::HashMap, mem};

use ndarray::{Array2, ArrayD, Ix2};
use rand::Rng;

use super::{Model, layers::Layer};
use crate::{MlErr, ParamStore, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    fn init_params<R: Rng>(&self, store: &mut ParamStore, rng: &mut R) -> Result<()> {
        store.check_size(self.size())?;

        let mut rest = store.params_mut();
        for layer in &self.layers {
            let (params, tail) = mem::take(&mut rest).split_at_mut(layer.size());
            layer.init(params, rng)?;
            rest = tail;
        }

        Ok(())
    }

    fn forward(&mut self, store: &ParamStore, mut x: ArrayD<f32>) -> Result<Array2<f32>> {
        store.check_size(self.size())?;

        let mut front = store.front();
        let nlayers = self.layers.len();

        for (i, layer) in self.layers.iter_mut().enumerate() {
            let params = front.take(layer.size()).ok_or(MlErr::SizeMismatch {
                a: "layers",
                b: "parameters",
                got: i,
                expected: nlayers,
            })?;

            x = layer.forward(params, x)?;
        }

        Ok(x.into_dimensionality::<Ix2>()?)
    }

    fn backward(&mut self, store: &mut ParamStore, d: Array2<f32>) -> Result<()> {
        store.check_size(self.size())?;

        let mut back = store.back();
        let nlayers = self.layers.len();
        let mut d = d.into_dyn();

        for (i, layer) in self.layers.iter_mut().rev().enumerate() {
            let (params, grad) = back.take(layer.size()).ok_or(MlErr::SizeMismatch {
                a: "layers",
                b: "parameters",
                got: i,
                expected: nlayers,
            })?;

            d = layer.backward(params, grad, d)?;
        }

        Ok(())
    }

    fn set_training(&mut self, training: bool) {
        for layer in &mut self.layers {
            layer.set_training(training);
        }
    }

    fn named_params(&self) -> Vec<(String, Vec<usize>)> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut named = Vec::new();

        for layer in &self.layers {
            let (Some(kind), Some([weight, bias])) = (layer.kind(), layer.param_shapes()) else {
                continue;
            };

            let n = seen.entry(kind).or_default();
            *n += 1;

            named.push((format!("{kind}{n}.weight"), weight));
            named.push((format!("{kind}{n}.bias"), bias));
        }

        named
    }
}
