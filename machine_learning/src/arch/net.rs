use super::{Sequential, activations::ActFn, layers::Layer};
use crate::{MlErr, Result};

/// The shape of the classic MNIST convolutional classifier.
///
/// `conv1 → relu → conv2 → relu → max pool → dropout → flatten → fc1 → relu → dropout → fc2
/// → log softmax`
#[derive(Debug, Clone, PartialEq)]
pub struct NetConfig {
    pub in_channels: usize,
    pub height: usize,
    pub width: usize,
    pub conv1_channels: usize,
    pub conv2_channels: usize,
    pub kernel: usize,
    pub pool: usize,
    pub hidden: usize,
    pub classes: usize,
    pub dropout1: f32,
    pub dropout2: f32,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            in_channels: 1,
            height: 28,
            width: 28,
            conv1_channels: 32,
            conv2_channels: 64,
            kernel: 3,
            pool: 2,
            hidden: 128,
            classes: 10,
            dropout1: 0.25,
            dropout2: 0.5,
        }
    }
}

impl NetConfig {
    /// The amount of features entering the first fully connected layer.
    pub fn flat_features(&self) -> Option<usize> {
        let shrink = 2 * (self.kernel.checked_sub(1)?);
        let h = self.height.checked_sub(shrink)? / self.pool.max(1);
        let w = self.width.checked_sub(shrink)? / self.pool.max(1);

        Some(self.conv2_channels * h * w).filter(|&n| n > 0)
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("in_channels", self.in_channels),
            ("conv1_channels", self.conv1_channels),
            ("conv2_channels", self.conv2_channels),
            ("kernel", self.kernel),
            ("pool", self.pool),
            ("hidden", self.hidden),
            ("classes", self.classes),
        ];

        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(MlErr::InvalidConfig(format!("{name} must be positive")));
        }

        for (name, p) in [("dropout1", self.dropout1), ("dropout2", self.dropout2)] {
            if !(0. ..1.).contains(&p) {
                return Err(MlErr::InvalidConfig(format!(
                    "{name} must be in [0, 1), got {p}"
                )));
            }
        }

        if self.flat_features().is_none() {
            return Err(MlErr::InvalidConfig(format!(
                "a {}x{} input is too small for the network",
                self.height, self.width
            )));
        }

        Ok(())
    }

    /// Builds the network.
    ///
    /// # Arguments
    /// * `seed` - Seeds the dropout masks.
    pub fn build(&self, seed: u64) -> Result<Sequential> {
        self.validate()?;

        let flat = self.flat_features().unwrap_or_default();
        let relu = Some(ActFn::relu());

        let layers = [
            Layer::conv2d(self.in_channels, self.conv1_channels, self.kernel, relu),
            Layer::conv2d(self.conv1_channels, self.conv2_channels, self.kernel, relu),
            Layer::max_pool2d(self.pool),
            Layer::dropout(self.dropout1, seed),
            Layer::flatten(),
            Layer::dense((flat, self.hidden), relu),
            Layer::dropout(self.dropout2, seed.wrapping_add(1)),
            Layer::dense((self.hidden, self.classes), None),
            Layer::log_softmax(),
        ];

        Ok(Sequential::new(layers))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{ParamStore, arch::Model};

    #[test]
    fn default_matches_the_mnist_network() {
        let cfg = NetConfig::default();
        assert_eq!(cfg.flat_features(), Some(9216));

        let model = cfg.build(0).unwrap();
        assert_eq!(model.size(), 1_199_882);

        let shapes: Vec<_> = model.named_params();
        assert_eq!(shapes[0], ("conv1.weight".to_string(), vec![32, 1, 3, 3]));
        assert_eq!(shapes[4], ("fc1.weight".to_string(), vec![128, 9216]));
        assert_eq!(shapes[7], ("fc2.bias".to_string(), vec![10]));
    }

    #[test]
    fn tiny_net_outputs_log_probabilities() {
        let cfg = NetConfig {
            height: 8,
            width: 8,
            conv1_channels: 2,
            conv2_channels: 3,
            hidden: 5,
            classes: 4,
            ..NetConfig::default()
        };

        let mut model = cfg.build(3).unwrap();
        let mut store = ParamStore::new(model.size());
        model
            .init_params(&mut store, &mut StdRng::seed_from_u64(3))
            .unwrap();

        model.set_training(false);
        let y = model
            .forward(&store, Array::zeros((6, 1, 8, 8)).into_dyn())
            .unwrap();

        assert_eq!(y.dim(), (6, 4));
        for row in y.rows() {
            let total: f32 = row.iter().map(|v| v.exp()).sum();
            assert!((total - 1.).abs() < 1e-5);
        }
    }

    #[test]
    fn invalid_configs() {
        let too_small = NetConfig {
            height: 4,
            width: 4,
            ..NetConfig::default()
        };
        assert!(too_small.validate().is_err());

        let bad_dropout = NetConfig {
            dropout2: 1.,
            ..NetConfig::default()
        };
        assert!(bad_dropout.validate().is_err());

        let no_classes = NetConfig {
            classes: 0,
            ..NetConfig::default()
        };
        assert!(no_classes.build(0).is_err());
    }
}
