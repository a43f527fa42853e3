use super::Optimizer;

/// Decays the learning rate by `gamma` every `step_size` epochs.
///
/// After `epoch` calls to `step` the learning rate is
/// `initial * gamma ^ (epoch / step_size)`.
#[derive(Debug, Clone)]
pub struct StepLr {
    initial: f32,
    gamma: f32,
    step_size: usize,
    epoch: usize,
}

impl StepLr {
    /// Creates a new `StepLr` starting from the optimizer's current learning rate.
    pub fn new<O: Optimizer>(optimizer: &O, step_size: usize, gamma: f32) -> Self {
        Self {
            initial: optimizer.learning_rate(),
            gamma,
            step_size: step_size.max(1),
            epoch: 0,
        }
    }

    /// The learning rate for the given amount of completed epochs.
    pub fn lr_at(&self, epoch: usize) -> f32 {
        let exp = (epoch / self.step_size) as i32;
        self.initial * self.gamma.powi(exp)
    }

    /// Marks the end of an epoch and updates the optimizer's learning rate.
    pub fn step<O: Optimizer>(&mut self, optimizer: &mut O) {
        self.epoch += 1;
        optimizer.set_learning_rate(self.lr_at(self.epoch));
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }
}
