use std::time::{Duration, Instant};

use comms::ProcessGroup;
use log::debug;
use machine_learning::{
    ParamStore,
    arch::{Model, loss::LossFn},
    optimization::Optimizer,
};
use ndarray::{Array2, ArrayD};

use crate::error::Result;

/// A model replica kept in lockstep with the replicas of every other rank.
///
/// Owns the model, its parameters and the process group. The parameters start out as rank
/// 0's and the gradient of every batch is averaged over the group before the optimizer
/// sees it, so every rank applies the same update.
pub struct DistributedModel<M: Model> {
    model: M,
    store: ParamStore,
    group: ProcessGroup,
    last_sync: Duration,
}

impl<M: Model> DistributedModel<M> {
    /// Wraps a freshly initialized replica, overwriting its parameters with rank 0's.
    ///
    /// # Errors
    /// Any error of the broadcast, including replicas of different sizes.
    pub async fn wrap(model: M, mut store: ParamStore, mut group: ProcessGroup) -> Result<Self> {
        store.check_size(model.size())?;
        group.broadcast(store.params_mut()).await?;

        debug!(rank = group.rank(); "replica of {} parameters synchronized", store.len());

        Ok(Self {
            model,
            store,
            group,
            last_sync: Duration::ZERO,
        })
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.group.rank()
    }

    #[inline]
    pub fn world_size(&self) -> usize {
        self.group.world_size()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.group.is_root()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn store(&self) -> &ParamStore {
        &self.store
    }

    /// How long the last gradient synchronization took.
    pub fn last_sync(&self) -> Duration {
        self.last_sync
    }

    pub fn set_training(&mut self, training: bool) {
        self.model.set_training(training);
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<Array2<f32>> {
        Ok(self.model.forward(&self.store, x)?)
    }

    /// Computes the gradient of the loss over a local batch and averages it over the group.
    ///
    /// # Returns
    /// The local batch loss.
    pub async fn compute_grad<L: LossFn>(
        &mut self,
        loss_fn: &L,
        x: ArrayD<f32>,
        y: &[u32],
    ) -> Result<f32> {
        let loss = self.model.compute_grad(&mut self.store, loss_fn, x, y)?;
        self.sync_gradients().await?;
        Ok(loss)
    }

    /// Replaces the local gradient with its mean over every rank.
    pub async fn sync_gradients(&mut self) -> Result<()> {
        let start = Instant::now();
        self.group.all_reduce_mean(self.store.grad_mut()).await?;
        self.last_sync = start.elapsed();
        Ok(())
    }

    /// Applies the synchronized gradient.
    pub fn step<O: Optimizer>(&mut self, optimizer: &mut O) -> Result<()> {
        Ok(self.store.optimize(optimizer)?)
    }

    /// The mean of `value` over every rank.
    pub async fn mean(&mut self, value: f32) -> Result<f32> {
        let mut buf = [value];
        self.group.all_reduce_mean(&mut buf).await?;
        Ok(buf[0])
    }

    /// Every rank's `data` concatenated in rank order.
    pub async fn all_gather(&mut self, data: &[u32]) -> Result<Vec<u32>> {
        Ok(self.group.all_gather(data).await?)
    }

    pub async fn barrier(&mut self) -> Result<()> {
        Ok(self.group.barrier().await?)
    }

    /// Leaves the group, handing back the trained model and its parameters.
    pub async fn shutdown(self) -> Result<(M, ParamStore)> {
        self.group.shutdown().await?;
        Ok((self.model, self.store))
    }
}
