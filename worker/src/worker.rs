use std::path::PathBuf;

use log::{debug, info};
use machine_learning::{
    ParamStore,
    arch::Model,
    optimization::{AnyOptimizer, Optimizer, StepLr},
};

use crate::{
    checkpoint,
    config::TrainConfig,
    data::{Dataset, DistributedSampler},
    ddp::DistributedModel,
    error::Result,
    eval::{EvalReport, evaluate},
    metrics::WorkerMetrics,
    train::{TrainReport, train_epoch},
};

/// What happened during one epoch.
#[derive(Debug, Clone)]
pub struct EpochReport {
    pub epoch: usize,
    /// The learning rate the epoch trained with.
    pub lr: f32,
    pub train: TrainReport,
    pub eval: EvalReport,
}

/// The outcome of a whole run on one rank.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub epochs: Vec<EpochReport>,
    pub checkpoint: Option<PathBuf>,
    pub metrics: WorkerMetrics,
    /// The trained parameters of this rank's replica.
    pub params: ParamStore,
}

/// One rank of a data-parallel training run.
pub struct Worker<M: Model> {
    config: TrainConfig,
    ddp: DistributedModel<M>,
    optimizer: AnyOptimizer,
    scheduler: StepLr,
    train_set: Dataset,
    test_set: Dataset,
}

impl<M: Model> Worker<M> {
    /// Creates a new `Worker`.
    ///
    /// # Arguments
    /// * `config` - The run's configuration.
    /// * `ddp` - The already synchronized replica.
    /// * `optimizer` - Steps the replica's parameters.
    /// * `scheduler` - Decays the optimizer's learning rate after every epoch.
    /// * `train_set` - The whole training set, every rank visits its own shard.
    /// * `test_set` - The whole held-out set.
    ///
    /// # Returns
    /// A new worker instance.
    pub fn new(
        config: TrainConfig,
        ddp: DistributedModel<M>,
        optimizer: AnyOptimizer,
        scheduler: StepLr,
        train_set: Dataset,
        test_set: Dataset,
    ) -> Self {
        Self {
            config,
            ddp,
            optimizer,
            scheduler,
            train_set,
            test_set,
        }
    }

    /// Trains and evaluates for every configured epoch, saves the parameters if asked to and
    /// leaves the group.
    ///
    /// # Errors
    /// Returns `WorkerErr` on any failure, every rank of the group fails along.
    pub async fn run(self) -> Result<RunReport> {
        let Self {
            config,
            mut ddp,
            mut optimizer,
            mut scheduler,
            train_set,
            test_set,
        } = self;

        let (rank, world_size) = (ddp.rank(), ddp.world_size());
        let mut train_sampler =
            DistributedSampler::new(train_set.len(), rank, world_size).with_seed(config.seed);
        let test_sampler =
            DistributedSampler::new(test_set.len(), rank, world_size).with_shuffle(false);

        if ddp.is_root() {
            info!(
                "Total train examples: {} total test examples: {}",
                train_set.len(),
                test_set.len()
            );
        }

        let mut metrics = WorkerMetrics::default();
        let mut epochs = Vec::with_capacity(config.epochs);

        for epoch in 1..=config.epochs {
            if ddp.is_root() {
                info!("Training epoch {epoch}");
            }

            let lr = optimizer.learning_rate();
            train_sampler.set_epoch(epoch);

            let train = train_epoch(
                &config,
                &mut ddp,
                &mut optimizer,
                &train_set,
                &train_sampler,
                epoch,
                &mut metrics,
            )
            .await?;
            let eval = evaluate(&config, &mut ddp, &test_set, &test_sampler).await?;

            scheduler.step(&mut optimizer);
            epochs.push(EpochReport {
                epoch,
                lr,
                train,
                eval,
            });
        }

        let mut saved = None;
        if config.save_model && ddp.is_root() {
            checkpoint::save(&config.checkpoint, ddp.model(), ddp.store())?;
            saved = Some(config.checkpoint.clone());
        }

        let (_, params) = ddp.shutdown().await?;

        debug!(
            rank = rank,
            steps = metrics.steps,
            samples = metrics.samples;
            "done, {:.1}% of the step time spent synchronizing",
            100. * metrics.sync_ratio()
        );

        Ok(RunReport {
            epochs,
            checkpoint: saved,
            metrics,
            params,
        })
    }
}
