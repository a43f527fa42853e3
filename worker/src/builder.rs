use comms::ProcessGroup;
use log::info;
use machine_learning::{
    ParamStore,
    arch::{Model, NetConfig, Sequential},
    optimization::{Adadelta, AnyOptimizer, GradientDescent, StepLr},
};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    Worker,
    config::{OptimizerKind, TrainConfig},
    data::{
        Dataset,
        mnist::{self, Split},
    },
    ddp::DistributedModel,
    error::{Result, WorkerErr},
    worker::RunReport,
};

/// Assembles a rank's `Worker` around a network architecture.
#[derive(Debug, Clone, Default)]
pub struct WorkerBuilder {
    net: NetConfig,
}

impl WorkerBuilder {
    /// A builder for the default MNIST network.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_net(net: NetConfig) -> Self {
        Self { net }
    }

    /// Builds a `Worker` for the rank `group` belongs to.
    ///
    /// The replica is initialized from the rank's seed and then overwritten with rank 0's
    /// parameters, so every rank must call this concurrently.
    ///
    /// # Args
    /// * `config` - The validated run configuration.
    /// * `train_set` - The training set, identical on every rank.
    /// * `test_set` - The held-out set, identical on every rank.
    /// * `group` - This rank's handle to the process group.
    ///
    /// # Returns
    /// A fully initialized `Worker` instance.
    pub async fn build(
        &self,
        config: TrainConfig,
        train_set: Dataset,
        test_set: Dataset,
        group: ProcessGroup,
    ) -> Result<Worker<Sequential>> {
        let input = (self.net.in_channels, self.net.height, self.net.width);
        for (name, dataset) in [("training", &train_set), ("test", &test_set)] {
            if dataset.sample_dim() != input {
                return Err(WorkerErr::Config(format!(
                    "{name} samples are {:?} but the network takes {input:?}",
                    dataset.sample_dim()
                )));
            }
        }

        let seed = config.rank_seed();
        // Two dropout streams per rank.
        let model = self.net.build(seed.wrapping_mul(2))?;

        let mut store = ParamStore::new(model.size());
        model.init_params(&mut store, &mut StdRng::seed_from_u64(seed))?;

        let ddp = DistributedModel::wrap(model, store, group).await?;

        let size = ddp.store().len();
        let optimizer = match config.optimizer {
            OptimizerKind::Adadelta => {
                AnyOptimizer::Adadelta(Adadelta::with_defaults(size, config.lr))
            }
            OptimizerKind::Sgd => AnyOptimizer::GradientDescent(GradientDescent::new(config.lr)),
        };
        let scheduler = StepLr::new(&optimizer, 1, config.gamma);

        if ddp.is_root() {
            info!(
                "built a {size} parameter model on {} ranks, {:?} optimizer",
                ddp.world_size(),
                config.optimizer
            );
        }

        Ok(Worker::new(config, ddp, optimizer, scheduler, train_set, test_set))
    }
}

/// Runs this process's rank of a training run over MNIST from start to end.
///
/// Loads both splits from `config.data_dir`, joins the process group and drives the worker.
pub async fn run(config: TrainConfig) -> Result<RunReport> {
    config.validate()?;

    let train_set = mnist::load(&config.data_dir, Split::Train)?;
    let test_set = mnist::load(&config.data_dir, Split::Test)?;

    let group = ProcessGroup::init(&config.group_config()).await?;
    info!(
        rank = group.rank(),
        device = group.device();
        "joined a group of {}",
        group.world_size()
    );

    let worker = WorkerBuilder::new()
        .build(config, train_set, test_set, group)
        .await?;

    worker.run().await
}
