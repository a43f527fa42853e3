use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{
    config::{OptimizerKind, TrainConfig},
    error::Result,
};

/// Synchronous data-parallel training of a small convolutional MNIST classifier.
#[derive(Parser, Debug, Clone)]
#[command(name = "mnist-ddp", version)]
pub struct Args {
    /// Input batch size for training, split among the ranks
    #[arg(long, default_value_t = 64, value_name = "N")]
    pub batch_size: usize,

    /// Input batch size for testing, split among the ranks
    #[arg(long, default_value_t = 1000, value_name = "N")]
    pub test_batch_size: usize,

    /// Number of epochs to train
    #[arg(long, default_value_t = 14, value_name = "N")]
    pub epochs: usize,

    /// Learning rate
    #[arg(long, default_value_t = 1.0, value_name = "LR")]
    pub lr: f32,

    /// Learning rate step gamma
    #[arg(long, default_value_t = 0.7, value_name = "M")]
    pub gamma: f32,

    /// Random seed
    #[arg(long, default_value_t = 1, value_name = "S")]
    pub seed: u64,

    /// How many batches to wait before logging training status
    #[arg(long, default_value_t = 10, value_name = "N")]
    pub log_interval: usize,

    /// Quickly check a single pass
    #[arg(long)]
    pub dry_run: bool,

    /// Save the trained parameters
    #[arg(long)]
    pub save_model: bool,

    /// Where the trained parameters are saved
    #[arg(long, default_value = "mnist_cnn.safetensors")]
    pub checkpoint: PathBuf,

    #[arg(long, value_enum, default_value_t = OptimizerKind::Adadelta)]
    pub optimizer: OptimizerKind,

    /// Number of ranks taking part in the run
    #[arg(long, alias = "world-size", env = "WORLD_SIZE", default_value_t = 1)]
    pub gpus: usize,

    /// This process's rank and device
    #[arg(long, alias = "local_rank", env = "LOCAL_RANK", default_value_t = 0)]
    pub local_rank: usize,

    #[arg(long, env = "MASTER_ADDR", default_value = "127.0.0.1")]
    pub master_addr: String,

    #[arg(long, env = "MASTER_PORT", default_value_t = 10086)]
    pub master_port: u16,

    /// Seconds to wait for every rank to join
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Directory holding the MNIST IDX files
    #[arg(long, default_value = "../data")]
    pub data_dir: PathBuf,

    /// Launch every rank on this machine and wait for them
    #[arg(long)]
    pub spawn: bool,
}

impl Args {
    /// Validates the arguments into the run's configuration.
    pub fn into_config(self) -> Result<TrainConfig> {
        let config = TrainConfig {
            batch_size: self.batch_size,
            test_batch_size: self.test_batch_size,
            epochs: self.epochs,
            lr: self.lr,
            gamma: self.gamma,
            seed: self.seed,
            log_interval: self.log_interval,
            dry_run: self.dry_run,
            save_model: self.save_model,
            checkpoint: self.checkpoint,
            optimizer: self.optimizer,
            world_size: self.gpus,
            rank: self.local_rank,
            master_addr: self.master_addr,
            master_port: self.master_port,
            timeout: Duration::from_secs(self.timeout_secs),
            data_dir: self.data_dir,
        };

        config.validate()?;
        Ok(config)
    }
}
