use std::{path::PathBuf, time::Duration};

use clap::ValueEnum;
use comms::GroupConfig;

use crate::error::{Result, WorkerErr};

/// The optimizer every rank steps with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OptimizerKind {
    #[default]
    Adadelta,
    /// Plain gradient descent.
    Sgd,
}

/// Immutable settings of a training run, shared by every stage of a rank.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    /// Global training batch size, split evenly among the ranks.
    pub batch_size: usize,
    /// Global evaluation batch size, split evenly among the ranks.
    pub test_batch_size: usize,
    pub epochs: usize,
    pub lr: f32,
    pub gamma: f32,
    pub seed: u64,
    pub log_interval: usize,
    pub dry_run: bool,
    pub save_model: bool,
    pub checkpoint: PathBuf,
    pub optimizer: OptimizerKind,
    pub world_size: usize,
    pub rank: usize,
    pub master_addr: String,
    pub master_port: u16,
    pub timeout: Duration,
    pub data_dir: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            test_batch_size: 1000,
            epochs: 14,
            lr: 1.0,
            gamma: 0.7,
            seed: 1,
            log_interval: 10,
            dry_run: false,
            save_model: false,
            checkpoint: PathBuf::from("mnist_cnn.safetensors"),
            optimizer: OptimizerKind::Adadelta,
            world_size: 1,
            rank: 0,
            master_addr: "127.0.0.1".to_string(),
            master_port: 10086,
            timeout: Duration::from_secs(300),
            data_dir: PathBuf::from("../data"),
        }
    }
}

impl TrainConfig {
    /// The training batch size each rank draws.
    pub fn local_batch_size(&self) -> usize {
        self.batch_size / self.world_size.max(1)
    }

    /// The evaluation batch size each rank draws.
    pub fn local_test_batch_size(&self) -> usize {
        self.test_batch_size / self.world_size.max(1)
    }

    /// The seed of everything local to this rank: initial parameters and dropout masks.
    pub fn rank_seed(&self) -> u64 {
        self.seed.wrapping_add(self.rank as u64)
    }

    pub fn rendezvous_addr(&self) -> String {
        format!("{}:{}", self.master_addr, self.master_port)
    }

    pub fn group_config(&self) -> GroupConfig {
        GroupConfig {
            rank: self.rank,
            world_size: self.world_size,
            device: self.rank,
            addr: self.rendezvous_addr(),
            timeout: self.timeout,
        }
    }

    /// Checks the settings are usable before any resource is acquired.
    ///
    /// # Errors
    /// `WorkerErr::Config` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("epochs", self.epochs),
            ("log interval", self.log_interval),
            ("world size", self.world_size),
        ];

        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(WorkerErr::Config(format!("{name} must be positive")));
        }

        if self.rank >= self.world_size {
            return Err(WorkerErr::Config(format!(
                "local rank {} is outside a world of {}",
                self.rank, self.world_size
            )));
        }

        if self.local_batch_size() == 0 || self.local_test_batch_size() == 0 {
            return Err(WorkerErr::Config(format!(
                "batch sizes {}/{} leave nothing for each of the {} ranks",
                self.batch_size, self.test_batch_size, self.world_size
            )));
        }

        if !(self.lr.is_finite() && self.lr > 0.) {
            return Err(WorkerErr::Config(format!(
                "learning rate must be positive, got {}",
                self.lr
            )));
        }

        if !(self.gamma > 0. && self.gamma <= 1.) {
            return Err(WorkerErr::Config(format!(
                "gamma must be in (0, 1], got {}",
                self.gamma
            )));
        }

        Ok(())
    }
}
