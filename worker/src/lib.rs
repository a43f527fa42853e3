pub mod builder;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod data;
pub mod ddp;
pub mod error;
pub mod eval;
pub mod launcher;
pub mod metrics;
pub mod schedule;
pub mod train;
pub mod worker;

pub use builder::{WorkerBuilder, run};
pub use cli::Args;
pub use config::{OptimizerKind, TrainConfig};
pub use error::{Result, WorkerErr};
pub use worker::{EpochReport, RunReport, Worker};
