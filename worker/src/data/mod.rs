pub mod dataloader;
pub mod dataset;
pub mod mnist;
pub mod sampler;

pub use dataloader::DataLoader;
pub use dataset::{Batch, Dataset};
pub use sampler::{DistributedSampler, Remainder, shard_range};
