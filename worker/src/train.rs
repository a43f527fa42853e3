use std::{num::NonZeroUsize, time::Instant};

use log::info;
use machine_learning::{
    arch::{Model, loss::NllLoss},
    optimization::Optimizer,
};

use crate::{
    config::TrainConfig,
    data::{DataLoader, Dataset, DistributedSampler},
    ddp::DistributedModel,
    error::Result,
    metrics::{ScalarMeter, WorkerMetrics},
    schedule::LogSchedule,
};

/// What one rank did during a training epoch.
#[derive(Debug, Clone, Default)]
pub struct TrainReport {
    pub batches: usize,
    /// The progress lines reported, only rank 0 reports any.
    pub log_lines: Vec<String>,
    /// The group-wide loss of the last batch.
    pub last_loss: Option<f32>,
}

/// Trains the replica for one epoch over this rank's shard.
///
/// Every batch's gradient is averaged over the group before the optimizer step. With more
/// than one rank the batch loss is averaged too and rank 0 reports the median of the last
/// `log_interval` losses instead of the raw one.
///
/// # Arguments
/// * `config` - The run's configuration.
/// * `ddp` - This rank's replica.
/// * `optimizer` - Applies the synchronized gradient.
/// * `dataset` - The training set.
/// * `sampler` - Already set to `epoch`.
/// * `epoch` - The 1-based epoch number, only used for reporting.
/// * `metrics` - Accumulates timings and volumes.
pub async fn train_epoch<M: Model, O: Optimizer>(
    config: &TrainConfig,
    ddp: &mut DistributedModel<M>,
    optimizer: &mut O,
    dataset: &Dataset,
    sampler: &DistributedSampler,
    epoch: usize,
    metrics: &mut WorkerMetrics,
) -> Result<TrainReport> {
    ddp.set_training(true);

    let loader = DataLoader::new(dataset, sampler.indices(), config.local_batch_size(), true);
    let nbatches = loader.len();
    let interval = NonZeroUsize::new(config.log_interval).unwrap_or(NonZeroUsize::MIN);
    let schedule = LogSchedule::new(interval);
    let mut meter = ScalarMeter::new(interval.get());

    let loss_fn = NllLoss::new();
    let world_size = ddp.world_size();
    let mut report = TrainReport::default();

    for (batch_idx, batch) in loader.enumerate() {
        let start = Instant::now();
        let n = batch.len();

        let mut loss = ddp
            .compute_grad(&loss_fn, batch.images.into_dyn(), &batch.labels)
            .await?;
        ddp.step(optimizer)?;

        metrics.sync_time += ddp.last_sync();
        metrics.compute_time += start.elapsed().saturating_sub(ddp.last_sync());
        metrics.bump_step();
        metrics.add_samples(n);
        report.batches += 1;

        if world_size > 1 {
            loss = ddp.mean(loss).await?;
        }

        report.last_loss = Some(loss);
        if ddp.is_root() {
            meter.push(loss);
        }

        if !schedule.should_log(batch_idx) {
            continue;
        }

        if ddp.is_root() {
            let shown = match world_size {
                1 => loss,
                _ => meter.win_median().unwrap_or(loss),
            };

            let line = format!(
                "Train Epoch: {epoch} [{}/{} ({:.0}%)]\tLoss: {shown:.6}",
                batch_idx * n * world_size,
                dataset.len(),
                100. * batch_idx as f32 / nbatches as f32,
            );

            info!("{line}");
            report.log_lines.push(line);
        }

        // Every rank leaves together, the next collective would hang otherwise.
        if config.dry_run {
            break;
        }
    }

    Ok(report)
}
