use log::info;
use machine_learning::arch::Model;
use ndarray::ArrayView2;

use crate::{
    config::TrainConfig,
    data::{DataLoader, Dataset, DistributedSampler},
    ddp::DistributedModel,
    error::{Result, WorkerErr},
};

/// The accuracy of the replica over the whole held-out set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalReport {
    pub correct: usize,
    /// The amount of distinct samples evaluated, padded duplicates are counted once.
    pub total: usize,
    pub batches: usize,
    /// The per-batch progress lines, only rank 0 reports any.
    pub log_lines: Vec<String>,
    /// The final summary, only rank 0 reports it.
    pub summary: Option<String>,
}

impl EvalReport {
    /// The accuracy as a percentage.
    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            return 0.;
        }

        100. * self.correct as f32 / self.total as f32
    }
}

/// Evaluates the replica over this rank's shard of the held-out set.
///
/// Every batch's `(prediction, label, index)` triples are gathered from all ranks, so the
/// accuracy covers every sample the group saw, each dataset index counted once.
pub async fn evaluate<M: Model>(
    config: &TrainConfig,
    ddp: &mut DistributedModel<M>,
    dataset: &Dataset,
    sampler: &DistributedSampler,
) -> Result<EvalReport> {
    ddp.set_training(false);

    let loader = DataLoader::new(dataset, sampler.indices(), config.local_test_batch_size(), false);
    let nbatches = loader.len();

    let mut seen = vec![false; dataset.len()];
    let mut report = EvalReport::default();

    for (batch_idx, batch) in loader.enumerate() {
        let output = ddp.forward(batch.images.into_dyn())?;
        let predictions = argmax(output.view());

        let triples: Vec<u32> = predictions
            .iter()
            .zip(&batch.labels)
            .zip(&batch.indices)
            .flat_map(|((&pred, &label), &idx)| [pred, label, idx])
            .collect();

        let gathered = ddp.all_gather(&triples).await?;

        for triple in gathered.chunks_exact(3) {
            let (pred, label, idx) = (triple[0], triple[1], triple[2] as usize);

            let Some(visited) = seen.get_mut(idx) else {
                return Err(WorkerErr::UnknownSample {
                    index: idx,
                    len: dataset.len(),
                });
            };

            if !*visited {
                *visited = true;
                report.total += 1;
                report.correct += (pred == label) as usize;
            }
        }

        report.batches += 1;

        if ddp.is_root() {
            let line = format!(
                "Test results: {}/{} {:.0}% correct/all: {}/{}",
                report.total,
                dataset.len(),
                100. * (batch_idx + 1) as f32 / nbatches as f32,
                report.correct,
                report.total,
            );

            info!("{line}");
            report.log_lines.push(line);
        }
    }

    if ddp.is_root() {
        let summary = format!(
            "Test set: Accuracy: {}/{} ({:.0}%)",
            report.correct,
            report.total,
            report.accuracy()
        );

        info!("{summary}");
        report.summary = Some(summary);
    }

    Ok(report)
}

/// The index of the largest value of every row, the first one on ties.
fn argmax(output: ArrayView2<f32>) -> Vec<u32> {
    output
        .rows()
        .into_iter()
        .map(|row| {
            let (best, _) = row
                .iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
                    if v > max { (i, v) } else { (best, max) }
                });

            best as u32
        })
        .collect()
}
