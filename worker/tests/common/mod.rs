#![allow(dead_code)]

use std::time::Duration;

use comms::ProcessGroup;
use machine_learning::arch::NetConfig;
use ndarray::Array;
use tokio::net::TcpListener;
use worker::{Result, RunReport, TrainConfig, WorkerBuilder, data::Dataset};

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// A network small enough to train in a test, on 1x8x8 inputs and 4 classes.
pub fn tiny_net() -> NetConfig {
    NetConfig {
        height: 8,
        width: 8,
        conv1_channels: 2,
        conv2_channels: 3,
        hidden: 5,
        classes: 4,
        ..NetConfig::default()
    }
}

/// A deterministic dataset of `n` 1x8x8 images whose label depends on the brightest quadrant.
pub fn synthetic(n: usize) -> Dataset {
    let labels: Vec<u32> = (0..n).map(|i| (i % 4) as u32).collect();
    let images = Array::from_shape_fn((n, 1, 8, 8), |(s, _, i, j)| {
        let quadrant = (i / 4) * 2 + j / 4;
        let base = if quadrant == s % 4 { 1. } else { -0.5 };
        base + 0.1 * ((s * 64 + i * 8 + j) as f32 * 0.7).sin()
    });

    Dataset::new(images, labels).unwrap()
}

/// Forms a loopback group of `world_size` ranks, returned in rank order.
pub async fn form_group(world_size: usize) -> Vec<ProcessGroup> {
    if world_size == 1 {
        return vec![ProcessGroup::solo(0)];
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let host = tokio::spawn(ProcessGroup::host(listener, world_size, 0, TIMEOUT));
    let leaves: Vec<_> = (1..world_size)
        .map(|rank| {
            let addr = addr.clone();
            tokio::spawn(async move {
                ProcessGroup::join(&addr, rank, world_size, rank, TIMEOUT).await
            })
        })
        .collect();

    let mut groups = vec![host.await.unwrap().unwrap()];
    for leaf in leaves {
        groups.push(leaf.await.unwrap().unwrap());
    }

    groups
}

/// Runs every rank of a training run as a task and returns their outcomes in rank order.
///
/// `train_sets` holds either one dataset shared by every rank or one per rank.
pub async fn run_world(
    config: TrainConfig,
    train_sets: Vec<Dataset>,
    test_set: Dataset,
) -> Vec<Result<RunReport>> {
    run_world_with(config, train_sets, vec![test_set]).await
}

/// Like `run_world`, with either one test set shared by every rank or one per rank.
pub async fn run_world_with(
    config: TrainConfig,
    train_sets: Vec<Dataset>,
    test_sets: Vec<Dataset>,
) -> Vec<Result<RunReport>> {
    let world_size = config.world_size;
    let groups = form_group(world_size).await;

    let handles: Vec<_> = groups
        .into_iter()
        .enumerate()
        .map(|(rank, group)| {
            let config = TrainConfig {
                rank,
                ..config.clone()
            };
            let train_set = train_sets[rank.min(train_sets.len() - 1)].clone();
            let test_set = test_sets[rank.min(test_sets.len() - 1)].clone();

            tokio::spawn(async move {
                let worker = WorkerBuilder::with_net(tiny_net())
                    .build(config, train_set, test_set, group)
                    .await?;
                worker.run().await
            })
        })
        .collect();

    let mut reports = Vec::with_capacity(world_size);
    for handle in handles {
        reports.push(handle.await.unwrap());
    }

    reports
}
