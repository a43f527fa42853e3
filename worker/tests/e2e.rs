mod common;

use common::{run_world, synthetic};
use worker::{OptimizerKind, TrainConfig, eval::EvalReport};

fn config(world_size: usize) -> TrainConfig {
    TrainConfig {
        batch_size: 4 * world_size,
        test_batch_size: 8 * world_size,
        epochs: 1,
        log_interval: 2,
        world_size,
        ..TrainConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_rank_dry_run_trains_one_batch() {
    let config = TrainConfig {
        dry_run: true,
        ..config(1)
    };

    let mut reports = run_world(config, vec![synthetic(32)], synthetic(16)).await;
    let report = reports.remove(0).unwrap();

    assert_eq!(report.epochs.len(), 1);
    let train = &report.epochs[0].train;
    assert_eq!(train.batches, 1);
    assert_eq!(train.log_lines.len(), 1);
    assert!(
        train.log_lines[0].starts_with("Train Epoch: 1 [0/32 (0%)]\tLoss: "),
        "{}",
        train.log_lines[0]
    );

    // Evaluation still covers the whole test set.
    assert_eq!(report.epochs[0].eval.total, 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rank_zero_logs_every_interval() {
    let reports = run_world(config(2), vec![synthetic(40)], synthetic(8)).await;

    let root = reports[0].as_ref().unwrap();
    let leaf = reports[1].as_ref().unwrap();

    // 20 samples per rank in batches of 4.
    assert_eq!(root.epochs[0].train.batches, 5);
    assert_eq!(leaf.epochs[0].train.batches, 5);

    let lines = &root.epochs[0].train.log_lines;
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("Train Epoch: 1 [16/40 (40%)]"), "{}", lines[1]);
    assert!(leaf.epochs[0].train.log_lines.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn evaluation_counts_the_whole_test_set_across_ranks() {
    let config = TrainConfig {
        test_batch_size: 1000,
        dry_run: true,
        ..config(2)
    };

    let reports = run_world(config, vec![synthetic(16)], synthetic(10_000)).await;

    for report in &reports {
        let eval = &report.as_ref().unwrap().epochs[0].eval;
        assert_eq!(eval.total, 10_000);
        assert_eq!(eval.batches, 10);
    }

    let root_eval = &reports[0].as_ref().unwrap().epochs[0].eval;
    assert_eq!(root_eval.log_lines.len(), 10);
    assert!(
        root_eval.log_lines[0].starts_with("Test results: 1000/10000 10% correct/all: "),
        "{}",
        root_eval.log_lines[0]
    );
    assert!(root_eval.log_lines[9].starts_with("Test results: 10000/10000 100% "));

    let summary = root_eval.summary.as_deref().unwrap();
    assert!(
        summary.starts_with("Test set: Accuracy: ") && summary.contains("/10000 ("),
        "{summary}"
    );
    let leaf_eval = &reports[1].as_ref().unwrap().epochs[0].eval;
    assert!(leaf_eval.summary.is_none() && leaf_eval.log_lines.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn padded_samples_are_counted_once() {
    let reports = run_world(config(3), vec![synthetic(12)], synthetic(10)).await;

    for report in reports {
        let eval = &report.unwrap().epochs[0].eval;
        assert_eq!(eval.total, 10);
        assert!(eval.correct <= 10);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn learning_rate_decays_every_epoch() {
    let config = TrainConfig {
        epochs: 3,
        lr: 0.8,
        gamma: 0.5,
        dry_run: true,
        ..config(1)
    };

    let report = run_world(config, vec![synthetic(8)], synthetic(8))
        .await
        .remove(0)
        .unwrap();

    let lrs: Vec<_> = report.epochs.iter().map(|e| e.lr).collect();
    assert_eq!(lrs, vec![0.8, 0.4, 0.2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ranks_agree_on_the_group_loss() {
    let config = TrainConfig {
        epochs: 2,
        optimizer: OptimizerKind::Sgd,
        lr: 0.05,
        ..config(2)
    };

    let reports = run_world(config, vec![synthetic(32)], synthetic(16)).await;
    let root = reports[0].as_ref().unwrap();
    let leaf = reports[1].as_ref().unwrap();

    for (a, b) in root.epochs.iter().zip(&leaf.epochs) {
        let loss = a.train.last_loss.unwrap();
        assert!(loss.is_finite());
        assert_eq!(b.train.last_loss, Some(loss));
        let root_only = EvalReport {
            summary: None,
            log_lines: Vec::new(),
            ..a.eval.clone()
        };
        assert_eq!(root_only, b.eval);
    }
}
