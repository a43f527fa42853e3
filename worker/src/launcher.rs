//! Single machine launcher: runs every rank of a group as a child process of this one.

use std::{env, ffi::OsString, path::Path};

use log::{info, warn};
use tokio::process::Command;

use crate::{
    config::TrainConfig,
    error::{Result, WorkerErr},
};

/// Flags that would override the rank each child is given through its environment.
const RANK_FLAGS: [&str; 2] = ["--local-rank", "--local_rank"];

/// Re-executes the current binary once per rank and waits for all of them.
///
/// Each child gets the command line of this process, minus `--spawn` and any explicit rank,
/// and learns its rank and the rendezvous address through `RANK`, `LOCAL_RANK`,
/// `WORLD_SIZE`, `MASTER_ADDR` and `MASTER_PORT`. The children are killed if this future is
/// dropped.
///
/// # Errors
/// `WorkerErr::Launcher` listing the ranks that exited unsuccessfully.
pub async fn spawn_ranks(config: &TrainConfig) -> Result<()> {
    let exe = env::current_exe()?;
    let args = rank_args(env::args_os().skip(1));
    launch(&exe, &args, config).await
}

/// Runs `exe` with `args` once per rank of `config` and waits for all of them.
///
/// # Errors
/// `WorkerErr::Io` if a child can't be started, `WorkerErr::Launcher` listing the ranks that
/// exited unsuccessfully.
pub async fn launch(exe: &Path, args: &[OsString], config: &TrainConfig) -> Result<()> {
    let world_size = config.world_size;

    let mut children = Vec::with_capacity(world_size);
    for rank in 0..world_size {
        let child = Command::new(exe)
            .args(args)
            .env("RANK", rank.to_string())
            .env("LOCAL_RANK", rank.to_string())
            .env("WORLD_SIZE", world_size.to_string())
            .env("MASTER_ADDR", &config.master_addr)
            .env("MASTER_PORT", config.master_port.to_string())
            .kill_on_drop(true)
            .spawn()?;

        children.push(child);
    }

    info!("launched {world_size} ranks, rendezvous at {}", config.rendezvous_addr());

    let mut failed = Vec::new();
    for (rank, mut child) in children.into_iter().enumerate() {
        let status = child.wait().await?;
        if !status.success() {
            warn!("rank {rank} exited with {status}");
            failed.push(rank);
        }
    }

    if !failed.is_empty() {
        return Err(WorkerErr::Launcher { failed, world_size });
    }

    Ok(())
}

/// Strips the arguments a rank must not inherit from the launcher's command line.
fn rank_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut out = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let Some(flag) = arg.to_str() else {
            out.push(arg);
            continue;
        };

        if flag == "--spawn" {
            continue;
        }

        if RANK_FLAGS.contains(&flag) {
            // Skips the value too.
            args.next();
            continue;
        }

        if RANK_FLAGS.iter().any(|f| flag.starts_with(&format!("{f}="))) {
            continue;
        }

        out.push(arg);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(args: &[&str]) -> Vec<String> {
        rank_args(args.iter().map(OsString::from))
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect()
    }

    #[test]
    fn spawn_and_rank_flags_are_stripped() {
        let args = strip(&[
            "--epochs",
            "2",
            "--spawn",
            "--local_rank",
            "3",
            "--gpus",
            "4",
            "--local-rank=1",
            "--dry-run",
        ]);

        assert_eq!(args, vec!["--epochs", "2", "--gpus", "4", "--dry-run"]);
    }

    fn shell(script: &str) -> Vec<OsString> {
        vec!["-c".into(), script.into()]
    }

    fn world(world_size: usize) -> TrainConfig {
        TrainConfig {
            world_size,
            master_port: 10123,
            ..TrainConfig::default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn every_rank_gets_its_environment() {
        let script = shell(
            r#"test "$WORLD_SIZE" = 3 && test "$LOCAL_RANK" = "$RANK" \
                && test "$MASTER_ADDR" = 127.0.0.1 && test "$MASTER_PORT" = 10123"#,
        );

        launch(Path::new("/bin/sh"), &script, &world(3)).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_ranks_are_reported() {
        // Odd ranks fail.
        let script = shell("exit $((RANK % 2))");

        let err = launch(Path::new("/bin/sh"), &script, &world(4))
            .await
            .unwrap_err();

        assert!(
            matches!(&err, WorkerErr::Launcher { failed, world_size: 4 } if failed == &[1, 3]),
            "{err}"
        );
    }

    #[tokio::test]
    async fn missing_executable_is_an_io_error() {
        let err = launch(Path::new("/nonexistent/mnist-ddp"), &[], &world(2))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerErr::Io(_)), "{err}");
    }

    #[test]
    fn other_arguments_are_kept_in_order() {
        let args = strip(&["--data-dir", "/tmp/mnist", "--seed", "7"]);
        assert_eq!(args, vec!["--data-dir", "/tmp/mnist", "--seed", "7"]);
    }
}
