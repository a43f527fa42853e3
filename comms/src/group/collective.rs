use log::{debug, error};

use super::{GroupErr, Links, Peer, ProcessGroup, Result, unexpected};
use crate::msg::{Command, Msg, Payload};

impl ProcessGroup {
    /// Replaces `data` on every rank with the element-wise mean over all ranks.
    ///
    /// Contributions are summed in rank order by rank 0, so the result is bitwise identical
    /// on every rank.
    pub async fn all_reduce_mean(&mut self, data: &mut [f32]) -> Result<()> {
        let world_size = self.world_size as f32;

        match &mut self.links {
            Links::Solo => Ok(()),
            Links::Root { peers } => {
                let reduced = reduce(peers, data).await;
                guard(peers, reduced).await?;

                data.iter_mut().for_each(|x| *x /= world_size);
                let msg = Msg::Data(Payload::Reduce(data));
                for peer in peers.iter_mut() {
                    peer.send(&msg).await?;
                }

                Ok(())
            }
            Links::Leaf { root } => {
                root.send(&Msg::Data(Payload::Reduce(data))).await?;

                match root.recv().await? {
                    Msg::Data(Payload::Reduce(mean)) => copy_into(data, mean),
                    other => Err(unexpected(0, "data/reduce", other)),
                }
            }
        }
    }

    /// Overwrites `data` on every rank with rank 0's values.
    pub async fn broadcast(&mut self, data: &mut [f32]) -> Result<()> {
        match &mut self.links {
            Links::Solo => Ok(()),
            Links::Root { peers } => {
                let checked = check_broadcast(peers, data.len()).await;
                guard(peers, checked).await?;

                let msg = Msg::Data(Payload::Broadcast(data));
                for peer in peers.iter_mut() {
                    peer.send(&msg).await?;
                }

                Ok(())
            }
            Links::Leaf { root } => {
                // The non-root ranks announce the length they expect.
                root.send(&Msg::Data(Payload::Broadcast(data))).await?;

                match root.recv().await? {
                    Msg::Data(Payload::Broadcast(values)) => copy_into(data, values),
                    other => Err(unexpected(0, "data/broadcast", other)),
                }
            }
        }
    }

    /// Concatenates every rank's `data` in rank order and returns the result on every rank.
    pub async fn all_gather(&mut self, data: &[u32]) -> Result<Vec<u32>> {
        match &mut self.links {
            Links::Solo => Ok(data.to_vec()),
            Links::Root { peers } => {
                let gathered = gather(peers, data).await;
                let gathered = guard(peers, gathered).await?;

                let msg = Msg::Data(Payload::Gather(&gathered));
                for peer in peers.iter_mut() {
                    peer.send(&msg).await?;
                }

                Ok(gathered)
            }
            Links::Leaf { root } => {
                root.send(&Msg::Data(Payload::Gather(data))).await?;

                match root.recv().await? {
                    Msg::Data(Payload::Gather(all)) => Ok(all.to_vec()),
                    other => Err(unexpected(0, "data/gather", other)),
                }
            }
        }
    }

    /// Blocks until every rank has entered the barrier.
    pub async fn barrier(&mut self) -> Result<()> {
        self.exchange(Command::Barrier, "control/barrier").await
    }

    /// Tears the group down once every rank has asked to leave.
    pub async fn shutdown(mut self) -> Result<()> {
        self.exchange(Command::Disconnect, "control/disconnect").await?;

        debug!("rank {} left the group", self.rank);
        Ok(())
    }

    /// Every non-root rank sends `cmd` to the root, which answers with the same command once
    /// all of them arrived.
    async fn exchange(&mut self, cmd: Command, expected: &'static str) -> Result<()> {
        match &mut self.links {
            Links::Solo => Ok(()),
            Links::Root { peers } => {
                let collected = collect_command(peers, &cmd, expected).await;
                guard(peers, collected).await?;

                let msg = Msg::Control(cmd);
                for peer in peers.iter_mut() {
                    peer.send(&msg).await?;
                }

                Ok(())
            }
            Links::Leaf { root } => {
                root.send(&Msg::Control(cmd.clone())).await?;

                match root.recv().await? {
                    Msg::Control(got) if got == cmd => Ok(()),
                    other => Err(unexpected(0, expected, other)),
                }
            }
        }
    }
}

/// Reports a failed collective to every peer before handing the error back.
async fn guard<T>(peers: &mut [Peer], result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        error!("aborting collective: {err}");

        let detail = Msg::Err(err.to_string().into());
        for peer in peers.iter_mut() {
            let _ = peer.send(&detail).await;
        }
    }

    result
}

async fn reduce(peers: &mut [Peer], acc: &mut [f32]) -> Result<()> {
    for peer in peers.iter_mut() {
        let rank = peer.rank;
        match peer.recv().await? {
            Msg::Data(Payload::Reduce(values)) => {
                check_len(rank, values.len(), acc.len())?;
                acc.iter_mut().zip(values).for_each(|(a, v)| *a += v);
            }
            other => return Err(unexpected(rank, "data/reduce", other)),
        }
    }

    Ok(())
}

async fn check_broadcast(peers: &mut [Peer], len: usize) -> Result<()> {
    for peer in peers.iter_mut() {
        let rank = peer.rank;
        match peer.recv().await? {
            Msg::Data(Payload::Broadcast(values)) => check_len(rank, values.len(), len)?,
            other => return Err(unexpected(rank, "data/broadcast", other)),
        }
    }

    Ok(())
}

async fn gather(peers: &mut [Peer], own: &[u32]) -> Result<Vec<u32>> {
    let mut all = own.to_vec();

    for peer in peers.iter_mut() {
        let rank = peer.rank;
        match peer.recv().await? {
            Msg::Data(Payload::Gather(values)) => all.extend_from_slice(values),
            other => return Err(unexpected(rank, "data/gather", other)),
        }
    }

    Ok(all)
}

async fn collect_command(peers: &mut [Peer], cmd: &Command, expected: &'static str) -> Result<()> {
    for peer in peers.iter_mut() {
        let rank = peer.rank;
        match peer.recv().await? {
            Msg::Control(got) if got == *cmd => {}
            other => return Err(unexpected(rank, expected, other)),
        }
    }

    Ok(())
}

fn check_len(rank: usize, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(GroupErr::ShapeMismatch {
            rank,
            got,
            expected,
        });
    }

    Ok(())
}

fn copy_into(dst: &mut [f32], src: &[f32]) -> Result<()> {
    check_len(0, src.len(), dst.len())?;
    dst.copy_from_slice(src);
    Ok(())
}
