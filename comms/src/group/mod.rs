//! A synchronous collective-communication group over TCP.
//!
//! Every non-root rank keeps a single connection to rank 0, which runs the collectives: it
//! collects the contributions in rank order, combines them and answers every peer with the
//! same bytes. Each collective is a blocking barrier for all ranks.

mod collective;
mod error;
mod rendezvous;

use std::{io, time::Duration};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::{OnoReceiver, OnoSender, msg::Msg};

pub use error::GroupErr;

/// The result type of the process group.
pub type Result<T> = std::result::Result<T, GroupErr>;

/// How a rank joins the group.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    pub rank: usize,
    pub world_size: usize,
    /// The local device ordinal this rank is bound to.
    pub device: usize,
    /// The rendezvous address, `host:port`, bound by rank 0.
    pub addr: String,
    /// Upper bound for the whole rendezvous.
    pub timeout: Duration,
}

/// One rank's handle to the process group.
pub struct ProcessGroup {
    rank: usize,
    world_size: usize,
    device: usize,
    links: Links,
}

enum Links {
    Solo,
    /// Rank 0, peers sorted by rank.
    Root { peers: Vec<Peer> },
    Leaf { root: Peer },
}

/// A connection to another rank.
struct Peer {
    rank: usize,
    rx: OnoReceiver<OwnedReadHalf>,
    tx: OnoSender<OwnedWriteHalf>,
    buf: Vec<u32>,
}

impl Peer {
    async fn send(&mut self, msg: &Msg<'_>) -> io::Result<()> {
        self.tx.send(msg).await
    }

    async fn recv(&mut self) -> io::Result<Msg<'_>> {
        self.rx.recv_into(&mut self.buf).await
    }
}

impl ProcessGroup {
    /// A group made of this single rank, every collective is the identity.
    pub fn solo(device: usize) -> Self {
        Self {
            rank: 0,
            world_size: 1,
            device,
            links: Links::Solo,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    pub fn device(&self) -> usize {
        self.device
    }

    pub fn is_root(&self) -> bool {
        self.rank == 0
    }
}

/// Builds the error for a message that does not belong to the running collective.
///
/// An error reported by the root rank wins over the mismatch itself.
fn unexpected(rank: usize, expected: &'static str, got: Msg<'_>) -> GroupErr {
    match got {
        Msg::Err(detail) => GroupErr::Remote(detail.into_owned()),
        other => GroupErr::UnexpectedMessage {
            rank,
            expected,
            got: other.kind(),
        },
    }
}
