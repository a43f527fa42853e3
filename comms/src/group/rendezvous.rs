use std::{io, time::Duration};

use log::{debug, info, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    time,
};

use super::{GroupConfig, GroupErr, Links, Peer, ProcessGroup, Result};
use crate::msg::{Command, Msg};

const CONNECT_RETRY: Duration = Duration::from_millis(100);

impl Peer {
    fn new(rank: usize, stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let (rx, tx) = stream.into_split();
        let (rx, tx) = crate::channel(rx, tx);

        Ok(Self {
            rank,
            rx,
            tx,
            buf: Vec::new(),
        })
    }
}

impl ProcessGroup {
    /// Joins the process group described by `config`.
    ///
    /// Rank 0 binds the rendezvous address and waits for every other rank, the rest connect
    /// to it. A world of one rank opens no sockets at all.
    ///
    /// # Errors
    /// `GroupErr::Timeout` if the group is not complete within `config.timeout`.
    pub async fn init(config: &GroupConfig) -> Result<Self> {
        let GroupConfig {
            rank,
            world_size,
            device,
            timeout,
            ..
        } = *config;

        if rank >= world_size {
            return Err(GroupErr::InvalidRank { rank, world_size });
        }

        if world_size == 1 {
            return Ok(Self::solo(device));
        }

        if rank == 0 {
            let listener = TcpListener::bind(&config.addr).await?;
            info!(
                "rank 0 listening at {} for {} peers",
                config.addr,
                world_size - 1
            );
            Self::host(listener, world_size, device, timeout).await
        } else {
            Self::join(&config.addr, rank, world_size, device, timeout).await
        }
    }

    /// Hosts the group as rank 0 on an already bound listener.
    pub async fn host(
        listener: TcpListener,
        world_size: usize,
        device: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let peers = time::timeout(timeout, accept_peers(&listener, world_size))
            .await
            .map_err(|_| GroupErr::Timeout(timeout))??;

        let links = if peers.is_empty() {
            Links::Solo
        } else {
            Links::Root { peers }
        };

        Ok(Self {
            rank: 0,
            world_size,
            device,
            links,
        })
    }

    /// Joins the group hosted at `addr` as a non-root rank.
    ///
    /// Connection attempts are retried until the root is listening or `timeout` expires.
    pub async fn join(
        addr: &str,
        rank: usize,
        world_size: usize,
        device: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if rank == 0 || rank >= world_size {
            return Err(GroupErr::InvalidRank { rank, world_size });
        }

        let root = time::timeout(timeout, handshake(addr, rank, world_size, device))
            .await
            .map_err(|_| GroupErr::Timeout(timeout))??;

        debug!("rank {rank} joined a group of {world_size}");

        Ok(Self {
            rank,
            world_size,
            device,
            links: Links::Leaf { root },
        })
    }
}

async fn accept_peers(listener: &TcpListener, world_size: usize) -> Result<Vec<Peer>> {
    let mut slots: Vec<Option<Peer>> = (1..world_size).map(|_| None).collect();

    for _ in 1..world_size {
        let (stream, remote) = listener.accept().await?;
        let mut peer = Peer::new(0, stream)?;

        let (rank, device) = match peer.recv().await? {
            Msg::Control(Command::Join { rank, device }) => (rank, device),
            other => {
                let detail = format!("{remote} sent {} instead of joining", other.kind());
                return Err(io::Error::new(io::ErrorKind::InvalidData, detail).into());
            }
        };

        let rejection = if rank == 0 || rank >= world_size {
            Some(GroupErr::InvalidRank { rank, world_size })
        } else if slots[rank - 1].is_some() {
            Some(GroupErr::DuplicateRank(rank))
        } else {
            None
        };

        if let Some(err) = rejection {
            warn!("rejecting {remote}: {err}");
            let detail = Msg::Err(err.to_string().into());
            let _ = peer.send(&detail).await;
            for other in slots.iter_mut().flatten() {
                let _ = other.send(&detail).await;
            }

            return Err(err);
        }

        debug!(rank = rank, device = device; "peer joined from {remote}");
        peer.rank = rank;
        slots[rank - 1] = Some(peer);
    }

    let mut peers: Vec<Peer> = slots.into_iter().flatten().collect();
    let welcome = Msg::Control(Command::Welcome { world_size });
    for peer in &mut peers {
        peer.send(&welcome).await?;
    }

    info!("all {world_size} ranks joined");
    Ok(peers)
}

async fn handshake(addr: &str, rank: usize, world_size: usize, device: usize) -> Result<Peer> {
    let stream = loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => break stream,
            Err(e) => {
                debug!("rank {rank} could not reach {addr} yet: {e}");
                time::sleep(CONNECT_RETRY).await;
            }
        }
    };

    let mut root = Peer::new(0, stream)?;
    root.send(&Msg::Control(Command::Join { rank, device })).await?;

    let remote = match root.recv().await? {
        Msg::Control(Command::Welcome { world_size }) => world_size,
        other => return Err(super::unexpected(0, "control/welcome", other)),
    };

    if remote != world_size {
        return Err(GroupErr::WorldSizeMismatch {
            local: world_size,
            remote,
        });
    }

    Ok(root)
}
