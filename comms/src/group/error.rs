use std::{error::Error, fmt, io, time::Duration};

/// Process group failures.
#[derive(Debug)]
pub enum GroupErr {
    Io(io::Error),
    Timeout(Duration),
    InvalidRank {
        rank: usize,
        world_size: usize,
    },
    DuplicateRank(usize),
    WorldSizeMismatch {
        local: usize,
        remote: usize,
    },
    ShapeMismatch {
        rank: usize,
        got: usize,
        expected: usize,
    },
    UnexpectedMessage {
        rank: usize,
        expected: &'static str,
        got: &'static str,
    },
    /// The root rank aborted the collective and reported why.
    Remote(String),
}

impl fmt::Display for GroupErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupErr::Io(e) => write!(f, "io error: {e}"),
            GroupErr::Timeout(timeout) => {
                write!(f, "process group rendezvous timed out after {timeout:?}")
            }
            GroupErr::InvalidRank { rank, world_size } => {
                write!(f, "invalid rank {rank} for a world size of {world_size}")
            }
            GroupErr::DuplicateRank(rank) => write!(f, "rank {rank} joined the group twice"),
            GroupErr::WorldSizeMismatch { local, remote } => write!(
                f,
                "world size mismatch: this rank expects {local}, the root expects {remote}"
            ),
            GroupErr::ShapeMismatch {
                rank,
                got,
                expected,
            } => write!(
                f,
                "collective length mismatch with rank {rank}: got {got}, expected {expected}"
            ),
            GroupErr::UnexpectedMessage {
                rank,
                expected,
                got,
            } => write!(
                f,
                "unexpected message from rank {rank}: expected {expected}, got {got}"
            ),
            GroupErr::Remote(detail) => write!(f, "the root rank aborted: {detail}"),
        }
    }
}

impl Error for GroupErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GroupErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for GroupErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<GroupErr> for io::Error {
    fn from(value: GroupErr) -> Self {
        match value {
            GroupErr::Io(e) => e,
            GroupErr::Timeout(_) => io::Error::new(io::ErrorKind::TimedOut, value),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
