use std::{error::Error, fmt, io, path::PathBuf};

use comms::GroupErr;
use machine_learning::MlErr;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Worker runtime failures.
#[derive(Debug)]
pub enum WorkerErr {
    Io(io::Error),
    Group(GroupErr),
    Ml(MlErr),
    Config(String),
    Dataset {
        path: PathBuf,
        reason: String,
    },
    Checkpoint {
        path: PathBuf,
        reason: String,
    },
    Launcher {
        failed: Vec<usize>,
        world_size: usize,
    },
    /// A rank reported a prediction for a sample the local test set doesn't have, the ranks
    /// are not evaluating the same data.
    UnknownSample {
        index: usize,
        len: usize,
    },
}

impl WorkerErr {
    pub(crate) fn dataset(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Dataset {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn checkpoint(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Checkpoint {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::Group(e) => write!(f, "process group error: {e}"),
            WorkerErr::Ml(e) => write!(f, "model error: {e}"),
            WorkerErr::Config(detail) => write!(f, "invalid configuration: {detail}"),
            WorkerErr::Dataset { path, reason } => {
                write!(f, "invalid dataset file {}: {reason}", path.display())
            }
            WorkerErr::Checkpoint { path, reason } => {
                write!(f, "checkpoint {} failed: {reason}", path.display())
            }
            WorkerErr::Launcher { failed, world_size } => write!(
                f,
                "{} of {world_size} ranks failed: {failed:?}",
                failed.len()
            ),
            WorkerErr::UnknownSample { index, len } => write!(
                f,
                "a rank evaluated sample {index} but the test set holds {len} samples"
            ),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Io(e) => Some(e),
            WorkerErr::Group(e) => Some(e),
            WorkerErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<GroupErr> for WorkerErr {
    fn from(value: GroupErr) -> Self {
        Self::Group(value)
    }
}

impl From<MlErr> for WorkerErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            WorkerErr::Group(e) => e.into(),
            WorkerErr::Config(_) => io::Error::new(io::ErrorKind::InvalidInput, value),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
