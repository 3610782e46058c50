//! Error types shared by the stores, the curve editor and the GPU backends.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Failure while committing a file to disk.
///
/// Reads never produce this error: missing or unreadable files are treated
/// as empty by the stores.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Errors from the persisted curve model.
#[derive(Debug, Error)]
pub enum CurveError {
    #[error("fan curve points have reached the maximum of {max}")]
    Full { max: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from interactive point editing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("fan curve points have reached the maximum of {max}")]
    Full { max: usize },

    #[error("no free temperature left for a new point")]
    NoRoom,

    #[error("no point is selected")]
    NoSelection,
}

/// Errors reported by a GPU backend.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{tool} failed: {stderr}")]
    Command { tool: &'static str, stderr: String },

    #[error("unexpected {tool} output: {output}")]
    Parse { tool: &'static str, output: String },

    #[error("GPU {0} not found")]
    NotFound(u32),

    #[error("no fans detected on GPU {0}")]
    NoFans(u32),

    #[error("GPU {gpu} has no fan {fan}")]
    UnknownFan { gpu: u32, fan: u32 },
}
