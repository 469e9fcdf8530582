//! Error types for instance state and lifecycle operations.

use crate::logsink::LogSinkError;
use crate::workdir::ResolutionError;
use cake_protocol::InstanceId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the instance store and the service controller.
#[derive(Error, Debug)]
pub enum StateError {
    /// A plain file occupies the path of a run or instance directory.
    #[error("{0:?} exists and is a file, expected a directory")]
    DirConflict(PathBuf),

    #[error("Failed to create directory {path:?}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path:?}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// `proc.json` is written once; a second write is refused.
    #[error("Instance metadata already written at {0:?}")]
    MetadataExists(PathBuf),

    #[error("Failed to serialize instance metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("No service defined for tag {0:?}")]
    UnknownTag(String),

    #[error("No metadata found for instance {0}")]
    UnknownInstance(InstanceId),

    #[error("Failed to lock {path:?}: {source}")]
    Lock {
        path: PathBuf,
        source: nix::errno::Errno,
    },

    #[error("Failed to spawn {command:?}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// Processes survived the stop budget, so a restart was not attempted.
    #[error("Instance {id} still has running processes: {pids:?}")]
    StillRunning { id: InstanceId, pids: Vec<u32> },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    LogSink(#[from] LogSinkError),
}

/// Type alias for Result with StateError.
pub type StateResult<T> = Result<T, StateError>;
