//! Error types for rotating writer operations.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for rotating writer operations.
pub type RotateResult<T> = Result<T, RotateError>;

/// The rotation step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStage {
    /// Flushing or closing the live file.
    Close,
    /// Renaming (or copying) the closed file to its backup path.
    Move,
    /// Compressing the closed file into its backup path.
    Compress,
    /// Opening the fresh live file.
    Reopen,
}

impl fmt::Display for RotationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Close => "close",
            Self::Move => "move",
            Self::Compress => "compress",
            Self::Reopen => "reopen",
        };
        f.write_str(name)
    }
}

/// A backup that could not be deleted during retention enforcement.
#[derive(Debug)]
pub struct DeleteFailure {
    /// Path of the backup that survived.
    pub path: PathBuf,
    /// Why it could not be removed.
    pub source: io::Error,
}

/// Errors that can occur while writing, rotating or pruning logs.
#[derive(Debug, Error)]
pub enum RotateError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration rejected by validation.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The writer has been closed.
    #[error("writer is closed")]
    Closed,

    /// The OS write failed after `written` bytes were confirmed.
    #[error("write failed after {written} bytes: {source}")]
    Write {
        /// Bytes confirmed before the failure.
        written: usize,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// A rotation step failed.
    #[error("rotation failed during {stage}: {source}")]
    Rotation {
        /// The step that failed.
        stage: RotationStage,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Some backups could not be deleted.
    #[error("retention left {} backup(s) behind after deleting {}", failures.len(), deleted.len())]
    Retention {
        /// Backups that were removed.
        deleted: Vec<PathBuf>,
        /// Backups that could not be removed.
        failures: Vec<DeleteFailure>,
    },

    /// The background retention worker is no longer running.
    #[error("retention worker stopped")]
    WorkerStopped,
}

impl RotateError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a rotation error for the given stage.
    pub fn rotation(stage: RotationStage, source: io::Error) -> Self {
        Self::Rotation { stage, source }
    }
}

impl From<RotateError> for io::Error {
    fn from(err: RotateError) -> Self {
        match err {
            RotateError::Io(e) => e,
            RotateError::Write { source, .. } => source,
            closed @ RotateError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, closed),
            invalid @ RotateError::InvalidConfig { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, invalid)
            }
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
