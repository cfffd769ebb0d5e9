//! Error types for logrot-fs.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::writer::FsError;

/// Errors surfaced by the rotating sink and the retention sweeper.
#[derive(Debug, Error)]
pub enum Error {
    /// The path pattern could not be compiled. Fix the configuration.
    #[error("invalid path pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The file for the new bucket (or its directory) could not be created.
    /// Nothing was written and the previous file is still current.
    #[error("failed to open file {path}: {source}")]
    OpenFailed { path: PathBuf, source: FsError },

    /// Releasing the current file on an explicit close failed.
    #[error("failed to close file {path}: {source}")]
    CloseFailed { path: PathBuf, source: FsError },

    /// Error from the underlying append, passed through unchanged.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A retention pass stopped at the first stat or delete failure.
    #[error("retention sweep stopped at {path} after deleting {} file(s): {source}", .deleted.len())]
    SweepAborted {
        path: PathBuf,
        deleted: Vec<PathBuf>,
        source: FsError,
    },
}

impl Error {
    /// Files a failed retention pass removed before stopping.
    pub fn deleted(&self) -> &[PathBuf] {
        match self {
            Error::SweepAborted { deleted, .. } => deleted,
            _ => &[],
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
