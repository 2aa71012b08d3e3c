//! Error types for arbor-lockfile

use std::path::PathBuf;

/// Result type for arbor-lockfile operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading lockfiles
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Lockfile content was not valid JSON or had the wrong shape
    #[error("Failed to parse lockfile at {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Filesystem error from arbor-fs
    #[error(transparent)]
    Fs(#[from] arbor_fs::Error),
}
