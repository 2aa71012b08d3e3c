//! Error types for arbor

use std::path::PathBuf;

/// Result type for tree loading operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a load
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A virtual tree was requested but the project has no lockfile
    #[error("loading a virtual tree requires an existing lockfile in {path}")]
    NoLockfile { path: PathBuf },

    /// Two lockfile records name the same folder
    #[error("duplicate node at {location} (already loaded from {existing})")]
    DuplicateNode { location: String, existing: String },

    /// A filesystem probe task panicked or was cancelled
    #[error("filesystem probe failed: {0}")]
    Probe(#[from] tokio::task::JoinError),

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from arbor-fs
    #[error(transparent)]
    Fs(#[from] arbor_fs::Error),

    /// Lockfile error from arbor-lockfile
    #[error(transparent)]
    Lockfile(#[from] arbor_lockfile::Error),

    /// Tree error from arbor-tree
    #[error(transparent)]
    Tree(#[from] arbor_tree::Error),
}

impl From<arbor_tree::TreeCheckError> for Error {
    fn from(e: arbor_tree::TreeCheckError) -> Self {
        Self::Tree(e.into())
    }
}

impl Error {
    /// npm-compatible error code, where one exists.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::NoLockfile { .. } => Some("ENOLOCK"),
            Self::Tree(e) => e.code(),
            _ => None,
        }
    }
}
