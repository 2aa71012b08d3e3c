//! Error types for arbor-fs

use std::path::PathBuf;

/// Result type for arbor-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in arbor-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON at {path}: {message}")]
    JsonParse { path: PathBuf, message: String },

    #[error("Failed to parse {format} config at {path}: {message}")]
    ConfigParse {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Unsupported config format: {extension}")]
    UnsupportedFormat { extension: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the path simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }

    /// The path the failed operation was working on.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Io { path, .. } | Self::JsonParse { path, .. } | Self::ConfigParse { path, .. } => {
                Some(path)
            }
            Self::UnsupportedFormat { .. } => None,
        }
    }
}
