//! Error types for arbor-tree

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Override for {name}@{spec} conflicts with direct dependency")]
    OverrideConflict { name: String, spec: String },

    #[error("Override without name: {key}")]
    OverrideWithoutName { key: String },

    #[error("overrides must be an object, found {found}")]
    InvalidOverrides { found: String },

    #[error("Unable to resolve reference {reference}")]
    UnresolvedOverrideReference { reference: String },

    #[error("could not detect node name from path or package")]
    MissingName { path: Option<PathBuf> },

    #[error("node has neither a path nor a parent to derive one from")]
    MissingPath { name: String },

    #[error(transparent)]
    TreeCheck(#[from] TreeCheckError),
}

impl Error {
    /// npm-compatible error code, where one exists.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::OverrideConflict { .. } => Some("EOVERRIDE"),
            Self::TreeCheck(_) => Some("ETREECHECK"),
            _ => None,
        }
    }
}

/// A structural invariant violated by a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeCheckError {
    #[error("double root at {path}")]
    DoubleRoot { path: PathBuf },

    #[error("node from other root in tree: {path}")]
    NodeFromOtherRoot { path: PathBuf },

    #[error("non-root has non-zero inventory: {path}")]
    NonRootInventory { path: PathBuf },

    #[error("not in inventory: {path}")]
    NotInInventory { path: PathBuf },

    #[error("dev edges on non-top node: {path}")]
    DevEdgesOnNonTop { path: PathBuf },

    #[error("node with same path as root: {path}")]
    SameAsRootPath { path: PathBuf },

    #[error("non-link with mismatched path/realpath: {path}")]
    MismatchedRealpath { path: PathBuf },

    #[error("location {location:?} does not match path {path} (expected {expected:?})")]
    LocationMismatch {
        path: PathBuf,
        location: String,
        expected: String,
    },

    #[error("parent does not list {path} under its name")]
    ChildNotListed { path: PathBuf },

    #[error("inventory entry not reachable from root: {path}")]
    Unreachable { path: PathBuf },
}
