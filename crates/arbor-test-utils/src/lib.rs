//! Shared test utilities for the arbor workspace.
//!
//! This crate lays out throwaway projects on disk for loader tests. It is a
//! dev-dependency only and is never published.
//!
//! # Modules
//!
//! - [`project`]: [`TestProject`](project::TestProject) builder for
//!   `package.json`, `node_modules`, symlinks and lockfiles

pub mod project;

pub use project::TestProject;
