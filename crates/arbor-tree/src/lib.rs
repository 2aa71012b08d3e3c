//! Package dependency trees.
//!
//! An [`Arena`] owns any number of trees of [`Node`]s. Each node is a
//! package folder, a symlink to one, or a placeholder directory; nodes are
//! connected by parent/child placement, by enclosing-folder relationships,
//! by link targets, and by dependency [`Edge`]s that always point at
//! whatever currently resolves for the dependency's name.
//!
//! All structural mutation goes through [`Arena::set_root`],
//! [`Arena::set_parent`] and [`Arena::set_fs_parent`], which keep every
//! tree's [`Inventory`], lockfile records and edge resolutions consistent.

pub mod arena;
pub mod case_map;
mod dedup;
mod dep_flags;
mod deps;
pub mod edge;
pub mod error;
pub mod inventory;
pub mod meta;
pub mod node;
pub mod override_set;
pub mod package;
mod reparent;
pub mod spec;
mod tree_check;

pub use arena::{Arena, EdgeId, NodeId};
pub use case_map::CaseInsensitiveMap;
pub use edge::{Edge, EdgeError, EdgeType};
pub use error::{Error, Result, TreeCheckError};
pub use inventory::{IndexField, Inventory};
pub use meta::consistent_resolve;
pub use node::{DepFlags, Node, NodeError, NodeKind, NodeOptions};
pub use override_set::OverrideSet;
pub use package::{BundleDependencies, Package};
pub use spec::{Candidate, SemverMatcher, SpecMatcher};
