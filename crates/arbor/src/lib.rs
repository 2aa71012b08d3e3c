//! Package dependency trees, loaded from disk or from a lockfile
//!
//! This crate composes the lower layers into the two tree loaders:
//!
//! - **Actual tree**: walks the installed `node_modules` folders (or trusts
//!   a current hidden lockfile), recovers dependencies installed above the
//!   project, and computes dependency flags
//! - **Virtual tree**: materializes one node per lockfile record, checking
//!   the recorded root dependencies against `package.json` and
//!   recomputing flags when they disagree
//!
//! # Architecture
//!
//! ```text
//!                   arbor (Arborist)
//!                          |
//!          +---------------+---------------+
//!          |               |               |
//!      arbor-tree    arbor-lockfile     arbor-fs
//!          |               |
//!          +-------+-------+
//!                  |
//!               arbor-fs
//! ```
//!
//! # Example
//!
//! ```no_run
//! use arbor::{Arborist, ArboristOptions, LoadActualOptions};
//!
//! # async fn example() -> arbor::Result<()> {
//! let mut arborist = Arborist::new(ArboristOptions::load("/srv/app")?);
//! let tree = arborist.load_actual(LoadActualOptions::default()).await?;
//! for id in arborist.arena().inventory_ids(tree) {
//!     let node = arborist.arena().node(id);
//!     println!("{} {:?}", node.location(), arborist.arena().version(id));
//! }
//! # Ok(())
//! # }
//! ```

mod actual;
pub mod arborist;
pub mod error;
pub mod logging;
pub mod options;
mod virtual_tree;
pub mod workspaces;

pub use arborist::Arborist;
pub use error::{Error, Result};
pub use options::{ArboristOptions, ChildFilter, LoadActualOptions, LoadVirtualOptions, TransplantFilter};
pub use workspaces::{map_workspaces, map_workspaces_virtual};

pub use arbor_lockfile::{LockRecord, Lockfile};
pub use arbor_tree::{Arena, DepFlags, EdgeType, NodeId, NodeKind, Package};
