//! Filesystem layer for the arbor dependency tree engine
//!
//! Provides the path arithmetic used to compute node locations
//! (`relpath`, `walk_up`, `name_from_folder`) and the async reads the
//! tree loaders perform (`realpath`, `read_json`, `readdir_scoped`).

pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod path;

pub use config::ConfigStore;
pub use constants::PackagePath;
pub use error::{Error, Result};
pub use io::{RealpathCache, read_json, readdir_scoped, realpath};
pub use path::{
    is_hidden_entry, is_within, name_from_folder, nearest_common_ancestor, node_modules_name, normalize,
    relpath, resolve, walk_up,
};
