//! Lockfile records for the arbor dependency tree engine.
//!
//! This crate only reads: it parses `npm-shrinkwrap.json`,
//! `package-lock.json` and the hidden `node_modules/.package-lock.json`
//! into a location-keyed map of [`LockRecord`]s. Serializing lockfiles
//! back to disk belongs to the install machinery, not to this engine.

pub mod error;
pub mod lockfile;
pub mod record;

pub use error::{Error, Result};
pub use lockfile::{Lockfile, LockfileKind};
pub use record::{LockRecord, PeerDependencyMeta};
