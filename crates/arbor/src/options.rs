//! Options for an [`Arborist`](crate::Arborist) and its individual loads

use crate::Result;
use arbor_fs::{ConfigStore, normalize};
use arbor_lockfile::Lockfile;
use arbor_tree::{Arena, NodeId};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Option files looked up in the project folder, first match wins.
pub const OPTION_FILES: &[&str] = &[".arborrc.toml", ".arborrc.json", ".arborrc.yaml"];

/// Instance-wide options.
///
/// Can be read from an option file in the project folder (see
/// [`ArboristOptions::load`]) or built in code:
///
/// ```
/// use arbor::ArboristOptions;
///
/// let options = ArboristOptions::new("/srv/app")
///     .legacy_peer_deps(true)
///     .force_actual(true);
/// assert!(options.force_actual);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ArboristOptions {
    /// Project folder. Never read from an option file.
    #[serde(skip)]
    pub path: PathBuf,
    /// Treat the folder as a global `node_modules` prefix.
    pub global: bool,
    /// Ignore `peerDependencies` when building edges.
    pub legacy_peer_deps: bool,
    /// Always walk `node_modules`, never trusting the hidden lockfile.
    pub force_actual: bool,
    /// Skip missing-edge recovery after walking the actual tree.
    pub ignore_missing: bool,
    /// Lockfile version records are written for.
    pub lockfile_version: Option<u32>,
    /// Take a higher copy of a package even when it is older.
    pub prefer_dedupe: bool,
}

impl ArboristOptions {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: normalize(path),
            ..Self::default()
        }
    }

    /// Read options from the first of [`OPTION_FILES`] present in `path`.
    ///
    /// Defaults apply when there is none.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = normalize(path);
        let options: Option<Self> = ConfigStore::new().load_first(&path, OPTION_FILES)?;
        Ok(Self {
            path,
            ..options.unwrap_or_default()
        })
    }

    pub fn global(mut self, global: bool) -> Self {
        self.global = global;
        self
    }

    pub fn legacy_peer_deps(mut self, legacy_peer_deps: bool) -> Self {
        self.legacy_peer_deps = legacy_peer_deps;
        self
    }

    pub fn force_actual(mut self, force_actual: bool) -> Self {
        self.force_actual = force_actual;
        self
    }

    pub fn ignore_missing(mut self, ignore_missing: bool) -> Self {
        self.ignore_missing = ignore_missing;
        self
    }

    pub fn lockfile_version(mut self, version: u32) -> Self {
        self.lockfile_version = Some(version);
        self
    }

    pub fn prefer_dedupe(mut self, prefer_dedupe: bool) -> Self {
        self.prefer_dedupe = prefer_dedupe;
        self
    }

    /// Apply the configured lockfile version to a freshly loaded lockfile.
    pub(crate) fn versioned(&self, lockfile: Lockfile) -> Lockfile {
        match self.lockfile_version {
            Some(version) => lockfile.with_lockfile_version(version),
            None => lockfile,
        }
    }
}

/// Decides whether `node_modules/<name>` under a node is loaded at all.
pub type ChildFilter = Arc<dyn Fn(&Arena, NodeId, &str) -> bool + Send + Sync>;

/// Decides whether a loaded top-level node moves onto a transplant root.
pub type TransplantFilter = Arc<dyn Fn(&Arena, NodeId) -> bool + Send + Sync>;

/// Per-call options for [`Arborist::load_actual`](crate::Arborist::load_actual).
///
/// Unset booleans fall back to the instance's [`ArboristOptions`].
#[derive(Clone, Default)]
pub struct LoadActualOptions {
    pub filter: Option<ChildFilter>,
    pub transplant_filter: Option<TransplantFilter>,
    /// Load onto this node instead of keeping a fresh root.
    pub root: Option<NodeId>,
    pub ignore_missing: Option<bool>,
    pub force_actual: Option<bool>,
    pub global: Option<bool>,
}

impl LoadActualOptions {
    pub fn filter(mut self, filter: impl Fn(&Arena, NodeId, &str) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn transplant(
        mut self,
        root: NodeId,
        filter: impl Fn(&Arena, NodeId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.root = Some(root);
        self.transplant_filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for LoadActualOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadActualOptions")
            .field("filter", &self.filter.is_some())
            .field("transplant_filter", &self.transplant_filter.is_some())
            .field("root", &self.root)
            .field("ignore_missing", &self.ignore_missing)
            .field("force_actual", &self.force_actual)
            .field("global", &self.global)
            .finish()
    }
}

/// Per-call options for [`Arborist::load_virtual`](crate::Arborist::load_virtual).
#[derive(Debug, Clone, Default)]
pub struct LoadVirtualOptions {
    /// Populate this node instead of building a root from `package.json`.
    /// When it already carries lockfile metadata, that metadata is used.
    pub root: Option<NodeId>,
    /// Use this lockfile instead of reading one from disk.
    pub lockfile: Option<Lockfile>,
}
