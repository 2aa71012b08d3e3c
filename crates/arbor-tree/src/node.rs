//! Node data

use crate::arena::{EdgeId, NodeId};
use crate::case_map::CaseInsensitiveMap;
use crate::inventory::Inventory;
use crate::override_set::OverrideSet;
use crate::package::Package;
use arbor_lockfile::Lockfile;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A real package folder.
    Package,
    /// A symlink. Links never have children or outgoing edges; `target` is
    /// the node at the link's realpath, when one is known.
    Link { target: Option<NodeId> },
    /// A stand-in for a directory that holds a `node_modules` folder but is
    /// not itself a package. Its flags and manifest are never meaningful.
    Placeholder,
}

/// Dependency-type flags.
///
/// A flag is true when the node is only reachable through dependencies of
/// that kind. Freshly created nodes assume the worst (all true) until
/// [`calc_dep_flags`](crate::Arena::calc_dep_flags) proves otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepFlags {
    pub dev: bool,
    pub optional: bool,
    pub dev_optional: bool,
    pub peer: bool,
    pub extraneous: bool,
}

impl DepFlags {
    pub const UNKNOWN: Self = Self {
        dev: true,
        optional: true,
        dev_optional: true,
        peer: true,
        extraneous: true,
    };

    pub const NONE: Self = Self {
        dev: false,
        optional: false,
        dev_optional: false,
        peer: false,
        extraneous: false,
    };
}

impl Default for DepFlags {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// A problem recorded against a node while loading it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("could not resolve realpath of {path}: {message}")]
    Realpath { path: PathBuf, message: String },

    #[error("could not read package.json at {path}: {message}")]
    PackageJson {
        path: PathBuf,
        message: String,
        not_found: bool,
    },
}

/// Options for [`Arena::create_node`](crate::Arena::create_node) and
/// [`Arena::create_link`](crate::Arena::create_link).
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    pub name: Option<String>,
    /// Required unless `parent` is given.
    pub path: Option<PathBuf>,
    /// For links; defaults to the target's path.
    pub realpath: Option<PathBuf>,
    pub parent: Option<NodeId>,
    pub fs_parent: Option<NodeId>,
    pub root: Option<NodeId>,
    pub package: Package,
    pub resolved: Option<String>,
    pub integrity: Option<String>,
    pub has_shrinkwrap: bool,
    pub flags: Option<DepFlags>,
    pub error: Option<NodeError>,
    pub global: bool,
    pub legacy_peer_deps: bool,
    pub placeholder: bool,
    /// A node whose edges this one stands in for, e.g. a link target loaded
    /// on behalf of its link.
    pub source_reference: Option<NodeId>,
    pub overrides: Option<OverrideSet>,
    /// Build an override set from the package's own `overrides` field.
    pub load_overrides: bool,
}

impl NodeOptions {
    pub fn at(path: impl Into<PathBuf>, package: Package) -> Self {
        Self {
            path: Some(path.into()),
            package,
            ..Self::default()
        }
    }

    pub fn child(parent: NodeId, package: Package) -> Self {
        Self {
            parent: Some(parent),
            package,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) name: String,
    pub(crate) path: PathBuf,
    pub(crate) realpath: PathBuf,
    pub(crate) location: String,
    pub(crate) root: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) fs_parent: Option<NodeId>,
    pub(crate) children: CaseInsensitiveMap<NodeId>,
    pub(crate) fs_children: BTreeSet<NodeId>,
    pub(crate) links_in: BTreeSet<NodeId>,
    pub(crate) edges_out: CaseInsensitiveMap<EdgeId>,
    pub(crate) edges_in: BTreeSet<EdgeId>,
    /// Only populated on roots.
    pub(crate) inventory: Inventory,
    /// Only populated on roots: nodes with neither parent nor fs_parent.
    pub(crate) tops: BTreeSet<NodeId>,
    /// Only populated on roots.
    pub(crate) meta: Option<Lockfile>,
    pub(crate) package: Arc<Package>,
    pub(crate) overrides: Option<OverrideSet>,
    pub(crate) flags: DepFlags,
    pub(crate) errors: Vec<NodeError>,
    pub(crate) resolved: Option<String>,
    pub(crate) integrity: Option<String>,
    pub(crate) has_shrinkwrap: bool,
    pub(crate) global: bool,
    pub(crate) legacy_peer_deps: bool,
    pub(crate) source_reference: Option<NodeId>,
    pub(crate) workspaces: Option<BTreeMap<String, PathBuf>>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_link(&self) -> bool {
        matches!(self.kind, NodeKind::Link { .. })
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, NodeKind::Placeholder)
    }

    pub fn target(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Link { target } => target,
            _ => None,
        }
    }

    /// The folder name this node is installed as.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn realpath(&self) -> &Path {
        &self.realpath
    }

    /// Path relative to the root's realpath, `/`-delimited.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_root(&self) -> bool {
        self.root == self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn fs_parent(&self) -> Option<NodeId> {
        self.fs_parent
    }

    pub fn children(&self) -> &CaseInsensitiveMap<NodeId> {
        &self.children
    }

    pub fn fs_children(&self) -> &BTreeSet<NodeId> {
        &self.fs_children
    }

    pub fn links_in(&self) -> &BTreeSet<NodeId> {
        &self.links_in
    }

    pub fn edges_out(&self) -> &CaseInsensitiveMap<EdgeId> {
        &self.edges_out
    }

    pub fn edges_in(&self) -> &BTreeSet<EdgeId> {
        &self.edges_in
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn tops(&self) -> &BTreeSet<NodeId> {
        &self.tops
    }

    pub fn meta(&self) -> Option<&Lockfile> {
        self.meta.as_ref()
    }

    pub fn overrides(&self) -> Option<&OverrideSet> {
        self.overrides.as_ref()
    }

    /// Dependency flags; always clear on placeholders.
    pub fn flags(&self) -> DepFlags {
        if self.is_placeholder() {
            DepFlags::NONE
        } else {
            self.flags
        }
    }

    pub fn dev(&self) -> bool {
        self.flags().dev
    }

    pub fn optional(&self) -> bool {
        self.flags().optional
    }

    pub fn dev_optional(&self) -> bool {
        self.flags().dev_optional
    }

    pub fn peer(&self) -> bool {
        self.flags().peer
    }

    pub fn extraneous(&self) -> bool {
        self.flags().extraneous
    }

    pub fn errors(&self) -> &[NodeError] {
        &self.errors
    }

    pub fn resolved(&self) -> Option<&str> {
        self.resolved.as_deref()
    }

    pub fn integrity(&self) -> Option<&str> {
        self.integrity.as_deref()
    }

    pub fn has_shrinkwrap(&self) -> bool {
        self.has_shrinkwrap
    }

    pub fn global(&self) -> bool {
        self.global
    }

    pub fn legacy_peer_deps(&self) -> bool {
        self.legacy_peer_deps
    }

    pub fn source_reference(&self) -> Option<NodeId> {
        self.source_reference
    }

    /// Workspace name to folder, when this node declares workspaces.
    pub fn workspaces(&self) -> Option<&BTreeMap<String, PathBuf>> {
        self.workspaces.as_ref()
    }

    /// The node's own manifest. For links this is usually empty; see
    /// [`Arena::package`](crate::Arena::package).
    pub fn own_package(&self) -> &Package {
        &self.package
    }
}
