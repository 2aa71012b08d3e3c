//! Arena storage for nodes and edges.
//!
//! The tree is a cyclic graph (parents, dependents, link targets all point
//! at each other), so nodes and edges live in flat vectors and refer to one
//! another by index. Nodes are never freed: a node removed from a tree
//! becomes the root of its own detached tree.

use crate::edge::Edge;
use crate::error::{Error, Result};
use crate::inventory::InventoryKeys;
use crate::node::{Node, NodeKind, NodeOptions};
use crate::override_set::OverrideSet;
use crate::package::Package;
use crate::spec::{Candidate, SemverMatcher, SpecMatcher};
use arbor_fs::{name_from_folder, normalize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) u32);

impl EdgeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge#{}", self.0)
    }
}

/// Owner of every node and edge of one or more trees.
#[derive(Debug, Clone)]
pub struct Arena {
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) matcher: Arc<dyn SpecMatcher>,
    /// Nesting depth of structural changes; trees are checked when it
    /// drops back to zero.
    pub(crate) moves_in_flight: u32,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    pub fn new() -> Self {
        Self::with_matcher(Arc::new(SemverMatcher))
    }

    pub fn with_matcher(matcher: Arc<dyn SpecMatcher>) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            matcher,
            moves_in_flight: 0,
        }
    }

    pub fn matcher(&self) -> &dyn SpecMatcher {
        &*self.matcher
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }

    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a package node (or a placeholder, per `opts.placeholder`).
    ///
    /// The node is attached through `parent`, `fs_parent` or `root`, in
    /// that order of preference, and its dependency edges are loaded once
    /// it has a place in the tree.
    pub fn create_node(&mut self, opts: NodeOptions) -> Result<NodeId> {
        let kind = if opts.placeholder {
            NodeKind::Placeholder
        } else {
            NodeKind::Package
        };
        self.create(kind, opts)
    }

    /// Create a symlink node.
    ///
    /// With no `target`, a node already at the link's realpath is used, or
    /// a new target node is created there carrying `opts.package`.
    pub fn create_link(&mut self, opts: NodeOptions, target: Option<NodeId>) -> Result<NodeId> {
        let mut opts = opts;
        if opts.realpath.is_none() {
            opts.realpath = target.map(|t| self.node(t).path.clone());
        }
        let Some(realpath) = opts.realpath.clone() else {
            return Err(Error::MissingPath {
                name: opts.name.unwrap_or_default(),
            });
        };
        if opts.root.is_none() && opts.parent.is_none() && opts.fs_parent.is_none() {
            opts.root = target.map(|t| self.node(t).root);
        }
        let target_opts = NodeOptions {
            name: None,
            path: Some(realpath.clone()),
            realpath: None,
            parent: None,
            fs_parent: None,
            root: None,
            placeholder: false,
            ..opts.clone()
        };
        let link = self.create(NodeKind::Link { target: None }, opts)?;

        if let Some(target) = target {
            self.set_target(link, Some(target));
        } else if self.node(link).target().is_none() {
            let root = self.node(link).root;
            let existing = if self.node(root).realpath == normalize(&realpath) && !self.node(root).is_link() {
                Some(root)
            } else {
                let location = arbor_fs::relpath(&self.node(root).realpath, &realpath);
                self.node(root)
                    .inventory
                    .get(&location)
                    .filter(|&n| n != link && !self.node(n).is_link())
            };
            let target = match existing {
                Some(existing) => existing,
                None => self.create_node(NodeOptions {
                    root: Some(root),
                    ..target_opts
                })?,
            };
            self.set_target(link, Some(target));
        }
        Ok(link)
    }

    fn create(&mut self, kind: NodeKind, opts: NodeOptions) -> Result<NodeId> {
        let parent = match opts.parent {
            Some(p) => self.link_target_or_self(p),
            None => None,
        };
        let path = match (&opts.path, parent) {
            (Some(path), _) => normalize(path),
            (None, Some(parent)) => {
                let name = opts
                    .name
                    .clone()
                    .or_else(|| opts.package.name.clone())
                    .ok_or(Error::MissingName { path: None })?;
                self.node(parent).path.join("node_modules").join(&name)
            }
            (None, None) => {
                return Err(Error::MissingPath {
                    name: opts.name.clone().unwrap_or_default(),
                });
            }
        };
        let name = opts
            .name
            .clone()
            .or_else(|| name_from_folder(&path))
            .or_else(|| opts.package.name.clone())
            .ok_or_else(|| Error::MissingName {
                path: Some(path.clone()),
            })?;
        let realpath = match kind {
            NodeKind::Link { .. } => opts.realpath.as_deref().map(normalize).unwrap_or_else(|| path.clone()),
            _ => path.clone(),
        };

        let overrides = match (&opts.overrides, opts.load_overrides, &opts.package.overrides) {
            (Some(set), _, _) => Some(set.clone()),
            (None, true, Some(value)) => Some(OverrideSet::new(value)?),
            _ => None,
        };

        let id = NodeId(self.nodes.len() as u32);
        let package = opts.package;
        self.nodes.push(Node {
            id,
            kind,
            name,
            path,
            realpath,
            location: String::new(),
            root: id,
            parent: None,
            fs_parent: None,
            children: Default::default(),
            fs_children: Default::default(),
            links_in: Default::default(),
            edges_out: Default::default(),
            edges_in: Default::default(),
            inventory: Default::default(),
            tops: Default::default(),
            meta: None,
            resolved: opts.resolved.or_else(|| package.resolved.clone()),
            integrity: opts.integrity.or_else(|| package.integrity.clone()),
            has_shrinkwrap: opts.has_shrinkwrap || package.has_shrinkwrap,
            package: Arc::new(package),
            overrides,
            flags: opts.flags.unwrap_or_default(),
            errors: opts.error.into_iter().collect(),
            global: opts.global,
            legacy_peer_deps: opts.legacy_peer_deps,
            source_reference: opts.source_reference,
            workspaces: None,
        });
        self.refresh_location(id);

        if let Some(parent) = parent {
            self.set_parent(id, Some(parent));
        } else if let Some(fs_parent) = opts.fs_parent {
            self.set_fs_parent(id, Some(fs_parent));
        } else if let Some(root) = opts.root {
            self.set_root(id, Some(root));
        }
        self.load_deps(id);
        tracing::trace!(%id, path = %self.node(id).path.display(), "Created node");
        Ok(id)
    }

    /// Links stand in for their target when used as a parent.
    pub(crate) fn link_target_or_self(&self, id: NodeId) -> Option<NodeId> {
        match self.node(id).kind {
            NodeKind::Link { target } => target,
            _ => Some(id),
        }
    }

    /// The manifest in effect for `id`, following links to their target.
    pub fn package(&self, id: NodeId) -> &Package {
        match self.node(id).kind {
            NodeKind::Link { target: Some(t) } => &self.node(t).package,
            _ => &self.node(id).package,
        }
    }

    pub fn version(&self, id: NodeId) -> Option<&str> {
        self.package(id).version.as_deref()
    }

    /// `package.json` name, falling back to the folder name.
    pub fn package_name(&self, id: NodeId) -> &str {
        self.package(id)
            .name
            .as_deref()
            .unwrap_or(&self.node(id).name)
    }

    pub fn root_of(&self, id: NodeId) -> NodeId {
        self.node(id).root
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.node(id).is_root()
    }

    /// The root itself, or the target of a root link.
    pub fn is_project_root(&self, id: NodeId) -> bool {
        let root = self.node(id).root;
        id == root || self.node(root).target() == Some(id)
    }

    /// A top-level package of a global install.
    pub fn global_top(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.global && node.parent.is_some_and(|p| self.is_project_root(p))
    }

    /// Has no parent, or is a global top-level package.
    pub fn is_top(&self, id: NodeId) -> bool {
        self.node(id).parent.is_none() || self.global_top(id)
    }

    /// Where dependency resolution continues after this node's children.
    pub fn resolve_parent(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        node.parent.or(node.fs_parent)
    }

    /// Find what `name` resolves to from `id`: its own child, else the
    /// nearest resolve-parent's.
    pub fn resolve(&self, id: NodeId, name: &str) -> Option<NodeId> {
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            if let Some(&child) = self.node(node).children.get(name) {
                return Some(child);
            }
            cursor = self.resolve_parent(node);
        }
        None
    }

    /// `id` and its resolve-parents, nearest first.
    pub fn ancestry(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |&n| self.resolve_parent(n))
    }

    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.ancestry(id).skip(1).any(|n| n == ancestor)
    }

    /// The node a link points at, or the node itself.
    pub fn target_of(&self, id: NodeId) -> Option<NodeId> {
        self.link_target_or_self(id)
    }

    /// The node at `location` within the tree rooted at `root`.
    pub fn get(&self, root: NodeId, location: &str) -> Option<NodeId> {
        self.node(self.root_of(root)).inventory.get(location)
    }

    pub fn edge_out(&self, id: NodeId, name: &str) -> Option<EdgeId> {
        self.node(id).edges_out.get(name).copied()
    }

    pub(crate) fn candidate(&self, id: NodeId) -> Candidate<'_> {
        let node = self.node(id);
        Candidate {
            name: &node.name,
            package_name: self.package_name(id),
            version: self.version(id),
            resolved: node.resolved.as_deref(),
            realpath: &node.realpath,
        }
    }

    pub(crate) fn inventory_keys(&self, id: NodeId) -> InventoryKeys {
        let node = self.node(id);
        InventoryKeys {
            location: node.location.clone(),
            name: node.name.clone(),
            package_name: self.package(id).name.clone(),
            realpath: node.realpath.to_string_lossy().into_owned(),
            license: self.package(id).license_str().map(str::to_string),
        }
    }

    pub fn set_flags(&mut self, id: NodeId, flags: crate::node::DepFlags) {
        self.node_mut(id).flags = flags;
    }

    pub fn set_resolved(&mut self, id: NodeId, resolved: Option<String>) {
        self.node_mut(id).resolved = resolved;
    }

    pub fn set_integrity(&mut self, id: NodeId, integrity: Option<String>) {
        self.node_mut(id).integrity = integrity;
    }

    pub fn add_error(&mut self, id: NodeId, error: crate::node::NodeError) {
        self.node_mut(id).errors.push(error);
    }

    /// Replace the override set without touching edges; see
    /// [`Arena::apply_overrides`] for the propagating version.
    pub(crate) fn set_overrides_raw(&mut self, id: NodeId, overrides: Option<OverrideSet>) {
        self.node_mut(id).overrides = overrides;
    }

    /// Nodes reachable from the root's inventory, in location order.
    pub fn inventory_ids(&self, root: NodeId) -> Vec<NodeId> {
        self.node(self.root_of(root)).inventory.ids().collect()
    }

    pub fn path(&self, id: NodeId) -> &Path {
        &self.node(id).path
    }

    pub fn realpath(&self, id: NodeId) -> &Path {
        &self.node(id).realpath
    }

    pub(crate) fn path_buf(&self, id: NodeId) -> PathBuf {
        self.node(id).path.clone()
    }
}
