//! Building a tree from what is installed on disk.
//!
//! The walk is breadth-first per `node_modules` folder: every entry of one
//! folder is probed concurrently (realpath plus `package.json`), then the
//! probes are turned into nodes one at a time so that the arena only ever
//! has a single writer. A path that has already produced a node is never
//! probed twice, which is what keeps symlink fan-in from loading the same
//! target more than once.

use crate::options::{ArboristOptions, ChildFilter, LoadActualOptions, TransplantFilter};
use crate::virtual_tree::VirtualTreeLoader;
use crate::workspaces::map_workspaces;
use crate::Result;
use arbor_fs::{
    PackagePath, RealpathCache, is_hidden_entry, is_within, nearest_common_ancestor, normalize, read_json,
    readdir_scoped, walk_up,
};
use arbor_lockfile::Lockfile;
use arbor_tree::{Arena, NodeError, NodeId, NodeOptions, Package};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;

/// State scoped to a single load call.
#[derive(Debug, Default)]
struct LoadContext {
    /// Every node created so far, by the path it was loaded from.
    cache: HashMap<PathBuf, NodeId>,
    /// Realpaths whose `node_modules` have been read.
    loaded: HashSet<PathBuf>,
    /// Link targets, which may need an fs-parent found after the walk.
    top_nodes: BTreeSet<PathBuf>,
    realpaths: RealpathCache,
    /// `node_modules` listings read during missing-edge recovery.
    listings: HashMap<PathBuf, Vec<String>>,
    /// Link targets created since the last descent.
    new_targets: Vec<NodeId>,
}

/// What one concurrent probe learned about a folder.
#[derive(Debug)]
struct Probe {
    path: PathBuf,
    real: std::result::Result<PathBuf, NodeError>,
    package: std::result::Result<Package, NodeError>,
}

async fn probe(path: PathBuf, known_real: Option<PathBuf>) -> Probe {
    let real = match known_real {
        Some(real) => Ok(real),
        None => arbor_fs::realpath(&path).await.map_err(|e| NodeError::Realpath {
            path: path.clone(),
            message: e.to_string(),
        }),
    };
    let package = match &real {
        Ok(real) => read_package(real).await,
        Err(_) => Ok(Package::default()),
    };
    Probe { path, real, package }
}

pub(crate) async fn read_package(dir: &Path) -> std::result::Result<Package, NodeError> {
    let file = PackagePath::PackageJson.under(dir);
    read_json(&file).await.map_err(|e| NodeError::PackageJson {
        not_found: e.is_not_found(),
        message: e.to_string(),
        path: file,
    })
}

/// Where a probed folder goes once it becomes a node.
#[derive(Debug, Default, Clone, Copy)]
struct Placement {
    parent: Option<NodeId>,
    root: Option<NodeId>,
    load_overrides: bool,
    use_root_overrides: bool,
}

impl Placement {
    fn under(parent: NodeId) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    fn in_root(root: NodeId) -> Self {
        Self {
            root: Some(root),
            ..Self::default()
        }
    }
}

pub(crate) struct ActualTreeLoader<'a> {
    arena: &'a mut Arena,
    options: &'a ArboristOptions,
    path: PathBuf,
    global: bool,
    force_actual: bool,
    ignore_missing: bool,
    filter: Option<ChildFilter>,
    transplant_filter: Option<TransplantFilter>,
    ctx: LoadContext,
}

impl<'a> ActualTreeLoader<'a> {
    pub(crate) fn new(arena: &'a mut Arena, options: &'a ArboristOptions, load: &LoadActualOptions) -> Self {
        Self {
            arena,
            path: options.path.clone(),
            global: load.global.unwrap_or(options.global),
            force_actual: load.force_actual.unwrap_or(options.force_actual),
            ignore_missing: load.ignore_missing.unwrap_or(options.ignore_missing),
            filter: load.filter.clone(),
            transplant_filter: load.transplant_filter.clone(),
            options,
            ctx: LoadContext::default(),
        }
    }

    /// Load the tree, returning its root (or `transplant_root`, when given).
    ///
    /// Dependency flags are left for the caller to compute.
    pub(crate) async fn load(mut self, transplant_root: Option<NodeId>) -> Result<NodeId> {
        tracing::debug!(path = %self.path.display(), global = self.global, "Loading actual tree");
        let real = self.ctx.realpaths.realpath(&self.path).await?;

        let tree = if self.global {
            let opts = NodeOptions {
                path: Some(self.path.clone()),
                global: true,
                load_overrides: true,
                legacy_peer_deps: self.options.legacy_peer_deps,
                ..NodeOptions::default()
            };
            let tree = if self.path == real {
                self.arena.create_node(opts)?
            } else {
                self.new_link(opts, real)?
            };
            self.ctx.cache.insert(self.path.clone(), tree);
            tree
        } else {
            let found = probe(self.path.clone(), Some(real)).await;
            let tree = self.place(
                found,
                Placement {
                    load_overrides: true,
                    ..Placement::default()
                },
            )?;
            self.arena.assert_root_overrides(tree)?;

            if !self.force_actual {
                let hidden = Lockfile::load_hidden(&self.path).await?;
                if hidden.loaded_from_disk() {
                    tracing::debug!("Hidden lockfile is current, loading from it");
                    VirtualTreeLoader::new(self.arena, self.options)
                        .load_from_lockfile(hidden, tree, false)
                        .await?;
                    self.set_workspaces(tree).await?;
                    return Ok(self.transplant(tree, transplant_root));
                }
            }
            let meta = Lockfile::load(&self.path).await?;
            self.arena.set_meta(tree, Some(self.options.versioned(meta)));
            tree
        };

        self.load_fs_tree(tree).await?;
        self.set_workspaces(tree).await?;
        self.load_workspace_targets(tree).await?;
        if !self.ignore_missing {
            self.find_missing_edges(tree).await?;
        }
        self.anchor_top_nodes();
        let tree = self.transplant(tree, transplant_root);
        if self.global {
            self.depend_on_global_children(tree);
        }
        tracing::debug!(
            nodes = self.arena.inventory_ids(tree).len(),
            realpaths = self.ctx.realpaths.len(),
            "Loaded actual tree"
        );
        Ok(tree)
    }

    /// Turn a probe into a node, or reuse the node already loaded from
    /// the same path.
    fn place(&mut self, found: Probe, at: Placement) -> Result<NodeId> {
        let Probe { path, real, package } = found;
        let real = match real {
            Ok(real) => real,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "Loading node without realpath");
                let id = self.arena.create_node(NodeOptions {
                    path: Some(path),
                    parent: at.parent,
                    root: at.root,
                    error: Some(error),
                    global: self.global,
                    legacy_peer_deps: self.options.legacy_peer_deps,
                    load_overrides: at.load_overrides,
                    ..NodeOptions::default()
                })?;
                return Ok(id);
            }
        };
        self.ctx.realpaths.insert(path.clone(), real.clone());

        if let Some(&cached) = self.ctx.cache.get(&path) {
            if !self.arena.node(cached).is_placeholder() {
                if at.parent.is_some() {
                    self.arena.set_parent(cached, at.parent);
                }
                return Ok(cached);
            }
        }

        let (package, error) = match package {
            Ok(package) => (package, None),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "Could not read package.json");
                (Package::default(), Some(error))
            }
        };
        let overrides = if at.use_root_overrides {
            at.root.and_then(|root| {
                let set = self.arena.node(root).overrides()?;
                let name = package.name.as_deref()?;
                Some(set.node_rule(name, package.version.as_deref(), self.arena.matcher()))
            })
        } else {
            None
        };
        let opts = NodeOptions {
            path: Some(path.clone()),
            parent: at.parent,
            root: at.root,
            package,
            error,
            overrides,
            global: self.global,
            legacy_peer_deps: self.options.legacy_peer_deps,
            load_overrides: at.load_overrides,
            ..NodeOptions::default()
        };
        let id = if normalize(&path) == real {
            self.arena.create_node(opts)?
        } else {
            self.new_link(opts, real)?
        };
        self.ctx.cache.insert(path, id);
        Ok(id)
    }

    fn new_link(&mut self, opts: NodeOptions, real: PathBuf) -> Result<NodeId> {
        self.ctx.top_nodes.insert(real.clone());
        let target = self.ctx.cache.get(&real).copied();
        let link = self.arena.create_link(
            NodeOptions {
                realpath: Some(real.clone()),
                ..opts
            },
            target,
        )?;
        if target.is_none() {
            if let Some(created) = self.arena.node(link).target() {
                self.ctx.cache.insert(real, created);
                self.ctx.new_targets.push(created);
            }
        }
        Ok(link)
    }

    /// Descend into every node reachable from `start` whose `node_modules`
    /// has not been read yet, including link targets found on the way.
    async fn load_fs_tree(&mut self, start: NodeId) -> Result<()> {
        let mut queue = VecDeque::from([start]);
        queue.extend(self.ctx.new_targets.drain(..));
        while let Some(id) = queue.pop_front() {
            if self.arena.node(id).is_link() {
                continue;
            }
            let real = self.arena.realpath(id).to_path_buf();
            if !self.ctx.loaded.insert(real) {
                continue;
            }
            self.load_fs_children(id).await?;
            let kids: Vec<NodeId> = self
                .arena
                .node(id)
                .children()
                .values()
                .copied()
                .filter(|&kid| !self.ctx.loaded.contains(self.arena.realpath(kid)))
                .collect();
            queue.extend(kids);
            queue.extend(self.ctx.new_targets.drain(..));
        }
        Ok(())
    }

    async fn load_fs_children(&mut self, id: NodeId) -> Result<()> {
        let nm = PackagePath::NodeModules.under(self.arena.realpath(id));
        let entries = match readdir_scoped(&nm).await {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };

        let mut probes = JoinSet::new();
        for entry in entries {
            if is_hidden_entry(&entry) {
                continue;
            }
            if let Some(filter) = &self.filter {
                if !filter(&*self.arena, id, &entry) {
                    continue;
                }
            }
            let path = nm.join(&entry);
            let known = self.ctx.realpaths.get(&path).cloned();
            probes.spawn(probe(path, known));
        }

        let mut found = Vec::with_capacity(probes.len());
        while let Some(joined) = probes.join_next().await {
            found.push(joined?);
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::trace!(folder = %nm.display(), entries = found.len(), "Probed node_modules");
        for entry in found {
            self.place(entry, Placement::under(id))?;
        }
        Ok(())
    }

    async fn set_workspaces(&mut self, tree: NodeId) -> Result<()> {
        let Some(project) = self.arena.target_of(tree) else {
            return Ok(());
        };
        let path = self.arena.path(project).to_path_buf();
        let package = self.arena.package(project).clone();
        let workspaces = map_workspaces(&path, &package).await?;
        if !workspaces.is_empty() {
            self.arena.set_workspaces(project, workspaces);
        }
        Ok(())
    }

    /// Workspaces not linked from `node_modules` are loaded in place so
    /// their own dependencies are known.
    async fn load_workspace_targets(&mut self, tree: NodeId) -> Result<()> {
        let Some(project) = self.arena.target_of(tree) else {
            return Ok(());
        };
        let Some(workspaces) = self.arena.node(project).workspaces().cloned() else {
            return Ok(());
        };
        for path in workspaces.into_values() {
            if self.ctx.cache.contains_key(&path) {
                continue;
            }
            let found = probe(path, None).await;
            let placed = Placement {
                use_root_overrides: true,
                ..Placement::in_root(tree)
            };
            let id = self.place(found, placed)?;
            self.load_fs_tree(id).await?;
        }
        Ok(())
    }

    /// Resolve missing dependencies from `node_modules` folders above the
    /// dependent, never climbing past the folder it shares with the
    /// project.
    async fn find_missing_edges(&mut self, tree: NodeId) -> Result<()> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        loop {
            let pending: Vec<NodeId> = self
                .arena
                .inventory_ids(tree)
                .into_iter()
                .filter(|id| !visited.contains(id))
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            for id in pending {
                visited.insert(id);
                self.recover_edges(id).await?;
            }
        }
    }

    async fn recover_edges(&mut self, id: NodeId) -> Result<()> {
        let node = self.arena.node(id);
        let root = node.root();
        let real = node.realpath().to_path_buf();
        let unresolved: Vec<String> = node
            .edges_out()
            .values()
            .map(|&e| self.arena.edge(e))
            .filter(|edge| match edge.to() {
                None => true,
                Some(to) => self.arena.node(to).is_placeholder() || self.arena.node(to).parent() != Some(id),
            })
            .map(|edge| edge.name().to_string())
            .collect();
        if unresolved.is_empty() {
            return Ok(());
        }
        let ancestor = nearest_common_ancestor(&real, &self.path);
        let Some(start) = real.parent().map(Path::to_path_buf) else {
            return Ok(());
        };

        for name in unresolved {
            for dir in walk_up(&start) {
                if ancestor.as_ref().is_some_and(|a| !is_within(a, dir)) {
                    break;
                }
                if !self.listing(dir).await.iter().any(|entry| *entry == name) {
                    continue;
                }
                let anchor = match self.ctx.cache.get(dir) {
                    Some(&anchor) => anchor,
                    None => {
                        let anchor = self.arena.create_node(NodeOptions {
                            path: Some(dir.to_path_buf()),
                            root: Some(root),
                            placeholder: true,
                            ..NodeOptions::default()
                        })?;
                        self.ctx.cache.insert(dir.to_path_buf(), anchor);
                        anchor
                    }
                };
                if self.arena.node(anchor).is_placeholder() {
                    let dep_path = normalize(PackagePath::NodeModules.under(dir).join(&name));
                    let cached = self.ctx.cache.get(&dep_path).copied();
                    if cached.is_none_or(|c| self.arena.node(c).is_placeholder()) {
                        tracing::debug!(dependency = %name, from = %dir.display(), "Recovered missing dependency");
                        let found = probe(dep_path, None).await;
                        let at = Placement {
                            parent: Some(anchor),
                            root: Some(root),
                            ..Placement::default()
                        };
                        let dep = self.place(found, at)?;
                        self.load_fs_tree(dep).await?;
                    }
                }
                break;
            }
        }
        Ok(())
    }

    async fn listing(&mut self, dir: &Path) -> &[String] {
        if !self.ctx.listings.contains_key(dir) {
            let entries = readdir_scoped(&PackagePath::NodeModules.under(dir))
                .await
                .unwrap_or_default();
            self.ctx.listings.insert(dir.to_path_buf(), entries);
        }
        self.ctx.listings.get(dir).map(Vec::as_slice).unwrap_or_default()
    }

    /// Link targets outside any `node_modules` resolve through the nearest
    /// loaded folder above them.
    fn anchor_top_nodes(&mut self) {
        for path in &self.ctx.top_nodes {
            let Some(&node) = self.ctx.cache.get(path) else {
                continue;
            };
            let n = self.arena.node(node);
            if n.parent().is_some() || n.fs_parent().is_some() {
                continue;
            }
            let Some(dir) = path.parent() else {
                continue;
            };
            let anchor = walk_up(dir).find_map(|p| self.ctx.cache.get(p).copied());
            if let Some(anchor) = anchor.filter(|&a| a != node) {
                self.arena.set_fs_parent(node, Some(anchor));
            }
        }
    }

    /// Move the loaded tree onto `root`, keeping only the top-level nodes
    /// the transplant filter accepts.
    fn transplant(&mut self, tree: NodeId, root: Option<NodeId>) -> NodeId {
        let Some(root) = root.filter(|&r| r != tree) else {
            return tree;
        };
        let keep = |arena: &Arena, id: NodeId| self.transplant_filter.as_ref().is_none_or(|f| f(arena, id));

        let new_path = self.arena.path(root).to_path_buf();
        self.arena.change_path(tree, new_path);
        let tree_node = self.arena.node(tree);
        let family: Vec<NodeId> = tree_node
            .children()
            .values()
            .copied()
            .chain(tree_node.fs_children().iter().copied())
            .collect();
        for child in family {
            if !keep(&*self.arena, child) {
                self.arena.set_root(child, None);
            }
        }
        self.arena.replace(root, tree);
        tracing::debug!(%root, "Transplanted actual tree");
        root
    }

    /// A global prefix is not a real project: depend on every installed
    /// package so none of them are extraneous.
    fn depend_on_global_children(&mut self, tree: NodeId) {
        let Some(project) = self.arena.target_of(tree) else {
            return;
        };
        let mut package = self.arena.package(project).clone();
        for (name, &kid) in self.arena.node(project).children().iter() {
            let spec = if self.arena.node(kid).is_link() {
                let real = self.arena.realpath(kid).to_string_lossy().replace('#', "%23");
                format!("file:{real}")
            } else {
                "*".to_string()
            };
            package.dependencies.entry(name.to_string()).or_insert(spec);
        }
        self.arena.set_package(project, package);
    }
}
