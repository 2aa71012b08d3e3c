//! Building a tree from lockfile records alone.

use crate::actual::read_package;
use crate::options::{ArboristOptions, LoadVirtualOptions};
use crate::workspaces::{map_workspaces, map_workspaces_virtual};
use crate::{Error, Result};
use arbor_fs::{PackagePath, name_from_folder, read_json, relpath, resolve};
use arbor_lockfile::{LockRecord, Lockfile};
use arbor_tree::{Arena, DepFlags, EdgeType, NodeId, NodeOptions, Package, consistent_resolve};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

pub(crate) struct VirtualTreeLoader<'a> {
    arena: &'a mut Arena,
    options: &'a ArboristOptions,
    path: PathBuf,
    /// Recorded flags can't be trusted; recompute them after loading.
    flags_suspect: bool,
}

impl<'a> VirtualTreeLoader<'a> {
    pub(crate) fn new(arena: &'a mut Arena, options: &'a ArboristOptions) -> Self {
        Self {
            arena,
            path: options.path.clone(),
            options,
            flags_suspect: false,
        }
    }

    pub(crate) async fn load(mut self, opts: LoadVirtualOptions) -> Result<NodeId> {
        if let Some(root) = opts.root {
            if let Some(meta) = self.arena.take_meta(root) {
                self.load_from_lockfile(meta, root, false).await?;
                self.arena.tree_check(root)?;
                return Ok(root);
            }
        }

        let lockfile = match opts.lockfile {
            Some(lockfile) => lockfile,
            None => self.options.versioned(Lockfile::load(&self.path).await?),
        };
        if !lockfile.loaded_from_disk() && opts.root.is_none() {
            return Err(Error::NoLockfile { path: self.path.clone() });
        }
        let root_provided = opts.root.is_some();
        let root = match opts.root {
            Some(root) => root,
            None => self.load_root(&lockfile).await?,
        };
        self.load_from_lockfile(lockfile, root, root_provided).await?;
        self.arena.assert_root_overrides(root)?;
        self.arena.tree_check(root)?;
        Ok(root)
    }

    /// The project node, from `package.json` or else the lockfile's root
    /// record.
    async fn load_root(&mut self, lockfile: &Lockfile) -> Result<NodeId> {
        let manifest = PackagePath::PackageJson.under(&self.path);
        let package = match read_json::<Package>(&manifest).await {
            Ok(package) => package,
            Err(e) => {
                tracing::debug!(error = %e, "Using lockfile root record as the root package");
                lockfile.root().map(Package::from).unwrap_or_default()
            }
        };
        let root = self.arena.create_node(NodeOptions {
            path: Some(self.path.clone()),
            package: package.clone(),
            legacy_peer_deps: self.options.legacy_peer_deps,
            load_overrides: true,
            ..NodeOptions::default()
        })?;
        let workspaces = map_workspaces(&self.path, &package).await?;
        if !workspaces.is_empty() {
            self.arena.set_workspaces(root, workspaces);
        }
        Ok(root)
    }

    /// Materialize every record of `lockfile` under `root`.
    ///
    /// With `root_provided`, the root came from elsewhere and its flags are
    /// left alone, but every other flag is recomputed.
    pub(crate) async fn load_from_lockfile(
        &mut self,
        lockfile: Lockfile,
        root: NodeId,
        root_provided: bool,
    ) -> Result<()> {
        if root_provided {
            self.flags_suspect = true;
        } else {
            self.arena.set_flags(root, DepFlags::NONE);
        }
        self.check_root_edges(&lockfile, root);

        let records: Vec<(String, LockRecord)> = lockfile
            .packages()
            .iter()
            .filter(|(location, _)| !location.is_empty())
            .map(|(location, record)| (location.clone(), record.clone()))
            .collect();
        let bundled: BTreeSet<String> = records
            .iter()
            .filter(|(_, record)| record.in_bundle)
            .map(|(location, _)| location.clone())
            .collect();
        let modern = lockfile.original_lockfile_version().is_some_and(|v| v >= 2);
        self.arena.set_meta(root, Some(lockfile));

        let mut seen: HashMap<String, String> = HashMap::new();
        let mut nodes: BTreeMap<String, NodeId> = BTreeMap::from([(String::new(), root)]);
        let mut links = Vec::new();
        for (location, record) in records {
            if let Some(existing) = seen.insert(location.to_lowercase(), location.clone()) {
                return Err(Error::DuplicateNode { location, existing });
            }
            if record.link {
                links.push((location, record));
                continue;
            }
            let id = self.load_node(root, &location, &record)?;
            nodes.insert(location, id);
        }
        self.resolve_links(root, links, &mut nodes).await?;
        if !modern {
            self.assign_bundles(&nodes, &bundled);
        }

        if self.flags_suspect {
            tracing::debug!("Lockfile disagrees with the root package, recalculating flags");
            for &id in nodes.values() {
                if self.arena.is_root(id) || (root_provided && id == root) {
                    continue;
                }
                self.arena.set_flags(id, DepFlags::UNKNOWN);
            }
            self.arena.calc_dep_flags(root, !root_provided);
            self.arena.refresh_meta(root);
        }
        tracing::debug!(nodes = nodes.len(), "Loaded virtual tree");
        Ok(())
    }

    /// Compare the lockfile's root record with the root's edges; any
    /// difference means recorded flags are suspect.
    fn check_root_edges(&mut self, lockfile: &Lockfile, root: NodeId) {
        if !lockfile.loaded_from_disk() || lockfile.ancient() {
            return;
        }
        let Some(record) = lockfile.root() else {
            return;
        };
        let Some(project) = self.arena.target_of(root) else {
            return;
        };

        let (peer, peer_optional) = record.split_peer_dependencies();
        let mut prod = record.dependencies.clone();
        for name in record.optional_dependencies.keys() {
            prod.remove(name);
        }
        let workspaces: BTreeMap<String, String> = map_workspaces_virtual(&self.path, lockfile)
            .into_iter()
            .map(|(name, path)| (name, format!("file:{}", path.to_string_lossy().replace('#', "%23"))))
            .collect();
        let by_type = [
            (EdgeType::Dev, &record.dev_dependencies),
            (EdgeType::Optional, &record.optional_dependencies),
            (EdgeType::Peer, &peer),
            (EdgeType::PeerOptional, &peer_optional),
            (EdgeType::Prod, &prod),
            (EdgeType::Workspace, &workspaces),
        ];

        let mut unaccounted: BTreeSet<String> = self
            .arena
            .node(project)
            .edges_out()
            .keys()
            .map(|name| name.to_lowercase())
            .collect();
        for (edge_type, deps) in by_type {
            for (name, spec) in deps {
                let matches = self
                    .arena
                    .edge_out(project, name)
                    .map(|e| self.arena.edge(e))
                    .is_some_and(|edge| edge.edge_type() == edge_type && edge.raw_spec() == spec);
                if !matches {
                    tracing::debug!(dependency = %name, "Root edge differs from lockfile");
                    self.flags_suspect = true;
                    return;
                }
                unaccounted.remove(&name.to_lowercase());
            }
        }
        if !unaccounted.is_empty() {
            tracing::debug!(?unaccounted, "Root edges missing from lockfile");
            self.flags_suspect = true;
        }
    }

    fn load_node(&mut self, root: NodeId, location: &str, record: &LockRecord) -> Result<NodeId> {
        let path = resolve(self.arena.realpath(root), location);
        let mut package = Package::from(record);
        if package.name.is_none() {
            package.name = name_from_folder(&path);
        }
        let flags = DepFlags {
            dev: record.dev,
            optional: record.optional,
            dev_optional: record.dev || record.optional || record.dev_optional,
            peer: record.peer,
            extraneous: record.extraneous,
        };
        let resolved = record
            .resolved
            .as_deref()
            .map(|r| consistent_resolve(r, &self.path, &path));
        let id = self.arena.create_node(NodeOptions {
            path: Some(path),
            root: Some(root),
            package,
            resolved,
            integrity: record.integrity.clone(),
            has_shrinkwrap: record.has_shrinkwrap,
            flags: Some(flags),
            legacy_peer_deps: self.options.legacy_peer_deps,
            ..NodeOptions::default()
        })?;
        Ok(id)
    }

    /// Link records point at their target's location; targets outside
    /// `node_modules` are re-read from disk since they may have changed.
    async fn resolve_links(
        &mut self,
        root: NodeId,
        links: Vec<(String, LockRecord)>,
        nodes: &mut BTreeMap<String, NodeId>,
    ) -> Result<()> {
        let base = self.arena.realpath(root).to_path_buf();
        for (location, record) in links {
            let target_path = resolve(&base, record.resolved.as_deref().unwrap_or_default());
            let target_location = relpath(&base, &target_path);
            let target = nodes.get(&target_location).copied();
            let link = self.load_link(root, &location, &target_path, target)?;
            nodes.insert(location, link);
            let Some(target) = self.arena.node(link).target() else {
                continue;
            };
            nodes.insert(target_location, target);
            if self.arena.node(target).parent().is_none() {
                match read_package(&target_path).await {
                    Ok(package) => self.arena.set_package(target, package),
                    Err(error) => {
                        tracing::debug!(%error, "Keeping lockfile metadata for link target");
                    }
                }
            }
        }
        Ok(())
    }

    fn load_link(&mut self, root: NodeId, location: &str, target_path: &Path, target: Option<NodeId>) -> Result<NodeId> {
        let package = target.map(|t| self.arena.package(t).clone()).unwrap_or_default();
        let path = resolve(self.arena.realpath(root), location);
        let link = self.arena.create_link(
            NodeOptions {
                path: Some(path),
                realpath: Some(target_path.to_path_buf()),
                root: Some(root),
                package,
                legacy_peer_deps: self.options.legacy_peer_deps,
                ..NodeOptions::default()
            },
            target,
        )?;
        if let Some(target) = self.arena.node(link).target() {
            let flags = self.arena.node(target).flags();
            self.arena.set_flags(link, flags);
        }
        Ok(link)
    }

    /// Lockfiles before version 2 only mark bundled packages with
    /// `inBundle`; rebuild the bundling parent's `bundleDependencies`.
    fn assign_bundles(&mut self, nodes: &BTreeMap<String, NodeId>, bundled: &BTreeSet<String>) {
        for (location, &id) in nodes {
            if location.is_empty() || !bundled.contains(location) {
                continue;
            }
            let Some(parent) = self.arena.node(id).parent() else {
                continue;
            };
            if bundled.contains(self.arena.node(parent).location()) {
                continue;
            }
            let name = self.arena.node(id).name().to_string();
            if self.arena.edge_out(parent, &name).is_some() {
                self.arena.add_bundled(parent, &name);
            }
        }
    }
}
