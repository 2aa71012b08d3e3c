//! Loading dependency edges from manifests, and keeping them resolved.

use crate::arena::{Arena, EdgeId, NodeId};
use crate::case_map::CaseInsensitiveMap;
use crate::edge::{Edge, EdgeError, EdgeType};
use crate::error::{Error, Result};
use crate::override_set::OverrideSet;
use crate::package::Package;
use crate::spec::{SpecKind, classify};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Edge declaration: `(declared name, type, spec, accept)`.
type Declared = (String, EdgeType, String, Option<String>);

impl Arena {
    /// Replace the manifest of `id`, rebuilding its outgoing edges and
    /// re-validating everything that depends on it.
    pub fn set_package(&mut self, id: NodeId, package: Package) {
        let edges: Vec<EdgeId> = self.node(id).edges_out.values().copied().collect();
        for edge in edges {
            self.detach_edge(edge);
        }
        self.delist(id);
        self.node_mut(id).package = Arc::new(package);
        self.refresh_location(id);
        self.load_workspace_edges(id);
        self.load_deps(id);
        self.reload_edges_in(id, true);
    }

    /// Record bundled names on a node's manifest in place.
    pub fn add_bundled(&mut self, id: NodeId, name: &str) {
        Arc::make_mut(&mut self.node_mut(id).package).add_bundled(name);
    }

    /// Declare the workspaces of `id` as name to folder. Each becomes a
    /// `workspace` edge that no ordinary dependency can displace.
    pub fn set_workspaces(&mut self, id: NodeId, workspaces: BTreeMap<String, PathBuf>) {
        if let Some(previous) = self.node(id).workspaces.clone() {
            for name in previous.keys().filter(|n| !workspaces.contains_key(*n)) {
                if let Some(edge) = self.edge_out(id, name) {
                    self.detach_edge(edge);
                }
            }
        }
        self.node_mut(id).workspaces = Some(workspaces);
        self.load_workspace_edges(id);
        self.load_deps(id);
    }

    fn load_workspace_edges(&mut self, id: NodeId) {
        let Some(workspaces) = self.node(id).workspaces.clone() else {
            return;
        };
        for (name, path) in workspaces {
            let spec = format!("file:{}", path.to_string_lossy().replace('#', "%23"));
            let current = self.edge_out(id, &name).map(|e| self.edge(e));
            if current.is_some_and(|e| e.workspace() && e.spec == spec) {
                continue;
            }
            self.add_edge(id, &name, EdgeType::Workspace, spec, None);
        }
    }

    /// Whether the package's dev dependencies become edges.
    fn loads_dev_deps(&self, id: NodeId) -> bool {
        let this_dev = self.is_top(id) && !self.global_top(id);
        let source_dev = match self.node(id).source_reference {
            None => true,
            Some(source) => self.is_top(source) && !self.global_top(source),
        };
        this_dev && source_dev
    }

    fn declared_edges(&self, id: NodeId) -> Vec<Declared> {
        let package = &self.node(id).package;
        let accept = |name: &str| package.accept_dependencies.get(name).cloned();
        let mut declared = Vec::new();
        if !self.node(id).legacy_peer_deps {
            for (name, spec) in &package.peer_dependencies {
                let kind = if package.is_peer_optional(name) {
                    EdgeType::PeerOptional
                } else {
                    EdgeType::Peer
                };
                declared.push((name.clone(), kind, spec.clone(), accept(name)));
            }
        }
        for (deps, kind) in [
            (&package.dependencies, EdgeType::Prod),
            (&package.optional_dependencies, EdgeType::Optional),
        ] {
            for (name, spec) in deps {
                declared.push((name.clone(), kind, spec.clone(), accept(name)));
            }
        }
        if self.loads_dev_deps(id) {
            for (name, spec) in &package.dev_dependencies {
                declared.push((name.clone(), EdgeType::Dev, spec.clone(), accept(name)));
            }
        }
        declared
    }

    /// Bring the outgoing edges of `id` in line with its manifest.
    ///
    /// Declarations are applied peer, prod, optional, dev; a later
    /// declaration of the same name wins. Workspace edges are never
    /// replaced. Re-running this on an unchanged node changes nothing.
    pub(crate) fn load_deps(&mut self, id: NodeId) {
        if matches!(
            self.node(id).kind,
            crate::node::NodeKind::Link { .. } | crate::node::NodeKind::Placeholder
        ) {
            return;
        }
        let mut wanted: CaseInsensitiveMap<Declared> = CaseInsensitiveMap::new();
        for declared in self.declared_edges(id) {
            wanted.insert(declared.0.clone(), declared);
        }

        let existing: Vec<(String, EdgeId)> = self
            .node(id)
            .edges_out
            .iter()
            .map(|(name, &edge)| (name.to_string(), edge))
            .collect();
        for (name, edge) in existing {
            if !self.edge(edge).workspace() && !wanted.contains_key(&name) {
                self.detach_edge(edge);
            }
        }

        for (name, kind, spec, accept) in wanted.values().cloned().collect::<Vec<_>>() {
            if let Some(current) = self.edge_out(id, &name).map(|e| self.edge(e)) {
                if current.workspace()
                    || (current.edge_type == kind && current.spec == spec && current.accept == accept)
                {
                    continue;
                }
            }
            self.add_edge(id, &name, kind, spec, accept);
        }
    }

    /// Create an edge from `from`, displacing any edge of the same name.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        name: &str,
        edge_type: EdgeType,
        spec: impl Into<String>,
        accept: Option<String>,
    ) -> EdgeId {
        if let Some(old) = self.edge_out(from, name) {
            self.detach_edge(old);
        }
        let spec = spec.into();
        let overrides = self
            .node(from)
            .overrides
            .as_ref()
            .map(|set| set.edge_rule(name, &spec, self.matcher()));
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge {
            id,
            from: Some(from),
            to: None,
            edge_type,
            name: name.to_string(),
            spec,
            accept,
            overrides,
        });
        self.node_mut(from).edges_out.insert(name, id);
        self.reload_edge(id, true);
        id
    }

    /// Disconnect an edge from both ends. Detached edges stay detached.
    pub fn detach_edge(&mut self, id: EdgeId) {
        let Some(from) = self.edge_mut(id).from.take() else {
            return;
        };
        if let Some(to) = self.edge_mut(id).to.take() {
            self.node_mut(to).edges_in.remove(&id);
        }
        let name = self.edge(id).name.clone();
        if self.node(from).edges_out.get(&name) == Some(&id) {
            self.node_mut(from).edges_out.remove(&name);
        }
    }

    /// Re-resolve an edge against the current tree shape.
    pub fn reload_edge(&mut self, id: EdgeId, hard: bool) {
        let Some(from) = self.edge(id).from else {
            return;
        };
        let name = self.edge(id).name.clone();
        let spec = self.edge(id).spec.clone();
        let rule = self
            .node(from)
            .overrides
            .as_ref()
            .map(|set| set.edge_rule(&name, &spec, self.matcher()));
        let overrides_changed = match (&rule, &self.edge(id).overrides) {
            (Some(new), Some(old)) => !new.is_equal(old),
            (None, None) => false,
            _ => true,
        };
        self.edge_mut(id).overrides = rule.clone();

        let new_to = self.resolve(from, &name);
        let old_to = self.edge(id).to;
        if new_to != old_to {
            if let Some(old) = old_to {
                self.node_mut(old).edges_in.remove(&id);
            }
            self.edge_mut(id).to = new_to;
            if let Some(to) = new_to {
                self.node_mut(to).edges_in.insert(id);
                self.adopt_edge_overrides(to, rule);
            }
        } else if overrides_changed || hard {
            if let Some(to) = new_to {
                self.adopt_edge_overrides(to, rule);
            }
        }
    }

    pub(crate) fn reload_edges_out(&mut self, id: NodeId, hard: bool) {
        let edges: Vec<EdgeId> = self.node(id).edges_out.values().copied().collect();
        for edge in edges {
            self.reload_edge(edge, hard);
        }
    }

    pub(crate) fn reload_edges_in(&mut self, id: NodeId, hard: bool) {
        let edges: Vec<EdgeId> = self.node(id).edges_in.iter().copied().collect();
        for edge in edges {
            self.reload_edge(edge, hard);
        }
    }

    /// A dependency resolving to `node` passes its override rule along.
    fn adopt_edge_overrides(&mut self, node: NodeId, incoming: Option<OverrideSet>) {
        let Some(incoming) = incoming else {
            return;
        };
        let node = self.target_of(node).unwrap_or(node);
        let updated = match &self.node(node).overrides {
            None => Some(incoming),
            Some(current) if current.is_equal(&incoming) => None,
            Some(current) => match OverrideSet::most_specific(current, &incoming) {
                Some(set) if !set.is_equal(current) => Some(set),
                Some(_) => None,
                None => {
                    tracing::debug!(name = %self.node(node).name, "Conflicting override sets");
                    None
                }
            },
        };
        if let Some(set) = updated {
            self.apply_overrides(node, Some(set));
        }
    }

    /// Set a node's overrides and re-evaluate its outgoing edges.
    pub fn apply_overrides(&mut self, id: NodeId, overrides: Option<OverrideSet>) {
        self.set_overrides_raw(id, overrides);
        self.reload_edges_out(id, true);
    }

    /// The spec an edge is checked against: the raw spec, or the override
    /// value in force for it. `$name` references resolve against the root
    /// manifest.
    pub fn try_edge_spec(&self, id: EdgeId) -> Result<String> {
        let edge = self.edge(id);
        let Some(rule) = &edge.overrides else {
            return Ok(edge.spec.clone());
        };
        let Some(value) = rule.value() else {
            return Ok(edge.spec.clone());
        };
        if value == "*" || rule.name() != edge.name {
            return Ok(edge.spec.clone());
        }
        if let Some(reference) = value.strip_prefix('$') {
            let root_package = edge.from.map(|f| {
                let anchor = self.node(f).source_reference.unwrap_or(f);
                self.package(self.root_of(anchor))
            });
            let found = root_package.and_then(|pkg| {
                pkg.dev_dependencies
                    .get(reference)
                    .or_else(|| pkg.optional_dependencies.get(reference))
                    .or_else(|| pkg.dependencies.get(reference))
                    .or_else(|| pkg.peer_dependencies.get(reference))
            });
            return found
                .cloned()
                .ok_or_else(|| Error::UnresolvedOverrideReference {
                    reference: value.to_string(),
                });
        }
        if let SpecKind::Alias { name, .. } = classify(&edge.spec) {
            if !value.starts_with("npm:") {
                return Ok(format!("npm:{name}@{value}"));
            }
        }
        Ok(value.to_string())
    }

    /// Like [`Arena::try_edge_spec`], falling back to the raw spec when a
    /// reference cannot be resolved.
    pub fn edge_spec(&self, id: EdgeId) -> String {
        self.try_edge_spec(id).unwrap_or_else(|e| {
            tracing::warn!(edge = %self.edge(id).name, "{}", e);
            self.edge(id).spec.clone()
        })
    }

    /// Whether `node` satisfies edge `id`.
    ///
    /// Bundled and shrinkwrapped packages are checked against the raw spec:
    /// overrides never reach inside them.
    pub fn satisfied_by(&self, id: EdgeId, node: NodeId) -> bool {
        let edge = self.edge(id);
        if self.node(node).name != edge.name {
            return false;
        }
        let spec = if self.node(node).has_shrinkwrap || self.in_shrinkwrap(node) || self.in_bundle(node) {
            edge.spec.clone()
        } else {
            self.edge_spec(id)
        };
        self.dep_valid(node, &spec, edge.accept.as_deref(), edge.from)
    }

    pub(crate) fn dep_valid(&self, node: NodeId, spec: &str, accept: Option<&str>, from: Option<NodeId>) -> bool {
        let from_dir = match from {
            Some(f) => self.node(f).realpath.clone(),
            None => self.node(self.root_of(node)).realpath.clone(),
        };
        let candidate = self.candidate(node);
        self.matcher.satisfies(&candidate, spec, &from_dir)
            || accept.is_some_and(|accept| self.matcher.satisfies(&candidate, accept, &from_dir))
    }

    /// Why edge `id` is unsatisfied, if it is.
    pub fn edge_error(&self, id: EdgeId) -> Option<EdgeError> {
        let edge = self.edge(id);
        let Some(from) = edge.from else {
            return Some(EdgeError::Detached);
        };
        match edge.to {
            None if edge.optional() => None,
            None => Some(EdgeError::Missing),
            Some(to) if edge.peer() && self.node(to).parent == Some(from) && !self.is_top(from) => {
                Some(EdgeError::PeerLocal)
            }
            Some(to) if !self.satisfied_by(id, to) => Some(EdgeError::Invalid),
            Some(_) => None,
        }
    }

    pub fn edge_valid(&self, id: EdgeId) -> bool {
        self.edge_error(id).is_none()
    }

    /// Reject overrides that rewrite the project's own direct
    /// dependencies (`EOVERRIDE`).
    pub fn assert_root_overrides(&self, id: NodeId) -> Result<()> {
        if !self.is_project_root(id) || self.node(id).overrides.is_none() {
            return Ok(());
        }
        for &edge in self.node(id).edges_out.values() {
            let spec = self.try_edge_spec(edge)?;
            let raw = &self.edge(edge).spec;
            if &spec != raw && !spec.starts_with('$') {
                return Err(Error::OverrideConflict {
                    name: self.edge(edge).name.clone(),
                    spec: raw.clone(),
                });
            }
        }
        Ok(())
    }
}
