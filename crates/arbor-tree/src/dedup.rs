//! Identity and replacement decisions used when deduplicating a tree.

use crate::arena::{Arena, NodeId};
use crate::override_set::OverrideSet;
use crate::spec::parse_version;
use std::collections::BTreeSet;

fn overrides_equal(a: Option<&OverrideSet>, b: Option<&OverrideSet>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.is_equal(b),
        _ => false,
    }
}

impl Arena {
    /// Whether `a` and `b` are the same package.
    ///
    /// Checked in order: identity, folder name, link targets, project root
    /// paths, integrity, resolved, then package name and version.
    pub fn matches(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        let (na, nb) = (self.node(a), self.node(b));
        if na.name != nb.name {
            return false;
        }
        if na.is_link() || nb.is_link() {
            let target = self.target_of(a);
            return target.is_some() && target == self.target_of(b);
        }
        if self.is_project_root(a) && self.is_project_root(b) {
            return na.path == nb.path;
        }
        if let (Some(x), Some(y)) = (&na.integrity, &nb.integrity) {
            return x == y;
        }
        if let (Some(x), Some(y)) = (&na.resolved, &nb.resolved) {
            return x == y;
        }
        match (
            &self.package(a).name,
            &self.package(b).name,
            self.version(a),
            self.version(b),
        ) {
            (Some(pa), Some(pb), Some(va), Some(vb)) => pa == pb && va == vb,
            _ => false,
        }
    }

    /// Whether `candidate` could take the place of `id` without breaking
    /// any dependent.
    ///
    /// Dependents that only exist because of `id` do not count, and with
    /// `ignore_peers` neither do sibling peers being replaced as a group.
    pub fn can_replace_with(&self, id: NodeId, candidate: NodeId, ignore_peers: &[String]) -> bool {
        if self.node(candidate).name != self.node(id).name {
            return false;
        }
        if self.package_name(candidate) != self.package_name(id) {
            return false;
        }
        let node = self.node(id);
        if !node.edges_in.is_empty()
            && !overrides_equal(node.overrides.as_ref(), self.node(candidate).overrides.as_ref())
        {
            return false;
        }

        let dep_set = self.gather_dep_set(&[id], |arena, edge| {
            arena.edge(edge).to != Some(id) && arena.edge_valid(edge)
        });
        let is_top = self.is_top(id);
        for &edge in &node.edges_in {
            let Some(from) = self.edge(edge).from else {
                continue;
            };
            if !is_top
                && self.node(from).parent == node.parent
                && self.edge(edge).peer()
                && ignore_peers.iter().any(|p| *p == self.node(from).name)
            {
                continue;
            }
            if !dep_set.contains(&from) && !self.satisfied_by(edge, candidate) {
                return false;
            }
        }
        true
    }

    /// Whether `id` could take the place of `other`.
    pub fn can_replace(&self, id: NodeId, other: NodeId, ignore_peers: &[String]) -> bool {
        self.can_replace_with(other, id, ignore_peers)
    }

    /// The dependency closure of `set` along edges accepted by `filter`,
    /// minus every node depended on from outside the closure.
    pub fn gather_dep_set<F>(&self, set: &[NodeId], filter: F) -> BTreeSet<NodeId>
    where
        F: Fn(&Arena, crate::arena::EdgeId) -> bool,
    {
        let mut deps: BTreeSet<NodeId> = set.iter().copied().collect();
        let mut queue: Vec<NodeId> = set.to_vec();
        while let Some(node) = queue.pop() {
            for &edge in self.node(node).edges_out.values() {
                if let Some(to) = self.edge(edge).to {
                    if filter(self, edge) && deps.insert(to) {
                        queue.push(to);
                    }
                }
            }
        }

        let mut changed = true;
        while changed && !deps.is_empty() {
            changed = false;
            let outside: Vec<NodeId> = deps
                .iter()
                .copied()
                .filter(|&dep| {
                    self.node(dep)
                        .edges_in
                        .iter()
                        .any(|&e| self.edge(e).from.is_none_or(|from| !deps.contains(&from)))
                })
                .collect();
            for dep in outside {
                deps.remove(&dep);
                changed = true;
            }
        }
        deps
    }

    /// Whether `id` can be removed in favour of the same package resolved
    /// two levels up.
    ///
    /// `prefer_dedupe` takes the higher copy even when it is older. An
    /// `explicit_request` (the user named this package) allows dedupe when
    /// nothing else decides it.
    pub fn can_dedupe(&self, id: NodeId, prefer_dedupe: bool, explicit_request: bool) -> bool {
        if self.in_dep_bundle(id) || self.in_shrinkwrap(id) {
            return false;
        }
        let Some(grandparent) = self
            .resolve_parent(id)
            .and_then(|p| self.resolve_parent(p))
        else {
            return false;
        };
        if self.node(id).edges_in.is_empty() {
            return true;
        }
        let Some(other) = self.resolve(grandparent, &self.node(id).name) else {
            return false;
        };
        if self.matches(other, id) {
            return true;
        }
        if !self.can_replace(other, id, &[]) {
            return false;
        }
        let other_version = self.version(other).and_then(parse_version);
        let this_version = self.version(id).and_then(parse_version);
        let (Some(other_version), Some(this_version)) = (other_version, this_version) else {
            return prefer_dedupe || explicit_request;
        };
        if prefer_dedupe || other_version == this_version {
            return true;
        }
        if !self.overridden(id) && other_version > this_version {
            return true;
        }
        explicit_request
    }

    /// Whether `id` was placed because an override rewrote some dependent's
    /// spec.
    pub fn overridden(&self, id: NodeId) -> bool {
        let node = self.node(id);
        let Some(set) = &node.overrides else {
            return false;
        };
        if set.value().is_none() || set.name() != node.name {
            return false;
        }
        node.edges_in.iter().any(|&e| {
            let edge = self.edge(e);
            let Some(rule) = &edge.overrides else {
                return false;
            };
            if rule.name() != node.name || rule.value() != self.version(id) {
                return false;
            }
            let from_set = edge.from.and_then(|f| self.node(f).overrides.as_ref());
            !from_set.is_some_and(|f| rule.is_equal(f))
        })
    }

    /// The node whose bundle ships `id`, if any.
    pub fn bundler(&self, id: NodeId) -> Option<NodeId> {
        let mut visited = Vec::new();
        self.bundler_walk(id, &mut visited)
    }

    fn bundler_walk(&self, id: NodeId, visited: &mut Vec<NodeId>) -> Option<NodeId> {
        if visited.contains(&id) {
            return None;
        }
        visited.push(id);
        let parent = self.node(id).parent?;
        if let Some(bundler) = self.bundler_walk(parent, visited) {
            return Some(bundler);
        }
        if self.package(parent).bundles(&self.node(id).name) {
            return Some(parent);
        }
        for &edge in &self.node(id).edges_in {
            let Some(from) = self.edge(edge).from else {
                continue;
            };
            if self.bundler_walk(from, visited) == Some(parent) {
                return Some(parent);
            }
        }
        None
    }

    pub fn in_bundle(&self, id: NodeId) -> bool {
        self.bundler(id).is_some()
    }

    /// Bundled by a dependency rather than by the project itself.
    pub fn in_dep_bundle(&self, id: NodeId) -> bool {
        self.bundler(id).is_some_and(|b| b != self.root_of(id))
    }

    /// Placed by some ancestor's `npm-shrinkwrap.json`.
    pub fn in_shrinkwrap(&self, id: NodeId) -> bool {
        let mut cursor = self.node(id).parent;
        while let Some(parent) = cursor {
            if self.node(parent).has_shrinkwrap {
                return true;
            }
            cursor = self.node(parent).parent;
        }
        false
    }

    /// Whether `id` satisfies `name@spec` (or a bare spec for its own name).
    pub fn satisfies(&self, id: NodeId, requested: &str) -> bool {
        let (name, spec) = split_request(requested);
        let name = name.unwrap_or(&self.node(id).name);
        self.node(id).name == name && self.dep_valid(id, spec, None, None)
    }
}

fn split_request(requested: &str) -> (Option<&str>, &str) {
    let at = if let Some(scoped) = requested.strip_prefix('@') {
        scoped.find('@').map(|i| i + 1)
    } else {
        requested.find('@')
    };
    match at {
        Some(0) => (None, &requested[1..]),
        Some(i) => (Some(&requested[..i]), &requested[i + 1..]),
        None if crate::spec::parse_range(requested).is_some() => (None, requested),
        None => (Some(requested), "*"),
    }
}
