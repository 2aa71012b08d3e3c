//! Moving nodes within and between trees.
//!
//! Every structural change funnels into [`Arena::set_root`], which keeps
//! the following true for all nodes of the destination tree:
//!
//! - the node is filed in its root's inventory under its location;
//! - `parent` is the node owning the `node_modules` folder it lives in, and
//!   `fs_parent` the nearest enclosing package otherwise;
//! - links and targets sharing a realpath are connected;
//! - edges whose resolution could have changed are reloaded.

use crate::arena::{Arena, NodeId};
use crate::node::NodeKind;
use arbor_fs::{node_modules_name, relpath, resolve, walk_up};
use std::path::{Path, PathBuf};

fn child_location(parent_location: &str, name: &str) -> String {
    if parent_location.is_empty() {
        format!("node_modules/{name}")
    } else {
        format!("{parent_location}/node_modules/{name}")
    }
}

impl Arena {
    /// Run a structural change, then check every tree it touched once the
    /// outermost change completes.
    fn reparent<R>(&mut self, touched: &[NodeId], change: impl FnOnce(&mut Self) -> R) -> R {
        let mut trees: Vec<NodeId> = touched.iter().map(|&id| self.node(id).root).collect();
        self.moves_in_flight += 1;
        let out = change(self);
        self.moves_in_flight -= 1;
        if self.moves_in_flight == 0 {
            trees.extend(touched.iter().map(|&id| self.node(id).root));
            self.debug_tree_check(&trees);
        }
        out
    }

    /// Move `id` (and everything beneath it) into the tree rooted at
    /// `root`, or make it the root of its own tree when `root` is `None`.
    pub fn set_root(&mut self, id: NodeId, root: Option<NodeId>) {
        let touched: Vec<NodeId> = std::iter::once(id).chain(root).collect();
        self.reparent(&touched, |arena| arena.move_root(id, root));
    }

    fn move_root(&mut self, id: NodeId, root: Option<NodeId>) {
        let mut new_root = root.unwrap_or(id);
        while new_root != id && self.node(new_root).root != new_root {
            new_root = self.node(new_root).root;
        }
        let was_top = self.is_top(id);

        self.delist(id);
        self.node_mut(id).root = id;

        // links into this node are rediscovered below if still valid
        for link in std::mem::take(&mut self.node_mut(id).links_in) {
            if let NodeKind::Link { target } = &mut self.node_mut(link).kind {
                *target = None;
            }
        }
        let old_target = self.node(id).target();
        if let Some(target) = old_target {
            self.node_mut(target).links_in.remove(&id);
            if self.node(target).root == id {
                self.delist(target);
            }
            self.node_mut(id).kind = NodeKind::Link { target: None };
        }

        if let Some(parent) = self.node(id).parent {
            if self.node(parent).root != new_root {
                let name = self.node(id).name.clone();
                if self.node(parent).children.get(&name) == Some(&id) {
                    self.node_mut(parent).children.remove(&name);
                }
                self.node_mut(id).parent = None;
            }
        }
        if let Some(fs_parent) = self.node(id).fs_parent {
            if self.node(fs_parent).root != new_root {
                self.node_mut(fs_parent).fs_children.remove(&id);
                self.node_mut(id).fs_parent = None;
            }
        }

        if new_root == id {
            self.refresh_location(id);
        } else {
            self.attach(id, new_root);
        }

        self.rehome_family(id, new_root);

        if let Some(target) = old_target {
            if self.node(id).target().is_none() && new_root != id && self.node(target).root != new_root {
                self.set_root(target, Some(new_root));
                if self.node(id).target().is_none() && self.node(target).root == new_root {
                    self.connect_link(id, target);
                }
            }
        }

        self.reload_edges_out(id, false);
        let stale_in: Vec<_> = self
            .node(id)
            .edges_in
            .iter()
            .copied()
            .filter(|&e| self.edge(e).from.is_some_and(|f| self.node(f).root != new_root))
            .collect();
        for edge in stale_in {
            self.reload_edge(edge, false);
        }
        if was_top != self.is_top(id) {
            self.load_deps(id);
        }
    }

    /// Place `id` in `root`'s inventory and wire up parentage and links.
    fn attach(&mut self, id: NodeId, root: NodeId) {
        let location = relpath(&self.node(root).realpath, &self.node(id).path);
        if let Some(current) = self.node(root).inventory.get(&location) {
            if current != id {
                tracing::debug!(%location, "Evicting node from location");
                self.set_root(current, None);
            }
        }
        self.node_mut(id).root = root;
        self.refresh_location(id);
        self.find_parent(id, root);

        if self.node(id).parent.is_none() {
            self.node_mut(root).tops.insert(id);
        } else {
            self.node_mut(root).tops.remove(&id);
        }
        self.adopt_tops(id, root);
        self.connect_by_realpath(id, root);
    }

    /// Walk up from the node's folder to the nearest node in the inventory.
    fn find_parent(&mut self, id: NodeId, root: NodeId) {
        let path = self.path_buf(id);
        let root_realpath = self.node(root).realpath.clone();
        let Some(dir) = path.parent() else {
            return;
        };
        for candidate in walk_up(dir) {
            if candidate == path {
                continue;
            }
            let ploc = relpath(&root_realpath, candidate);
            let Some(found) = self.node(root).inventory.get(&ploc) else {
                continue;
            };
            if self.node(found).is_link() {
                tracing::debug!(location = %ploc, "Skipping link while looking for parent");
                continue;
            }
            let name = self.node(id).name.clone();
            if self.node(id).location == child_location(&ploc, &name) {
                if let Some(old_child) = self.node(found).children.get(&name).copied() {
                    if old_child != id {
                        self.set_root(old_child, None);
                    }
                }
                if let Some(old_parent) = self.node(id).parent {
                    self.node_mut(old_parent).children.remove(&name);
                    self.reload_named_edges(old_parent, &name);
                }
                self.node_mut(found).children.insert(name.clone(), id);
                self.node_mut(id).parent = Some(found);
                if !self.node(id).is_link() {
                    self.reload_named_edges(found, &name);
                }
            } else {
                if let Some(old) = self.node(id).fs_parent {
                    self.node_mut(old).fs_children.remove(&id);
                }
                self.node_mut(found).fs_children.insert(id);
                self.node_mut(id).fs_parent = Some(found);
            }
            return;
        }
    }

    /// Nodes added before this one may belong beneath it.
    fn adopt_tops(&mut self, id: NodeId, root: NodeId) {
        let nm_location = child_location(&self.node(id).location, "");
        let path = self.path_buf(id);
        let tops: Vec<NodeId> = self.node(root).tops.iter().copied().collect();
        for top in tops {
            if top == id || self.node(top).parent.is_some() {
                continue;
            }
            let top_location = self.node(top).location.clone();
            let top_name = self.node(top).name.clone();
            let is_child = top_location == format!("{nm_location}{top_name}");
            let top_dir = self.node(top).path.parent().map(Path::to_path_buf);
            let is_fs_child = !is_child
                && top_dir.as_deref().is_some_and(|d| d.starts_with(&path))
                && self.node(top).fs_parent.is_none_or(|fp| {
                    fp == id || path.parent().is_some_and(|d| d.starts_with(self.path(fp)))
                });
            if is_child {
                if let Some(fp) = self.node_mut(top).fs_parent.take() {
                    self.node_mut(fp).fs_children.remove(&top);
                }
                self.node_mut(id).children.insert(top_name.clone(), top);
                self.node_mut(top).parent = Some(id);
                self.node_mut(root).tops.remove(&top);
                self.reload_named_edges(id, &top_name);
                self.load_deps(top);
            } else if is_fs_child {
                if let Some(fp) = self.node(top).fs_parent {
                    self.node_mut(fp).fs_children.remove(&top);
                }
                self.node_mut(top).fs_parent = Some(id);
                self.node_mut(id).fs_children.insert(top);
            }
        }
    }

    /// Links and targets share a realpath; connect any such pairs.
    fn connect_by_realpath(&mut self, id: NodeId, root: NodeId) {
        let realpath = self.node(id).realpath.to_string_lossy().into_owned();
        let peers = self
            .node(root)
            .inventory
            .query(crate::inventory::IndexField::Realpath, &realpath);
        for other in peers {
            if other == id {
                continue;
            }
            if self.node(id).is_link() {
                let Some(target) = self.target_of(other) else {
                    continue;
                };
                if target == id {
                    continue;
                }
                self.connect_link(id, target);
                break;
            } else if self.node(other).is_link() && self.node(other).target() != Some(id) {
                self.connect_link(other, id);
            }
        }
    }

    fn connect_link(&mut self, link: NodeId, target: NodeId) {
        if let Some(old) = self.node(link).target() {
            self.node_mut(old).links_in.remove(&link);
        }
        self.node_mut(link).kind = NodeKind::Link {
            target: Some(target),
        };
        self.node_mut(target).links_in.insert(link);
        self.refresh_location(link);
        if let Some(parent) = self.node(link).parent {
            let name = self.node(link).name.clone();
            self.reload_named_edges(parent, &name);
        }
        self.reload_edges_in(link, true);
    }

    /// Bring children, fs-children and (for a former root) every inventory
    /// member along into `root`.
    fn rehome_family(&mut self, id: NodeId, root: NodeId) {
        let node = self.node(id);
        let mut family: Vec<NodeId> = node
            .fs_children
            .iter()
            .copied()
            .chain(node.children.values().copied())
            .chain(node.inventory.ids())
            .filter(|&n| n != id)
            .collect();
        family.sort();
        family.dedup();
        family.retain(|&n| self.node(n).root != root);

        for &member in &family {
            self.delist(member);
            let name = self.node(member).name.clone();
            if self.node(member).parent == Some(id) {
                self.node_mut(member).parent = None;
                self.node_mut(id).children.remove(&name);
            }
            if self.node(member).fs_parent == Some(id) {
                self.node_mut(member).fs_parent = None;
                self.node_mut(id).fs_children.remove(&member);
            }
            for link in std::mem::take(&mut self.node_mut(member).links_in) {
                if let NodeKind::Link { target } = &mut self.node_mut(link).kind {
                    *target = None;
                }
            }
        }
        for member in family {
            if self.node(member).root != root {
                self.set_root(member, Some(root));
            }
        }
    }

    /// Make `parent` (or its target, for links) the parent of `id`,
    /// moving `id` to `parent/node_modules/<name>`. `None` detaches.
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        let touched: Vec<NodeId> = std::iter::once(id).chain(parent).collect();
        self.reparent(&touched, |arena| arena.move_under_parent(id, parent));
    }

    fn move_under_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        let Some(parent) = parent else {
            if self.node(id).parent.is_some() {
                self.set_root(id, None);
            }
            return;
        };
        let Some(parent) = self.link_target_or_self(parent) else {
            tracing::debug!(%id, "Cannot parent a node under a dangling link");
            return;
        };
        if parent == id || self.node(id).parent == Some(parent) {
            return;
        }
        let name = self.node(id).name.clone();
        let new_path = self.node(parent).path.join("node_modules").join(&name);

        if let Some(old_parent) = self.node_mut(id).parent.take() {
            self.node_mut(old_parent).children.remove(&name);
        }
        if let Some(old) = self.node_mut(id).fs_parent.take() {
            self.node_mut(old).fs_children.remove(&id);
        }
        if new_path != self.node(id).path {
            self.change_path(id, new_path);
        }
        if let Some(overrides) = self.node(parent).overrides.clone() {
            let rule = overrides.node_rule(&name, self.version(id), self.matcher());
            self.node_mut(id).overrides = Some(rule);
        }
        let root = self.node(parent).root;
        self.set_root(id, Some(root));
    }

    /// Make `fs_parent` the enclosing package of `id`, keeping the node's
    /// path relative to its previous enclosing folder.
    pub fn set_fs_parent(&mut self, id: NodeId, fs_parent: Option<NodeId>) {
        let touched: Vec<NodeId> = std::iter::once(id).chain(fs_parent).collect();
        self.reparent(&touched, |arena| arena.move_under_fs_parent(id, fs_parent));
    }

    fn move_under_fs_parent(&mut self, id: NodeId, fs_parent: Option<NodeId>) {
        let Some(fs_parent) = fs_parent else {
            if self.node(id).fs_parent.is_some() {
                self.set_root(id, None);
            }
            return;
        };
        let Some(fs_parent) = self.link_target_or_self(fs_parent) else {
            return;
        };
        if fs_parent == id || self.node(id).fs_parent == Some(fs_parent) {
            return;
        }
        let name = self.node(id).name.clone();
        let base = self.node(id).fs_parent.or(self.node(id).parent).map(|n| self.path_buf(n));
        let new_path = match base {
            Some(base) => {
                let rel = relpath(&base, &self.node(id).path);
                resolve(&self.node(fs_parent).path, rel)
            }
            None => self.path_buf(id),
        };
        let nm_path = self.node(fs_parent).path.join("node_modules").join(&name);
        if new_path == nm_path {
            self.set_parent(id, Some(fs_parent));
            return;
        }

        let old_parent = self.node_mut(id).parent.take();
        if let Some(old_parent) = old_parent {
            self.node_mut(old_parent).children.remove(&name);
        }
        if let Some(old) = self.node_mut(id).fs_parent.take() {
            self.node_mut(old).fs_children.remove(&id);
        }
        if new_path != self.node(id).path {
            self.change_path(id, new_path);
        }
        if let Some(old_parent) = old_parent {
            self.reload_named_edges(old_parent, &name);
        }
        let root = self.node(fs_parent).root;
        self.set_root(id, Some(root));
    }

    /// Rewrite the path of `id` and everything beneath it.
    ///
    /// Children keep their place relative to `id`; links into a moved
    /// target follow it.
    pub fn change_path(&mut self, id: NodeId, new_path: PathBuf) {
        self.reparent(&[id], |arena| arena.move_path(id, new_path));
    }

    fn move_path(&mut self, id: NodeId, new_path: PathBuf) {
        self.delist(id);
        let old_path = std::mem::replace(&mut self.node_mut(id).path, new_path.clone());
        if let Some(name) = node_modules_name(&new_path) {
            if self.node(id).name != name {
                self.node_mut(id).name = name;
            }
        }
        if !self.node(id).is_link() {
            self.node_mut(id).realpath = new_path.clone();
            let links: Vec<NodeId> = self.node(id).links_in.iter().copied().collect();
            for link in links {
                self.delist(link);
                self.node_mut(link).realpath = new_path.clone();
                self.refresh_location(link);
            }
        }
        // filed before the family so an occupant leaves with its own family
        self.refresh_location(id);
        let fs_children: Vec<NodeId> = self.node(id).fs_children.iter().copied().collect();
        for child in fs_children {
            let rel = relpath(&old_path, &self.node(child).path);
            self.move_path(child, resolve(&new_path, rel));
        }
        let children: Vec<(String, NodeId)> = self
            .node(id)
            .children
            .iter()
            .map(|(name, &child)| (name.to_string(), child))
            .collect();
        for (name, child) in children {
            self.move_path(child, new_path.join("node_modules").join(name));
        }
    }

    /// Recompute the location and re-file the node in its root's
    /// inventory and lockfile. Any other node filed there is detached.
    pub(crate) fn refresh_location(&mut self, id: NodeId) {
        let root = self.node(id).root;
        let location = relpath(&self.node(root).realpath, &self.node(id).path);
        if let Some(occupant) = self.node(root).inventory.get(&location) {
            if occupant != id && occupant != root {
                tracing::debug!(%location, "Evicting node from location");
                self.set_root(occupant, None);
            }
        }
        self.node_mut(id).location = location;
        let keys = self.inventory_keys(id);
        self.node_mut(root).inventory.add(id, keys);
        self.add_to_meta(id);
    }

    /// Remove the node from its root's inventory, tops and lockfile. The
    /// lockfile record stays when another node holds the location.
    pub(crate) fn delist(&mut self, id: NodeId) {
        let root = self.node(id).root;
        let location = self.node(id).location.clone();
        let root_node = self.node_mut(root);
        let holds_location = root_node.inventory.get(&location) == Some(id);
        root_node.inventory.delete(id);
        root_node.tops.remove(&id);
        if holds_location {
            if let Some(meta) = root_node.meta.as_mut() {
                meta.remove(&location);
            }
        }
    }

    /// Point a link at `target`, moving the target into the link's tree.
    pub fn set_target(&mut self, link: NodeId, target: Option<NodeId>) {
        let touched: Vec<NodeId> = std::iter::once(link).chain(target).collect();
        self.reparent(&touched, |arena| arena.retarget(link, target));
    }

    fn retarget(&mut self, link: NodeId, target: Option<NodeId>) {
        let NodeKind::Link { target: current } = self.node(link).kind else {
            return;
        };
        if current == target {
            return;
        }
        if let Some(current) = current {
            self.node_mut(current).links_in.remove(&link);
        }
        self.delist(link);
        self.node_mut(link).kind = NodeKind::Link { target };
        match target {
            None => self.refresh_location(link),
            Some(target) => {
                self.node_mut(target).links_in.insert(link);
                self.node_mut(link).realpath = self.path_buf(target);
                self.refresh_location(link);
                let root = self.node(link).root;
                if self.node(target).root != root {
                    self.set_root(target, Some(root));
                }
            }
        }
        if let Some(parent) = self.node(link).parent {
            let name = self.node(link).name.clone();
            self.reload_named_edges(parent, &name);
        }
        self.reload_edges_in(link, true);
    }

    /// Put `id` where `other` is, taking over its children. `other` ends
    /// up detached in a tree of its own.
    pub fn replace(&mut self, id: NodeId, other: NodeId) {
        if id == other {
            return;
        }
        self.reparent(&[id, other], |arena| arena.take_place(id, other));
    }

    fn take_place(&mut self, id: NodeId, other: NodeId) {
        let other_root = self.node(other).root;
        let name = self.node(other).name.clone();
        let path = self.path_buf(other);
        let children: Vec<NodeId> = self.node(other).children.values().copied().collect();
        let fs_children: Vec<NodeId> = self.node(other).fs_children.iter().copied().collect();

        let own_name = self.node(id).name.clone();
        if let Some(parent) = self.node_mut(id).parent.take() {
            if self.node(parent).children.get(&own_name) == Some(&id) {
                self.node_mut(parent).children.remove(&own_name);
            }
            self.reload_named_edges(parent, &own_name);
        }
        if let Some(fs_parent) = self.node_mut(id).fs_parent.take() {
            self.node_mut(fs_parent).fs_children.remove(&id);
        }

        self.node_mut(id).name = name;
        self.move_path(id, path);
        if other_root != other {
            self.set_root(id, Some(other_root));
        }
        if self.node(id).is_link() {
            return;
        }
        for child in children {
            self.set_parent(child, Some(id));
        }
        for child in fs_children {
            self.set_fs_parent(child, Some(id));
        }
    }

    /// Reload edges named `name` anywhere beneath `id` that resolved to the
    /// spot now (or previously) occupied.
    pub(crate) fn reload_named_edges(&mut self, id: NodeId, name: &str) {
        let root_location = self.node(id).location.clone();
        self.reload_named_edges_from(id, name, &root_location);
    }

    fn reload_named_edges_from(&mut self, id: NodeId, name: &str, root_location: &str) {
        if let Some(edge) = self.edge_out(id, name) {
            let to = self.edge(edge).to;
            let at_root = to.is_some_and(|to| self.node(to).location == child_location(root_location, name));
            if at_root || self.resolve(id, name) != to {
                self.reload_edge(edge, true);
            }
        }
        let node = self.node(id);
        let next: Vec<NodeId> = node
            .children
            .values()
            .copied()
            .chain(node.fs_children.iter().copied())
            .collect();
        for child in next {
            self.reload_named_edges_from(child, name, root_location);
        }
    }
}
