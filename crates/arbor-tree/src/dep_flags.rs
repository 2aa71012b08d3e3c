//! Dependency flag calculation.
//!
//! Starting from "everything is dev, optional, peer and extraneous", walk
//! the dependency graph from the root and clear each flag on every node
//! reachable without passing through an edge of that kind.

use crate::arena::{Arena, NodeId};
use crate::edge::EdgeType;
use crate::node::DepFlags;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Dev,
    Optional,
    DevOptional,
    Peer,
    Extraneous,
}

impl Flag {
    fn get(self, flags: &DepFlags) -> bool {
        match self {
            Self::Dev => flags.dev,
            Self::Optional => flags.optional,
            Self::DevOptional => flags.dev_optional,
            Self::Peer => flags.peer,
            Self::Extraneous => flags.extraneous,
        }
    }

    fn clear(self, flags: &mut DepFlags) {
        match self {
            Self::Dev => flags.dev = false,
            Self::Optional => flags.optional = false,
            Self::DevOptional => flags.dev_optional = false,
            Self::Peer => flags.peer = false,
            Self::Extraneous => flags.extraneous = false,
        }
    }
}

impl Arena {
    /// Recompute dependency flags for the tree under `tree`.
    ///
    /// With `reset_root`, the root's own flags are cleared first; pass
    /// `false` when the root's flags were inherited from elsewhere.
    pub fn calc_dep_flags(&mut self, tree: NodeId, reset_root: bool) {
        if reset_root {
            let flags = &mut self.node_mut(tree).flags;
            flags.dev = false;
            flags.optional = false;
            flags.dev_optional = false;
            flags.peer = false;
        }
        let mut seen = HashSet::new();
        let mut stack = vec![tree];
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            let walked = self.dep_flags_step(node);
            let next: Vec<NodeId> = self
                .node(walked)
                .edges_out
                .values()
                .filter_map(|&e| self.edge(e).to)
                .collect();
            stack.extend(next.into_iter().rev());
        }
        tracing::debug!(nodes = seen.len(), "Calculated dependency flags");
    }

    fn dep_flags_step(&mut self, node: NodeId) -> NodeId {
        self.node_mut(node).flags.extraneous = false;
        for flag in [
            Flag::Extraneous,
            Flag::Dev,
            Flag::Peer,
            Flag::DevOptional,
            Flag::Optional,
        ] {
            self.reset_parents(node, flag);
        }

        if let Some(target) = self.node(node).target() {
            let link = self.node(node).flags;
            let flags = &mut self.node_mut(target).flags;
            flags.dev = link.dev;
            flags.optional = link.optional;
            flags.dev_optional = link.dev_optional;
            flags.peer = link.peer;
            return self.dep_flags_step(target);
        }

        let edges: Vec<_> = self.node(node).edges_out.values().copied().collect();
        for edge in edges {
            let (to, dev, optional, peer) = {
                let e = self.edge(edge);
                (e.to, e.dev(), e.optional(), e.peer())
            };
            let Some(to) = to else {
                continue;
            };
            self.node_mut(to).flags.extraneous = false;
            let from = self.node(node).flags;
            let unset_dev_opt = !from.dev_optional && !from.dev && !from.optional && !dev && !optional;
            let unset_dev = unset_dev_opt || (!from.dev && !dev);
            let unset_opt = unset_dev_opt || (!from.optional && !optional);
            let unset_peer = !from.peer && !peer;
            if unset_peer {
                self.unset_flag(to, Flag::Peer);
            }
            if unset_dev_opt {
                self.unset_flag(to, Flag::DevOptional);
            }
            if unset_dev {
                self.unset_flag(to, Flag::Dev);
            }
            if unset_opt {
                self.unset_flag(to, Flag::Optional);
            }
        }
        node
    }

    /// A node without `flag` lives inside ancestors that cannot have it
    /// either.
    fn reset_parents(&mut self, node: NodeId, flag: Flag) {
        if flag.get(&self.node(node).flags) {
            return;
        }
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current != node && !flag.get(&self.node(current).flags) {
                break;
            }
            flag.clear(&mut self.node_mut(current).flags);
            cursor = self.resolve_parent(current);
        }
    }

    /// Clear `flag` on `node` and on everything it reaches through prod
    /// edges (and peer edges, unless clearing `peer`).
    fn unset_flag(&mut self, node: NodeId, flag: Flag) {
        if !flag.get(&self.node(node).flags) {
            return;
        }
        let mut seen = HashSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let flags = &mut self.node_mut(current).flags;
            flags.extraneous = false;
            flag.clear(flags);
            let target = self.node(current).target();
            if let Some(target) = target {
                let flags = &mut self.node_mut(target).flags;
                flags.extraneous = false;
                flag.clear(flags);
            }
            let source = target.unwrap_or(current);
            for &edge in self.node(source).edges_out.values() {
                let e = self.edge(edge);
                let Some(to) = e.to else {
                    continue;
                };
                let follows = e.edge_type == EdgeType::Prod || (flag != Flag::Peer && e.edge_type == EdgeType::Peer);
                if follows && flag.get(&self.node(to).flags) {
                    stack.push(to);
                }
            }
        }
    }

    /// Mark every non-root node in the tree with unknown flags, ready for
    /// [`Arena::calc_dep_flags`].
    pub fn reset_dep_flags(&mut self, root: NodeId) {
        let root = self.root_of(root);
        for id in self.inventory_ids(root) {
            if id != root {
                self.node_mut(id).flags = DepFlags::UNKNOWN;
            }
        }
    }

    /// Mark every node in the tree extraneous, keeping its other flags.
    pub fn reset_extraneous(&mut self, root: NodeId) {
        let root = self.root_of(root);
        for id in self.inventory_ids(root) {
            self.node_mut(id).flags.extraneous = true;
        }
    }
}
