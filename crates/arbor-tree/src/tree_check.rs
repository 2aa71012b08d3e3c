//! Structural validation of a whole tree.

use crate::arena::{Arena, NodeId};
use crate::error::TreeCheckError;
use arbor_fs::relpath;
use std::collections::HashSet;

impl Arena {
    /// Verify the structural invariants of the tree containing `tree`.
    ///
    /// Walks from the root through parents, children, fs-children, link
    /// targets, links and tops, then checks that every inventory entry was
    /// reached. Running it does not change the tree.
    pub fn tree_check(&self, tree: NodeId) -> Result<(), TreeCheckError> {
        let root = self.root_of(tree);
        let root_realpath = self.node(root).realpath.clone();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![tree, root];

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let node = self.node(id);
            let path = node.path.clone();
            if node.is_root() && id != root {
                return Err(TreeCheckError::DoubleRoot { path });
            }
            if node.root != root {
                return Err(TreeCheckError::NodeFromOtherRoot { path });
            }
            if !node.is_root() && !node.inventory.is_empty() {
                return Err(TreeCheckError::NonRootInventory { path });
            }
            if !node.is_root() && self.node(root).inventory.get(&node.location) != Some(id) {
                return Err(TreeCheckError::NotInInventory { path });
            }
            if !self.is_top(id) && node.edges_out.values().any(|&e| self.edge(e).dev()) {
                return Err(TreeCheckError::DevEdgesOnNonTop { path });
            }
            if node.path == root_realpath && id != root && self.node(root).target() != Some(id) {
                return Err(TreeCheckError::SameAsRootPath { path });
            }
            if !node.is_link() && node.path != node.realpath {
                return Err(TreeCheckError::MismatchedRealpath { path });
            }
            let expected = relpath(&root_realpath, &node.path);
            if node.location != expected {
                return Err(TreeCheckError::LocationMismatch {
                    path,
                    location: node.location.clone(),
                    expected,
                });
            }
            if let Some(parent) = node.parent {
                if self.node(parent).children.get(&node.name) != Some(&id) {
                    return Err(TreeCheckError::ChildNotListed { path });
                }
            }

            stack.extend(node.parent);
            stack.extend(node.fs_parent);
            stack.extend(node.target());
            stack.extend(node.children.values().copied());
            stack.extend(node.fs_children.iter().copied());
            stack.extend(node.links_in.iter().copied());
            stack.extend(node.tops.iter().copied());
        }

        for (_, id) in self.node(root).inventory.iter() {
            if !seen.contains(&id) {
                return Err(TreeCheckError::Unreachable {
                    path: self.node(id).path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Check every tree named in `trees` in debug builds, panicking on the
    /// first broken one.
    pub(crate) fn debug_tree_check(&self, trees: &[NodeId]) {
        if !cfg!(debug_assertions) {
            return;
        }
        let mut roots: Vec<NodeId> = trees.iter().map(|&id| self.root_of(id)).collect();
        roots.sort();
        roots.dedup();
        for root in roots {
            if let Err(e) = self.tree_check(root) {
                panic!("tree at {} is inconsistent: {e}", self.node(root).path.display());
            }
        }
    }
}
