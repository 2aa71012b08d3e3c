//! Invariants that must survive arbitrary sequences of moves.

use arbor_fs::relpath;
use arbor_tree::{Arena, NodeId, NodeOptions, Package};
use proptest::prelude::*;

const NAMES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

fn build() -> (Arena, NodeId, Vec<NodeId>) {
    let mut arena = Arena::new();
    let mut package = Package::named("root", "1.0.0");
    for name in NAMES {
        package = package.with_dependency(name, "*");
    }
    let root = arena.create_node(NodeOptions::at("/p", package)).unwrap();
    let nodes = NAMES
        .iter()
        .map(|name| {
            arena
                .create_node(NodeOptions::child(
                    root,
                    Package::named(*name, "1.0.0").with_dependency("a", "*"),
                ))
                .unwrap()
        })
        .collect();
    (arena, root, nodes)
}

/// Every node sits in some tree; each tree touched must be intact and the
/// trees together account for every node exactly once.
fn check(arena: &Arena, root: NodeId, nodes: &[NodeId]) -> Result<(), TestCaseError> {
    let mut roots: Vec<NodeId> = nodes.iter().map(|&id| arena.root_of(id)).collect();
    roots.push(root);
    roots.sort();
    roots.dedup();
    for &tree in &roots {
        prop_assert_eq!(arena.tree_check(tree), Ok(()));
    }
    let filed: usize = roots.iter().map(|&tree| arena.node(tree).inventory().len()).sum();
    prop_assert_eq!(filed, nodes.len() + 1);

    for &id in nodes {
        let node = arena.node(id);
        let tree = node.root();
        prop_assert_eq!(arena.get(tree, node.location()), Some(id));
        prop_assert_eq!(node.location(), relpath(arena.realpath(tree), node.path()));
        if let Some(parent) = node.parent() {
            prop_assert_eq!(node.path(), arena.path(parent).join("node_modules").join(node.name()));
        }
    }
    Ok(())
}

proptest! {
    // target 6 is the root, 7 detaches the node
    #[test]
    fn test_moves_keep_tree_consistent(moves in prop::collection::vec((0usize..6, 0usize..8), 1..24)) {
        let (mut arena, root, nodes) = build();
        for (node, target) in moves {
            let node = nodes[node];
            let parent = match target {
                6 => Some(root),
                7 => None,
                n => Some(nodes[n]),
            };
            if let Some(parent) = parent {
                if parent == node || arena.is_descendant_of(parent, node) {
                    continue;
                }
            }
            arena.set_parent(node, parent);
            check(&arena, root, &nodes)?;
        }
    }

    #[test]
    fn test_tree_check_is_stable(moves in prop::collection::vec((0usize..6, 0usize..6), 0..8)) {
        let (mut arena, root, nodes) = build();
        for (node, parent) in moves {
            let (node, parent) = (nodes[node], nodes[parent]);
            if parent != node && !arena.is_descendant_of(parent, node) {
                arena.set_parent(node, Some(parent));
            }
        }
        let first = arena.tree_check(root);
        let second = arena.tree_check(root);
        prop_assert_eq!(first, second);
    }
}
