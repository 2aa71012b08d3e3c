//! Dependency flags and overrides.

use arbor_tree::{Arena, DepFlags, NodeId, NodeOptions, Package};
use pretty_assertions::assert_eq;
use serde_json::json;

fn flags(dev: bool, optional: bool, dev_optional: bool, peer: bool, extraneous: bool) -> DepFlags {
    DepFlags {
        dev,
        optional,
        dev_optional,
        peer,
        extraneous,
    }
}

fn child(arena: &mut Arena, parent: NodeId, package: Package) -> NodeId {
    arena.create_node(NodeOptions::child(parent, package)).unwrap()
}

#[test]
fn test_calc_dep_flags() {
    let mut arena = Arena::new();
    let root = arena
        .create_node(NodeOptions::at(
            "/p",
            Package::named("root", "1.0.0")
                .with_dependency("a", "^1")
                .with_dev_dependency("d", "^1"),
        ))
        .unwrap();
    let a = child(&mut arena, root, Package::named("a", "1.0.0").with_optional_dependency("o", "^1"));
    let d = child(&mut arena, root, Package::named("d", "1.0.0").with_dependency("e", "^1"));
    let e = child(&mut arena, root, Package::named("e", "1.0.0"));
    let o = child(&mut arena, root, Package::named("o", "1.0.0"));
    let x = child(&mut arena, root, Package::named("x", "1.0.0"));

    arena.calc_dep_flags(root, true);

    assert_eq!(arena.node(root).flags(), DepFlags::NONE);
    assert_eq!(arena.node(a).flags(), DepFlags::NONE);
    assert_eq!(arena.node(d).flags(), flags(true, false, true, false, false));
    assert_eq!(arena.node(e).flags(), flags(true, false, true, false, false));
    assert_eq!(arena.node(o).flags(), flags(false, true, true, false, false));
    assert!(arena.node(x).extraneous());
}

#[test]
fn test_prod_path_wins_over_dev_path() {
    let mut arena = Arena::new();
    let root = arena
        .create_node(NodeOptions::at(
            "/p",
            Package::named("root", "1.0.0")
                .with_dependency("a", "^1")
                .with_dev_dependency("d", "^1"),
        ))
        .unwrap();
    child(&mut arena, root, Package::named("a", "1.0.0").with_dependency("shared", "^1"));
    child(&mut arena, root, Package::named("d", "1.0.0").with_dependency("shared", "^1"));
    let shared = child(&mut arena, root, Package::named("shared", "1.0.0"));

    arena.calc_dep_flags(root, true);
    assert_eq!(arena.node(shared).flags(), DepFlags::NONE);
}

#[test]
fn test_link_flags_follow_to_target() {
    let mut arena = Arena::new();
    let root = arena
        .create_node(NodeOptions::at("/p", Package::named("root", "1.0.0").with_dev_dependency("w", "*")))
        .unwrap();
    let link = arena
        .create_link(
            NodeOptions {
                path: Some("/p/node_modules/w".into()),
                realpath: Some("/p/packages/w".into()),
                parent: Some(root),
                package: Package::named("w", "1.0.0").with_dependency("z", "^1"),
                ..NodeOptions::default()
            },
            None,
        )
        .unwrap();
    let target = arena.node(link).target().unwrap();
    let z = child(&mut arena, root, Package::named("z", "1.0.0"));

    arena.calc_dep_flags(root, true);
    assert!(arena.node(link).dev());
    assert!(arena.node(target).dev());
    assert!(!arena.node(target).extraneous());
    assert!(arena.node(z).dev());
    assert!(!arena.node(z).extraneous());
}

#[test]
fn test_reset_flags() {
    let mut arena = Arena::new();
    let root = arena
        .create_node(NodeOptions::at("/p", Package::named("root", "1.0.0").with_dependency("a", "^1")))
        .unwrap();
    let a = child(&mut arena, root, Package::named("a", "1.0.0"));
    arena.calc_dep_flags(root, true);
    assert_eq!(arena.node(a).flags(), DepFlags::NONE);

    arena.reset_extraneous(root);
    assert!(arena.node(a).extraneous());
    assert!(!arena.node(a).dev());

    arena.reset_dep_flags(root);
    assert_eq!(arena.node(a).flags(), DepFlags::UNKNOWN);
    assert!(arena.node(root).extraneous());
    assert!(!arena.node(root).dev());
}

#[test]
fn test_override_rewrites_transitive_spec() {
    let mut package = Package::named("root", "1.0.0").with_dependency("a", "^1");
    package.overrides = Some(json!({ "b": "2.0.0" }));

    let mut arena = Arena::new();
    let root = arena
        .create_node(NodeOptions {
            load_overrides: true,
            ..NodeOptions::at("/p", package)
        })
        .unwrap();
    let a = child(&mut arena, root, Package::named("a", "1.0.0").with_dependency("b", "^1"));
    let b = child(&mut arena, root, Package::named("b", "2.0.0"));

    let edge = arena.edge_out(a, "b").unwrap();
    assert_eq!(arena.edge(edge).raw_spec(), "^1");
    assert_eq!(arena.edge_spec(edge), "2.0.0");
    assert_eq!(arena.edge(edge).to(), Some(b));
    assert!(arena.edge_valid(edge));
    assert_eq!(arena.node(b).overrides().map(|o| o.name()), Some("b"));
    assert!(arena.assert_root_overrides(root).is_ok());
}

#[test]
fn test_override_of_direct_dependency_conflicts() {
    let mut package = Package::named("root", "1.0.0").with_dependency("b", "^1");
    package.overrides = Some(json!({ "b": "2.0.0" }));

    let mut arena = Arena::new();
    let root = arena
        .create_node(NodeOptions {
            load_overrides: true,
            ..NodeOptions::at("/p", package)
        })
        .unwrap();

    let err = arena.assert_root_overrides(root).unwrap_err();
    assert_eq!(err.code(), Some("EOVERRIDE"));
}

#[test]
fn test_override_reference_uses_root_spec() {
    let mut package = Package::named("root", "1.0.0")
        .with_dependency("a", "^1")
        .with_dependency("b", "^3");
    package.overrides = Some(json!({ "b": "$b" }));

    let mut arena = Arena::new();
    let root = arena
        .create_node(NodeOptions {
            load_overrides: true,
            ..NodeOptions::at("/p", package)
        })
        .unwrap();
    let a = child(&mut arena, root, Package::named("a", "1.0.0").with_dependency("b", "^1"));

    let edge = arena.edge_out(a, "b").unwrap();
    assert_eq!(arena.try_edge_spec(edge).unwrap(), "^3");
    assert!(arena.assert_root_overrides(root).is_ok());
}

#[test]
fn test_invalid_overrides_fail_node_creation() {
    let mut package = Package::named("root", "1.0.0");
    package.overrides = Some(json!(["not", "an", "object"]));

    let mut arena = Arena::new();
    let result = arena.create_node(NodeOptions {
        load_overrides: true,
        ..NodeOptions::at("/p", package)
    });
    assert!(result.is_err());
}
