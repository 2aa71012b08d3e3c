//! Actual tree loading against real folders

use arbor::{Arborist, ArboristOptions, Error, LoadActualOptions};
use arbor_test_utils::TestProject;
use arbor_tree::{Arena, EdgeError, EdgeType, NodeError, NodeId, NodeOptions, Package};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

fn locations(arena: &Arena, tree: NodeId) -> Vec<String> {
    arena
        .inventory_ids(tree)
        .into_iter()
        .map(|id| arena.node(id).location().to_string())
        .collect()
}

async fn load(project: &TestProject) -> Arborist {
    let mut arborist = Arborist::new(ArboristOptions::new(project.root()));
    arborist.load_actual(LoadActualOptions::default()).await.unwrap();
    arborist
}

#[tokio::test]
async fn test_loads_node_modules_and_flags() {
    let project = TestProject::new();
    project
        .package(
            "",
            json!({
                "name": "app",
                "version": "1.0.0",
                "dependencies": {"a": "^1.0.0"},
                "devDependencies": {"d": "^1.0.0"}
            }),
        )
        .package(
            "node_modules/a",
            json!({"name": "a", "version": "1.0.0", "dependencies": {"b": "^2.0.0"}}),
        )
        .package("node_modules/b", json!({"name": "b", "version": "2.1.0"}))
        .package("node_modules/c", json!({"name": "c", "version": "1.0.0"}))
        .package("node_modules/d", json!({"name": "d", "version": "1.0.0"}));

    let arborist = load(&project).await;
    let arena = arborist.arena();
    let tree = arborist.actual_tree().unwrap();

    assert_eq!(
        locations(arena, tree),
        vec!["", "node_modules/a", "node_modules/b", "node_modules/c", "node_modules/d"]
    );
    let node = |loc: &str| arena.node(arena.get(tree, loc).unwrap());
    assert!(!node("node_modules/a").extraneous());
    assert!(!node("node_modules/b").dev());
    assert!(node("node_modules/c").extraneous());
    assert!(node("node_modules/d").dev());
    assert!(!node("node_modules/d").optional());

    let a = arena.get(tree, "node_modules/a").unwrap();
    assert!(arena.edge_valid(arena.edge_out(a, "b").unwrap()));
    assert_eq!(arena.version(a), Some("1.0.0"));
}

#[tokio::test]
async fn test_missing_dependency_without_node_modules() {
    let project = TestProject::new();
    project.package("", json!({"name": "app", "dependencies": {"a": "1.0.0"}}));

    let arborist = load(&project).await;
    let arena = arborist.arena();
    let tree = arborist.actual_tree().unwrap();

    assert_eq!(locations(arena, tree), vec![""]);
    let edge = arena.edge_out(tree, "a").unwrap();
    assert_eq!(arena.edge(edge).edge_type(), EdgeType::Prod);
    assert_eq!(arena.edge_error(edge), Some(EdgeError::Missing));
}

#[tokio::test]
async fn test_hidden_and_scoped_entries() {
    let project = TestProject::new();
    project
        .package("", json!({"name": "app", "dependencies": {"@scope/x": "^1.0.0"}}))
        .package("node_modules/@scope/x", json!({"name": "@scope/x", "version": "1.0.0"}))
        .package("node_modules/@scope/.cache", json!({"name": "cache"}))
        .dir("node_modules/.bin")
        .write("node_modules/.staging/partial", "");

    let arborist = load(&project).await;
    let arena = arborist.arena();
    let tree = arborist.actual_tree().unwrap();

    assert_eq!(locations(arena, tree), vec!["", "node_modules/@scope/x"]);
    let x = arena.get(tree, "node_modules/@scope/x").unwrap();
    assert_eq!(arena.node(x).name(), "@scope/x");
    assert!(arena.edge_valid(arena.edge_out(tree, "@scope/x").unwrap()));
}

#[tokio::test]
async fn test_workspace_links() {
    let project = TestProject::new();
    project
        .package("", json!({"name": "app", "workspaces": ["packages/*"]}))
        .package("packages/w", json!({"name": "w", "version": "0.1.0"}))
        .symlink("node_modules/w", "packages/w");

    let arborist = load(&project).await;
    let arena = arborist.arena();
    let tree = arborist.actual_tree().unwrap();

    let link = arena.get(tree, "node_modules/w").unwrap();
    let target = arena.get(tree, "packages/w").unwrap();
    assert!(arena.node(link).is_link());
    assert_eq!(arena.node(link).target(), Some(target));
    assert_eq!(arena.node(target).fs_parent(), Some(tree));
    assert_eq!(arena.realpath(link), project.path("packages/w"));

    let edge = arena.edge_out(tree, "w").unwrap();
    assert_eq!(arena.edge(edge).edge_type(), EdgeType::Workspace);
    assert!(arena.edge_valid(edge));
    assert!(!arena.node(target).extraneous());
    assert_eq!(
        arena.node(tree).workspaces().cloned(),
        Some(BTreeMap::from([("w".to_string(), project.path("packages/w"))]))
    );
}

#[tokio::test]
async fn test_unlinked_workspace_is_loaded_in_place() {
    let project = TestProject::new();
    project
        .package("", json!({"name": "app", "workspaces": ["packages/*"]}))
        .package(
            "packages/w",
            json!({"name": "w", "version": "0.1.0", "dependencies": {"lodash": "^4.0.0"}}),
        )
        .package("node_modules/lodash", json!({"name": "lodash", "version": "4.17.21"}));

    let arborist = load(&project).await;
    let arena = arborist.arena();
    let tree = arborist.actual_tree().unwrap();

    let w = arena.get(tree, "packages/w").unwrap();
    assert_eq!(arena.node(w).fs_parent(), Some(tree));
    assert!(arena.edge_valid(arena.edge_out(w, "lodash").unwrap()));
    assert_eq!(arena.edge_error(arena.edge_out(tree, "w").unwrap()), Some(EdgeError::Missing));
}

#[tokio::test]
async fn test_child_filter() {
    let project = TestProject::new();
    project
        .package("", json!({"name": "app"}))
        .package("node_modules/a", json!({"name": "a", "version": "1.0.0"}))
        .package("node_modules/c", json!({"name": "c", "version": "1.0.0"}));

    let mut arborist = Arborist::new(ArboristOptions::new(project.root()));
    let options = LoadActualOptions::default().filter(|arena, parent, name| !(arena.is_root(parent) && name == "c"));
    let tree = arborist.load_actual(options).await.unwrap();

    assert_eq!(locations(arborist.arena(), tree), vec!["", "node_modules/a"]);
}

#[tokio::test]
async fn test_load_is_memoized() {
    let project = TestProject::new();
    project.package("", json!({"name": "app"}));

    let mut arborist = load(&project).await;
    let first = arborist.actual_tree().unwrap();
    project.package("node_modules/late", json!({"name": "late", "version": "1.0.0"}));

    let second = arborist.load_actual(LoadActualOptions::default()).await.unwrap();
    assert_eq!(first, second);
    assert!(arborist.arena().get(second, "node_modules/late").is_none());
}

#[tokio::test]
async fn test_hidden_lockfile_short_circuits_walk() {
    let project = TestProject::new();
    project
        .package("", json!({"name": "app", "dependencies": {"a": "^1.0.0"}}))
        .package("node_modules/a", json!({"name": "a", "version": "1.0.0"}))
        .hidden_lockfile(json!({
            "node_modules/a": {
                "version": "1.0.0",
                "resolved": "https://registry.example/a/-/a-1.0.0.tgz",
                "integrity": "sha512-hidden"
            }
        }));

    let arborist = load(&project).await;
    let arena = arborist.arena();
    let tree = arborist.actual_tree().unwrap();
    let a = arena.get(tree, "node_modules/a").unwrap();
    assert_eq!(arena.node(a).integrity(), Some("sha512-hidden"));
    assert!(!arena.node(a).extraneous());

    let mut forced = Arborist::new(ArboristOptions::new(project.root()).force_actual(true));
    let tree = forced.load_actual(LoadActualOptions::default()).await.unwrap();
    let a = forced.arena().get(tree, "node_modules/a").unwrap();
    assert_eq!(forced.arena().node(a).integrity(), None);
}

#[tokio::test]
async fn test_stale_hidden_lockfile_is_ignored() {
    let project = TestProject::new();
    project
        .package("", json!({"name": "app", "dependencies": {"a": "^1.0.0"}}))
        .package("node_modules/a", json!({"name": "a", "version": "1.0.0"}))
        .hidden_lockfile(json!({
            "node_modules/a": {"version": "1.0.0", "integrity": "sha512-hidden"},
            "node_modules/gone": {"version": "1.0.0"}
        }));

    let arborist = load(&project).await;
    let arena = arborist.arena();
    let tree = arborist.actual_tree().unwrap();
    let a = arena.get(tree, "node_modules/a").unwrap();
    assert_eq!(arena.node(a).integrity(), None);
    assert!(arena.get(tree, "node_modules/gone").is_none());
}

#[tokio::test]
async fn test_missing_edges_found_above_link_target() {
    let project = TestProject::new();
    project
        .package("app", json!({"name": "app", "dependencies": {"lib": "file:../x/lib"}}))
        .package(
            "x/lib",
            json!({"name": "lib", "version": "1.0.0", "dependencies": {"dep": "^1.0.0"}}),
        )
        .package("x/node_modules/dep", json!({"name": "dep", "version": "1.2.0"}))
        .symlink("app/node_modules/lib", "x/lib");

    let mut arborist = Arborist::new(ArboristOptions::new(project.path("app")));
    let tree = arborist.load_actual(LoadActualOptions::default()).await.unwrap();
    let arena = arborist.arena();

    let lib = arena.get(tree, "../x/lib").unwrap();
    let anchor = arena.get(tree, "../x").unwrap();
    let dep = arena.get(tree, "../x/node_modules/dep").unwrap();
    assert!(arena.node(anchor).is_placeholder());
    assert_eq!(arena.node(dep).parent(), Some(anchor));
    assert_eq!(arena.node(lib).fs_parent(), Some(anchor));
    assert!(arena.edge_valid(arena.edge_out(lib, "dep").unwrap()));
    assert!(!arena.node(dep).extraneous());
}

#[tokio::test]
async fn test_ignore_missing_skips_recovery() {
    let project = TestProject::new();
    project
        .package("app", json!({"name": "app", "dependencies": {"lib": "file:../x/lib"}}))
        .package(
            "x/lib",
            json!({"name": "lib", "version": "1.0.0", "dependencies": {"dep": "^1.0.0"}}),
        )
        .package("x/node_modules/dep", json!({"name": "dep", "version": "1.2.0"}))
        .symlink("app/node_modules/lib", "x/lib");

    let mut arborist = Arborist::new(ArboristOptions::new(project.path("app")).ignore_missing(true));
    let tree = arborist.load_actual(LoadActualOptions::default()).await.unwrap();
    let arena = arborist.arena();

    let lib = arena.get(tree, "../x/lib").unwrap();
    assert!(arena.get(tree, "../x").is_none());
    assert_eq!(arena.edge_error(arena.edge_out(lib, "dep").unwrap()), Some(EdgeError::Missing));
}

#[tokio::test]
async fn test_unreadable_entries_become_error_nodes() {
    let project = TestProject::new();
    project
        .package("", json!({"name": "app"}))
        .write("node_modules/bad/package.json", "{ not json")
        .symlink("node_modules/broken", "nowhere");

    let arborist = load(&project).await;
    let arena = arborist.arena();
    let tree = arborist.actual_tree().unwrap();

    let bad = arena.node(arena.get(tree, "node_modules/bad").unwrap());
    assert!(matches!(
        bad.errors(),
        [NodeError::PackageJson { not_found: false, .. }]
    ));
    let broken = arena.node(arena.get(tree, "node_modules/broken").unwrap());
    assert!(matches!(broken.errors(), [NodeError::Realpath { .. }]));
    assert!(!broken.is_link());
}

#[tokio::test]
async fn test_global_prefix_depends_on_children() {
    let project = TestProject::new();
    project
        .package("node_modules/a", json!({"name": "a", "version": "1.0.0"}))
        .package("node_modules/b", json!({"name": "b", "version": "2.0.0"}));

    let mut arborist = Arborist::new(ArboristOptions::new(project.root()).global(true));
    let tree = arborist.load_actual(LoadActualOptions::default()).await.unwrap();
    let arena = arborist.arena();

    assert_eq!(
        arena.package(tree).dependencies,
        BTreeMap::from([("a".to_string(), "*".to_string()), ("b".to_string(), "*".to_string())])
    );
    let a = arena.get(tree, "node_modules/a").unwrap();
    assert!(arena.global_top(a));
    assert!(!arena.node(a).extraneous());
}

#[tokio::test]
async fn test_transplant_onto_existing_root() {
    let project = TestProject::new();
    project
        .package("", json!({"name": "app", "dependencies": {"a": "^1.0.0"}}))
        .package("node_modules/a", json!({"name": "a", "version": "1.0.0"}))
        .package("node_modules/c", json!({"name": "c", "version": "1.0.0"}));

    let mut arena = Arena::new();
    let host = arena
        .create_node(NodeOptions::at(
            "/virtual/app",
            Package::named("app", "1.0.0").with_dependency("a", "^1.0.0"),
        ))
        .unwrap();
    let mut arborist = Arborist::with_arena(ArboristOptions::new(project.root()), arena);
    let options = LoadActualOptions::default().transplant(host, |arena, id| arena.node(id).name() != "c");
    let tree = arborist.load_actual(options).await.unwrap();
    let arena = arborist.arena();

    assert_eq!(tree, host);
    let a = arena.get(host, "node_modules/a").unwrap();
    assert_eq!(arena.path(a), Path::new("/virtual/app/node_modules/a"));
    assert!(arena.get(host, "node_modules/c").is_none());
    assert!(arena.edge_valid(arena.edge_out(host, "a").unwrap()));
    assert_eq!(arena.tree_check(host), Ok(()));
}

#[tokio::test]
async fn test_missing_project_folder_fails() {
    let project = TestProject::new();
    let mut arborist = Arborist::new(ArboristOptions::new(project.path("does-not-exist")));
    let err = arborist.load_actual(LoadActualOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::Fs(_)));
}

#[tokio::test]
async fn test_conflicting_root_override_fails() {
    let project = TestProject::new();
    project.package(
        "",
        json!({
            "name": "app",
            "dependencies": {"a": "^1.0.0"},
            "overrides": {"a": "2.0.0"}
        }),
    );

    let mut arborist = Arborist::new(ArboristOptions::new(project.root()));
    let err = arborist.load_actual(LoadActualOptions::default()).await.unwrap_err();
    assert_eq!(err.code(), Some("EOVERRIDE"));
}
