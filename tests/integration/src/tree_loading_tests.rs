//! End-to-end checks that both loaders agree on the same project
//!
//! Each project is laid out on disk with a matching `package-lock.json`,
//! then loaded once by walking `node_modules` and once from the lockfile.

use arbor::{Arborist, ArboristOptions, LoadActualOptions, LoadVirtualOptions};
use arbor_test_utils::TestProject;
use arbor_tree::{Arena, DepFlags, NodeId};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, PartialEq)]
struct Summary {
    version: Option<String>,
    integrity: Option<String>,
    link: bool,
    flags: DepFlags,
}

fn summarize(arena: &Arena, tree: NodeId) -> BTreeMap<String, Summary> {
    arena
        .inventory_ids(tree)
        .into_iter()
        .map(|id| {
            let node = arena.node(id);
            let summary = Summary {
                version: arena.version(id).map(str::to_string),
                integrity: node.integrity().map(str::to_string),
                link: node.is_link(),
                flags: node.flags(),
            };
            (node.location().to_string(), summary)
        })
        .collect()
}

/// An app with prod, dev, optional and workspace dependencies, installed
/// and locked.
fn installed_project() -> TestProject {
    let project = TestProject::new();
    project
        .package(
            "",
            json!({
                "name": "app",
                "version": "1.0.0",
                "workspaces": ["packages/*"],
                "dependencies": {"a": "^1.0.0"},
                "devDependencies": {"d": "^1.0.0"},
                "optionalDependencies": {"o": "^1.0.0"}
            }),
        )
        .package(
            "node_modules/a",
            json!({"name": "a", "version": "1.0.0", "dependencies": {"b": "^2.0.0"}}),
        )
        .package("node_modules/b", json!({"name": "b", "version": "2.0.0"}))
        .package(
            "node_modules/d",
            json!({"name": "d", "version": "1.0.0", "dependencies": {"e": "^1.0.0"}}),
        )
        .package("node_modules/e", json!({"name": "e", "version": "1.0.0"}))
        .package("node_modules/o", json!({"name": "o", "version": "1.0.0"}))
        .package("packages/w", json!({"name": "w", "version": "0.1.0"}))
        .symlink("node_modules/w", "packages/w")
        .lockfile(
            3,
            json!({
                "": {
                    "name": "app",
                    "version": "1.0.0",
                    "workspaces": ["packages/*"],
                    "dependencies": {"a": "^1.0.0"},
                    "devDependencies": {"d": "^1.0.0"},
                    "optionalDependencies": {"o": "^1.0.0"}
                },
                "node_modules/a": {
                    "version": "1.0.0",
                    "resolved": "https://registry.example/a/-/a-1.0.0.tgz",
                    "integrity": "sha512-a",
                    "dependencies": {"b": "^2.0.0"}
                },
                "node_modules/b": {
                    "version": "2.0.0",
                    "resolved": "https://registry.example/b/-/b-2.0.0.tgz",
                    "integrity": "sha512-b"
                },
                "node_modules/d": {
                    "version": "1.0.0",
                    "dev": true,
                    "dependencies": {"e": "^1.0.0"}
                },
                "node_modules/e": {"version": "1.0.0", "dev": true},
                "node_modules/o": {"version": "1.0.0", "optional": true},
                "node_modules/w": {"resolved": "packages/w", "link": true},
                "packages/w": {"name": "w", "version": "0.1.0"}
            }),
        );
    project
}

#[tokio::test]
async fn test_actual_and_virtual_trees_agree() {
    let project = installed_project();

    let mut actual = Arborist::new(ArboristOptions::new(project.root()).force_actual(true));
    let actual_tree = actual.load_actual(LoadActualOptions::default()).await.unwrap();
    let mut virtual_ = Arborist::new(ArboristOptions::new(project.root()));
    let virtual_tree = virtual_.load_virtual(LoadVirtualOptions::default()).await.unwrap();

    let from_disk = summarize(actual.arena(), actual_tree);
    let from_lock = summarize(virtual_.arena(), virtual_tree);
    assert_eq!(
        from_disk.keys().collect::<Vec<_>>(),
        vec![
            "",
            "node_modules/a",
            "node_modules/b",
            "node_modules/d",
            "node_modules/e",
            "node_modules/o",
            "node_modules/w",
            "packages/w",
        ]
    );
    assert_eq!(from_disk, from_lock);
}

#[tokio::test]
async fn test_actual_flags_are_written_to_metadata() {
    let project = installed_project();

    let mut arborist = Arborist::new(ArboristOptions::new(project.root()).force_actual(true));
    let tree = arborist.load_actual(LoadActualOptions::default()).await.unwrap();
    let meta = arborist.arena().meta(tree).unwrap();

    let e = meta.get("node_modules/e").unwrap();
    assert!(e.dev);
    assert!(!e.optional);
    let o = meta.get("node_modules/o").unwrap();
    assert!(o.optional);
    assert!(!o.dev);
    assert!(meta.get("node_modules/w").unwrap().link);
}

#[tokio::test]
async fn test_records_round_trip_through_nodes() {
    let project = installed_project();
    let mut arborist = Arborist::new(ArboristOptions::new(project.root()));
    let tree = arborist.load_virtual(LoadVirtualOptions::default()).await.unwrap();
    let arena = arborist.arena();

    let text = std::fs::read_to_string(project.path("package-lock.json")).unwrap();
    let original = arbor::Lockfile::from_json(
        project.root(),
        arbor_lockfile::LockfileKind::PackageLock,
        &text,
    )
    .unwrap();

    for (location, expected) in original.packages() {
        if location.is_empty() {
            continue;
        }
        let id = arena.get(tree, location).unwrap();
        let record = arena.record_from_node(id, project.root());
        assert_eq!(record.version, expected.version, "{location}");
        assert_eq!(record.resolved, expected.resolved, "{location}");
        assert_eq!(record.integrity, expected.integrity, "{location}");
        assert_eq!(record.link, expected.link, "{location}");
        assert_eq!(
            (record.dev, record.optional, record.dev_optional, record.peer),
            (expected.dev, expected.optional, expected.dev_optional, expected.peer),
            "{location}"
        );
    }
}

#[tokio::test]
async fn test_hidden_lockfile_matches_walk() {
    let project = installed_project();
    let mut walked = Arborist::new(ArboristOptions::new(project.root()).force_actual(true));
    let walked_tree = walked.load_actual(LoadActualOptions::default()).await.unwrap();

    let records: serde_json::Map<String, serde_json::Value> = walked
        .arena()
        .inventory_ids(walked_tree)
        .into_iter()
        .filter(|&id| !walked.arena().is_root(id))
        .map(|id| {
            let record = walked.arena().record_from_node(id, project.root());
            let location = walked.arena().node(id).location().to_string();
            (location, serde_json::to_value(record).unwrap())
        })
        .collect();
    project.hidden_lockfile(serde_json::Value::Object(records));

    let mut hidden = Arborist::new(ArboristOptions::new(project.root()));
    let hidden_tree = hidden.load_actual(LoadActualOptions::default()).await.unwrap();

    assert_eq!(
        summarize(hidden.arena(), hidden_tree),
        summarize(walked.arena(), walked_tree)
    );
}
