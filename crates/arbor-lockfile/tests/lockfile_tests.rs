//! Tests for lockfile loading

use arbor_lockfile::{Lockfile, LockfileKind};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use tempfile::tempdir;

fn write_json(path: &std::path::Path, value: serde_json::Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

#[tokio::test]
async fn test_load_package_lock_records() {
    let dir = tempdir().unwrap();
    write_json(
        &dir.path().join("package-lock.json"),
        json!({
            "name": "root",
            "lockfileVersion": 3,
            "packages": {
                "": { "name": "root", "dependencies": { "a": "^1.0.0" } },
                "node_modules/a": { "version": "1.2.3", "resolved": "https://r/a-1.2.3.tgz", "integrity": "sha512-a" },
                "node_modules/b": { "resolved": "packages/b", "link": true },
                "packages/b": { "name": "b", "version": "0.0.1" }
            }
        }),
    );

    let lock = Lockfile::load(dir.path()).await.unwrap();
    assert!(lock.loaded_from_disk());
    assert!(!lock.ancient());
    assert_eq!(lock.kind(), Some(LockfileKind::PackageLock));
    assert_eq!(lock.original_lockfile_version(), Some(3));
    assert_eq!(lock.len(), 4);
    assert_eq!(lock.get("node_modules/a").unwrap().version.as_deref(), Some("1.2.3"));
    assert!(lock.get("node_modules/b").unwrap().link);
    assert_eq!(
        lock.root().unwrap().dependencies.get("a").map(String::as_str),
        Some("^1.0.0")
    );
}

#[tokio::test]
async fn test_shrinkwrap_preferred_over_package_lock() {
    let dir = tempdir().unwrap();
    write_json(
        &dir.path().join("package-lock.json"),
        json!({ "lockfileVersion": 3, "packages": { "": { "name": "from-lock" } } }),
    );
    write_json(
        &dir.path().join("npm-shrinkwrap.json"),
        json!({ "lockfileVersion": 3, "packages": { "": { "name": "from-shrinkwrap" } } }),
    );

    let lock = Lockfile::load(dir.path()).await.unwrap();
    assert_eq!(lock.kind(), Some(LockfileKind::Shrinkwrap));
    assert_eq!(lock.root().unwrap().name.as_deref(), Some("from-shrinkwrap"));
}

#[tokio::test]
async fn test_missing_lockfile_is_not_loaded() {
    let dir = tempdir().unwrap();
    let lock = Lockfile::load(dir.path()).await.unwrap();
    assert!(!lock.loaded_from_disk());
    assert!(lock.is_empty());
}

#[tokio::test]
async fn test_corrupt_lockfile_is_ignored_with_reason() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("package-lock.json"), "{ broken").unwrap();
    let lock = Lockfile::load(dir.path()).await.unwrap();
    assert!(!lock.loaded_from_disk());
    assert!(lock.loading_error().is_some());
}

#[test]
fn test_v1_dependencies_are_flattened() {
    let text = json!({
        "name": "root",
        "version": "1.0.0",
        "lockfileVersion": 1,
        "dependencies": {
            "a": {
                "version": "1.0.0",
                "requires": { "b": "^2.0.0" },
                "dependencies": {
                    "b": { "version": "2.0.0", "bundled": true }
                }
            },
            "local": { "version": "file:packages/local" }
        }
    })
    .to_string();

    let lock = Lockfile::from_json("/project", LockfileKind::PackageLock, &text).unwrap();
    assert!(lock.ancient());
    assert_eq!(lock.original_lockfile_version(), Some(1));
    assert_eq!(
        lock.packages().keys().cloned().collect::<Vec<_>>(),
        vec![
            "",
            "node_modules/a",
            "node_modules/a/node_modules/b",
            "node_modules/local",
            "packages/local",
        ]
    );
    let b = lock.get("node_modules/a/node_modules/b").unwrap();
    assert!(b.in_bundle);
    assert_eq!(
        lock.get("node_modules/a").unwrap().dependencies.get("b").map(String::as_str),
        Some("^2.0.0")
    );
    let link = lock.get("node_modules/local").unwrap();
    assert!(link.link);
    assert_eq!(link.resolved.as_deref(), Some("packages/local"));
}

#[tokio::test]
async fn test_hidden_lockfile_rejected_when_folder_missing() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("node_modules/a")).unwrap();
    write_json(
        &dir.path().join("node_modules/.package-lock.json"),
        json!({
            "lockfileVersion": 3,
            "packages": {
                "node_modules/a": { "version": "1.0.0" },
                "node_modules/gone": { "version": "1.0.0" }
            }
        }),
    );

    let lock = Lockfile::load_hidden(dir.path()).await.unwrap();
    assert!(!lock.loaded_from_disk());
}

#[tokio::test]
async fn test_hidden_lockfile_accepted_when_current() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("node_modules/a")).unwrap();
    write_json(
        &dir.path().join("node_modules/.package-lock.json"),
        json!({
            "lockfileVersion": 3,
            "packages": { "node_modules/a": { "version": "1.0.0" } }
        }),
    );

    let lock = Lockfile::load_hidden(dir.path()).await.unwrap();
    assert!(lock.loaded_from_disk());
    assert_eq!(lock.kind(), Some(LockfileKind::Hidden));
}

#[test]
fn test_insert_and_remove_path() {
    let mut lock = Lockfile::new("/project");
    lock.insert("node_modules/a", Default::default());
    assert_eq!(lock.len(), 1);
    assert!(lock.remove_path(std::path::Path::new("/project/node_modules/a")).is_some());
    assert!(lock.is_empty());
}
