//! [`TestProject`] builder for tree loading scenarios.

use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary project folder.
///
/// Paths are relative to the project root. Nothing is canonicalized, so
/// on systems where the temp dir sits behind a symlink use
/// [`TestProject::root`], which already resolves it.
///
/// # Example
///
/// ```rust,no_run
/// use arbor_test_utils::TestProject;
/// use serde_json::json;
///
/// let project = TestProject::new();
/// project.package("", json!({"name": "app", "dependencies": {"a": "^1.0.0"}}));
/// project.package("node_modules/a", json!({"name": "a", "version": "1.2.0"}));
/// project.assert_file_exists("node_modules/a/package.json");
/// ```
pub struct TestProject {
    temp_dir: TempDir,
    root: PathBuf,
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

impl TestProject {
    /// Create an empty temporary project folder.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = fs::canonicalize(temp_dir.path()).unwrap();
        Self { temp_dir, root }
    }

    /// Return the canonical root path of the project.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The folder holding the project, for fixtures placed beside it.
    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    /// Write `<dir>/package.json`, creating the folder.
    pub fn package(&self, dir: &str, manifest: Value) -> &Self {
        self.write(&format!("{dir}/package.json"), &manifest.to_string())
    }

    /// Create a folder without a `package.json`.
    pub fn dir(&self, dir: &str) -> &Self {
        fs::create_dir_all(self.path(dir)).unwrap();
        self
    }

    /// Write a file, creating parent folders.
    pub fn write(&self, relative: &str, content: &str) -> &Self {
        let path = self.path(relative.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        self
    }

    /// Create a directory symlink at `link` pointing to `target`, both
    /// relative to the project root.
    #[cfg(unix)]
    pub fn symlink(&self, link: &str, target: &str) -> &Self {
        let link_path = self.path(link);
        if let Some(parent) = link_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        std::os::unix::fs::symlink(self.path(target), link_path).unwrap();
        self
    }

    /// Write `package-lock.json` with the given `packages` records.
    pub fn lockfile(&self, version: u32, packages: Value) -> &Self {
        let lock = json!({
            "name": "test-project",
            "lockfileVersion": version,
            "requires": true,
            "packages": packages,
        });
        self.write("package-lock.json", &lock.to_string())
    }

    /// Write `node_modules/.package-lock.json`.
    ///
    /// Call this after laying out `node_modules`: the hidden lockfile is
    /// only trusted while it is newer than every folder it describes.
    pub fn hidden_lockfile(&self, packages: Value) -> &Self {
        std::thread::sleep(std::time::Duration::from_millis(20));
        let lock = json!({
            "name": "test-project",
            "lockfileVersion": 3,
            "requires": true,
            "packages": packages,
        });
        self.write("node_modules/.package-lock.json", &lock.to_string())
    }

    /// Assert that `path` (relative to the project root) exists.
    ///
    /// # Panics
    /// Panics with a descriptive message if the path does not exist.
    pub fn assert_file_exists(&self, path: &str) {
        let full_path = self.path(path);
        assert!(
            full_path.exists(),
            "Expected file to exist: {}",
            full_path.display()
        );
    }
}
