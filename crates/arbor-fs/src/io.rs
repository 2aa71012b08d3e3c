//! Async reads performed while loading trees

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Resolve every symlink in `path`.
///
/// UNC prefixes produced by canonicalization on Windows are stripped so the
/// result compares equal to paths built by joining segments.
pub async fn realpath(path: &Path) -> Result<PathBuf> {
    let real = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    Ok(dunce::simplified(&real).to_path_buf())
}

/// Realpath lookups memoized for the lifetime of one load.
#[derive(Debug, Default)]
pub struct RealpathCache {
    resolved: HashMap<PathBuf, PathBuf>,
}

impl RealpathCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `path`, consulting and filling the cache.
    pub async fn realpath(&mut self, path: &Path) -> Result<PathBuf> {
        if let Some(real) = self.resolved.get(path) {
            return Ok(real.clone());
        }
        let real = realpath(path).await?;
        self.resolved.insert(path.to_path_buf(), real.clone());
        Ok(real)
    }

    /// Record a resolution made elsewhere (e.g. by a spawned probe).
    pub fn insert(&mut self, path: PathBuf, real: PathBuf) {
        self.resolved.insert(path, real);
    }

    /// Look up a previously resolved path.
    pub fn get(&self, path: &Path) -> Option<&PathBuf> {
        self.resolved.get(path)
    }

    /// Number of cached resolutions.
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// Whether nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

/// Read and deserialize a JSON file.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| Error::JsonParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// List a `node_modules` folder, expanding `@scope` folders into
/// `@scope/name` entries. Results are sorted.
pub async fn readdir_scoped(dir: &Path) -> Result<Vec<String>> {
    let mut results = Vec::new();
    for entry in read_dir_names(dir).await? {
        if entry.starts_with('@') {
            let scope_dir = dir.join(&entry);
            for scoped in read_dir_names(&scope_dir).await? {
                results.push(format!("{entry}/{scoped}"));
            }
        } else {
            results.push(entry);
        }
    }
    results.sort();
    Ok(results)
}

async fn read_dir_names(dir: &Path) -> Result<Vec<String>> {
    let mut reader = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::io(dir, e))?;
    let mut names = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(|e| Error::io(dir, e))? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}
