//! Format-agnostic option file loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Loads option files, detecting the format from the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigStore;

impl ConfigStore {
    /// Create a new ConfigStore.
    pub fn new() -> Self {
        Self
    }

    /// Load a typed value from a file.
    ///
    /// Format is detected from file extension:
    /// - `.toml` -> TOML
    /// - `.json` -> JSON
    /// - `.yaml`, `.yml` -> YAML
    pub fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "toml" => toml::from_str(&content).map_err(|e| Error::ConfigParse {
                path: path.to_path_buf(),
                format: "TOML".into(),
                message: e.to_string(),
            }),
            "json" => serde_json::from_str(&content).map_err(|e| Error::ConfigParse {
                path: path.to_path_buf(),
                format: "JSON".into(),
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| Error::ConfigParse {
                path: path.to_path_buf(),
                format: "YAML".into(),
                message: e.to_string(),
            }),
            _ => Err(Error::UnsupportedFormat { extension }),
        }
    }

    /// Load the first file of `candidates` that exists under `dir`.
    ///
    /// Returns `Ok(None)` when none of them exist.
    pub fn load_first<T: DeserializeOwned>(&self, dir: &Path, candidates: &[&str]) -> Result<Option<T>> {
        for name in candidates {
            let path = dir.join(name);
            if path.is_file() {
                tracing::debug!(path = %path.display(), "Loading options file");
                return self.load(&path).map(Some);
            }
        }
        Ok(None)
    }
}
