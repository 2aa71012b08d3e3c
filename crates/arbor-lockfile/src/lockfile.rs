//! Lockfile containers and loading

use crate::{Error, LockRecord, Result};
use arbor_fs::{PackagePath, relpath, resolve};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The lockfile version this engine produces records for.
pub const DEFAULT_LOCKFILE_VERSION: u32 = 3;

/// Which file a lockfile was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockfileKind {
    Shrinkwrap,
    PackageLock,
    Hidden,
}

impl LockfileKind {
    fn path_entry(&self) -> PackagePath {
        match self {
            Self::Shrinkwrap => PackagePath::Shrinkwrap,
            Self::PackageLock => PackagePath::PackageLock,
            Self::Hidden => PackagePath::HiddenLockfile,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLockfile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    lockfile_version: Option<u32>,
    #[serde(default)]
    packages: Option<BTreeMap<String, LockRecord>>,
    #[serde(default)]
    dependencies: Option<BTreeMap<String, LegacyDependency>>,
}

/// A v1 `dependencies` entry: nested by install location.
#[derive(Debug, Default, Deserialize)]
struct LegacyDependency {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    resolved: Option<String>,
    #[serde(default)]
    integrity: Option<String>,
    #[serde(default)]
    dev: bool,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    bundled: bool,
    #[serde(default)]
    requires: BTreeMap<String, String>,
    #[serde(default)]
    dependencies: BTreeMap<String, LegacyDependency>,
}

/// Parsed lockfile metadata for one project.
///
/// Records are keyed by root-relative location; the root record lives at
/// `""`.
#[derive(Debug, Clone)]
pub struct Lockfile {
    path: PathBuf,
    kind: Option<LockfileKind>,
    lockfile_version: u32,
    original_lockfile_version: Option<u32>,
    loaded_from_disk: bool,
    ancient: bool,
    loading_error: Option<String>,
    packages: BTreeMap<String, LockRecord>,
}

impl Lockfile {
    /// An empty lockfile for the project at `path`, not backed by disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: None,
            lockfile_version: DEFAULT_LOCKFILE_VERSION,
            original_lockfile_version: None,
            loaded_from_disk: false,
            ancient: false,
            loading_error: None,
            packages: BTreeMap::new(),
        }
    }

    /// A lockfile built from records already in memory.
    ///
    /// It is treated as authoritative, exactly as if it had been read from
    /// disk.
    pub fn from_records(path: impl Into<PathBuf>, packages: BTreeMap<String, LockRecord>) -> Self {
        Self {
            loaded_from_disk: true,
            original_lockfile_version: Some(DEFAULT_LOCKFILE_VERSION),
            packages,
            ..Self::new(path)
        }
    }

    /// Parse lockfile JSON. Errors are returned, not swallowed.
    pub fn from_json(path: impl Into<PathBuf>, kind: LockfileKind, text: &str) -> Result<Self> {
        let path = path.into();
        let raw: RawLockfile = serde_json::from_str(text).map_err(|e| Error::Parse {
            path: kind.path_entry().under(&path),
            message: e.to_string(),
        })?;
        Ok(Self::from_raw(path, kind, raw))
    }

    /// Load `npm-shrinkwrap.json`, falling back to `package-lock.json`.
    ///
    /// A missing or unreadable lockfile yields an empty, not-loaded
    /// lockfile; the caller decides whether that is fatal.
    pub async fn load(path: &Path) -> Result<Self> {
        for kind in [LockfileKind::Shrinkwrap, LockfileKind::PackageLock] {
            let file = kind.path_entry().under(path);
            match tokio::fs::read_to_string(&file).await {
                Ok(text) => return Ok(Self::parse_tolerant(path, kind, &text)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(arbor_fs::Error::io(&file, e).into()),
            }
        }
        tracing::debug!(path = %path.display(), "No lockfile present");
        Ok(Self::new(path))
    }

    /// Load `node_modules/.package-lock.json`.
    ///
    /// The hidden lockfile is only trusted while it is newer than every
    /// package folder it describes and none of them are missing; otherwise
    /// an empty, not-loaded lockfile is returned.
    pub async fn load_hidden(path: &Path) -> Result<Self> {
        let file = PackagePath::HiddenLockfile.under(path);
        let text = match tokio::fs::read_to_string(&file).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new(path)),
            Err(e) => return Err(arbor_fs::Error::io(&file, e).into()),
        };
        let lockfile = Self::parse_tolerant(path, LockfileKind::Hidden, &text);
        if !lockfile.loaded_from_disk {
            return Ok(lockfile);
        }

        let lock_time = tokio::fs::metadata(&file)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| arbor_fs::Error::io(&file, e))?;
        match lockfile.find_stale_entry(lock_time).await {
            Some(reason) => {
                tracing::debug!(%reason, "Hidden lockfile rejected");
                Ok(Self::new(path))
            }
            None => Ok(lockfile),
        }
    }

    async fn find_stale_entry(&self, lock_time: SystemTime) -> Option<String> {
        for (location, record) in &self.packages {
            if !location.starts_with("node_modules/") && !location.contains("/node_modules/") {
                continue;
            }
            let folder = resolve(&self.path, location);
            let meta = if record.link {
                tokio::fs::symlink_metadata(&folder).await
            } else {
                tokio::fs::metadata(&folder).await
            };
            match meta.and_then(|m| m.modified()) {
                Ok(modified) if modified > lock_time => {
                    return Some(format!("{location} updated after the hidden lockfile"));
                }
                Ok(_) => {}
                Err(_) => return Some(format!("{location} is missing")),
            }
        }
        None
    }

    fn parse_tolerant(path: &Path, kind: LockfileKind, text: &str) -> Self {
        match Self::from_json(path, kind, text) {
            Ok(lockfile) => lockfile,
            Err(e) => {
                tracing::warn!("Ignoring unreadable lockfile: {}", e);
                Self {
                    loading_error: Some(e.to_string()),
                    ..Self::new(path)
                }
            }
        }
    }

    fn from_raw(path: PathBuf, kind: LockfileKind, raw: RawLockfile) -> Self {
        let original = raw.lockfile_version.unwrap_or(1);
        let (packages, ancient) = match raw.packages {
            Some(packages) => (packages, false),
            None => {
                let mut packages = BTreeMap::new();
                packages.insert(
                    String::new(),
                    LockRecord {
                        name: raw.name.clone(),
                        version: raw.version.clone(),
                        ..LockRecord::default()
                    },
                );
                for (name, dep) in raw.dependencies.unwrap_or_default() {
                    flatten_legacy(&path, "", &name, dep, &mut packages);
                }
                (packages, true)
            }
        };
        tracing::debug!(
            path = %path.display(),
            ?kind,
            version = original,
            records = packages.len(),
            "Loaded lockfile"
        );
        Self {
            path,
            kind: Some(kind),
            lockfile_version: DEFAULT_LOCKFILE_VERSION,
            original_lockfile_version: Some(original),
            loaded_from_disk: true,
            ancient,
            loading_error: None,
            packages,
        }
    }

    /// Target a different lockfile version for records written back.
    pub fn with_lockfile_version(mut self, version: u32) -> Self {
        self.lockfile_version = version;
        self
    }

    /// The project folder this lockfile describes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Which file the records came from, if any.
    pub fn kind(&self) -> Option<LockfileKind> {
        self.kind
    }

    pub fn loaded_from_disk(&self) -> bool {
        self.loaded_from_disk
    }

    /// A v1 lockfile with no `packages` section.
    pub fn ancient(&self) -> bool {
        self.ancient
    }

    pub fn lockfile_version(&self) -> u32 {
        self.lockfile_version
    }

    /// The `lockfileVersion` found on disk.
    pub fn original_lockfile_version(&self) -> Option<u32> {
        self.original_lockfile_version
    }

    /// Why the lockfile on disk was ignored, if it was.
    pub fn loading_error(&self) -> Option<&str> {
        self.loading_error.as_deref()
    }

    pub fn get(&self, location: &str) -> Option<&LockRecord> {
        self.packages.get(location)
    }

    pub fn get_mut(&mut self, location: &str) -> Option<&mut LockRecord> {
        self.packages.get_mut(location)
    }

    /// The root record.
    pub fn root(&self) -> Option<&LockRecord> {
        self.packages.get("")
    }

    pub fn insert(&mut self, location: impl Into<String>, record: LockRecord) -> Option<LockRecord> {
        self.packages.insert(location.into(), record)
    }

    pub fn remove(&mut self, location: &str) -> Option<LockRecord> {
        self.packages.remove(location)
    }

    /// Remove the record for the package folder at `path`.
    pub fn remove_path(&mut self, path: &Path) -> Option<LockRecord> {
        let location = relpath(&self.path, path);
        self.packages.remove(&location)
    }

    /// All records in location order.
    pub fn packages(&self) -> &BTreeMap<String, LockRecord> {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

fn flatten_legacy(
    root: &Path,
    parent_location: &str,
    name: &str,
    dep: LegacyDependency,
    packages: &mut BTreeMap<String, LockRecord>,
) {
    let location = if parent_location.is_empty() {
        format!("node_modules/{name}")
    } else {
        format!("{parent_location}/node_modules/{name}")
    };

    if let Some(target) = dep.version.as_deref().and_then(|v| v.strip_prefix("file:")) {
        let base = resolve(root, parent_location);
        let target_location = relpath(root, resolve(base, target));
        packages
            .entry(target_location.clone())
            .or_insert_with(|| LockRecord {
                name: Some(name.to_string()),
                ..LockRecord::default()
            });
        packages.insert(location, LockRecord::link(target_location));
        return;
    }

    let record = LockRecord {
        version: dep.version,
        resolved: dep.resolved,
        integrity: dep.integrity,
        dev: dep.dev,
        optional: dep.optional,
        in_bundle: dep.bundled,
        dependencies: dep.requires,
        ..LockRecord::default()
    };
    packages.insert(location.clone(), record);
    for (child_name, child) in dep.dependencies {
        flatten_legacy(root, &location, &child_name, child, packages);
    }
}
