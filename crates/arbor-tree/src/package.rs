//! The manifest view of a package
//!
//! A [`Package`] is whatever is known about a package's `package.json`: read
//! from disk by the actual-tree loader, or reconstructed from a lockfile
//! record by the virtual-tree loader.

use arbor_lockfile::{LockRecord, PeerDependencyMeta};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

fn is_false(value: &bool) -> bool {
    !*value
}

/// `bundleDependencies` is either a list of names or `true` for "all of
/// `dependencies`".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleDependencies {
    #[default]
    None,
    All(bool),
    Names(Vec<String>),
}

impl BundleDependencies {
    fn is_none(&self) -> bool {
        matches!(self, Self::None | Self::All(false)) || matches!(self, Self::Names(n) if n.is_empty())
    }
}

/// Workspaces are declared as an array of globs or as `{ "packages": [...] }`.
fn workspace_globs<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let strings = |items: Vec<Value>| -> Vec<String> {
        items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect()
    };
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => Some(strings(items)),
        Some(Value::Object(mut map)) => match map.remove("packages") {
            Some(Value::Array(items)) => Some(strings(items)),
            _ => None,
        },
        _ => None,
    })
}

/// Dependency maps occasionally contain non-string junk; it is dropped.
fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect(),
        _ => BTreeMap::new(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, deserialize_with = "string_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "string_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "string_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "string_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies_meta: BTreeMap<String, PeerDependencyMeta>,
    #[serde(default, deserialize_with = "string_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub accept_dependencies: BTreeMap<String, String>,
    #[serde(default, alias = "bundledDependencies", skip_serializing_if = "BundleDependencies::is_none")]
    pub bundle_dependencies: BundleDependencies,

    #[serde(default, deserialize_with = "workspace_globs", skip_serializing_if = "Option::is_none")]
    pub workspaces: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engines: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpu: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libc: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_install_script: bool,

    /// Install metadata recorded by the package manager that placed the
    /// folder.
    #[serde(default, rename = "_resolved", skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, rename = "_integrity", skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, rename = "_hasShrinkwrap", skip_serializing_if = "is_false")]
    pub has_shrinkwrap: bool,
}

impl Package {
    pub fn named(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            version: Some(version.into()),
            ..Self::default()
        }
    }

    pub fn with_dependency(mut self, name: impl Into<String>, spec: impl Into<String>) -> Self {
        self.dependencies.insert(name.into(), spec.into());
        self
    }

    pub fn with_dev_dependency(mut self, name: impl Into<String>, spec: impl Into<String>) -> Self {
        self.dev_dependencies.insert(name.into(), spec.into());
        self
    }

    pub fn with_optional_dependency(mut self, name: impl Into<String>, spec: impl Into<String>) -> Self {
        self.optional_dependencies.insert(name.into(), spec.into());
        self
    }

    pub fn with_peer_dependency(mut self, name: impl Into<String>, spec: impl Into<String>) -> Self {
        self.peer_dependencies.insert(name.into(), spec.into());
        self
    }

    /// Names this package bundles, expanding `bundleDependencies: true`.
    pub fn bundled_names(&self) -> Vec<String> {
        match &self.bundle_dependencies {
            BundleDependencies::None | BundleDependencies::All(false) => Vec::new(),
            BundleDependencies::All(true) => self.dependencies.keys().cloned().collect(),
            BundleDependencies::Names(names) => names.clone(),
        }
    }

    pub fn bundles(&self, name: &str) -> bool {
        match &self.bundle_dependencies {
            BundleDependencies::All(true) => self.dependencies.contains_key(name),
            BundleDependencies::Names(names) => names.iter().any(|n| n == name),
            _ => false,
        }
    }

    pub(crate) fn add_bundled(&mut self, name: &str) {
        match &mut self.bundle_dependencies {
            BundleDependencies::All(true) => {}
            BundleDependencies::Names(names) => {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
            other => *other = BundleDependencies::Names(vec![name.to_string()]),
        }
    }

    pub fn is_peer_optional(&self, name: &str) -> bool {
        self.peer_dependencies_meta
            .get(name)
            .is_some_and(|meta| meta.optional)
    }

    /// The license as a plain SPDX string, when declared as one.
    pub fn license_str(&self) -> Option<&str> {
        match &self.license {
            Some(Value::String(s)) => Some(s),
            Some(Value::Object(map)) => map.get("type").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Whether `package.json` declares anything this engine reads.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl From<&LockRecord> for Package {
    fn from(record: &LockRecord) -> Self {
        let bundle_dependencies = if record.bundle_dependencies.is_empty() {
            BundleDependencies::None
        } else {
            BundleDependencies::Names(record.bundle_dependencies.clone())
        };
        Self {
            name: record.name.clone(),
            version: record.version.clone(),
            dependencies: record.dependencies.clone(),
            dev_dependencies: record.dev_dependencies.clone(),
            optional_dependencies: record.optional_dependencies.clone(),
            peer_dependencies: record.peer_dependencies.clone(),
            peer_dependencies_meta: record.peer_dependencies_meta.clone(),
            accept_dependencies: record.accept_dependencies.clone(),
            bundle_dependencies,
            workspaces: record.workspaces.clone(),
            overrides: record.overrides.clone(),
            license: record.license.clone(),
            engines: record.engines.clone(),
            bin: record.bin.clone(),
            funding: record.funding.clone(),
            deprecated: record.deprecated.clone(),
            os: record.os.clone(),
            cpu: record.cpu.clone(),
            libc: record.libc.clone(),
            has_install_script: record.has_install_script,
            resolved: record.resolved.clone(),
            integrity: record.integrity.clone(),
            has_shrinkwrap: record.has_shrinkwrap,
        }
    }
}
