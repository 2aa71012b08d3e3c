//! The abstract lockfile record shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Accepts the array form of `bundleDependencies`; the boolean form means
/// "everything" in a manifest and carries no names in a lockfile.
fn bundle_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect()),
        _ => Ok(Vec::new()),
    }
}

/// `peerDependenciesMeta[name]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDependencyMeta {
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
}

/// One entry of a lockfile's `packages` map.
///
/// Link records carry only `link: true` and `resolved`, the location of the
/// link target relative to the project root. The root record (location
/// `""`) mirrors the project's own dependency declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<Value>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub link: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dev: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dev_optional: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub peer: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub extraneous: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub in_bundle: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_shrinkwrap: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_install_script: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies_meta: BTreeMap<String, PeerDependencyMeta>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub accept_dependencies: BTreeMap<String, String>,
    #[serde(
        default,
        alias = "bundledDependencies",
        deserialize_with = "bundle_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub bundle_dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspaces: Option<Vec<String>>,
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
}

impl LockRecord {
    /// A record describing a symlink to the package at `target_location`.
    pub fn link(target_location: impl Into<String>) -> Self {
        Self {
            link: true,
            resolved: Some(target_location.into()),
            ..Self::default()
        }
    }

    /// Peer dependencies split into `(required, optional)` by
    /// `peerDependenciesMeta`.
    pub fn split_peer_dependencies(&self) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
        let mut peer = BTreeMap::new();
        let mut peer_optional = BTreeMap::new();
        for (name, spec) in &self.peer_dependencies {
            let optional = self
                .peer_dependencies_meta
                .get(name)
                .is_some_and(|meta| meta.optional);
            if optional {
                peer_optional.insert(name.clone(), spec.clone());
            } else {
                peer.insert(name.clone(), spec.clone());
            }
        }
        (peer, peer_optional)
    }

    /// Production dependencies, excluding names also listed as optional.
    pub fn prod_dependencies(&self) -> BTreeMap<String, String> {
        self.dependencies
            .iter()
            .filter(|(name, _)| !self.optional_dependencies.contains_key(*name))
            .map(|(name, spec)| (name.clone(), spec.clone()))
            .collect()
    }

    /// The license as a plain SPDX string, when recorded as one.
    pub fn license_str(&self) -> Option<&str> {
        match &self.license {
            Some(Value::String(s)) => Some(s),
            Some(Value::Object(obj)) => obj.get("type").and_then(Value::as_str),
            _ => None,
        }
    }
}
