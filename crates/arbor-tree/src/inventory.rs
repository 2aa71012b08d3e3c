//! Per-root index of every node in a tree.
//!
//! Nodes are keyed by location, and additionally indexed by name, package
//! name, realpath and license so loaders can answer "which nodes live at
//! this realpath" without walking the tree.

use crate::arena::NodeId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A secondary index kept by every [`Inventory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexField {
    Name,
    PackageName,
    Realpath,
    License,
}

/// The values a node was filed under when it was added.
///
/// Deletion uses this snapshot, so a node that has since been renamed or
/// moved is still removed from the buckets it actually occupies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryKeys {
    pub location: String,
    pub name: String,
    pub package_name: Option<String>,
    pub realpath: String,
    pub license: Option<String>,
}

impl InventoryKeys {
    fn value(&self, field: IndexField) -> Option<&str> {
        match field {
            IndexField::Name => Some(&self.name),
            IndexField::PackageName => self.package_name.as_deref(),
            IndexField::Realpath => Some(&self.realpath),
            IndexField::License => self.license.as_deref(),
        }
    }
}

const FIELDS: [IndexField; 4] = [
    IndexField::Name,
    IndexField::PackageName,
    IndexField::Realpath,
    IndexField::License,
];

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    by_location: BTreeMap<String, NodeId>,
    keys: HashMap<NodeId, InventoryKeys>,
    index: HashMap<IndexField, HashMap<String, BTreeSet<NodeId>>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// File `id` under `keys`, displacing whatever occupied the location.
    ///
    /// Returns the displaced node, if any.
    pub(crate) fn add(&mut self, id: NodeId, keys: InventoryKeys) -> Option<NodeId> {
        if self.keys.get(&id) == Some(&keys) {
            return None;
        }
        self.delete(id);
        let displaced = self
            .by_location
            .get(&keys.location)
            .copied()
            .filter(|current| *current != id);
        if let Some(current) = displaced {
            self.delete(current);
        }
        for field in FIELDS {
            if let Some(value) = keys.value(field) {
                self.index
                    .entry(field)
                    .or_default()
                    .entry(value.to_string())
                    .or_default()
                    .insert(id);
            }
        }
        self.by_location.insert(keys.location.clone(), id);
        self.keys.insert(id, keys);
        displaced
    }

    /// Remove `id` using the keys it was filed under.
    pub(crate) fn delete(&mut self, id: NodeId) -> bool {
        let Some(keys) = self.keys.remove(&id) else {
            return false;
        };
        if self.by_location.get(&keys.location) == Some(&id) {
            self.by_location.remove(&keys.location);
        }
        for field in FIELDS {
            let Some(value) = keys.value(field) else {
                continue;
            };
            if let Some(buckets) = self.index.get_mut(&field) {
                if let Some(bucket) = buckets.get_mut(value) {
                    bucket.remove(&id);
                    if bucket.is_empty() {
                        buckets.remove(value);
                    }
                }
            }
        }
        true
    }

    pub fn get(&self, location: &str) -> Option<NodeId> {
        self.by_location.get(location).copied()
    }

    pub fn has(&self, id: NodeId) -> bool {
        self.keys.contains_key(&id)
    }

    /// The keys `id` is currently filed under.
    pub fn keys_of(&self, id: NodeId) -> Option<&InventoryKeys> {
        self.keys.get(&id)
    }

    /// Every node filed under `value` for `field`, in id order.
    pub fn query(&self, field: IndexField, value: &str) -> Vec<NodeId> {
        self.index
            .get(&field)
            .and_then(|buckets| buckets.get(value))
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every distinct value indexed for `field`.
    pub fn values_of(&self, field: IndexField) -> BTreeSet<&str> {
        self.index
            .get(&field)
            .map(|buckets| buckets.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// `(location, node)` pairs in location order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.by_location.iter().map(|(loc, id)| (loc.as_str(), *id))
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.by_location.values().copied()
    }

    pub fn len(&self) -> usize {
        self.by_location.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_location.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(location: &str, name: &str) -> InventoryKeys {
        InventoryKeys {
            location: location.to_string(),
            name: name.to_string(),
            package_name: Some(name.to_string()),
            realpath: format!("/p/{location}"),
            license: Some("MIT".to_string()),
        }
    }

    #[test]
    fn test_add_displaces_occupant() {
        let mut inv = Inventory::new();
        assert_eq!(inv.add(NodeId(1), keys("node_modules/a", "a")), None);
        assert_eq!(inv.add(NodeId(2), keys("node_modules/a", "a")), Some(NodeId(1)));
        assert_eq!(inv.get("node_modules/a"), Some(NodeId(2)));
        assert!(!inv.has(NodeId(1)));
        assert_eq!(inv.query(IndexField::Name, "a"), vec![NodeId(2)]);
    }

    #[test]
    fn test_delete_uses_snapshot() {
        let mut inv = Inventory::new();
        inv.add(NodeId(1), keys("node_modules/a", "a"));
        inv.add(NodeId(1), keys("node_modules/b", "b"));
        assert_eq!(inv.len(), 1);
        assert_eq!(inv.get("node_modules/a"), None);
        assert!(inv.query(IndexField::Name, "a").is_empty());
        assert!(inv.delete(NodeId(1)));
        assert!(inv.is_empty());
        assert!(inv.values_of(IndexField::License).is_empty());
    }
}
