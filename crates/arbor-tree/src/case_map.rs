//! A map whose keys compare case-insensitively.
//!
//! Package folders on case-insensitive filesystems collide when names differ
//! only in case, so `children` and `edges_out` are keyed this way. The most
//! recently inserted spelling of a key is the one reported by iteration.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseInsensitiveMap<V> {
    entries: BTreeMap<String, (String, V)>,
}

impl<V> Default for CaseInsensitiveMap<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> CaseInsensitiveMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing any entry whose key differs only in case.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        self.entries
            .insert(key.to_lowercase(), (key, value))
            .map(|(_, old)| old)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(&key.to_lowercase()).map(|(_, v)| v)
    }

    /// The stored spelling of `key` together with its value.
    pub fn get_key_value(&self, key: &str) -> Option<(&str, &V)> {
        self.entries
            .get(&key.to_lowercase())
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(&key.to_lowercase()).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_collide_case_insensitively() {
        let mut map = CaseInsensitiveMap::new();
        map.insert("abbrev", 1);
        assert_eq!(map.insert("ABBREV", 2), Some(1));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("abbrev"), Some(&2));
        assert_eq!(map.get_key_value("Abbrev"), Some(("ABBREV", &2)));
        assert_eq!(map.remove("aBbReV"), Some(2));
        assert!(map.is_empty());
    }
}
