//! Dependency overrides.
//!
//! The root manifest's `overrides` object becomes a shared, immutable rule
//! tree. Nodes and edges hold an [`OverrideSet`], a cursor into that tree
//! naming the most specific rule in force for them.

use crate::error::{Error, Result};
use crate::spec::{SpecKind, SpecMatcher, classify};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug)]
struct Rule {
    parent: Option<usize>,
    /// Raw key, e.g. `foo@^1.0.0`. Empty for the tree root.
    key: String,
    name: String,
    key_spec: String,
    value: Option<String>,
    children: Vec<usize>,
}

#[derive(Debug)]
struct RuleTree {
    rules: Vec<Rule>,
}

/// Split an override key into `(name, spec)`, honouring scopes.
fn split_key(key: &str) -> (&str, &str) {
    if key.starts_with('@') && !key.contains('/') {
        return ("", &key[1..]);
    }
    let at = if let Some(scoped) = key.strip_prefix('@') {
        scoped.find('@').map(|i| i + 1)
    } else {
        key.find('@')
    };
    match at {
        Some(i) => (&key[..i], &key[i + 1..]),
        None => (key, ""),
    }
}

impl RuleTree {
    fn build(&mut self, parent: usize, overrides: &serde_json::Map<String, Value>) -> Result<()> {
        for (key, value) in overrides {
            if key == "." {
                continue;
            }
            let (name, spec) = split_key(key);
            if name.is_empty() {
                return Err(Error::OverrideWithoutName { key: key.clone() });
            }
            let key_spec = if spec.is_empty() { "*" } else { spec };
            let (explicit, nested) = match value {
                Value::String(s) => (Some(s.clone()), None),
                Value::Object(map) => (
                    map.get(".").and_then(Value::as_str).map(str::to_string),
                    Some(map),
                ),
                other => {
                    return Err(Error::InvalidOverrides {
                        found: other.to_string(),
                    });
                }
            };
            let value = match explicit {
                Some(v) if v.is_empty() => Some("*".to_string()),
                Some(v) => Some(v),
                None => Some(key_spec.to_string()),
            };
            let index = self.rules.len();
            self.rules.push(Rule {
                parent: Some(parent),
                key: key.clone(),
                name: name.to_string(),
                key_spec: key_spec.to_string(),
                value,
                children: Vec::new(),
            });
            self.rules[parent].children.push(index);
            if let Some(nested) = nested {
                self.build(index, nested)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OverrideSet {
    tree: Arc<RuleTree>,
    index: usize,
}

impl OverrideSet {
    /// Build the rule tree from a manifest's `overrides` value.
    pub fn new(overrides: &Value) -> Result<Self> {
        let Value::Object(map) = overrides else {
            return Err(Error::InvalidOverrides {
                found: overrides.to_string(),
            });
        };
        let mut tree = RuleTree {
            rules: vec![Rule {
                parent: None,
                key: String::new(),
                name: String::new(),
                key_spec: "*".to_string(),
                value: None,
                children: Vec::new(),
            }],
        };
        tree.build(0, map)?;
        Ok(Self {
            tree: Arc::new(tree),
            index: 0,
        })
    }

    fn rule(&self) -> &Rule {
        &self.tree.rules[self.index]
    }

    fn at(&self, index: usize) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
            index,
        }
    }

    pub fn is_root(&self) -> bool {
        self.rule().parent.is_none()
    }

    /// Package name the current rule targets. Empty at the root.
    pub fn name(&self) -> &str {
        &self.rule().name
    }

    pub fn key(&self) -> &str {
        &self.rule().key
    }

    pub fn key_spec(&self) -> &str {
        &self.rule().key_spec
    }

    /// The replacement spec, which may be a `$name` reference.
    pub fn value(&self) -> Option<&str> {
        self.rule().value.as_deref()
    }

    pub fn parent(&self) -> Option<Self> {
        self.rule().parent.map(|p| self.at(p))
    }

    /// Rules in scope here: each ancestor's children, nearest first, plus
    /// the ancestors themselves. The first rule seen for a key wins.
    fn ruleset(&self) -> Vec<usize> {
        let mut seen: Vec<&str> = Vec::new();
        let mut out = Vec::new();
        let mut cursor = Some(self.index);
        while let Some(index) = cursor {
            let rule = &self.tree.rules[index];
            for &child in &rule.children {
                let key = self.tree.rules[child].key.as_str();
                if !seen.contains(&key) {
                    seen.push(key);
                    out.push(child);
                }
            }
            if rule.parent.is_some() && !seen.contains(&rule.key.as_str()) {
                seen.push(&rule.key);
                out.push(index);
            }
            cursor = rule.parent;
        }
        out
    }

    /// The rule that applies to an edge named `name` with spec `spec`.
    pub fn edge_rule(&self, name: &str, spec: &str, matcher: &dyn SpecMatcher) -> Self {
        for index in self.ruleset() {
            let rule = &self.tree.rules[index];
            if rule.name != name {
                continue;
            }
            if rule.key_spec == "*" {
                return self.at(index);
            }
            let spec = match classify(spec) {
                SpecKind::Alias { spec, .. } => spec,
                _ => spec,
            };
            match classify(spec) {
                SpecKind::Git(_) => continue,
                SpecKind::Range(range) => {
                    if matcher.intersects(range, &rule.key_spec) {
                        return self.at(index);
                    }
                }
                _ => return self.at(index),
            }
        }
        self.clone()
    }

    /// The rule that applies to a package `name@version` placed here.
    pub fn node_rule(&self, name: &str, version: Option<&str>, matcher: &dyn SpecMatcher) -> Self {
        for index in self.ruleset() {
            let rule = &self.tree.rules[index];
            if rule.name != name {
                continue;
            }
            let matches = |range: &str| version.is_some_and(|v| matcher.version_satisfies(v, range));
            if matches(&rule.key_spec) || rule.value.as_deref().is_some_and(matches) {
                return self.at(index);
            }
        }
        self.clone()
    }

    /// Structural equality: same rule position in equal rule trees.
    pub fn is_equal(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.tree, &other.tree) && self.index == other.index {
            return true;
        }
        let (a, b) = (self.rule(), other.rule());
        if a.key != b.key || a.value != b.value || a.children.len() != b.children.len() {
            return false;
        }
        let children_equal = a.children.iter().all(|&child| {
            let key = &self.tree.rules[child].key;
            b.children
                .iter()
                .find(|&&c| &other.tree.rules[c].key == key)
                .is_some_and(|&c| self.at(child).subtree_equal(&other.at(c)))
        });
        if !children_equal {
            return false;
        }
        match (self.parent(), other.parent()) {
            (None, None) => true,
            (Some(p), Some(q)) => p.is_equal(&q),
            _ => false,
        }
    }

    fn subtree_equal(&self, other: &Self) -> bool {
        let (a, b) = (self.rule(), other.rule());
        a.key == b.key
            && a.value == b.value
            && a.children.len() == b.children.len()
            && a.children.iter().all(|&child| {
                let key = &self.tree.rules[child].key;
                b.children
                    .iter()
                    .find(|&&c| &other.tree.rules[c].key == key)
                    .is_some_and(|&c| self.at(child).subtree_equal(&other.at(c)))
            })
    }

    /// Whether `self` sits on the path from the tree root to `other`.
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        let mut cursor = other.parent();
        while let Some(set) = cursor {
            if set.is_equal(self) {
                return true;
            }
            cursor = set.parent();
        }
        false
    }

    /// Of two sets, the one nested inside the other; `None` when they
    /// conflict.
    pub fn most_specific(a: &Self, b: &Self) -> Option<Self> {
        if a.is_equal(b) || b.is_ancestor_of(a) {
            Some(a.clone())
        } else if a.is_ancestor_of(b) {
            Some(b.clone())
        } else {
            None
        }
    }
}
