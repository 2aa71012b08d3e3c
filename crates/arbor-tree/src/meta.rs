//! Writing node state back into the root's lockfile records.

use crate::arena::{Arena, NodeId};
use arbor_fs::{relpath, resolve};
use arbor_lockfile::{LockRecord, Lockfile};
use serde_json::Value;
use std::path::Path;

/// Rebase a `file:` resolution recorded relative to `from` onto `to`.
pub fn consistent_resolve(resolved: &str, from: &Path, to: &Path) -> String {
    match resolved.strip_prefix("file:") {
        Some(rest) => {
            let absolute = resolve(from, rest);
            format!("file:{}", relpath(to, absolute))
        }
        None => resolved.to_string(),
    }
}

impl Arena {
    /// The lockfile record describing `id`, with paths relative to
    /// `lock_path`.
    pub fn record_from_node(&self, id: NodeId, lock_path: &Path) -> LockRecord {
        let node = self.node(id);
        if node.is_link() {
            return LockRecord::link(relpath(lock_path, &node.realpath));
        }
        let package = self.package(id);
        let mut record = LockRecord {
            version: package.version.clone(),
            dependencies: package.dependencies.clone(),
            optional_dependencies: package.optional_dependencies.clone(),
            peer_dependencies: package.peer_dependencies.clone(),
            peer_dependencies_meta: package.peer_dependencies_meta.clone(),
            accept_dependencies: package.accept_dependencies.clone(),
            bundle_dependencies: package.bundled_names(),
            funding: package.funding.clone(),
            engines: package.engines.clone(),
            os: package.os.clone(),
            cpu: package.cpu.clone(),
            libc: package.libc.clone(),
            license: package.license.clone(),
            has_install_script: package.has_install_script,
            bin: package.bin.clone(),
            deprecated: package.deprecated.clone(),
            workspaces: package.workspaces.clone(),
            ..LockRecord::default()
        };
        if let Some(name) = &package.name {
            if node.is_root() || *name != node.name {
                record.name = Some(name.clone());
            }
        }
        if self.is_top(id) {
            record.dev_dependencies = package.dev_dependencies.clone();
        }
        record.integrity = node.integrity.clone();
        record.in_bundle = self.in_bundle(id);
        record.has_shrinkwrap = node.has_shrinkwrap;
        record.resolved = node
            .resolved
            .as_deref()
            .map(|r| consistent_resolve(r, &node.path, lock_path));

        let flags = node.flags();
        if flags.extraneous {
            record.extraneous = true;
        } else {
            record.peer = flags.peer;
            record.dev = flags.dev;
            record.optional = flags.optional;
            record.dev_optional = flags.dev_optional && !flags.dev && !flags.optional;
        }
        if record.license == Some(Value::Null) {
            record.license = None;
        }
        record
    }

    /// Attach (or detach) the lockfile metadata of a root, recording every
    /// node already in its tree.
    pub fn set_meta(&mut self, root: NodeId, meta: Option<Lockfile>) {
        let root = self.root_of(root);
        self.node_mut(root).meta = meta;
        self.refresh_meta(root);
    }

    pub fn meta(&self, root: NodeId) -> Option<&Lockfile> {
        self.node(self.root_of(root)).meta.as_ref()
    }

    pub fn take_meta(&mut self, root: NodeId) -> Option<Lockfile> {
        let root = self.root_of(root);
        self.node_mut(root).meta.take()
    }

    /// Rewrite the record of every node in the tree from current state.
    pub fn refresh_meta(&mut self, root: NodeId) {
        let root = self.root_of(root);
        if self.node(root).meta.is_none() {
            return;
        }
        for id in self.inventory_ids(root) {
            self.add_to_meta(id);
        }
    }

    /// Record `id` in its root's lockfile.
    ///
    /// A node lacking `resolved` or `integrity` first picks them up from an
    /// existing record for the same version at its location.
    pub(crate) fn add_to_meta(&mut self, id: NodeId) {
        let root = self.node(id).root;
        if self.node(id).is_placeholder() {
            return;
        }
        let Some(meta) = self.node(root).meta.as_ref() else {
            return;
        };
        let lock_path = meta.path().to_path_buf();
        let location = self.node(id).location.clone();
        let needs_decoration = !self.node(id).is_link()
            && (self.node(id).resolved.is_none() || self.node(id).integrity.is_none());
        if needs_decoration {
            let existing = meta
                .get(&location)
                .filter(|r| !r.link)
                .filter(|r| match (&r.version, self.version(id)) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                })
                .map(|r| (r.resolved.clone(), r.integrity.clone(), r.has_shrinkwrap));
            if let Some((resolved, integrity, has_shrinkwrap)) = existing {
                let node = self.node_mut(id);
                if node.resolved.is_none() {
                    node.resolved = resolved;
                }
                if node.integrity.is_none() {
                    node.integrity = integrity;
                }
                node.has_shrinkwrap |= has_shrinkwrap;
            }
        }
        let record = self.record_from_node(id, &lock_path);
        if let Some(meta) = self.node_mut(root).meta.as_mut() {
            meta.insert(location, record);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::Arena;
    use crate::node::{DepFlags, NodeOptions};
    use crate::package::Package;
    use arbor_lockfile::Lockfile;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn test_record_from_node_flags_and_name() {
        let mut arena = Arena::new();
        let root = arena
            .create_node(NodeOptions::at("/p", Package::named("root", "1.0.0").with_dev_dependency("d", "^1")))
            .unwrap();
        let child = arena
            .create_node(NodeOptions {
                name: Some("alias".into()),
                flags: Some(DepFlags {
                    dev: true,
                    ..DepFlags::NONE
                }),
                ..NodeOptions::child(root, Package::named("real", "2.0.0"))
            })
            .unwrap();

        let root_record = arena.record_from_node(root, Path::new("/p"));
        assert_eq!(root_record.name.as_deref(), Some("root"));
        assert_eq!(root_record.dev_dependencies.len(), 1);

        let record = arena.record_from_node(child, Path::new("/p"));
        assert_eq!(record.name.as_deref(), Some("real"));
        assert!(record.dev);
        assert!(!record.dev_optional);
        assert!(!record.extraneous);
    }

    #[test]
    fn test_meta_tracks_moves() {
        let mut arena = Arena::new();
        let root = arena.create_node(NodeOptions::at("/p", Package::named("root", "1.0.0"))).unwrap();
        arena.set_meta(root, Some(Lockfile::new("/p")));
        let a = arena
            .create_node(NodeOptions::child(root, Package::named("a", "1.0.0")))
            .unwrap();
        assert!(arena.meta(root).unwrap().get("node_modules/a").is_some());

        let b = arena
            .create_node(NodeOptions::child(root, Package::named("b", "1.0.0")))
            .unwrap();
        arena.set_parent(a, Some(b));
        let meta = arena.meta(root).unwrap();
        assert!(meta.get("node_modules/a").is_none());
        assert!(meta.get("node_modules/b/node_modules/a").is_some());
    }

    #[test]
    fn test_hoisting_over_occupant_keeps_new_record() {
        let mut arena = Arena::new();
        let root = arena.create_node(NodeOptions::at("/p", Package::named("root", "1.0.0"))).unwrap();
        arena.set_meta(root, Some(Lockfile::new("/p")));
        let b = arena
            .create_node(NodeOptions::child(root, Package::named("b", "1.0.0")))
            .unwrap();
        let old = arena
            .create_node(NodeOptions::child(root, Package::named("a", "1.0.0")))
            .unwrap();
        let nested = arena
            .create_node(NodeOptions::child(b, Package::named("a", "2.0.0")))
            .unwrap();

        arena.set_parent(nested, Some(root));

        let meta = arena.meta(root).unwrap();
        let record = meta.get("node_modules/a").unwrap();
        assert_eq!(record.version.as_deref(), Some("2.0.0"));
        assert!(meta.get("node_modules/b/node_modules/a").is_none());
        assert!(arena.node(old).is_root());
        assert_eq!(arena.get(root, "node_modules/a"), Some(nested));
    }

    #[test]
    fn test_link_record() {
        let mut arena = Arena::new();
        let root = arena.create_node(NodeOptions::at("/p", Package::named("root", "1.0.0"))).unwrap();
        let link = arena
            .create_link(
                NodeOptions {
                    path: Some("/p/node_modules/w".into()),
                    realpath: Some("/p/packages/w".into()),
                    parent: Some(root),
                    package: Package::named("w", "0.1.0"),
                    ..NodeOptions::default()
                },
                None,
            )
            .unwrap();
        let record = arena.record_from_node(link, Path::new("/p"));
        assert!(record.link);
        assert_eq!(record.resolved.as_deref(), Some("packages/w"));
    }
}
