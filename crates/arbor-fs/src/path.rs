//! Path arithmetic for node locations
//!
//! Locations are root-relative, `/`-delimited and stable across machines.
//! Everything here is lexical: no function in this module touches the
//! filesystem.

use regex::Regex;
use std::path::{Ancestors, Component, Path, PathBuf};
use std::sync::LazyLock;

/// Entries of a `node_modules` folder that are never packages: dot folders
/// such as `.bin` or `.package-lock.json`, and retired scoped folders
/// (`@scope/.foo-XXXX`).
static HIDDEN_ENTRY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(@[^/]+/)?\.").unwrap());

/// Package name implied by a path ending in `node_modules/<name>`.
static NODE_MODULES_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|/|\\)node_modules[\\/](@[^/\\]+[\\/][^\\/]+|[^\\/]+)$").unwrap()
});

/// Lexically normalize a path, resolving `.` and `..` segments.
///
/// `..` above the filesystem root is dropped, matching how the OS treats
/// `/..`.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Resolve `rel` against `base`. An absolute `rel` wins outright.
pub fn resolve(base: impl AsRef<Path>, rel: impl AsRef<Path>) -> PathBuf {
    let rel = rel.as_ref();
    if rel.is_absolute() {
        normalize(rel)
    } else {
        normalize(base.as_ref().join(rel))
    }
}

/// The `/`-delimited relative path from `from` to `to`.
///
/// Equal paths produce the empty string; targets outside `from` produce
/// leading `..` segments. Paths with no common prefix at all (different
/// drives) return `to` itself with forward slashes.
pub fn relpath(from: impl AsRef<Path>, to: impl AsRef<Path>) -> String {
    let from = normalize(from);
    let to = normalize(to);
    let from_parts: Vec<Component<'_>> = from.components().collect();
    let to_parts: Vec<Component<'_>> = to.components().collect();

    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 && (from.has_root() || to.has_root()) {
        return to.to_string_lossy().replace('\\', "/");
    }

    let mut segments: Vec<String> = Vec::with_capacity(from_parts.len() + to_parts.len());
    for _ in common..from_parts.len() {
        segments.push("..".to_string());
    }
    for part in &to_parts[common..] {
        segments.push(part.as_os_str().to_string_lossy().into_owned());
    }
    segments.join("/")
}

/// Walk from `path` up to the filesystem root, `path` itself first.
pub fn walk_up(path: &Path) -> Ancestors<'_> {
    path.ancestors()
}

/// Derive a package name from its folder, keeping the scope for
/// `@scope/name` folders.
pub fn name_from_folder(path: impl AsRef<Path>) -> Option<String> {
    let path = path.as_ref();
    let base = path.file_name()?.to_string_lossy().into_owned();
    let scope = path
        .parent()
        .and_then(Path::file_name)
        .map(|s| s.to_string_lossy().into_owned());
    match scope {
        Some(scope) if scope.starts_with('@') => Some(format!("{scope}/{base}")),
        _ => Some(base),
    }
}

/// The package name a `.../node_modules/<name>` path implies, if any.
pub fn node_modules_name(path: impl AsRef<Path>) -> Option<String> {
    let text = path.as_ref().to_string_lossy();
    NODE_MODULES_NAME
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().replace('\\', "/"))
}

/// Whether a `node_modules` entry (possibly `@scope/name`) is skipped when
/// listing children.
pub fn is_hidden_entry(entry: &str) -> bool {
    HIDDEN_ENTRY.is_match(entry)
}

/// The deepest directory containing both `a` and `b`.
pub fn nearest_common_ancestor(a: impl AsRef<Path>, b: impl AsRef<Path>) -> Option<PathBuf> {
    let a = normalize(a);
    let b = normalize(b);
    let shared: Vec<Component<'_>> = a
        .components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect();
    if shared.is_empty() {
        None
    } else {
        Some(shared.iter().map(|c| c.as_os_str()).collect())
    }
}

/// Whether `path` is `ancestor` or lies beneath it.
pub fn is_within(ancestor: impl AsRef<Path>, path: impl AsRef<Path>) -> bool {
    normalize(path).starts_with(normalize(ancestor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(normalize("/a/./b/../c"), PathBuf::from("/a/c"));
        assert_eq!(normalize("/.."), PathBuf::from("/"));
        assert_eq!(normalize("a/../.."), PathBuf::from(".."));
    }

    #[test]
    fn relpath_of_self_is_empty() {
        assert_eq!(relpath("/project", "/project"), "");
    }

    #[test]
    fn scoped_node_modules_name() {
        assert_eq!(
            node_modules_name("/p/node_modules/@scope/pkg").as_deref(),
            Some("@scope/pkg")
        );
        assert_eq!(node_modules_name("/p/packages/pkg"), None);
    }
}
