//! Workspace discovery.
//!
//! Patterns are folder paths relative to the project, where a segment may
//! contain `*` wildcards (`packages/*`, `tools/cli-*`). A leading `!`
//! excludes matches. Recursive `**` globs are not expanded.

use crate::Result;
use arbor_fs::{PackagePath, name_from_folder, normalize, read_json};
use arbor_lockfile::Lockfile;
use arbor_tree::Package;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct Pattern {
    segments: Vec<String>,
    negate: bool,
}

impl Pattern {
    fn parse(raw: &str) -> Option<Self> {
        let (negate, raw) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let segments: Vec<String> = raw
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_string)
            .collect();
        if segments.is_empty() || segments.iter().any(|s| s.contains("**")) {
            tracing::warn!(pattern = raw, "Unsupported workspace pattern");
            return None;
        }
        Some(Self { segments, negate })
    }

    /// Whole-location matcher, one wildcard segment per path segment.
    fn regex(&self) -> Option<Regex> {
        let body: Vec<String> = self.segments.iter().map(|s| segment_regex(s)).collect();
        Regex::new(&format!("^{}$", body.join("/"))).ok()
    }
}

fn segment_regex(segment: &str) -> String {
    segment
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[^/]*")
}

fn parse_patterns(patterns: &[String]) -> Vec<Pattern> {
    patterns.iter().filter_map(|p| Pattern::parse(p)).collect()
}

/// Folders under `cwd` matching `segments`.
async fn expand(cwd: &Path, segments: &[String]) -> Vec<PathBuf> {
    let mut current = vec![cwd.to_path_buf()];
    for segment in segments {
        if !segment.contains('*') {
            current = current.into_iter().map(|dir| dir.join(segment)).collect();
            continue;
        }
        let Ok(matcher) = Regex::new(&format!("^{}$", segment_regex(segment))) else {
            return Vec::new();
        };
        let mut next = Vec::new();
        for dir in current {
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') || name == "node_modules" || !matcher.is_match(&name) {
                    continue;
                }
                if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                    next.push(entry.path());
                }
            }
        }
        next.sort();
        current = next;
    }
    current
}

/// Map the workspaces declared by `package` in `cwd` to their folders,
/// keyed by package name.
///
/// Folders without a readable `package.json` are skipped.
pub async fn map_workspaces(cwd: &Path, package: &Package) -> Result<BTreeMap<String, PathBuf>> {
    let mut found = BTreeMap::new();
    let Some(patterns) = &package.workspaces else {
        return Ok(found);
    };
    for pattern in parse_patterns(patterns) {
        for dir in expand(cwd, &pattern.segments).await {
            let dir = normalize(dir);
            if pattern.negate {
                found.retain(|_, path: &mut PathBuf| *path != dir);
                continue;
            }
            let manifest = PackagePath::PackageJson.under(&dir);
            let workspace: Package = match read_json(&manifest).await {
                Ok(workspace) => workspace,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    tracing::warn!(path = %manifest.display(), error = %e, "Skipping unreadable workspace");
                    continue;
                }
            };
            let Some(name) = workspace.name.or_else(|| name_from_folder(&dir)) else {
                continue;
            };
            found.insert(name, dir);
        }
    }
    tracing::debug!(cwd = %cwd.display(), count = found.len(), "Mapped workspaces");
    Ok(found)
}

/// Map workspaces using only lockfile records: the root record's patterns
/// are matched against recorded locations.
pub fn map_workspaces_virtual(cwd: &Path, lockfile: &Lockfile) -> BTreeMap<String, PathBuf> {
    let mut found = BTreeMap::new();
    let Some(patterns) = lockfile.root().and_then(|r| r.workspaces.clone()) else {
        return found;
    };
    for pattern in parse_patterns(&patterns) {
        let Some(matcher) = pattern.regex() else {
            continue;
        };
        for (location, record) in lockfile.packages() {
            if location.is_empty() || record.link || !matcher.is_match(location) {
                continue;
            }
            let path = normalize(cwd.join(location));
            if pattern.negate {
                found.retain(|_, p: &mut PathBuf| *p != path);
                continue;
            }
            if let Some(name) = record.name.clone().or_else(|| name_from_folder(&path)) {
                found.insert(name, path);
            }
        }
    }
    found
}
