//! Dependency spec classification and matching.
//!
//! Ranges use npm syntax (`^1.2.3`, `1.x`, `>=1 <2`, `1.0.0 - 2.0.0`,
//! `a || b`) and are translated onto [`semver::VersionReq`], whose
//! comparators are comma-separated and treat a bare version as a caret
//! range.
//!
//! # Examples
//!
//! ```
//! use arbor_tree::spec::{SemverMatcher, SpecMatcher};
//!
//! let matcher = SemverMatcher;
//! assert!(matcher.version_satisfies("1.4.0", "^1.2.0"));
//! assert!(!matcher.version_satisfies("1.2.0", "1.2.3 - 1.3.0"));
//! assert!(matcher.intersects("^1.0.0", ">=1.5.0 <3.0.0"));
//! ```

use arbor_fs::resolve;
use semver::{Comparator, Op, Prerelease, Version, VersionReq};
use std::path::Path;

/// What kind of thing a dependency spec names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecKind<'a> {
    /// A semver range or exact version; `*` and the empty string match all.
    Range(&'a str),
    /// A dist-tag such as `latest`.
    Tag(&'a str),
    /// `npm:<name>@<spec>`
    Alias { name: &'a str, spec: &'a str },
    /// A local folder or tarball, with any `file:` prefix removed.
    File(&'a str),
    Git(&'a str),
    Remote(&'a str),
}

impl SpecKind<'_> {
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Range(_))
    }
}

const GIT_PREFIXES: &[&str] = &[
    "git+", "git://", "github:", "gitlab:", "bitbucket:", "gist:",
];

pub fn classify(spec: &str) -> SpecKind<'_> {
    let spec = spec.trim();
    if let Some(rest) = spec.strip_prefix("npm:") {
        let at = if let Some(scoped) = rest.strip_prefix('@') {
            scoped.find('@').map(|i| i + 1)
        } else {
            rest.find('@')
        };
        return match at {
            Some(i) => SpecKind::Alias {
                name: &rest[..i],
                spec: &rest[i + 1..],
            },
            None => SpecKind::Alias {
                name: rest,
                spec: "*",
            },
        };
    }
    if let Some(path) = spec.strip_prefix("file:") {
        return SpecKind::File(path);
    }
    if spec.starts_with("./")
        || spec.starts_with("../")
        || spec.starts_with('/')
        || spec.starts_with("~/")
        || spec == "."
        || spec == ".."
    {
        return SpecKind::File(spec);
    }
    if GIT_PREFIXES.iter().any(|p| spec.starts_with(p)) {
        return SpecKind::Git(spec);
    }
    if spec.starts_with("http://") || spec.starts_with("https://") {
        return SpecKind::Remote(spec);
    }
    if parse_range(spec).is_some() {
        return SpecKind::Range(spec);
    }
    // `user/repo` shorthand
    if !spec.starts_with('@') && spec.contains('/') && !spec.contains(' ') {
        return SpecKind::Git(spec);
    }
    SpecKind::Tag(spec)
}

fn is_star(range: &str) -> bool {
    let range = range.trim();
    range.is_empty() || matches!(range, "*" | "x" | "X")
}

fn is_operator(token: &str) -> bool {
    matches!(token, "<" | "<=" | ">" | ">=" | "=" | "~" | "^" | "~>")
}

fn strip_v(version: &str) -> &str {
    version.trim().trim_start_matches('=').trim_start_matches(['v', 'V'])
}

/// Translate one npm comparator into `VersionReq` comparator syntax.
fn translate_comparator(token: &str) -> Option<String> {
    let op_len = token
        .find(|c: char| c.is_ascii_alphanumeric() || c == '*')
        .unwrap_or(token.len());
    let (op, version) = token.split_at(op_len);
    let version = version.trim_start_matches(['v', 'V']);
    if version.is_empty() {
        return None;
    }
    // `1.x.x` and `1.*` keep only the concrete leading parts
    let concrete: Vec<&str> = version
        .split('.')
        .take_while(|part| !matches!(*part, "*" | "x" | "X"))
        .collect();
    if concrete.is_empty() {
        return Some("*".to_string());
    }
    let version = concrete.join(".");
    let op = match op {
        "" | "=" => "=",
        "~>" => "~",
        other if is_operator(other) => other,
        _ => return None,
    };
    Some(format!("{op}{version}"))
}

fn translate_set(set: &str) -> Option<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in set.split_whitespace() {
        if is_operator(token) {
            pending_op = Some(token);
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{op}{token}")),
            None => tokens.push(token.to_string()),
        }
    }

    let mut comparators = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if tokens.get(i + 1).is_some_and(|t| t == "-") && i + 2 < tokens.len() {
            comparators.push(format!(">={}", strip_v(&tokens[i])));
            comparators.push(format!("<={}", strip_v(&tokens[i + 2])));
            i += 3;
            continue;
        }
        comparators.push(translate_comparator(&tokens[i])?);
        i += 1;
    }
    comparators.retain(|c| c != "*");
    if comparators.is_empty() {
        return Some("*".to_string());
    }
    Some(comparators.join(", "))
}

/// Parse an npm range into its `||` alternatives.
pub fn parse_range(range: &str) -> Option<Vec<VersionReq>> {
    if is_star(range) {
        return Some(vec![VersionReq::STAR]);
    }
    range
        .split("||")
        .map(|alt| {
            let alt = alt.trim();
            if is_star(alt) {
                return Some(VersionReq::STAR);
            }
            VersionReq::parse(&translate_set(alt)?).ok()
        })
        .collect()
}

pub fn parse_version(version: &str) -> Option<Version> {
    Version::parse(strip_v(version)).ok()
}

/// Versions worth probing when deciding whether two ranges overlap.
fn probe_versions(req: &VersionReq, out: &mut Vec<Version>) {
    for Comparator {
        major,
        minor,
        patch,
        pre,
        ..
    } in &req.comparators
    {
        let base = Version {
            major: *major,
            minor: minor.unwrap_or(0),
            patch: patch.unwrap_or(0),
            pre: pre.clone(),
            build: Default::default(),
        };
        let release = Version::new(base.major, base.minor, base.patch);
        out.push(Version::new(base.major, base.minor, base.patch + 1));
        out.push(Version::new(base.major, base.minor + 1, 0));
        out.push(Version::new(base.major + 1, 0, 0));
        if base.patch > 0 {
            out.push(Version::new(base.major, base.minor, base.patch - 1));
        }
        if base.minor > 0 {
            out.push(Version::new(base.major, base.minor - 1, 0));
        }
        if base.pre != Prerelease::EMPTY {
            out.push(base);
        }
        out.push(release);
    }
}

/// The facts about a node a spec is checked against.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub name: &'a str,
    /// `package.json` name, which differs from `name` for aliases.
    pub package_name: &'a str,
    pub version: Option<&'a str>,
    pub resolved: Option<&'a str>,
    /// Where the package contents actually live.
    pub realpath: &'a Path,
}

/// Decides whether a node satisfies a dependency spec.
///
/// The tree engine only ever asks these three questions, so alternative
/// registries or stricter matching can be plugged in by implementing this
/// trait.
pub trait SpecMatcher: std::fmt::Debug + Send + Sync {
    /// Whether `candidate` satisfies `spec` as declared by a package living
    /// at `from`.
    fn satisfies(&self, candidate: &Candidate<'_>, spec: &str, from: &Path) -> bool;

    fn version_satisfies(&self, version: &str, range: &str) -> bool;

    /// Whether some version could satisfy both ranges.
    fn intersects(&self, a: &str, b: &str) -> bool;
}

/// The default matcher, built on the `semver` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SemverMatcher;

impl SpecMatcher for SemverMatcher {
    fn satisfies(&self, candidate: &Candidate<'_>, spec: &str, from: &Path) -> bool {
        match classify(spec) {
            SpecKind::Range(range) => {
                is_star(range)
                    || candidate
                        .version
                        .is_some_and(|v| self.version_satisfies(v, range))
            }
            SpecKind::Alias { name, spec } => {
                candidate.package_name == name
                    && self.satisfies(
                        &Candidate {
                            name,
                            ..*candidate
                        },
                        spec,
                        from,
                    )
            }
            SpecKind::Tag(_) => true,
            SpecKind::File(path) => {
                let path = path.replace("%23", "#");
                if path.ends_with(".tgz") || path.ends_with(".tar.gz") || path.ends_with(".tar") {
                    return candidate.resolved.is_some_and(|r| r.ends_with(&path));
                }
                resolve(from, &path) == candidate.realpath
            }
            SpecKind::Git(spec) => match candidate.resolved {
                None => true,
                Some(resolved) => {
                    let repo = spec
                        .split('#')
                        .next()
                        .unwrap_or(spec)
                        .trim_start_matches("git+")
                        .trim_end_matches(".git");
                    let repo = repo.rsplit(':').next().unwrap_or(repo);
                    let repo = repo.trim_start_matches('/');
                    resolved == spec || resolved.contains(repo)
                }
            },
            SpecKind::Remote(url) => candidate.resolved.is_some_and(|r| r == url),
        }
    }

    fn version_satisfies(&self, version: &str, range: &str) -> bool {
        if is_star(range) {
            return true;
        }
        let (Some(version), Some(alternatives)) = (parse_version(version), parse_range(range)) else {
            return false;
        };
        alternatives.iter().any(|req| req.matches(&version))
    }

    fn intersects(&self, a: &str, b: &str) -> bool {
        if is_star(a) || is_star(b) {
            return true;
        }
        let (Some(a), Some(b)) = (parse_range(a), parse_range(b)) else {
            return false;
        };
        a.iter().any(|left| {
            b.iter().any(|right| {
                if left.comparators.is_empty() || right.comparators.is_empty() {
                    return true;
                }
                let mut probes = Vec::new();
                probe_versions(left, &mut probes);
                probe_versions(right, &mut probes);
                probes.iter().any(|v| left.matches(v) && right.matches(v))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    #[rstest]
    #[case("^1.0.0", "1.9.9", true)]
    #[case("^1.0.0", "2.0.0", false)]
    #[case("1.2.3", "1.2.4", false)]
    #[case("1.2.3", "1.2.3", true)]
    #[case("1.2", "1.2.9", true)]
    #[case("1.2", "1.3.0", false)]
    #[case("1.x", "1.5.0", true)]
    #[case(">=1.0.0 <2.0.0", "1.5.0", true)]
    #[case(">= 1.0.0 < 2.0.0", "2.0.0", false)]
    #[case("1.0.0 - 1.4", "1.4.7", true)]
    #[case("^1.0.0 || ^3.0.0", "3.1.0", true)]
    #[case("^1.0.0 || ^3.0.0", "2.1.0", false)]
    #[case("~1.2.0", "1.2.5", true)]
    #[case("*", "0.0.1", true)]
    #[case("", "9.9.9", true)]
    #[case("v1.0.0", "1.0.0", true)]
    fn test_version_satisfies(#[case] range: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(SemverMatcher.version_satisfies(version, range), expected);
    }

    #[rstest]
    #[case("^1.0.0", "^1.5.0", true)]
    #[case("^1.0.0", "^2.0.0", false)]
    #[case("1.x", ">=1.9.0", true)]
    #[case("<1.0.0", ">=1.0.0", false)]
    #[case("*", "^5", true)]
    fn test_intersects(#[case] a: &str, #[case] b: &str, #[case] expected: bool) {
        assert_eq!(SemverMatcher.intersects(a, b), expected);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("^1.0.0"), SpecKind::Range("^1.0.0"));
        assert_eq!(classify("latest"), SpecKind::Tag("latest"));
        assert_eq!(classify("file:../x"), SpecKind::File("../x"));
        assert_eq!(
            classify("npm:@scope/real@^2"),
            SpecKind::Alias {
                name: "@scope/real",
                spec: "^2"
            }
        );
        assert_eq!(classify("user/repo#main"), SpecKind::Git("user/repo#main"));
        assert!(matches!(classify("https://r.example/a.tgz"), SpecKind::Remote(_)));
    }

    #[test]
    fn test_alias_checks_package_name() {
        let realpath = PathBuf::from("/p/node_modules/alias");
        let candidate = Candidate {
            name: "alias",
            package_name: "real",
            version: Some("2.1.0"),
            resolved: None,
            realpath: &realpath,
        };
        assert!(SemverMatcher.satisfies(&candidate, "npm:real@^2", Path::new("/p")));
        assert!(!SemverMatcher.satisfies(&candidate, "npm:other@^2", Path::new("/p")));
    }

    #[test]
    fn test_file_spec_compares_paths() {
        let realpath = PathBuf::from("/p/packages/a");
        let candidate = Candidate {
            name: "a",
            package_name: "a",
            version: None,
            resolved: None,
            realpath: &realpath,
        };
        assert!(SemverMatcher.satisfies(&candidate, "file:packages/a", Path::new("/p")));
        assert!(SemverMatcher.satisfies(&candidate, "file:../packages/a", Path::new("/p/x")));
        assert!(!SemverMatcher.satisfies(&candidate, "file:packages/b", Path::new("/p")));
    }
}
