use arbor_fs::{
    is_hidden_entry, is_within, name_from_folder, nearest_common_ancestor, node_modules_name,
    relpath, resolve, walk_up,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::{Path, PathBuf};

#[rstest]
#[case("/project", "/project/node_modules/a", "node_modules/a")]
#[case("/project", "/project/node_modules/@s/b", "node_modules/@s/b")]
#[case("/project", "/elsewhere/pkg", "../elsewhere/pkg")]
#[case("/project/packages/x", "/project/node_modules/y", "../../node_modules/y")]
#[case("/project", "/project", "")]
fn test_relpath(#[case] from: &str, #[case] to: &str, #[case] expected: &str) {
    assert_eq!(relpath(from, to), expected);
}

#[rstest]
#[case("/project", "node_modules/a", "/project/node_modules/a")]
#[case("/project", "../linked", "/linked")]
#[case("/project", "/abs/path", "/abs/path")]
#[case("/project/a", "./b/../c", "/project/a/c")]
fn test_resolve(#[case] base: &str, #[case] rel: &str, #[case] expected: &str) {
    assert_eq!(resolve(base, rel), PathBuf::from(expected));
}

#[rstest]
#[case("/p/node_modules/abbrev", Some("abbrev"))]
#[case("/p/node_modules/@scope/pkg", Some("@scope/pkg"))]
#[case("/p/packages/foo", Some("foo"))]
fn test_name_from_folder(#[case] path: &str, #[case] expected: Option<&str>) {
    assert_eq!(name_from_folder(path).as_deref(), expected);
}

#[test]
fn test_name_from_folder_of_filesystem_root() {
    assert_eq!(name_from_folder("/"), None);
}

#[rstest]
#[case(".bin", true)]
#[case(".package-lock.json", true)]
#[case("@scope/.retired-abc", true)]
#[case("@scope/pkg", false)]
#[case("abbrev", false)]
fn test_hidden_entries(#[case] entry: &str, #[case] hidden: bool) {
    assert_eq!(is_hidden_entry(entry), hidden);
}

#[test]
fn test_node_modules_name_takes_last_segment() {
    assert_eq!(
        node_modules_name("/p/node_modules/a/node_modules/b").as_deref(),
        Some("b")
    );
}

#[test]
fn test_walk_up_starts_at_self() {
    let visited: Vec<&Path> = walk_up(Path::new("/a/b/c")).collect();
    assert_eq!(
        visited,
        vec![Path::new("/a/b/c"), Path::new("/a/b"), Path::new("/a"), Path::new("/")]
    );
}

#[test]
fn test_nearest_common_ancestor() {
    assert_eq!(
        nearest_common_ancestor("/home/u/project", "/home/u/linked/pkg"),
        Some(PathBuf::from("/home/u"))
    );
    assert_eq!(
        nearest_common_ancestor("/home/u/project", "/home/u/project/node_modules/a"),
        Some(PathBuf::from("/home/u/project"))
    );
}

#[test]
fn test_is_within_is_segment_aware() {
    assert!(is_within("/foo", "/foo/bar"));
    assert!(is_within("/foo", "/foo"));
    assert!(!is_within("/foo", "/foo-bar"));
}
