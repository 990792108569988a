//! Path transforms between repository-relative and dump-root-relative forms.
//!
//! A dump indexes a sub-tree of its repository identified by `root` (a path
//! prefix, empty for whole-repository dumps). Paths stored inside the dump
//! are relative to that root; every path returned to a caller is
//! repository-relative. The two transforms here are inverses whenever the
//! repository path actually lives under the dump root.

/// Converts a repository-relative path to the dump-root-relative form stored
/// on disk. Returns `None` when the path is outside the dump's root.
#[must_use]
pub fn path_in_dump(root: &str, path: &str) -> Option<String> {
    path.strip_prefix(root).map(str::to_owned)
}

/// Converts a dump-root-relative path back to the repository-relative form.
#[must_use]
pub fn path_in_repo(root: &str, stored: &str) -> String {
    format!("{root}{stored}")
}
