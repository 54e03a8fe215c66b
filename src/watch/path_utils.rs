// src/watch/path_utils.rs

//! Lexical path helpers shared by the matcher, resolver and engine.
//!
//! None of these touch the filesystem: symlinks are resolved through the
//! [`FileSystem`](crate::fs::FileSystem) capability where it matters.

use std::path::{Component, Path, PathBuf};

/// Path as a string with forward slashes, so patterns behave the same on
/// every platform.
pub fn slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Collapse `.` and `..` components without consulting the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !path.is_absolute() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Absolute, normalized form of `path`, with relative input taken from `base`.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// Relative path leading from directory `from` to `to`.
///
/// Both are expected to be absolute. Returns an empty path when they are
/// equal.
pub fn relative(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to[common..] {
        out.push(component);
    }
    out
}

/// Split into parent directory and base name.
///
/// `None` for filesystem roots, which have no name.
pub fn split_parent(path: &Path) -> Option<(PathBuf, String)> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    let parent = path.parent()?.to_path_buf();
    Some((parent, name))
}

/// Number of components of `path` below `root`, or `None` when `path` is
/// not inside `root`.
pub fn depth_below(root: &Path, path: &Path) -> Option<usize> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.components().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("a/../..")), PathBuf::from(".."));
        assert_eq!(normalize(Path::new("./")), PathBuf::from("."));
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn resolve_only_joins_relative_paths() {
        let base = Path::new("/work");
        assert_eq!(resolve(base, Path::new("src")), PathBuf::from("/work/src"));
        assert_eq!(resolve(base, Path::new("/etc/x")), PathBuf::from("/etc/x"));
        assert_eq!(resolve(base, Path::new("../up")), PathBuf::from("/up"));
    }

    #[test]
    fn relative_walks_up_and_down() {
        let cwd = Path::new("/work/project");
        assert_eq!(relative(cwd, Path::new("/work/project/a/b")), PathBuf::from("a/b"));
        assert_eq!(relative(cwd, Path::new("/work")), PathBuf::from(".."));
        assert_eq!(relative(cwd, Path::new("/work/other/x")), PathBuf::from("../other/x"));
        assert_eq!(relative(cwd, cwd), PathBuf::new());
    }

    #[test]
    fn split_parent_and_depth() {
        assert_eq!(
            split_parent(Path::new("/a/b.txt")),
            Some((PathBuf::from("/a"), "b.txt".to_string()))
        );
        assert_eq!(split_parent(Path::new("/")), None);

        let root = Path::new("/w");
        assert_eq!(depth_below(root, Path::new("/w")), Some(0));
        assert_eq!(depth_below(root, Path::new("/w/a/b")), Some(2));
        assert_eq!(depth_below(root, Path::new("/x/a")), None);
    }
}
