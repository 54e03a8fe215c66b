// src/fs/mock.rs

use super::{FileKind, FileSystem, Metadata};
use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

const MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { content: Vec<u8>, mode: u32 },
    Dir { mode: u32 },
    Symlink(PathBuf),
}

/// In-memory filesystem for deterministic engine tests.
///
/// Paths are expected to be absolute. Parent directories are created
/// implicitly. Clones share the same tree, so a test can keep a handle and
/// mutate the filesystem while a watcher reads from it.
#[derive(Debug, Clone)]
pub struct MockFileSystem {
    entries: Arc<Mutex<BTreeMap<PathBuf, MockEntry>>>,
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(PathBuf::from("/"), MockEntry::Dir { mode: 0o755 });
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, MockEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut entries = self.lock();
        ensure_dir(&mut entries, path.as_ref());
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut entries = self.lock();
        if let Some(parent) = path.parent() {
            ensure_dir(&mut entries, parent);
        }
        entries.insert(
            path.to_path_buf(),
            MockEntry::File {
                content: content.into(),
                mode: 0o644,
            },
        );
    }

    /// Append to a file, creating it when missing.
    pub fn append(&self, path: impl AsRef<Path>, content: impl AsRef<[u8]>) {
        let path = path.as_ref();
        let mut entries = self.lock();
        if let Some(MockEntry::File { content: existing, .. }) = entries.get_mut(path) {
            existing.extend_from_slice(content.as_ref());
            return;
        }
        if let Some(parent) = path.parent() {
            ensure_dir(&mut entries, parent);
        }
        entries.insert(
            path.to_path_buf(),
            MockEntry::File {
                content: content.as_ref().to_vec(),
                mode: 0o644,
            },
        );
    }

    pub fn add_symlink(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) {
        let link = link.as_ref();
        let mut entries = self.lock();
        if let Some(parent) = link.parent() {
            ensure_dir(&mut entries, parent);
        }
        entries.insert(
            link.to_path_buf(),
            MockEntry::Symlink(target.as_ref().to_path_buf()),
        );
    }

    /// Remove an entry and, for directories, everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut entries = self.lock();
        entries.retain(|p, _| !p.starts_with(path));
    }

    pub fn set_mode(&self, path: impl AsRef<Path>, new_mode: u32) {
        let mut entries = self.lock();
        match entries.get_mut(path.as_ref()) {
            Some(MockEntry::File { mode, .. }) | Some(MockEntry::Dir { mode }) => {
                *mode = new_mode;
            }
            _ => {}
        }
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.lock().contains_key(path.as_ref())
    }
}

fn ensure_dir(entries: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
    let mut current = PathBuf::new();
    for component in path.components() {
        current.push(component);
        entries
            .entry(current.clone())
            .or_insert(MockEntry::Dir { mode: 0o755 });
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such entry: {}", path.display()))
}

/// Resolve symlinks in every component of `path`; the last one only when
/// `follow_last` is set.
fn resolve(
    entries: &BTreeMap<PathBuf, MockEntry>,
    path: &Path,
    follow_last: bool,
    hops: usize,
) -> io::Result<PathBuf> {
    if hops > MAX_SYMLINK_HOPS {
        return Err(io::Error::other(format!(
            "too many levels of symbolic links: {}",
            path.display()
        )));
    }

    let components: Vec<Component<'_>> = path.components().collect();
    let mut current = PathBuf::new();

    for (i, component) in components.iter().enumerate() {
        let last = i + 1 == components.len();
        match component {
            Component::ParentDir => {
                current.pop();
                continue;
            }
            Component::CurDir => continue,
            _ => current.push(component),
        }

        match entries.get(&current) {
            Some(MockEntry::Symlink(target)) if !last || follow_last => {
                let base = current.parent().map(Path::to_path_buf).unwrap_or_default();
                let joined = if target.is_absolute() {
                    target.clone()
                } else {
                    base.join(target)
                };
                current = resolve(entries, &joined, true, hops + 1)?;
            }
            Some(MockEntry::File { .. }) if !last => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {}", current.display()),
                ));
            }
            None if !last => return Err(not_found(&current)),
            _ => {}
        }
    }

    Ok(current)
}

fn metadata_of(entry: &MockEntry) -> Metadata {
    match entry {
        MockEntry::File { content, mode } => Metadata {
            kind: FileKind::File,
            size: content.len() as u64,
            modified: None,
            mode: Some(*mode),
        },
        MockEntry::Dir { mode } => Metadata {
            kind: FileKind::Dir,
            size: 0,
            modified: None,
            mode: Some(*mode),
        },
        MockEntry::Symlink(_) => Metadata {
            kind: FileKind::Symlink,
            size: 0,
            modified: None,
            mode: Some(0o777),
        },
    }
}

impl FileSystem for MockFileSystem {
    fn stat(&self, path: &Path) -> io::Result<Metadata> {
        let entries = self.lock();
        let real = resolve(&entries, path, true, 0)?;
        entries
            .get(&real)
            .map(metadata_of)
            .ok_or_else(|| not_found(path))
    }

    fn lstat(&self, path: &Path) -> io::Result<Metadata> {
        let entries = self.lock();
        let real = resolve(&entries, path, false, 0)?;
        entries
            .get(&real)
            .map(metadata_of)
            .ok_or_else(|| not_found(path))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let entries = self.lock();
        let real = resolve(&entries, path, true, 0)?;
        match entries.get(&real) {
            Some(MockEntry::Dir { .. }) => Ok(entries
                .keys()
                .filter(|p| p.parent() == Some(real.as_path()))
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let entries = self.lock();
        let real = resolve(&entries, path, true, 0)?;
        if entries.contains_key(&real) {
            Ok(real)
        } else {
            Err(not_found(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_parents_and_lists_children() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/src/main.rs", b"fn main() {}");
        fs.add_file("/w/README.md", b"# hi");

        assert_eq!(fs.read_dir(Path::new("/w")).unwrap(), vec!["README.md", "src"]);
        assert!(fs.stat(Path::new("/w/src")).unwrap().is_dir());
        assert_eq!(fs.stat(Path::new("/w/README.md")).unwrap().size, 4);
    }

    #[test]
    fn follows_symlinks_only_for_stat() {
        let fs = MockFileSystem::new();
        fs.add_file("/real/a.txt", b"a");
        fs.add_symlink("/w/link", "/real");

        assert!(fs.lstat(Path::new("/w/link")).unwrap().is_symlink());
        assert!(fs.stat(Path::new("/w/link")).unwrap().is_dir());
        assert_eq!(fs.read_dir(Path::new("/w/link")).unwrap(), vec!["a.txt"]);
        assert_eq!(
            fs.canonicalize(Path::new("/w/link/a.txt")).unwrap(),
            PathBuf::from("/real/a.txt")
        );
    }

    #[test]
    fn relative_symlink_targets_resolve_against_link_dir() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/data/x", b"x");
        fs.add_symlink("/w/alias", "data");
        assert_eq!(
            fs.canonicalize(Path::new("/w/alias/x")).unwrap(),
            PathBuf::from("/w/data/x")
        );
    }

    #[test]
    fn remove_drops_subtree_and_reports_not_found() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/sub/a.txt", b"a");
        fs.remove("/w/sub");

        let err = fs.stat(Path::new("/w/sub/a.txt")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(fs.read_dir(Path::new("/w/sub")).is_err());
        assert!(fs.exists("/w"));
    }

    #[test]
    fn append_grows_file() {
        let fs = MockFileSystem::new();
        fs.append("/w/log", b"hello");
        fs.append("/w/log", b"world!");
        assert_eq!(fs.stat(Path::new("/w/log")).unwrap().size, 11);
    }

    #[test]
    fn circular_links_fail_instead_of_looping() {
        let fs = MockFileSystem::new();
        fs.add_symlink("/w/a", "/w/b");
        fs.add_symlink("/w/b", "/w/a");
        assert!(fs.stat(Path::new("/w/a")).is_err());
    }
}
