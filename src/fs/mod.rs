// src/fs/mod.rs

//! Stat / readdir capability consumed by the engine.
//!
//! Errors are plain `std::io::Error`s so the engine can tell vanished
//! entries and permission problems apart from real failures.

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    /// Metadata of `path`, following symlinks.
    fn stat(&self, path: &Path) -> io::Result<Metadata>;

    /// Metadata of `path` itself, without following a final symlink.
    fn lstat(&self, path: &Path) -> io::Result<Metadata>;

    /// Base names of the entries in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Fully resolved real path.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    Other,
}

/// Snapshot of the attributes the engine looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub kind: FileKind,
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Unix permission bits, when the platform has them.
    pub mode: Option<u32>,
}

impl Metadata {
    pub fn file(size: u64) -> Self {
        Self {
            kind: FileKind::File,
            size,
            modified: None,
            mode: None,
        }
    }

    pub fn dir() -> Self {
        Self {
            kind: FileKind::Dir,
            size: 0,
            modified: None,
            mode: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }

    /// Owner read bit. Entries without permission bits count as readable.
    pub fn is_readable(&self) -> bool {
        match self.mode {
            Some(mode) => mode & 0o400 != 0,
            None => true,
        }
    }
}

impl From<fs::Metadata> for Metadata {
    fn from(meta: fs::Metadata) -> Self {
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Dir
        } else if file_type.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };

        Self {
            kind,
            size: meta.len(),
            modified: meta.modified().ok(),
            mode: permission_bits(&meta),
        }
    }
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_bits(_meta: &fs::Metadata) -> Option<u32> {
    None
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn stat(&self, path: &Path) -> io::Result<Metadata> {
        fs::metadata(path).map(Metadata::from)
    }

    fn lstat(&self, path: &Path) -> io::Result<Metadata> {
        fs::symlink_metadata(path).map(Metadata::from)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_fs_reports_kinds_and_sorted_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();

        let fs = RealFileSystem;
        assert_eq!(fs.read_dir(dir.path()).unwrap(), vec!["a", "b.txt"]);

        let file = fs.stat(&dir.path().join("b.txt")).unwrap();
        assert!(file.is_file());
        assert_eq!(file.size, 5);
        assert!(fs.stat(&dir.path().join("a")).unwrap().is_dir());

        let err = fs.stat(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn mode_controls_readability() {
        let mut meta = Metadata::file(1);
        assert!(meta.is_readable());
        meta.mode = Some(0o200);
        assert!(!meta.is_readable());
        meta.mode = Some(0o644);
        assert!(meta.is_readable());
    }
}
