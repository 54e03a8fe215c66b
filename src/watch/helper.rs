// src/watch/helper.rs

//! Per-root watch helpers.
//!
//! A [`WatchHelper`] is built once for every resolved watch root and carries
//! the predicates the engine uses to decide which entries under that root
//! are reported.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use globset::GlobMatcher;

use crate::errors::Result;
use crate::fs::{FileSystem, Metadata};
use crate::watch::ignore::IgnoreMatcher;
use crate::watch::path_utils::{depth_below, relative, slash};
use crate::watch::patterns::{compile_glob, is_glob, segment_matches, split_glob};

/// Real-path prefix that backends may report for an aliased root.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rewrite {
    real: PathBuf,
    alias: PathBuf,
}

#[derive(Debug)]
pub struct WatchHelper {
    /// Requested path or glob, slash-normalized.
    pub path: String,
    /// Directory (or file) handed to the backend.
    pub watch_path: PathBuf,
    pub has_glob: bool,
    pub follow_symlinks: bool,
    /// Base name of the single entry watched for under `watch_path`.
    pub target: Option<String>,
    /// Request this helper stands in for while `target` does not exist.
    pub origin: Option<String>,
    glob_filter: Option<GlobMatcher>,
    dir_parts: Vec<String>,
    rewrite: OnceLock<Option<Rewrite>>,
}

impl WatchHelper {
    /// `path` is expected to be absolute already. Globbing only applies when
    /// it is enabled and `path` carries glob metacharacters.
    pub fn build(
        path: &str,
        target: Option<String>,
        globbing: bool,
        follow_symlinks: bool,
    ) -> Result<Self> {
        let path = slash(Path::new(path.strip_prefix("./").unwrap_or(path)));

        let (watch_path, has_glob) = if globbing && is_glob(&path) {
            let (prefix, _) = split_glob(&path);
            let prefix = if prefix.is_empty() { ".".to_string() } else { prefix };
            (PathBuf::from(prefix), true)
        } else {
            (PathBuf::from(&path), false)
        };

        let (glob_filter, dir_parts) = if has_glob {
            let matcher = compile_glob(&path)?;
            let mut parts: Vec<String> = slash(&relative(&watch_path, Path::new(&path)))
                .split('/')
                .map(str::to_string)
                .collect();
            if parts.len() > 1 {
                parts.pop();
            }
            (Some(matcher), parts)
        } else {
            (None, Vec::new())
        };

        Ok(Self {
            path,
            watch_path,
            has_glob,
            follow_symlinks,
            target,
            origin: None,
            glob_filter,
            dir_parts,
            rewrite: OnceLock::new(),
        })
    }

    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    /// Full path of the watched-for entry, for helpers with a target.
    pub fn target_path(&self) -> Option<PathBuf> {
        self.target.as_ref().map(|name| self.watch_path.join(name))
    }

    /// True when globbing is off or `path` matches the glob.
    pub fn glob_matches(&self, path: &Path) -> bool {
        self.glob_filter
            .as_ref()
            .is_none_or(|m| m.is_match(slash(path)))
    }

    /// Whether a non-directory entry under this root should be reported.
    pub fn filter_path(
        &self,
        entry: &Path,
        stats: Option<&Metadata>,
        ignore: &mut IgnoreMatcher,
        ignore_permission_errors: bool,
    ) -> bool {
        if stats.is_some_and(Metadata::is_symlink) {
            return self.filter_dir(entry, stats, ignore);
        }

        self.glob_matches(entry)
            && !ignore.is_ignored(entry, stats)
            && (ignore_permission_errors || stats.is_none_or(Metadata::is_readable))
    }

    /// Directory prefilter: could anything below `entry` still match?
    pub fn filter_dir(
        &self,
        entry: &Path,
        stats: Option<&Metadata>,
        ignore: &mut IgnoreMatcher,
    ) -> bool {
        if self.has_glob {
            let rel = slash(&relative(&self.watch_path, entry));
            let entry_parts: Vec<&str> = rel.split('/').collect();

            let mut globstar = false;
            let matched = self.dir_parts.iter().enumerate().all(|(i, part)| {
                if part == "**" {
                    globstar = true;
                }
                globstar
                    || entry_parts.get(i).is_none_or(|seg| seg.is_empty())
                    || entry_parts
                        .get(i)
                        .is_some_and(|seg| segment_matches(part, seg))
            });
            if !matched {
                return false;
            }
        }
        !ignore.is_ignored(entry, stats)
    }

    /// Map a path reported by a backend back under the requested root.
    ///
    /// Backends may report the resolved location of a symlinked root. The
    /// first call decides the real-to-alias rewrite once; every later call
    /// reuses it.
    pub fn entry_path(&self, raw: &Path, fs: &dyn FileSystem) -> PathBuf {
        let rule = self.rewrite.get_or_init(|| {
            if !self.follow_symlinks {
                return None;
            }
            match fs.canonicalize(&self.watch_path) {
                Ok(real) if real != self.watch_path => Some(Rewrite {
                    real,
                    alias: self.watch_path.clone(),
                }),
                _ => None,
            }
        });

        match rule {
            Some(Rewrite { real, alias }) => match raw.strip_prefix(real) {
                Ok(rest) if rest.as_os_str().is_empty() => alias.clone(),
                Ok(rest) => alias.join(rest),
                Err(_) => raw.to_path_buf(),
            },
            None => raw.to_path_buf(),
        }
    }

    /// Depth of `entry` below the watch root, if it lives under it.
    pub fn depth_of(&self, entry: &Path) -> Option<usize> {
        depth_below(&self.watch_path, entry)
    }
}
