// src/watch/tree.rs

//! Watched-directory tree.
//!
//! A flat map from absolute directory path to the base names known to live
//! in it. Nodes are created lazily on first access and never hold `.` or
//! `..`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone)]
pub struct DirNode {
    items: BTreeSet<String>,
}

impl DirNode {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }
}

/// Outcome of [`WatchedDirs::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Kept,
    /// The node has no children left; the caller should probe whether the
    /// directory itself still exists.
    Emptied,
}

#[derive(Debug, Default)]
pub struct WatchedDirs {
    nodes: HashMap<PathBuf, DirNode>,
}

impl WatchedDirs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node for `dir`, created when missing.
    pub fn get(&mut self, dir: &Path) -> &mut DirNode {
        self.nodes.entry(dir.to_path_buf()).or_default()
    }

    pub fn add(&mut self, dir: &Path, name: &str) {
        if name == "." || name == ".." {
            return;
        }
        self.get(dir).items.insert(name.to_string());
    }

    pub fn remove(&mut self, dir: &Path, name: &str) -> Removal {
        let Some(node) = self.nodes.get_mut(dir) else {
            return Removal::Kept;
        };
        if node.items.remove(name) && node.items.is_empty() {
            Removal::Emptied
        } else {
            Removal::Kept
        }
    }

    pub fn has(&self, dir: &Path, name: &str) -> bool {
        self.nodes
            .get(dir)
            .is_some_and(|node| node.items.contains(name))
    }

    /// Sorted child names of `dir`; empty when the node does not exist.
    pub fn children(&self, dir: &Path) -> Vec<String> {
        self.nodes
            .get(dir)
            .map(|node| node.items.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains_dir(&self, dir: &Path) -> bool {
        self.nodes.contains_key(dir)
    }

    /// Drop the node for `dir` (not its parent's reference to it).
    pub fn forget(&mut self, dir: &Path) {
        self.nodes.remove(dir);
    }

    /// Drop `dir` and every node below it.
    pub fn forget_tree(&mut self, dir: &Path) {
        self.nodes.retain(|path, _| !path.starts_with(dir));
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sorted copy of the whole tree.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<String>> {
        self.nodes
            .iter()
            .map(|(dir, node)| (dir.clone(), node.items.iter().cloned().collect()))
            .collect()
    }
}
