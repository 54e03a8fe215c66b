// src/engine/handlers.rs

//! Filesystem-facing handlers of the core.
//!
//! - adding roots (including re-arming roots that do not exist yet)
//! - directory scans and their diff against the tree
//! - files and symlinks
//! - cascading removal
//! - raw backend notifications

use std::collections::{BTreeSet, HashSet};
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::backend::{RawEvent, RawKind, RootId, WatchMode};
use crate::engine::core::{CloserKey, RootEntry, RootKind, Stamp, WatcherCore};
use crate::engine::debounce::{ADD_THROTTLE, REMOVE_THROTTLE};
use crate::engine::{CoreCommand, Inbound, ThrottleAction};
use crate::errors::{is_missing, WatchError};
use crate::fs::Metadata;
use crate::types::{FsEventKind, WatchEvent};
use crate::watch::helper::WatchHelper;
use crate::watch::path_utils::{normalize, slash, split_parent};
use crate::watch::tree::Removal;

impl WatcherCore {
    /// Stat honouring `follow_symlinks`.
    pub(crate) fn stat_entry(&self, path: &Path) -> io::Result<Metadata> {
        if self.options.follow_symlinks {
            self.fs.stat(path)
        } else {
            self.fs.lstat(path)
        }
    }

    fn depth_allowed(&self, depth: usize) -> bool {
        self.options.depth.is_none_or(|max| depth <= max)
    }

    /// Publish an error unless it is an expected race or a tolerated
    /// permission problem.
    pub(crate) fn handle_error(&mut self, error: WatchError) {
        if error.is_not_found() {
            trace!(%error, "suppressed missing-entry error");
            return;
        }
        if error.is_permission_denied() && self.options.ignore_permission_errors {
            debug!(%error, "suppressed permission error");
            return;
        }
        warn!(%error, "watch error");
        self.out
            .push(CoreCommand::Publish(WatchEvent::Error(Arc::new(error))));
    }

    /// Resolve one request to a root, scan it and subscribe the backend.
    ///
    /// Delivers this request's readiness signals itself, directly or through
    /// the parent it re-arms.
    pub(crate) fn add_root(
        &mut self,
        path: &str,
        target: Option<String>,
        origin: Option<String>,
        initial: bool,
    ) {
        let per_target = self.signals_per_target();
        let requested = Path::new(path).to_path_buf();

        if self.ignore.is_ignored(&requested, None) {
            self.signal_ready(per_target);
            return;
        }

        let key: CloserKey = (requested, target.clone());
        if self.closers.contains_key(&key) {
            debug!(path, ?target, "already watching");
            self.signal_ready(per_target);
            return;
        }

        let helper = match WatchHelper::build(
            path,
            target.clone(),
            !self.options.disable_globbing,
            self.options.follow_symlinks,
        ) {
            Ok(helper) => helper.with_origin(origin.clone()),
            Err(error) => {
                self.handle_error(error);
                self.signal_ready(per_target);
                return;
            }
        };
        let watch_path = helper.watch_path.clone();

        let stats = match self.stat_entry(&watch_path) {
            Ok(stats) => stats,
            Err(e) if is_missing(&e) => {
                let origin = origin.unwrap_or_else(|| path.to_string());
                self.rearm_missing(&watch_path, origin, initial);
                return;
            }
            Err(e) => {
                self.handle_error(e.into());
                self.signal_ready(per_target);
                return;
            }
        };

        if self.ignore.is_ignored(&watch_path, Some(&stats)) {
            self.signal_ready(per_target);
            return;
        }

        let kind = match (&target, stats.is_dir()) {
            (Some(_), true) => RootKind::Target,
            (Some(_), false) => {
                debug!(path, "target parent is not a directory");
                self.signal_ready(per_target);
                return;
            }
            (None, true) => RootKind::Dir,
            (None, false) => RootKind::File,
        };

        let helper = Arc::new(helper);
        match kind {
            RootKind::Dir | RootKind::Target => {
                self.handle_dir(&watch_path, Some(&stats), initial, 0, target.as_deref(), &helper)
            }
            RootKind::File => self.handle_file(&watch_path, &stats, initial),
        }

        self.register_root(key, helper, kind);
        self.signal_ready(1);
    }

    /// Watch the parent of a missing path for that one entry.
    fn rearm_missing(&mut self, missing: &Path, origin: String, initial: bool) {
        match split_parent(missing) {
            Some((parent, name)) => {
                debug!(missing = %missing.display(), %origin, "path missing; watching parent");
                self.add_root(&slash(&parent), Some(name), Some(origin), initial);
            }
            None => self.signal_ready(self.signals_per_target()),
        }
    }

    fn register_root(&mut self, key: CloserKey, helper: Arc<WatchHelper>, kind: RootKind) {
        let root = self.next_root_id();

        let (path, mode) = match kind {
            RootKind::Dir if self.options.depth == Some(0) => {
                (helper.watch_path.clone(), WatchMode::NonRecursive)
            }
            RootKind::Dir => (helper.watch_path.clone(), WatchMode::Recursive),
            RootKind::File => (
                helper
                    .watch_path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| helper.watch_path.clone()),
                WatchMode::NonRecursive,
            ),
            RootKind::Target => (helper.watch_path.clone(), WatchMode::NonRecursive),
        };

        debug!(%root, path = %path.display(), ?kind, "registered root");
        self.roots.insert(root, RootEntry { helper, kind });
        self.closers.insert(key, root);

        if self.options.persistent {
            self.awaiting_backend.insert(root);
            self.out
                .push(CoreCommand::StartBackend { root, path, mode });
        }
    }

    pub(crate) fn handle_dir(
        &mut self,
        dir: &Path,
        stats: Option<&Metadata>,
        initial: bool,
        depth: usize,
        target: Option<&str>,
        helper: &Arc<WatchHelper>,
    ) {
        if let Some((parent, name)) = split_parent(dir) {
            let tracked = self.tree.has(&parent, &name);
            let announce = !(initial && self.options.ignore_initial) && target.is_none() && !tracked;
            if announce && helper.glob_matches(dir) {
                self.emit(FsEventKind::AddDir, dir, stats.cloned());
            }
            self.tree.add(&parent, &name);
        }
        self.tree.get(dir);

        if self.depth_allowed(depth) {
            self.handle_read(dir, initial, depth, target, helper);
        }
    }

    /// Read `dir` and reconcile it with the tree.
    pub(crate) fn handle_read(
        &mut self,
        dir: &Path,
        initial: bool,
        depth: usize,
        target: Option<&str>,
        helper: &Arc<WatchHelper>,
    ) {
        let names = match self.fs.read_dir(dir) {
            Ok(names) => names,
            Err(e) => {
                self.handle_error(e.into());
                return;
            }
        };

        let previous: BTreeSet<String> = self.tree.children(dir).into_iter().collect();
        let mut current: HashSet<String> = HashSet::new();

        for name in names {
            if name == "." || name == ".." {
                continue;
            }
            let path = dir.join(&name);
            let stats = match self.fs.lstat(&path) {
                Ok(stats) => stats,
                Err(e) => {
                    self.handle_error(e.into());
                    continue;
                }
            };

            let accepted = if stats.is_dir() {
                helper.filter_dir(&path, Some(&stats), &mut self.ignore)
            } else {
                helper.filter_path(
                    &path,
                    Some(&stats),
                    &mut self.ignore,
                    self.options.ignore_permission_errors,
                )
            };
            if !accepted {
                continue;
            }
            current.insert(name.clone());

            if stats.is_symlink() && self.handle_symlink(dir, &name, &path, &stats, initial, helper) {
                continue;
            }

            let wanted = match target {
                Some(t) => name == t,
                None => !previous.contains(&name),
            };
            if wanted {
                self.add_entry(&path, initial, helper, depth + 1);
            }
        }

        for name in previous {
            if current.contains(&name) {
                continue;
            }
            let path = dir.join(&name);
            if helper.has_glob
                && !helper.filter_path(&path, None, &mut self.ignore, self.options.ignore_permission_errors)
            {
                continue;
            }
            self.remove(dir, &name);
        }
    }

    /// Add an entry found while reading a directory.
    fn add_entry(&mut self, path: &Path, initial: bool, helper: &Arc<WatchHelper>, depth: usize) {
        if self.ignore.is_ignored(path, None) {
            return;
        }
        let stats = match self.stat_entry(path) {
            Ok(stats) => stats,
            Err(e) => {
                self.handle_error(e.into());
                return;
            }
        };
        if self.ignore.is_ignored(path, Some(&stats)) {
            return;
        }

        if stats.is_dir() {
            self.handle_dir(path, Some(&stats), initial, depth, None, helper);
        } else {
            self.handle_file(path, &stats, initial);
        }
    }

    pub(crate) fn handle_file(&mut self, file: &Path, stats: &Metadata, initial: bool) {
        let Some((dir, name)) = split_parent(file) else {
            return;
        };
        if self.tree.has(&dir, &name) {
            return;
        }
        self.tree.add(&dir, &name);
        self.stamps.insert(file.to_path_buf(), Stamp::of(stats));

        if initial && self.options.ignore_initial {
            return;
        }
        if !self.throttle(ThrottleAction::Add, file, ADD_THROTTLE) {
            return;
        }
        self.emit(FsEventKind::Add, file, Some(stats.clone()));
    }

    /// Returns true when the symlink was fully handled and must not be
    /// added as a regular entry.
    fn handle_symlink(
        &mut self,
        dir: &Path,
        name: &str,
        path: &Path,
        stats: &Metadata,
        initial: bool,
        helper: &Arc<WatchHelper>,
    ) -> bool {
        let resolved = self.fs.canonicalize(path).ok();

        if !self.options.follow_symlinks {
            if self.tree.has(dir, name) {
                if self.symlink_paths.get(path) != Some(&resolved) {
                    self.symlink_paths.insert(path.to_path_buf(), resolved);
                    self.emit(FsEventKind::Change, path, Some(stats.clone()));
                }
            } else {
                self.tree.add(dir, name);
                self.symlink_paths.insert(path.to_path_buf(), resolved);
                if !(initial && self.options.ignore_initial) {
                    self.emit(FsEventKind::Add, path, Some(stats.clone()));
                }
            }
            return true;
        }

        // Each link is followed once.
        if self.symlink_paths.contains_key(path) {
            return true;
        }

        if let Some(real) = &resolved {
            let target_is_dir = self.fs.stat(real).is_ok_and(|s| s.is_dir());
            if target_is_dir && self.loops_back(dir, real, helper) {
                debug!(link = %path.display(), target = %real.display(), "symlink cycle; not descending");
                self.symlink_paths.insert(path.to_path_buf(), resolved.clone());
                if !self.tree.has(dir, name) {
                    self.tree.add(dir, name);
                    if !(initial && self.options.ignore_initial) {
                        let target_stats = self.fs.stat(real).ok();
                        self.emit(FsEventKind::AddDir, path, target_stats);
                    }
                }
                return true;
            }
        }

        self.symlink_paths.insert(path.to_path_buf(), resolved);
        false
    }

    /// Does `real` resolve to `dir` or one of its ancestors within the root?
    fn loops_back(&self, dir: &Path, real: &Path, helper: &WatchHelper) -> bool {
        let mut current = Some(dir);
        while let Some(d) = current {
            if let Ok(real_d) = self.fs.canonicalize(d) {
                if real_d.starts_with(real) {
                    return true;
                }
            }
            if d == helper.watch_path {
                break;
            }
            current = d.parent();
        }
        false
    }

    /// Remove `dir/item` and everything tracked below it.
    pub(crate) fn remove(&mut self, dir: &Path, item: &str) {
        let path = dir.join(item);
        let is_dir = self.tree.contains_dir(&path);

        if !self.throttle(ThrottleAction::Remove, &path, REMOVE_THROTTLE) {
            return;
        }

        // The only watched file went away: wait for it to come back.
        if !is_dir && self.tree.len() == 1 {
            self.out.push(CoreCommand::Defer(Inbound::Add {
                paths: vec![slash(dir)],
                target: Some(item.to_string()),
                internal: true,
            }));
        }

        for child in self.tree.children(&path) {
            self.remove(&path, &child);
        }

        let was_tracked = self.tree.has(dir, item);
        self.detach_entry(dir, item);

        self.tree.forget(&path);
        self.stamps.remove(&path);
        self.symlink_paths.remove(&path);

        let held_add = self.pending_writes.cancel(&path) == Some(FsEventKind::Add);

        if was_tracked && !held_add && !self.ignore.is_ignored(&path, None) {
            let kind = if is_dir {
                FsEventKind::UnlinkDir
            } else {
                FsEventKind::Unlink
            };
            self.emit(kind, &path, None);
        }

        self.close_path(&path);
    }

    /// Stop every root registered for exactly `path`.
    pub(crate) fn close_path(&mut self, path: &Path) {
        let keys: Vec<CloserKey> = self
            .closers
            .keys()
            .filter(|(p, _)| p == path)
            .cloned()
            .collect();
        if keys.is_empty() {
            return;
        }

        for key in keys {
            if let Some(root) = self.closers.remove(&key) {
                self.close_root(root);
            }
        }

        if let Some((parent, name)) = split_parent(path) {
            self.detach_entry(&parent, &name);
        }
    }

    /// Drop `item` from its parent's listing, probing the parent once it
    /// has no children left.
    pub(crate) fn detach_entry(&mut self, dir: &Path, item: &str) {
        if self.tree.remove(dir, item) == Removal::Emptied {
            self.out.push(CoreCommand::Defer(Inbound::ProbeDir {
                dir: dir.to_path_buf(),
            }));
        }
    }

    fn close_root(&mut self, root: RootId) {
        self.closers.retain(|_, id| *id != root);
        if self.roots.remove(&root).is_some() {
            self.awaiting_backend.remove(&root);
            if self.options.persistent {
                self.out.push(CoreCommand::StopBackend { root });
            }
        }
    }

    /// Re-check an emptied directory; gone means removing it too.
    pub(crate) fn probe_dir(&mut self, dir: &Path) {
        if self.fs.read_dir(dir).is_ok() {
            return;
        }
        if let Some((parent, name)) = split_parent(dir) {
            debug!(dir = %dir.display(), "emptied directory vanished");
            self.remove(&parent, &name);
        }
    }

    /// Normalize one backend notification against the tree.
    pub(crate) fn on_raw(&mut self, event: RawEvent) {
        if self.closed {
            return;
        }
        self.out
            .push(CoreCommand::Publish(WatchEvent::Raw(event.clone())));

        let Some(entry) = self.roots.get(&event.root) else {
            trace!(root = %event.root, "raw event for a closed root");
            return;
        };
        let helper = Arc::clone(&entry.helper);
        let kind = entry.kind;

        let path = normalize(&helper.entry_path(&event.path, self.fs.as_ref()));

        let in_scope = match kind {
            RootKind::Target => helper.target_path().is_some_and(|t| t == path),
            RootKind::File => path == helper.watch_path,
            RootKind::Dir => path.starts_with(&helper.watch_path),
        };
        if !in_scope {
            return;
        }

        let depth = helper.depth_of(&path).unwrap_or(0);
        if kind == RootKind::Dir {
            if let Some(max) = self.options.depth {
                if depth > max + 1 {
                    return;
                }
            }
        }

        if self.ignore.is_ignored(&path, None) {
            return;
        }
        let Some((dir, name)) = split_parent(&path) else {
            return;
        };

        let stats = match self.stat_entry(&path) {
            Ok(stats) => stats,
            Err(e) if is_missing(&e) => {
                if self.tree.has(&dir, &name) || self.tree.contains_dir(&path) {
                    self.remove(&dir, &name);
                }
                return;
            }
            Err(e) => {
                self.handle_error(e.into());
                return;
            }
        };

        if self.ignore.is_ignored(&path, Some(&stats)) {
            return;
        }

        // New entries only count inside directories the scan accepted.
        if kind == RootKind::Dir
            && path != helper.watch_path
            && dir != helper.watch_path
            && !self.tree.contains_dir(&dir)
        {
            trace!(path = %path.display(), "parent not watched");
            return;
        }

        if stats.is_dir() {
            if kind == RootKind::Target {
                self.target_appeared_as_dir(event.root, &helper, &path);
                return;
            }
            let known = path == helper.watch_path || self.tree.has(&dir, &name);
            if known {
                if self.depth_allowed(depth) {
                    self.handle_read(&path, false, depth, None, &helper);
                }
            } else if helper.filter_dir(&path, Some(&stats), &mut self.ignore) {
                self.handle_dir(&path, Some(&stats), false, depth, None, &helper);
            }
        } else if stats.is_symlink() {
            if helper.filter_path(&path, Some(&stats), &mut self.ignore, self.options.ignore_permission_errors) {
                self.handle_symlink(&dir, &name, &path, &stats, false, &helper);
            }
        } else if self.tree.has(&dir, &name) {
            self.file_changed(&path, stats, event.kind);
        } else if kind != RootKind::Dir
            || helper.filter_path(&path, Some(&stats), &mut self.ignore, self.options.ignore_permission_errors)
        {
            self.handle_file(&path, &stats, false);
        }
    }

    /// A tracked file was touched; emit `change` for real modifications.
    fn file_changed(&mut self, path: &Path, stats: Metadata, raw: RawKind) {
        let stamp = Stamp::of(&stats);
        let moved = self.stamps.insert(path.to_path_buf(), stamp) != Some(stamp);
        if raw == RawKind::Modify || moved {
            self.emit(FsEventKind::Change, path, Some(stats));
        }
    }

    /// The watched-for entry is a directory: watch the original request.
    fn target_appeared_as_dir(&mut self, root: RootId, helper: &WatchHelper, path: &Path) {
        let request = helper.origin.clone().unwrap_or_else(|| slash(path));
        debug!(path = %path.display(), %request, "awaited path appeared");
        self.close_root(root);
        self.add_paths(vec![request], None, true);
    }
}
