// src/engine/core.rs

//! Pure core state machine.
//!
//! [`WatcherCore`] consumes [`Inbound`] messages and produces:
//! - an updated engine state (tree, ignore set, pending tables)
//! - a list of [`CoreCommand`]s describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - reading messages from the channel
//! - driving the backend and the timers
//! - fanning published events out to subscribers
//!
//! The core performs filesystem reads through the [`FileSystem`] capability
//! only, so it can be unit tested against an in-memory filesystem with a
//! manual clock.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tracing::{debug, info};

use crate::backend::RootId;
use crate::config::WatchOptions;
use crate::engine::debounce::{PendingUnlinks, PendingWrites, Throttles};
use crate::engine::{CoreCommand, CoreStep, Inbound, WatchedSnapshot};
use crate::fs::{FileSystem, Metadata};
use crate::types::WatchEvent;
use crate::watch::helper::WatchHelper;
use crate::watch::ignore::{contents_entry, raw_entry, IgnoreMatcher};
use crate::watch::path_utils::{relative, resolve, slash, split_parent};
use crate::watch::tree::WatchedDirs;

/// What a root's backend subscription covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// A directory (or glob prefix) and everything below it.
    Dir,
    /// A single file, watched through its parent directory.
    File,
    /// A parent directory, for one entry that does not exist yet.
    Target,
}

#[derive(Debug, Clone)]
pub struct RootEntry {
    pub helper: Arc<WatchHelper>,
    pub kind: RootKind,
}

/// Size and mtime of a tracked file, to tell real changes from echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl Stamp {
    pub fn of(stats: &Metadata) -> Self {
        Self {
            size: stats.size,
            modified: stats.modified,
        }
    }
}

#[derive(Debug, Default)]
pub struct Readiness {
    expected: usize,
    received: usize,
    emitted: bool,
}

impl Readiness {
    pub fn expect(&mut self, signals: usize) {
        self.expected += signals;
    }

    /// Record signals; true exactly once, when the count is first reached.
    pub fn signal(&mut self, signals: usize) -> bool {
        self.received += signals;
        if !self.emitted && self.received >= self.expected {
            self.emitted = true;
            return true;
        }
        false
    }

    pub fn is_ready(&self) -> bool {
        self.emitted
    }
}

/// Key of a root subscription: requested path plus optional target name.
pub type CloserKey = (PathBuf, Option<String>);

/// Pure engine state.
///
/// It has **no** channels, no Tokio types, and never sleeps.
#[derive(Debug)]
pub struct WatcherCore {
    pub(crate) options: WatchOptions,
    pub(crate) fs: Arc<dyn FileSystem>,
    /// Absolute base for relative requests: `cwd`, or the process cwd.
    pub(crate) base: PathBuf,
    pub(crate) tree: WatchedDirs,
    pub(crate) ignore: IgnoreMatcher,
    pub(crate) roots: HashMap<RootId, RootEntry>,
    pub(crate) closers: HashMap<CloserKey, RootId>,
    next_root: u64,
    pub(crate) awaiting_backend: HashSet<RootId>,
    pub(crate) throttles: Throttles,
    pub(crate) pending_unlinks: PendingUnlinks,
    pub(crate) pending_writes: PendingWrites,
    /// Symlink path → resolved target seen last time.
    pub(crate) symlink_paths: HashMap<PathBuf, Option<PathBuf>>,
    pub(crate) stamps: HashMap<PathBuf, Stamp>,
    pub(crate) readiness: Readiness,
    pub(crate) closed: bool,
    pub(crate) now: Instant,
    pub(crate) out: Vec<CoreCommand>,
}

impl WatcherCore {
    pub fn new(options: WatchOptions, fs: Arc<dyn FileSystem>, base: PathBuf, now: Instant) -> Self {
        let ignore = IgnoreMatcher::new(
            &options.ignored,
            options.cwd.as_ref().map(|_| base.as_path()),
            options.skips_transient_files(),
        );

        Self {
            options,
            fs,
            base,
            tree: WatchedDirs::new(),
            ignore,
            roots: HashMap::new(),
            closers: HashMap::new(),
            next_root: 0,
            awaiting_backend: HashSet::new(),
            throttles: Throttles::default(),
            pending_unlinks: PendingUnlinks::default(),
            pending_writes: PendingWrites::default(),
            symlink_paths: HashMap::new(),
            stamps: HashMap::new(),
            readiness: Readiness::default(),
            closed: false,
            now,
            out: Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// Handle a single message at time `now`, updating state and returning
    /// the resulting commands for the IO shell.
    pub fn step(&mut self, msg: Inbound, now: Instant) -> CoreStep {
        self.now = now;

        let keep_running = match msg {
            Inbound::Raw(event) => {
                self.on_raw(event);
                !self.closed
            }
            Inbound::Close => {
                self.close();
                false
            }
            _ if self.closed => false,
            Inbound::Add {
                paths,
                target,
                internal,
            } => {
                self.add_paths(paths, target, internal);
                true
            }
            Inbound::Unwatch { paths } => {
                self.unwatch(paths);
                true
            }
            Inbound::BackendReady { root } => {
                if self.awaiting_backend.remove(&root) {
                    self.signal_ready(1);
                }
                true
            }
            Inbound::BackendError { root, error } => {
                self.handle_error(error);
                if let Some(root) = root {
                    if self.awaiting_backend.remove(&root) {
                        self.signal_ready(1);
                    }
                }
                true
            }
            Inbound::Timer(timer) => {
                self.on_timer(timer);
                true
            }
            Inbound::ProbeDir { dir } => {
                self.probe_dir(&dir);
                true
            }
        };

        CoreStep {
            commands: std::mem::take(&mut self.out),
            keep_running,
        }
    }

    /// Signals each request contributes to the readiness counter.
    pub(crate) fn signals_per_target(&self) -> usize {
        if self.options.persistent { 2 } else { 1 }
    }

    pub(crate) fn signal_ready(&mut self, signals: usize) {
        if self.readiness.signal(signals) {
            info!("initial scan complete; watcher ready");
            self.out.push(CoreCommand::Publish(WatchEvent::Ready));
        }
    }

    pub(crate) fn next_root_id(&mut self) -> RootId {
        self.next_root += 1;
        RootId(self.next_root)
    }

    /// Absolute, slash-normalized form of a user request.
    pub(crate) fn resolve_request(&self, raw: &str) -> String {
        slash(&resolve(&self.base, Path::new(raw)))
    }

    pub(crate) fn add_paths(&mut self, paths: Vec<String>, target: Option<String>, internal: bool) {
        let mut requests = Vec::new();

        for raw in paths {
            if let Some(negated) = raw.strip_prefix('!') {
                let path = self.resolve_request(negated);
                debug!(%path, "ignoring negated request");
                self.ignore.insert(path);
            } else {
                let path = self.resolve_request(&raw);
                // Re-adding a previously ignored path stops ignoring it.
                self.ignore.forget(&path);
                requests.push(path);
            }
        }

        self.readiness
            .expect(requests.len() * self.signals_per_target());

        for path in requests {
            self.add_root(&path, target.clone(), None, !internal);
        }
    }

    pub(crate) fn unwatch(&mut self, paths: Vec<String>) {
        for raw in paths {
            let path = resolve(&self.base, Path::new(&raw));
            info!(path = %path.display(), "unwatching");

            self.close_path(&path);
            if let Some((parent, name)) = split_parent(&path) {
                self.detach_entry(&parent, &name);
            }
            self.tree.forget_tree(&path);

            // Nothing already in flight may report on the subtree.
            self.throttles.forget_tree(&path);
            self.pending_unlinks.forget_tree(&path);
            self.pending_writes.forget_tree(&path);
            self.stamps.retain(|p, _| !p.starts_with(&path));
            self.symlink_paths.retain(|p, _| !p.starts_with(&path));

            self.ignore.insert(raw_entry(&path));
            self.ignore.insert(contents_entry(&path));
        }
    }

    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!(roots = self.roots.len(), "closing watcher");

        let mut ids: Vec<RootId> = self.roots.keys().copied().collect();
        ids.sort();
        if self.options.persistent {
            for root in ids {
                self.out.push(CoreCommand::StopBackend { root });
            }
        }

        self.roots.clear();
        self.closers.clear();
        self.awaiting_backend.clear();
        self.tree.clear();
        self.throttles.clear();
        self.pending_unlinks.clear();
        self.pending_writes.clear();
        self.symlink_paths.clear();
        self.stamps.clear();
        self.out.push(CoreCommand::DetachSubscribers);
    }

    /// Emitted form of an absolute path: relative to `cwd` when set.
    pub(crate) fn display_path(&self, path: &Path) -> PathBuf {
        if self.options.cwd.is_none() {
            return path.to_path_buf();
        }
        let rel = relative(&self.base, path);
        if rel.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            rel
        }
    }

    pub fn get_watched(&self) -> WatchedSnapshot {
        self.tree
            .snapshot()
            .into_iter()
            .map(|(dir, items)| (slash(&self.display_path(&dir)), items))
            .collect()
    }
}
