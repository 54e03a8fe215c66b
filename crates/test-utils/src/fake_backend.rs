use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use treewatch::backend::{Backend, EventSink, RawEvent, RawKind, RootId, WatchMode};
use treewatch::errors::{Result, WatchError};

#[derive(Default)]
struct State {
    live: BTreeMap<RootId, (PathBuf, WatchMode, EventSink)>,
    started: Vec<(RootId, PathBuf, WatchMode)>,
    stopped: Vec<RootId>,
    refuse: Vec<PathBuf>,
}

/// A fake backend that:
/// - records every subscription it was asked for
/// - lets tests inject raw notifications by path
/// - can be told to refuse particular paths
///
/// Clones share state, so a test keeps one clone and hands the other to
/// the watcher.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Make `start_watching` fail for `path`.
    pub fn refuse(&self, path: impl Into<PathBuf>) {
        self.lock().refuse.push(path.into());
    }

    /// Deliver a notification to every live subscription covering `path`.
    /// Returns how many subscriptions received it.
    pub fn emit(&self, kind: RawKind, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let state = self.lock();
        let mut delivered = 0;
        for (root, (watched, mode, sink)) in &state.live {
            if covers(watched, *mode, path) {
                sink.raw(RawEvent::new(*root, path, kind));
                delivered += 1;
            }
        }
        delivered
    }

    pub fn started(&self) -> Vec<(RootId, PathBuf, WatchMode)> {
        self.lock().started.clone()
    }

    pub fn stopped(&self) -> Vec<RootId> {
        self.lock().stopped.clone()
    }

    pub fn live_paths(&self) -> Vec<PathBuf> {
        self.lock().live.values().map(|(p, _, _)| p.clone()).collect()
    }
}

fn covers(watched: &Path, mode: WatchMode, path: &Path) -> bool {
    match mode {
        WatchMode::Recursive => path.starts_with(watched),
        WatchMode::NonRecursive => path == watched || path.parent() == Some(watched),
    }
}

impl Backend for FakeBackend {
    fn start_watching(
        &mut self,
        root: RootId,
        path: &Path,
        mode: WatchMode,
        sink: EventSink,
    ) -> Result<()> {
        let mut state = self.lock();
        state.started.push((root, path.to_path_buf(), mode));
        if state.refuse.iter().any(|p| p == path) {
            return Err(WatchError::ConfigError(format!(
                "fake backend refused {}",
                path.display()
            )));
        }
        state.live.insert(root, (path.to_path_buf(), mode, sink));
        Ok(())
    }

    fn stop_watching(&mut self, root: RootId) {
        let mut state = self.lock();
        state.live.remove(&root);
        state.stopped.push(root);
    }
}
