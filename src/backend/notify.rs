// src/backend/notify.rs

//! Backend built on the `notify` crate.
//!
//! One notify watcher per root: the platform's recommended watcher by
//! default, or a polling watcher when polling is selected. Polling roots
//! whose path has a binary extension use the slower binary interval.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use ::notify::event::ModifyKind;
use ::notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info};

use super::{Backend, EventSink, RawEvent, RawKind, RootId, WatchMode};
use crate::config::WatchOptions;
use crate::errors::{Result, WatchError};

const BINARY_EXTENSIONS: &[&str] = &[
    "7z", "a", "avi", "bin", "bmp", "bz2", "class", "dll", "dmg", "doc", "docx", "dylib", "exe",
    "flac", "gif", "gz", "ico", "iso", "jar", "jpeg", "jpg", "mkv", "mov", "mp3", "mp4", "o",
    "ogg", "otf", "pdf", "png", "psd", "pyc", "rar", "so", "tar", "tgz", "tif", "tiff", "ttf",
    "wav", "webm", "webp", "woff", "woff2", "xls", "xlsx", "xz", "zip",
];

pub fn is_binary_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            BINARY_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// A thin wrapper around [`RecommendedWatcher`] and [`PollWatcher`].
enum NotifyWatcher {
    Recommended(RecommendedWatcher),
    Polling(PollWatcher),
}

impl NotifyWatcher {
    fn watch(&mut self, path: &Path, mode: RecursiveMode) -> ::notify::Result<()> {
        match self {
            Self::Recommended(w) => w.watch(path, mode),
            Self::Polling(w) => w.watch(path, mode),
        }
    }
}

pub struct NotifyBackend {
    use_polling: bool,
    interval: Duration,
    binary_interval: Duration,
    follow_symlinks: bool,
    watchers: HashMap<RootId, NotifyWatcher>,
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("use_polling", &self.use_polling)
            .field("roots", &self.watchers.len())
            .finish_non_exhaustive()
    }
}

impl NotifyBackend {
    pub fn new(options: &WatchOptions) -> Self {
        Self {
            use_polling: options.use_polling,
            interval: options.interval,
            binary_interval: options.binary_interval,
            follow_symlinks: options.follow_symlinks,
            watchers: HashMap::new(),
        }
    }

    /// Poll watcher settings for `path`.
    ///
    /// The poller stats mtime at one-second resolution, so contents are
    /// compared too.
    fn poll_config(&self, path: &Path) -> Config {
        Config::default()
            .with_follow_symlinks(self.follow_symlinks)
            .with_poll_interval(self.poll_interval_for(path))
            .with_compare_contents(true)
    }

    fn poll_interval_for(&self, path: &Path) -> Duration {
        if is_binary_path(path) {
            self.binary_interval
        } else {
            self.interval
        }
    }
}

/// Translate one notify event into per-path raw events.
pub fn translate(root: RootId, event: &Event) -> Vec<RawEvent> {
    let kind = match event.kind {
        EventKind::Access(_) => return Vec::new(),
        EventKind::Create(_) => RawKind::Create,
        EventKind::Modify(ModifyKind::Name(_)) => RawKind::Rename,
        // Metadata-only changes count only when size or mtime moved.
        EventKind::Modify(ModifyKind::Metadata(_)) => RawKind::Other,
        EventKind::Modify(_) => RawKind::Modify,
        EventKind::Remove(_) => RawKind::Remove,
        EventKind::Any | EventKind::Other => RawKind::Other,
    };
    let detail = format!("{:?}", event.kind);

    event
        .paths
        .iter()
        .map(|path| RawEvent {
            root,
            path: path.clone(),
            kind,
            detail: detail.clone(),
        })
        .collect()
}

impl Backend for NotifyBackend {
    fn start_watching(
        &mut self,
        root: RootId,
        path: &Path,
        mode: WatchMode,
        sink: EventSink,
    ) -> Result<()> {
        let handler = move |res: ::notify::Result<Event>| match res {
            Ok(event) => {
                for raw in translate(root, &event) {
                    sink.raw(raw);
                }
            }
            Err(err) => sink.error(Some(root), WatchError::from(err)),
        };

        let mut watcher = if self.use_polling {
            let config = self.poll_config(path);
            debug!(%root, interval = ?config.poll_interval(), "starting poll watcher");
            NotifyWatcher::Polling(PollWatcher::new(handler, config)?)
        } else {
            let config = Config::default().with_follow_symlinks(self.follow_symlinks);
            NotifyWatcher::Recommended(RecommendedWatcher::new(handler, config)?)
        };

        let recursive = match mode {
            WatchMode::Recursive => RecursiveMode::Recursive,
            WatchMode::NonRecursive => RecursiveMode::NonRecursive,
        };
        watcher.watch(path, recursive)?;

        info!(%root, path = %path.display(), ?mode, "watch established");
        self.watchers.insert(root, watcher);
        Ok(())
    }

    fn stop_watching(&mut self, root: RootId) {
        if self.watchers.remove(&root).is_some() {
            debug!(%root, "watch dropped");
        }
    }
}
