// src/watcher.rs

//! Public watcher handle.
//!
//! [`FsWatcher`] is a cheap, cloneable handle onto one runtime task. Every
//! operation is a message on the runtime channel, so the handle can be used
//! from any task. The runtime stops when the watcher is closed or when the
//! last handle is dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::backend::{Backend, NotifyBackend};
use crate::config::WatchOptions;
use crate::engine::{Envelope, Inbound, Runtime, WatchedSnapshot, WatcherCore};
use crate::errors::{Result, WatchError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::{EventName, WatchEvent};

#[derive(Debug, Clone)]
pub struct FsWatcher {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl FsWatcher {
    /// Watcher on the real filesystem using `notify`.
    ///
    /// `TREEWATCH_USEPOLLING` / `TREEWATCH_INTERVAL` are applied on top of
    /// `options`. Must be called inside a Tokio runtime.
    pub fn new(mut options: WatchOptions) -> Result<Self> {
        options.apply_env_overrides();
        let backend = NotifyBackend::new(&options);
        Self::with_parts(options, Arc::new(RealFileSystem), backend)
    }

    /// Watcher over explicit filesystem and backend implementations.
    pub fn with_parts<B: Backend>(
        options: WatchOptions,
        fs: Arc<dyn FileSystem>,
        backend: B,
    ) -> Result<Self> {
        let process_cwd = std::env::current_dir()?;
        let base = match &options.cwd {
            Some(cwd) => crate::watch::path_utils::resolve(&process_cwd, cwd),
            None => process_cwd,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let core = WatcherCore::new(options, fs, base, tokio::time::Instant::now().into_std());
        let runtime = Runtime::new(core, rx, tx.downgrade(), backend);

        tokio::spawn(async move {
            if let Err(err) = runtime.run().await {
                tracing::error!(error = %err, "watcher runtime failed");
            }
        });

        Ok(Self { tx })
    }

    /// Receive events for the given names on a fresh channel.
    ///
    /// A closed watcher yields a receiver that ends immediately.
    pub fn subscribe(&self, names: &[EventName]) -> mpsc::UnboundedReceiver<WatchEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = self.tx.send(Envelope::Subscribe {
            names: names.to_vec(),
            sender,
        });
        receiver
    }

    /// Start watching files, directories or globs.
    ///
    /// Entries starting with `!` are ignored instead. Fails without side
    /// effects when a path is not valid UTF-8.
    pub fn add<I, P>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths = to_strings(paths)?;
        debug!(?paths, "add");
        self.send(Inbound::Add {
            paths,
            target: None,
            internal: false,
        })
    }

    /// Stop watching files, directories or globs.
    pub fn unwatch<I, P>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths = to_strings(paths)?;
        debug!(?paths, "unwatch");
        self.send(Inbound::Unwatch { paths })
    }

    /// Stop every subscription and drop all state. Closing twice is fine.
    pub async fn close(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        if self.tx.send(Envelope::Close(reply)).is_err() {
            return Ok(());
        }
        let _ = done.await;
        Ok(())
    }

    /// Directory → sorted child names. Empty once closed.
    pub async fn get_watched(&self) -> WatchedSnapshot {
        let (reply, snapshot) = oneshot::channel();
        if self.tx.send(Envelope::GetWatched(reply)).is_err() {
            return WatchedSnapshot::new();
        }
        snapshot.await.unwrap_or_default()
    }

    fn send(&self, msg: Inbound) -> Result<()> {
        self.tx
            .send(Envelope::Core(msg))
            .map_err(|_| WatchError::Closed)
    }
}

fn to_strings<I, P>(paths: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths
        .into_iter()
        .map(|p| {
            let p = p.as_ref();
            p.to_str()
                .map(str::to_string)
                .ok_or_else(|| WatchError::InvalidPath(p.to_string_lossy().into_owned()))
        })
        .collect()
}

/// Create a watcher, subscribe to every lifecycle event, and add `paths`.
pub fn watch<I, P>(
    paths: I,
    options: WatchOptions,
) -> Result<(FsWatcher, mpsc::UnboundedReceiver<WatchEvent>)>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let paths: Vec<PathBuf> = paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
    let watcher = FsWatcher::new(options)?;
    let events = watcher.subscribe(&[EventName::All, EventName::Error, EventName::Ready]);
    watcher.add(&paths)?;
    Ok((watcher, events))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_are_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let bad = Path::new(OsStr::from_bytes(b"/w/\xff"));
        let err = to_strings([bad]).unwrap_err();
        assert!(matches!(err, WatchError::InvalidPath(_)));
        assert!(err.to_string().starts_with("Non-string provided as watch path"));
    }

    #[test]
    fn utf8_paths_pass_through() {
        let out = to_strings(["/w/a", "!/w/b"]).unwrap();
        assert_eq!(out, vec!["/w/a", "!/w/b"]);
    }
}
