// src/backend/mod.rs

//! Pluggable raw-notification backend.
//!
//! The engine asks a [`Backend`] to watch one path per resolved root and
//! gets raw, unnormalized notifications back through an [`EventSink`].
//! Production code uses [`NotifyBackend`]; tests provide their own
//! implementation that lets them inject raw events by hand.

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::{Envelope, Inbound};
use crate::errors::{Result, WatchError};

pub mod notify;

pub use self::notify::NotifyBackend;

/// Identifier of one backend subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(pub u64);

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "root#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Recursive,
    NonRecursive,
}

/// Coarse classification of a backend notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Create,
    Modify,
    Remove,
    Rename,
    Other,
}

/// A notification exactly as the backend reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub root: RootId,
    pub path: PathBuf,
    pub kind: RawKind,
    /// Backend-specific description of the event.
    pub detail: String,
}

impl RawEvent {
    pub fn new(root: RootId, path: impl Into<PathBuf>, kind: RawKind) -> Self {
        Self {
            root,
            path: path.into(),
            kind,
            detail: String::new(),
        }
    }
}

/// Where backends deliver notifications.
///
/// Cloneable and usable from any thread, including synchronous callbacks.
/// Holds a weak sender: a backend never keeps the watcher loop alive on
/// its own.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::WeakUnboundedSender<Envelope>,
}

impl EventSink {
    pub fn new(tx: mpsc::WeakUnboundedSender<Envelope>) -> Self {
        Self { tx }
    }

    fn send(&self, envelope: Envelope) -> bool {
        self.tx
            .upgrade()
            .is_some_and(|tx| tx.send(envelope).is_ok())
    }

    pub fn raw(&self, event: RawEvent) {
        if !self.send(Envelope::Core(Inbound::Raw(event))) {
            debug!("watcher loop gone; dropping raw event");
        }
    }

    pub fn error(&self, root: Option<RootId>, error: WatchError) {
        if !self.send(Envelope::Core(Inbound::BackendError { root, error })) {
            warn!("watcher loop gone; dropping backend error");
        }
    }
}

/// Trait abstracting the OS notification primitive.
pub trait Backend: Send + 'static {
    /// Subscribe to changes of `path`. Returning `Ok` means the watch is
    /// established.
    fn start_watching(
        &mut self,
        root: RootId,
        path: &Path,
        mode: WatchMode,
        sink: EventSink,
    ) -> Result<()>;

    /// Drop the subscription for `root`. Unknown ids are ignored.
    fn stop_watching(&mut self, root: RootId);
}
