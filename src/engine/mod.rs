// src/engine/mod.rs

//! Orchestration engine for treewatch.
//!
//! This module ties together:
//! - the watched-directory tree and the per-root helpers
//! - the debounce pipeline (throttling, atomic unlinks, write-stability)
//! - the main runtime event loop that reacts to:
//!   - watch/unwatch requests
//!   - raw backend notifications
//!   - timer expiries and deferred directory probes
//!   - close requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::backend::{RawEvent, RootId, WatchMode};
use crate::errors::WatchError;
use crate::types::{EventName, WatchEvent};

/// Messages consumed by the pure core.
#[derive(Debug)]
pub enum Inbound {
    /// Start watching paths or globs (`!`-prefixed entries are ignores).
    Add {
        paths: Vec<String>,
        /// Watch `paths` as parents of this single base name.
        target: Option<String>,
        /// Internal adds are never treated as the initial scan.
        internal: bool,
    },
    Unwatch {
        paths: Vec<String>,
    },
    Raw(RawEvent),
    /// The backend established the subscription for `root`.
    BackendReady {
        root: RootId,
    },
    BackendError {
        root: Option<RootId>,
        error: WatchError,
    },
    Timer(TimerKey),
    /// Check whether an emptied directory still exists.
    ProbeDir {
        dir: PathBuf,
    },
    Close,
}

/// Snapshot returned by `get_watched`: directory → sorted child names.
pub type WatchedSnapshot = BTreeMap<String, Vec<String>>;

/// Everything that travels over the runtime channel.
#[derive(Debug)]
pub enum Envelope {
    Core(Inbound),
    Subscribe {
        names: Vec<EventName>,
        sender: mpsc::UnboundedSender<WatchEvent>,
    },
    GetWatched(oneshot::Sender<WatchedSnapshot>),
    Close(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleAction {
    Add,
    Change,
    Remove,
}

/// Identifies a scheduled timer. `id` is the generation of the entry that
/// scheduled it; a timer whose entry has since been replaced is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKey {
    Throttle {
        action: ThrottleAction,
        path: PathBuf,
        id: u64,
    },
    AtomicFlush {
        path: PathBuf,
        id: u64,
    },
    WritePoll {
        path: PathBuf,
        id: u64,
    },
}

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug)]
pub enum CoreCommand {
    /// Deliver to every matching subscriber.
    Publish(WatchEvent),
    StartBackend {
        root: RootId,
        path: PathBuf,
        mode: WatchMode,
    },
    StopBackend {
        root: RootId,
    },
    /// Post `Inbound::Timer(timer)` back after `after`.
    Schedule {
        after: Duration,
        timer: TimerKey,
    },
    /// Post a message back to the core after the current batch.
    Defer(Inbound),
    DetachSubscribers,
}

/// Decision returned by the core after handling a single message.
#[derive(Debug)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

pub mod core;
pub mod debounce;
pub mod handlers;
pub mod pipeline;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_harness;

pub use self::core::WatcherCore;
pub use self::runtime::Runtime;
