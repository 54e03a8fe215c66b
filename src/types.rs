// src/types.rs

//! Event types published by a watcher.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::backend::RawEvent;
use crate::errors::WatchError;
use crate::fs::Metadata;

/// Lifecycle event kinds for files and directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    Add,
    AddDir,
    Change,
    Unlink,
    UnlinkDir,
}

impl FsEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FsEventKind::Add => "add",
            FsEventKind::AddDir => "addDir",
            FsEventKind::Change => "change",
            FsEventKind::Unlink => "unlink",
            FsEventKind::UnlinkDir => "unlinkDir",
        }
    }

    /// Kinds that may carry stats.
    pub fn wants_stats(self) -> bool {
        matches!(
            self,
            FsEventKind::Add | FsEventKind::AddDir | FsEventKind::Change
        )
    }

    pub fn event_name(self) -> EventName {
        match self {
            FsEventKind::Add => EventName::Add,
            FsEventKind::AddDir => EventName::AddDir,
            FsEventKind::Change => EventName::Change,
            FsEventKind::Unlink => EventName::Unlink,
            FsEventKind::UnlinkDir => EventName::UnlinkDir,
        }
    }
}

impl fmt::Display for FsEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event for one path.
///
/// `path` is absolute, or relative to `cwd` when that option is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
    pub stats: Option<Metadata>,
}

impl FsEvent {
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: Option<Metadata>) -> Self {
        self.stats = stats;
        self
    }
}

/// Everything a subscriber can receive.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Fs(FsEvent),
    Error(Arc<WatchError>),
    /// Initial scan of every root finished.
    Ready,
    /// Unprocessed backend notification, published before normalization.
    Raw(RawEvent),
}

impl WatchEvent {
    /// Does a subscription to `name` receive this event?
    pub fn matches(&self, name: EventName) -> bool {
        match self {
            WatchEvent::Fs(ev) => name == EventName::All || ev.kind.event_name() == name,
            WatchEvent::Error(_) => name == EventName::Error,
            WatchEvent::Ready => name == EventName::Ready,
            WatchEvent::Raw(_) => name == EventName::Raw,
        }
    }

    pub fn as_fs(&self) -> Option<&FsEvent> {
        match self {
            WatchEvent::Fs(ev) => Some(ev),
            _ => None,
        }
    }
}

/// Subscription channel names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Add,
    AddDir,
    Change,
    Unlink,
    UnlinkDir,
    Error,
    /// Every lifecycle event.
    All,
    Ready,
    Raw,
}

impl EventName {
    pub const ALL_NAMES: [EventName; 9] = [
        EventName::Add,
        EventName::AddDir,
        EventName::Change,
        EventName::Unlink,
        EventName::UnlinkDir,
        EventName::Error,
        EventName::All,
        EventName::Ready,
        EventName::Raw,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::Add => "add",
            EventName::AddDir => "addDir",
            EventName::Change => "change",
            EventName::Unlink => "unlink",
            EventName::UnlinkDir => "unlinkDir",
            EventName::Error => "error",
            EventName::All => "all",
            EventName::Ready => "ready",
            EventName::Raw => "raw",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL_NAMES
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown event name: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_receives_lifecycle_events_only() {
        let add = WatchEvent::Fs(FsEvent::new(FsEventKind::Add, "a"));
        assert!(add.matches(EventName::All));
        assert!(add.matches(EventName::Add));
        assert!(!add.matches(EventName::Change));

        assert!(!WatchEvent::Ready.matches(EventName::All));
        let err = WatchEvent::Error(Arc::new(WatchError::Closed));
        assert!(err.matches(EventName::Error));
        assert!(!err.matches(EventName::All));
    }

    #[test]
    fn event_names_parse_case_insensitively() {
        assert_eq!("addDir".parse::<EventName>().unwrap(), EventName::AddDir);
        assert_eq!("UNLINKDIR".parse::<EventName>().unwrap(), EventName::UnlinkDir);
        assert!("rename".parse::<EventName>().is_err());
    }
}
