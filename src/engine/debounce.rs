// src/engine/debounce.rs

//! Pending-entry tables of the debounce pipeline.
//!
//! Every entry carries a generation id. The core schedules a timer tagged
//! with that id; when the timer fires it only acts if the entry still has
//! the same id, so cancelling an entry is just removing it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::engine::ThrottleAction;
use crate::types::{FsEvent, FsEventKind};

#[derive(Debug, Default)]
struct Generations {
    next: u64,
}

impl Generations {
    fn bump(&mut self) -> u64 {
        self.next += 1;
        self.next
    }
}

#[derive(Debug, Clone, Copy)]
struct ThrottleEntry {
    id: u64,
    /// Events suppressed while the window was open.
    count: usize,
}

#[derive(Debug, Default)]
pub struct Throttles {
    entries: HashMap<(ThrottleAction, PathBuf), ThrottleEntry>,
    ids: Generations,
}

impl Throttles {
    /// Open a window for `(action, path)`.
    ///
    /// Returns the id to tag the expiry timer with, or `None` when a window
    /// is already open; the suppressed event is counted and the window is
    /// not extended.
    pub fn try_enter(&mut self, action: ThrottleAction, path: &Path) -> Option<u64> {
        let key = (action, path.to_path_buf());
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.count += 1;
            return None;
        }
        let id = self.ids.bump();
        self.entries.insert(key, ThrottleEntry { id, count: 0 });
        Some(id)
    }

    /// Close the window if `id` still owns it. Returns the suppressed count.
    pub fn expire(&mut self, action: ThrottleAction, path: &Path, id: u64) -> Option<usize> {
        let key = (action, path.to_path_buf());
        match self.entries.get(&key) {
            Some(entry) if entry.id == id => self.entries.remove(&key).map(|e| e.count),
            _ => None,
        }
    }

    pub fn is_open(&self, action: ThrottleAction, path: &Path) -> bool {
        self.entries.contains_key(&(action, path.to_path_buf()))
    }

    /// Close every window for `dir` and the paths below it.
    pub fn forget_tree(&mut self, dir: &Path) {
        self.entries.retain(|(_, path), _| !path.starts_with(dir));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone)]
pub struct PendingUnlink {
    pub id: u64,
    pub event: FsEvent,
}

/// Buffered unlinks of the atomic-rename window.
#[derive(Debug, Default)]
pub struct PendingUnlinks {
    entries: HashMap<PathBuf, PendingUnlink>,
    ids: Generations,
}

impl PendingUnlinks {
    /// Buffer an unlink, replacing an older one for the same path.
    pub fn buffer(&mut self, path: &Path, event: FsEvent) -> u64 {
        let id = self.ids.bump();
        self.entries.insert(path.to_path_buf(), PendingUnlink { id, event });
        id
    }

    /// Drop the buffered unlink for `path`; true if there was one.
    pub fn cancel(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    /// Take the buffered event if `id` still owns the slot.
    pub fn take(&mut self, path: &Path, id: u64) -> Option<FsEvent> {
        match self.entries.get(path) {
            Some(entry) if entry.id == id => self.entries.remove(path).map(|e| e.event),
            _ => None,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Drop buffered unlinks for `dir` and everything below it.
    pub fn forget_tree(&mut self, dir: &Path) {
        self.entries.retain(|path, _| !path.starts_with(dir));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub id: u64,
    /// Event to publish once the file is stable.
    pub kind: FsEventKind,
    pub last_change: Instant,
    pub prev_size: Option<u64>,
}

/// Files held back by the write-stability gate.
#[derive(Debug, Default)]
pub struct PendingWrites {
    entries: HashMap<PathBuf, PendingWrite>,
    ids: Generations,
}

impl PendingWrites {
    pub fn start(&mut self, path: &Path, kind: FsEventKind, now: Instant) -> u64 {
        let id = self.ids.bump();
        self.entries.insert(
            path.to_path_buf(),
            PendingWrite {
                id,
                kind,
                last_change: now,
                prev_size: None,
            },
        );
        id
    }

    /// Refresh the last-change timestamp; false when nothing is pending.
    pub fn touch(&mut self, path: &Path, now: Instant) -> bool {
        match self.entries.get_mut(path) {
            Some(entry) => {
                entry.last_change = now;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Entry for a poll tagged with `id`, if it is still current.
    pub fn current(&mut self, path: &Path, id: u64) -> Option<&mut PendingWrite> {
        self.entries.get_mut(path).filter(|entry| entry.id == id)
    }

    /// Cancel the wait, returning the kind of event that was held back.
    pub fn cancel(&mut self, path: &Path) -> Option<FsEventKind> {
        self.entries.remove(path).map(|entry| entry.kind)
    }

    /// Abandon every wait for `dir` and the files below it.
    pub fn forget_tree(&mut self, dir: &Path) {
        self.entries.retain(|path, _| !path.starts_with(dir));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Change window of the throttle stage.
pub const CHANGE_THROTTLE: Duration = Duration::from_millis(50);
/// Window that collapses near-simultaneous removals of the same path.
pub const REMOVE_THROTTLE: Duration = Duration::from_millis(100);
/// Zero-length window: collapses duplicate adds within one batch.
pub const ADD_THROTTLE: Duration = Duration::ZERO;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_counts_suppressed_events_without_extending() {
        let mut t = Throttles::default();
        let p = Path::new("/w/a");
        let id = t.try_enter(ThrottleAction::Change, p).unwrap();
        assert!(t.try_enter(ThrottleAction::Change, p).is_none());
        assert!(t.try_enter(ThrottleAction::Change, p).is_none());
        // Other actions have their own windows.
        assert!(t.try_enter(ThrottleAction::Remove, p).is_some());

        assert_eq!(t.expire(ThrottleAction::Change, p, id), Some(2));
        assert!(!t.is_open(ThrottleAction::Change, p));
    }

    #[test]
    fn stale_throttle_timer_is_ignored() {
        let mut t = Throttles::default();
        let p = Path::new("/w/a");
        let old = t.try_enter(ThrottleAction::Change, p).unwrap();
        t.clear();
        let new = t.try_enter(ThrottleAction::Change, p).unwrap();
        assert_eq!(t.expire(ThrottleAction::Change, p, old), None);
        assert!(t.is_open(ThrottleAction::Change, p));
        assert_eq!(t.expire(ThrottleAction::Change, p, new), Some(0));
    }

    #[test]
    fn pending_unlink_take_respects_generation() {
        let mut u = PendingUnlinks::default();
        let p = Path::new("/w/a");
        let first = u.buffer(p, FsEvent::new(FsEventKind::Unlink, p));
        let second = u.buffer(p, FsEvent::new(FsEventKind::Unlink, p));
        assert!(u.take(p, first).is_none());
        assert!(u.take(p, second).is_some());
        assert!(!u.contains(p));
    }

    #[test]
    fn pending_write_cancel_reports_kind() {
        let mut w = PendingWrites::default();
        let p = Path::new("/w/a");
        let now = Instant::now();
        let id = w.start(p, FsEventKind::Add, now);
        assert!(w.touch(p, now));
        assert!(w.current(p, id).is_some());
        assert!(w.current(p, id + 1).is_none());
        assert_eq!(w.cancel(p), Some(FsEventKind::Add));
        assert!(!w.touch(p, now));
    }

    #[test]
    fn forget_tree_only_drops_the_subtree() {
        let now = Instant::now();
        let (inside, sibling) = (Path::new("/w/sub/f"), Path::new("/w/subway"));

        let mut w = PendingWrites::default();
        w.start(inside, FsEventKind::Add, now);
        w.start(sibling, FsEventKind::Change, now);
        w.forget_tree(Path::new("/w/sub"));
        assert!(!w.contains(inside));
        assert!(w.contains(sibling));

        let mut u = PendingUnlinks::default();
        u.buffer(inside, FsEvent::new(FsEventKind::Unlink, inside));
        u.forget_tree(Path::new("/w/sub"));
        assert!(!u.contains(inside));

        let mut t = Throttles::default();
        t.try_enter(ThrottleAction::Change, inside);
        t.try_enter(ThrottleAction::Change, sibling);
        t.forget_tree(Path::new("/w/sub"));
        assert!(!t.is_open(ThrottleAction::Change, inside));
        assert!(t.is_open(ThrottleAction::Change, sibling));
    }
}
