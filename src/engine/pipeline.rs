// src/engine/pipeline.rs

//! Emission pipeline.
//!
//! Every normalized event goes through, in order:
//! 1. write-stability absorption of files already waiting to settle
//! 2. the atomic window (held unlinks, unlink+add → change)
//! 3. the change throttle
//! 4. the write-stability gate for new adds and changes
//! 5. `always_stat` enrichment

use std::path::Path;
use std::time::Duration;

use tracing::{debug, trace};

use crate::engine::core::WatcherCore;
use crate::engine::debounce::CHANGE_THROTTLE;
use crate::engine::{CoreCommand, ThrottleAction, TimerKey};
use crate::errors::is_missing;
use crate::fs::Metadata;
use crate::types::{FsEvent, FsEventKind, WatchEvent};

impl WatcherCore {
    pub(crate) fn emit(&mut self, kind: FsEventKind, path: &Path, stats: Option<Metadata>) {
        let mut kind = kind;

        if self.options.await_write_finish.is_some() && self.pending_writes.touch(path, self.now) {
            trace!(path = %path.display(), %kind, "absorbed by pending write");
            return;
        }

        if let Some(window) = self.options.atomic {
            if kind == FsEventKind::Unlink {
                let id = self
                    .pending_unlinks
                    .buffer(path, FsEvent::new(kind, path));
                self.schedule(
                    window,
                    TimerKey::AtomicFlush {
                        path: path.to_path_buf(),
                        id,
                    },
                );
                return;
            }
            if kind == FsEventKind::Add && self.pending_unlinks.cancel(path) {
                debug!(path = %path.display(), "atomic replace; reporting change");
                kind = FsEventKind::Change;
            }
        }

        if kind == FsEventKind::Change
            && !self.throttle(ThrottleAction::Change, path, CHANGE_THROTTLE)
        {
            return;
        }

        if let Some(awf) = &self.options.await_write_finish {
            let gated = matches!(kind, FsEventKind::Add | FsEventKind::Change);
            if gated && self.readiness.is_ready() {
                let poll = awf.poll_interval;
                let id = self.pending_writes.start(path, kind, self.now);
                self.schedule(
                    poll,
                    TimerKey::WritePoll {
                        path: path.to_path_buf(),
                        id,
                    },
                );
                return;
            }
        }

        let stats = match stats {
            None if self.options.always_stat && kind.wants_stats() => match self.fs.stat(path) {
                Ok(stats) => Some(stats),
                Err(error) => {
                    trace!(path = %path.display(), %error, "dropping event; stat failed");
                    return;
                }
            },
            stats => stats,
        };

        self.publish(kind, path, stats);
    }

    /// Hand a finished event to the subscribers.
    pub(crate) fn publish(&mut self, kind: FsEventKind, path: &Path, stats: Option<Metadata>) {
        let event = FsEvent::new(kind, self.display_path(path)).with_stats(stats);
        debug!(%kind, path = %event.path.display(), "event");
        self.out.push(CoreCommand::Publish(WatchEvent::Fs(event)));
    }

    /// Open a throttle window; false when one is already open.
    pub(crate) fn throttle(&mut self, action: ThrottleAction, path: &Path, window: Duration) -> bool {
        match self.throttles.try_enter(action, path) {
            Some(id) => {
                self.schedule(
                    window,
                    TimerKey::Throttle {
                        action,
                        path: path.to_path_buf(),
                        id,
                    },
                );
                true
            }
            None => false,
        }
    }

    fn schedule(&mut self, after: Duration, timer: TimerKey) {
        self.out.push(CoreCommand::Schedule { after, timer });
    }

    pub(crate) fn on_timer(&mut self, timer: TimerKey) {
        match timer {
            TimerKey::Throttle { action, path, id } => {
                if let Some(count) = self.throttles.expire(action, &path, id) {
                    if count > 0 {
                        debug!(?action, path = %path.display(), suppressed = count, "throttle window closed");
                    }
                }
            }
            TimerKey::AtomicFlush { path, id } => {
                if let Some(event) = self.pending_unlinks.take(&path, id) {
                    self.publish(event.kind, &path, None);
                }
            }
            TimerKey::WritePoll { path, id } => self.poll_write(path, id),
        }
    }

    fn poll_write(&mut self, path: std::path::PathBuf, id: u64) {
        let Some(awf) = self.options.await_write_finish.clone() else {
            return;
        };
        if self.pending_writes.current(&path, id).is_none() {
            return;
        }
        let reschedule = TimerKey::WritePoll {
            path: path.clone(),
            id,
        };

        let current = match self.fs.stat(&path) {
            Ok(stats) => stats,
            Err(e) if is_missing(&e) => {
                // Still being moved into place, or about to be unlinked.
                self.schedule(awf.poll_interval, reschedule);
                return;
            }
            Err(e) => {
                self.pending_writes.cancel(&path);
                self.handle_error(e.into());
                return;
            }
        };

        let now = self.now;
        let Some(entry) = self.pending_writes.current(&path, id) else {
            return;
        };
        if entry.prev_size.is_some_and(|prev| prev != current.size) {
            entry.last_change = now;
        }

        if now.saturating_duration_since(entry.last_change) >= awf.stability_threshold {
            let kind = entry.kind;
            self.pending_writes.cancel(&path);
            self.publish(kind, &path, Some(current));
        } else {
            entry.prev_size = Some(current.size);
            self.schedule(awf.poll_interval, reschedule);
        }
    }
}
