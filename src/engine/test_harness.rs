// src/engine/test_harness.rs

//! Synchronous driver for [`WatcherCore`] unit tests.
//!
//! Plays the role of the runtime against a [`MockFileSystem`] and a manual
//! clock: deferred messages are fed back right after each step, timers fire
//! from [`Harness::advance`], and `StartBackend` commands are acknowledged
//! immediately unless `auto_ready` is switched off.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{RawEvent, RawKind, RootId, WatchMode};
use crate::config::WatchOptions;
use crate::engine::{CoreCommand, Inbound, TimerKey, WatcherCore};
use crate::fs::mock::MockFileSystem;
use crate::types::{FsEventKind, WatchEvent};

pub(crate) struct Stepped {
    pub keep_running: bool,
}

pub(crate) struct Harness {
    pub core: WatcherCore,
    pub fs: MockFileSystem,
    pub now: Instant,
    timers: Vec<(Instant, u64, TimerKey)>,
    timer_seq: u64,
    queue: VecDeque<Inbound>,
    pub events: Vec<WatchEvent>,
    pub started: Vec<(RootId, PathBuf, WatchMode)>,
    pub stopped: Vec<RootId>,
    pub detached: bool,
    pub auto_ready: bool,
}

impl Harness {
    pub fn new(options: WatchOptions) -> Self {
        Self::with_base(options, "/")
    }

    pub fn with_base(options: WatchOptions, base: impl Into<PathBuf>) -> Self {
        let fs = MockFileSystem::new();
        let now = Instant::now();
        let core = WatcherCore::new(options, Arc::new(fs.clone()), base.into(), now);
        Self {
            core,
            fs,
            now,
            timers: Vec::new(),
            timer_seq: 0,
            queue: VecDeque::new(),
            events: Vec::new(),
            started: Vec::new(),
            stopped: Vec::new(),
            detached: false,
            auto_ready: true,
        }
    }

    pub fn add(&mut self, paths: &[&str]) -> Stepped {
        self.step(Inbound::Add {
            paths: paths.iter().map(|p| p.to_string()).collect(),
            target: None,
            internal: false,
        })
    }

    /// Deliver a message, then everything it deferred, then due timers.
    pub fn step(&mut self, msg: Inbound) -> Stepped {
        let step = self.core.step(msg, self.now);
        self.run(step.commands);
        self.settle();
        Stepped {
            keep_running: step.keep_running,
        }
    }

    /// Send a backend notification to every live root that would see it.
    pub fn raw(&mut self, kind: RawKind, path: &str) {
        let path = PathBuf::from(path);
        let live: Vec<RootId> = self
            .started
            .iter()
            .filter(|(root, watched, mode)| {
                !self.stopped.contains(root) && covers(watched, *mode, &path)
            })
            .map(|(root, _, _)| *root)
            .collect();

        for root in live {
            self.step(Inbound::Raw(RawEvent::new(root, path.clone(), kind)));
        }
    }

    /// Move the clock forward, firing timers in due order.
    pub fn advance(&mut self, by: Duration) {
        let target = self.now + by;
        while let Some(index) = self.next_due(target) {
            let (due, _, key) = self.timers.remove(index);
            self.now = self.now.max(due);
            self.step(Inbound::Timer(key));
        }
        self.now = target;
    }

    /// Execute whatever the core queued outside of `step`.
    pub fn drain_core(&mut self) {
        let commands = std::mem::take(&mut self.core.out);
        self.run(commands);
        self.settle();
    }

    pub fn fs_events(&self) -> Vec<(FsEventKind, String)> {
        self.events
            .iter()
            .filter_map(|e| e.as_fs())
            .map(|e| (e.kind, e.path.to_string_lossy().replace('\\', "/")))
            .collect()
    }

    pub fn ready_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, WatchEvent::Ready))
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, WatchEvent::Error(_)))
            .count()
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    fn run(&mut self, commands: Vec<CoreCommand>) {
        for command in commands {
            match command {
                CoreCommand::Publish(event) => self.events.push(event),
                CoreCommand::StartBackend { root, path, mode } => {
                    self.started.push((root, path, mode));
                    if self.auto_ready {
                        self.queue.push_back(Inbound::BackendReady { root });
                    }
                }
                CoreCommand::StopBackend { root } => self.stopped.push(root),
                CoreCommand::Schedule { after, timer } => {
                    self.timer_seq += 1;
                    self.timers.push((self.now + after, self.timer_seq, timer));
                }
                CoreCommand::Defer(msg) => self.queue.push_back(msg),
                CoreCommand::DetachSubscribers => self.detached = true,
            }
        }
    }

    fn settle(&mut self) {
        while let Some(msg) = self.queue.pop_front() {
            let step = self.core.step(msg, self.now);
            self.run(step.commands);
        }
        // Zero-length windows close once the batch is done.
        while let Some(index) = self.next_due(self.now) {
            let (_, _, key) = self.timers.remove(index);
            let step = self.core.step(Inbound::Timer(key), self.now);
            self.run(step.commands);
            while let Some(msg) = self.queue.pop_front() {
                let step = self.core.step(msg, self.now);
                self.run(step.commands);
            }
        }
    }

    fn next_due(&self, limit: Instant) -> Option<usize> {
        self.timers
            .iter()
            .enumerate()
            .filter(|(_, (due, _, _))| *due <= limit)
            .min_by_key(|(_, (due, seq, _))| (*due, *seq))
            .map(|(index, _)| index)
    }
}

fn covers(watched: &Path, mode: WatchMode, path: &Path) -> bool {
    match mode {
        WatchMode::Recursive => path.starts_with(watched),
        WatchMode::NonRecursive => path == watched || path.parent() == Some(watched),
    }
}
