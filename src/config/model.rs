// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::watch::ignore::Ignored;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_BINARY_INTERVAL: Duration = Duration::from_millis(300);
pub const DEFAULT_ATOMIC_WINDOW: Duration = Duration::from_millis(100);
pub const DEFAULT_STABILITY_THRESHOLD: Duration = Duration::from_millis(2000);
pub const DEFAULT_WRITE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Watcher configuration as read from a TOML file.
///
/// ```toml
/// paths = ["src", "assets/**/*.png"]
/// ignored = ["**/target/**"]
/// ignored_regex = ['\.log$']
/// depth = 4
/// atomic = 150
///
/// [await_write_finish]
/// stability_threshold = 500
/// poll_interval = 50
/// ```
///
/// Durations are in milliseconds. Everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWatchConfig {
    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default)]
    pub persistent: Option<bool>,
    #[serde(default)]
    pub ignore_initial: Option<bool>,
    #[serde(default)]
    pub ignore_permission_errors: Option<bool>,

    #[serde(default)]
    pub use_polling: Option<bool>,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub binary_interval: Option<u64>,

    #[serde(default)]
    pub disable_globbing: Option<bool>,
    #[serde(default)]
    pub follow_symlinks: Option<bool>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Literal paths or globs.
    #[serde(default)]
    pub ignored: Vec<String>,
    /// Regular expressions matched against slash-separated paths.
    #[serde(default)]
    pub ignored_regex: Vec<String>,

    #[serde(default)]
    pub depth: Option<usize>,
    #[serde(default)]
    pub await_write_finish: Option<RawAwaitWriteFinish>,
    #[serde(default)]
    pub atomic: Option<RawAtomic>,
    #[serde(default)]
    pub always_stat: Option<bool>,
    #[serde(default)]
    pub ignore_tmp_files: Option<bool>,
}

/// `await_write_finish = true` or a table with explicit timings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAwaitWriteFinish {
    Flag(bool),
    Settings {
        #[serde(default)]
        stability_threshold: Option<u64>,
        #[serde(default)]
        poll_interval: Option<u64>,
    },
}

/// `atomic = true` or the window in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawAtomic {
    Flag(bool),
    Millis(u64),
}

/// Write-stability gate timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwaitWriteFinish {
    /// How long the size must stay unchanged.
    pub stability_threshold: Duration,
    /// How often the size is sampled.
    pub poll_interval: Duration,
}

impl Default for AwaitWriteFinish {
    fn default() -> Self {
        Self {
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
            poll_interval: DEFAULT_WRITE_POLL_INTERVAL,
        }
    }
}

/// Validated watcher options.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Keep backend subscriptions open after the initial scan.
    pub persistent: bool,
    /// Suppress `add`/`addDir` for entries found by the initial scan.
    pub ignore_initial: bool,
    pub ignore_permission_errors: bool,
    pub use_polling: bool,
    pub interval: Duration,
    /// Polling interval for files with a binary extension.
    pub binary_interval: Duration,
    pub disable_globbing: bool,
    pub follow_symlinks: bool,
    /// Base for relative requests and for emitted paths.
    pub cwd: Option<PathBuf>,
    pub ignored: Vec<Ignored>,
    /// Maximum recursion depth below each root; `Some(0)` is immediate
    /// children only.
    pub depth: Option<usize>,
    pub await_write_finish: Option<AwaitWriteFinish>,
    /// Unlink coalescing window.
    pub atomic: Option<Duration>,
    pub always_stat: bool,
    pub ignore_tmp_files: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            persistent: true,
            ignore_initial: false,
            ignore_permission_errors: false,
            use_polling: false,
            interval: DEFAULT_INTERVAL,
            binary_interval: DEFAULT_BINARY_INTERVAL,
            disable_globbing: false,
            follow_symlinks: true,
            cwd: None,
            ignored: Vec::new(),
            depth: None,
            await_write_finish: None,
            atomic: None,
            always_stat: false,
            ignore_tmp_files: true,
        }
    }
}

impl WatchOptions {
    /// Apply `TREEWATCH_USEPOLLING` / `TREEWATCH_INTERVAL` from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_with(|key| std::env::var(key).ok());
    }

    pub fn apply_env_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("TREEWATCH_USEPOLLING") {
            match raw.trim().to_lowercase().as_str() {
                "" | "false" | "0" => self.use_polling = false,
                _ => self.use_polling = true,
            }
        }

        if let Some(ms) = lookup("TREEWATCH_INTERVAL").and_then(|s| s.trim().parse::<u64>().ok()) {
            self.interval = Duration::from_millis(ms);
        }
    }

    /// Whether the transient-file pattern is applied.
    pub fn skips_transient_files(&self) -> bool {
        self.atomic.is_some() || self.ignore_tmp_files
    }
}

/// Validated configuration file: what to watch and how.
#[derive(Debug, Clone, Default)]
pub struct WatchConfig {
    pub paths: Vec<String>,
    pub options: WatchOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn polling_env_values() {
        for (raw, expected) in [("1", true), ("TRUE", true), ("yes", true), ("0", false), ("False", false), ("", false)] {
            let mut opts = WatchOptions {
                use_polling: !expected,
                ..WatchOptions::default()
            };
            opts.apply_env_overrides_with(env(&[("TREEWATCH_USEPOLLING", raw)]));
            assert_eq!(opts.use_polling, expected, "TREEWATCH_USEPOLLING={raw:?}");
        }
    }

    #[test]
    fn interval_env_needs_a_number() {
        let mut opts = WatchOptions::default();
        opts.apply_env_overrides_with(env(&[("TREEWATCH_INTERVAL", "abc")]));
        assert_eq!(opts.interval, DEFAULT_INTERVAL);

        opts.apply_env_overrides_with(env(&[("TREEWATCH_INTERVAL", " 250 ")]));
        assert_eq!(opts.interval, Duration::from_millis(250));
    }

    #[test]
    fn unset_env_leaves_options_alone() {
        let mut opts = WatchOptions {
            use_polling: true,
            ..WatchOptions::default()
        };
        opts.apply_env_overrides_with(|_| None);
        assert!(opts.use_polling);
    }
}
