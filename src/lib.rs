// src/lib.rs

pub mod backend;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod types;
pub mod watch;
pub mod watcher;

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, AwaitWriteFinish, WatchConfig};
use crate::types::{EventName, WatchEvent};
use crate::watch::Ignored;

pub use crate::config::WatchOptions;
pub use crate::errors::WatchError;
pub use crate::types::{FsEvent, FsEventKind};
pub use crate::watcher::{watch, FsWatcher};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - the watcher and its event subscription
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = match &args.config {
        Some(path) => load_and_validate(path)?,
        None => WatchConfig::default(),
    };
    apply_cli_overrides(&mut cfg, &args);

    if cfg.paths.is_empty() {
        bail!("nothing to watch: pass PATHS or set `paths` in the config file");
    }
    info!(paths = ?cfg.paths, "starting watcher");

    let watcher = FsWatcher::new(cfg.options.clone())?;
    let mut events = watcher.subscribe(&[EventName::All, EventName::Error, EventName::Ready]);
    watcher.add(&cfg.paths)?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if let Some(line) = format_event(&event) {
                        println!("{line}");
                    }
                }
                None => break,
            },
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    eprintln!("failed to listen for Ctrl+C: {e}");
                }
                break;
            }
        }
    }

    debug!("shutting down watcher");
    watcher.close().await?;
    Ok(())
}

/// Command-line flags win over the config file.
fn apply_cli_overrides(cfg: &mut WatchConfig, args: &CliArgs) {
    if !args.paths.is_empty() {
        cfg.paths = args.paths.clone();
    }

    let opts = &mut cfg.options;
    opts.ignored
        .extend(args.ignored.iter().cloned().map(Ignored::Pattern));
    if args.poll {
        opts.use_polling = true;
    }
    if let Some(ms) = args.interval.filter(|ms| *ms > 0) {
        opts.interval = Duration::from_millis(ms);
    }
    if args.depth.is_some() {
        opts.depth = args.depth;
    }
    if args.cwd.is_some() {
        opts.cwd = args.cwd.clone();
    }
    if args.ignore_initial {
        opts.ignore_initial = true;
    }
    if let Some(ms) = args.await_write_finish.filter(|ms| *ms > 0) {
        opts.await_write_finish = Some(AwaitWriteFinish {
            stability_threshold: Duration::from_millis(ms),
            ..AwaitWriteFinish::default()
        });
    }
    if let Some(ms) = args.atomic.filter(|ms| *ms > 0) {
        opts.atomic = Some(Duration::from_millis(ms));
    }
    if args.no_follow_symlinks {
        opts.follow_symlinks = false;
    }
    if args.always_stat {
        opts.always_stat = true;
    }
}

/// One output line per event; raw notifications are not printed.
pub fn format_event(event: &WatchEvent) -> Option<String> {
    match event {
        WatchEvent::Fs(ev) => {
            let mut line = format!("{:<10} {}", ev.kind.as_str(), ev.path.display());
            if let Some(stats) = &ev.stats {
                if stats.is_file() {
                    line.push_str(&format!(" ({} bytes)", stats.size));
                }
            }
            Some(line)
        }
        WatchEvent::Error(err) => Some(format!("{:<10} {err}", "error")),
        WatchEvent::Ready => Some("ready".to_string()),
        WatchEvent::Raw(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::Metadata;
    use clap::Parser;
    use std::sync::Arc;

    #[test]
    fn cli_flags_override_config_values() {
        let mut cfg = WatchConfig {
            paths: vec!["from-config".into()],
            options: WatchOptions {
                depth: Some(5),
                ..WatchOptions::default()
            },
        };
        let args = CliArgs::parse_from([
            "treewatch",
            "src",
            "--depth",
            "1",
            "--atomic",
            "--no-follow-symlinks",
            "--ignore",
            "*.log",
        ]);
        apply_cli_overrides(&mut cfg, &args);

        assert_eq!(cfg.paths, vec!["src"]);
        assert_eq!(cfg.options.depth, Some(1));
        assert_eq!(cfg.options.atomic, Some(Duration::from_millis(100)));
        assert!(!cfg.options.follow_symlinks);
        assert_eq!(cfg.options.ignored.len(), 1);
    }

    #[test]
    fn config_paths_survive_when_cli_has_none() {
        let mut cfg = WatchConfig {
            paths: vec!["docs".into()],
            ..WatchConfig::default()
        };
        apply_cli_overrides(&mut cfg, &CliArgs::parse_from(["treewatch"]));
        assert_eq!(cfg.paths, vec!["docs"]);
        assert!(cfg.options.atomic.is_none());
    }

    #[test]
    fn event_lines() {
        let add = WatchEvent::Fs(FsEvent::new(FsEventKind::Add, "src/a.rs").with_stats(Some(Metadata::file(12))));
        assert_eq!(format_event(&add).unwrap(), "add        src/a.rs (12 bytes)");

        let gone = WatchEvent::Fs(FsEvent::new(FsEventKind::UnlinkDir, "src/old"));
        assert_eq!(format_event(&gone).unwrap(), "unlinkDir  src/old");

        let err = WatchEvent::Error(Arc::new(WatchError::ConfigError("bad".into())));
        assert_eq!(format_event(&err).unwrap(), "error      Configuration error: bad");

        assert_eq!(format_event(&WatchEvent::Ready).unwrap(), "ready");
    }
}
