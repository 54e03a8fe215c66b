// src/config/validate.rs

use std::time::Duration;

use regex::Regex;

use crate::config::model::{
    AwaitWriteFinish, RawAtomic, RawAwaitWriteFinish, RawWatchConfig, WatchConfig, WatchOptions,
    DEFAULT_ATOMIC_WINDOW, DEFAULT_BINARY_INTERVAL, DEFAULT_INTERVAL, DEFAULT_STABILITY_THRESHOLD,
    DEFAULT_WRITE_POLL_INTERVAL,
};
use crate::errors::{Result, WatchError};
use crate::watch::ignore::Ignored;
use crate::watch::patterns::{compile_glob, is_glob};

impl TryFrom<RawWatchConfig> for WatchConfig {
    type Error = WatchError;

    fn try_from(raw: RawWatchConfig) -> std::result::Result<Self, Self::Error> {
        let options = WatchOptions {
            persistent: raw.persistent.unwrap_or(true),
            ignore_initial: raw.ignore_initial.unwrap_or(false),
            ignore_permission_errors: raw.ignore_permission_errors.unwrap_or(false),
            use_polling: raw.use_polling.unwrap_or(false),
            interval: millis("interval", raw.interval, DEFAULT_INTERVAL)?,
            binary_interval: millis("binary_interval", raw.binary_interval, DEFAULT_BINARY_INTERVAL)?,
            disable_globbing: raw.disable_globbing.unwrap_or(false),
            follow_symlinks: raw.follow_symlinks.unwrap_or(true),
            cwd: raw.cwd,
            ignored: ignored_entries(&raw.ignored, &raw.ignored_regex)?,
            depth: raw.depth,
            await_write_finish: await_write_finish(raw.await_write_finish)?,
            atomic: atomic_window(raw.atomic)?,
            always_stat: raw.always_stat.unwrap_or(false),
            ignore_tmp_files: raw.ignore_tmp_files.unwrap_or(true),
        };

        Ok(WatchConfig {
            paths: raw.paths,
            options,
        })
    }
}

fn millis(field: &str, value: Option<u64>, default: Duration) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(0) => Err(WatchError::ConfigError(format!(
            "{field} must be >= 1 millisecond (got 0)"
        ))),
        Some(ms) => Ok(Duration::from_millis(ms)),
    }
}

fn ignored_entries(patterns: &[String], regexes: &[String]) -> Result<Vec<Ignored>> {
    let mut out = Vec::with_capacity(patterns.len() + regexes.len());

    for pattern in patterns {
        if is_glob(pattern) {
            compile_glob(pattern)?;
        }
        out.push(Ignored::Pattern(pattern.clone()));
    }

    for source in regexes {
        let re = Regex::new(source).map_err(|e| {
            WatchError::ConfigError(format!("invalid ignored_regex {source:?}: {e}"))
        })?;
        out.push(Ignored::Regex(re));
    }

    Ok(out)
}

fn await_write_finish(raw: Option<RawAwaitWriteFinish>) -> Result<Option<AwaitWriteFinish>> {
    match raw {
        None | Some(RawAwaitWriteFinish::Flag(false)) => Ok(None),
        Some(RawAwaitWriteFinish::Flag(true)) => Ok(Some(AwaitWriteFinish::default())),
        Some(RawAwaitWriteFinish::Settings {
            stability_threshold,
            poll_interval,
        }) => Ok(Some(AwaitWriteFinish {
            stability_threshold: millis(
                "await_write_finish.stability_threshold",
                stability_threshold,
                DEFAULT_STABILITY_THRESHOLD,
            )?,
            poll_interval: millis(
                "await_write_finish.poll_interval",
                poll_interval,
                DEFAULT_WRITE_POLL_INTERVAL,
            )?,
        })),
    }
}

fn atomic_window(raw: Option<RawAtomic>) -> Result<Option<Duration>> {
    match raw {
        None | Some(RawAtomic::Flag(false)) => Ok(None),
        Some(RawAtomic::Flag(true)) => Ok(Some(DEFAULT_ATOMIC_WINDOW)),
        Some(RawAtomic::Millis(ms)) => millis("atomic", Some(ms), DEFAULT_ATOMIC_WINDOW).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<WatchConfig> {
        let raw: RawWatchConfig = toml::from_str(src)?;
        WatchConfig::try_from(raw)
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse("").unwrap();
        assert!(cfg.paths.is_empty());
        assert!(cfg.options.persistent);
        assert!(cfg.options.follow_symlinks);
        assert!(cfg.options.ignore_tmp_files);
        assert_eq!(cfg.options.interval, DEFAULT_INTERVAL);
        assert!(cfg.options.atomic.is_none());
        assert!(cfg.options.await_write_finish.is_none());
    }

    #[test]
    fn flags_and_tables_for_timed_options() {
        let cfg = parse(
            r#"
            atomic = true
            await_write_finish = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.options.atomic, Some(DEFAULT_ATOMIC_WINDOW));
        assert_eq!(cfg.options.await_write_finish, Some(AwaitWriteFinish::default()));

        let cfg = parse(
            r#"
            atomic = 250
            [await_write_finish]
            stability_threshold = 500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.options.atomic, Some(Duration::from_millis(250)));
        let awf = cfg.options.await_write_finish.unwrap();
        assert_eq!(awf.stability_threshold, Duration::from_millis(500));
        assert_eq!(awf.poll_interval, DEFAULT_WRITE_POLL_INTERVAL);
    }

    #[test]
    fn rejects_zero_intervals_and_bad_regexes() {
        assert!(matches!(parse("interval = 0"), Err(WatchError::ConfigError(_))));
        assert!(matches!(
            parse(r#"ignored_regex = ["(unclosed"]"#),
            Err(WatchError::ConfigError(_))
        ));
        assert!(matches!(parse("unknown_key = 1"), Err(WatchError::TomlError(_))));
    }

    #[test]
    fn ignored_entries_keep_their_kind() {
        let cfg = parse(
            r#"
            ignored = ["build", "**/*.log"]
            ignored_regex = ['\.tmp$']
            "#,
        )
        .unwrap();
        let kinds: Vec<&str> = cfg
            .options
            .ignored
            .iter()
            .map(|i| match i {
                Ignored::Pattern(_) => "pattern",
                Ignored::Regex(_) => "regex",
                Ignored::Predicate(_) => "predicate",
            })
            .collect();
        assert_eq!(kinds, vec!["pattern", "pattern", "regex"]);
    }
}
