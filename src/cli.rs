// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `treewatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "treewatch",
    version,
    about = "Watch files and directories and print normalized change events.",
    long_about = None
)]
pub struct CliArgs {
    /// Files, directories or globs to watch. `!`-prefixed entries are ignored.
    #[arg(value_name = "PATHS")]
    pub paths: Vec<String>,

    /// Optional TOML config file; flags override its values.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Ignore paths matching this glob (repeatable).
    #[arg(long = "ignore", value_name = "GLOB")]
    pub ignored: Vec<String>,

    /// Use the polling backend.
    #[arg(long)]
    pub poll: bool,

    /// Polling interval in milliseconds.
    #[arg(long, value_name = "MS")]
    pub interval: Option<u64>,

    /// Maximum recursion depth below each root (0 = immediate children).
    #[arg(long, value_name = "N")]
    pub depth: Option<usize>,

    /// Base directory for relative paths and for printed paths.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Do not report entries found by the initial scan.
    #[arg(long)]
    pub ignore_initial: bool,

    /// Hold add/change until the file size is stable for MS milliseconds.
    #[arg(long, value_name = "MS", num_args = 0..=1, default_missing_value = "2000")]
    pub await_write_finish: Option<u64>,

    /// Coalesce unlink+add within MS milliseconds into a change.
    #[arg(long, value_name = "MS", num_args = 0..=1, default_missing_value = "100")]
    pub atomic: Option<u64>,

    /// Report symlinks themselves instead of their targets.
    #[arg(long)]
    pub no_follow_symlinks: bool,

    /// Attach stats to every add/addDir/change event.
    #[arg(long)]
    pub always_stat: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TREEWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_values_take_defaults_when_bare() {
        let args = CliArgs::parse_from(["treewatch", "src", "--atomic", "--await-write-finish"]);
        assert_eq!(args.paths, vec!["src"]);
        assert_eq!(args.atomic, Some(100));
        assert_eq!(args.await_write_finish, Some(2000));
    }

    #[test]
    fn repeatable_ignores_and_numbers() {
        let args = CliArgs::parse_from([
            "treewatch",
            "--ignore",
            "**/target/**",
            "--ignore",
            "*.log",
            "--interval",
            "250",
            "--depth",
            "0",
            ".",
        ]);
        assert_eq!(args.ignored, vec!["**/target/**", "*.log"]);
        assert_eq!(args.interval, Some(250));
        assert_eq!(args.depth, Some(0));
        assert_eq!(args.paths, vec!["."]);
    }
}
