// src/errors.rs

//! Crate-wide error type and classification helpers.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    /// A watch path that cannot be represented as a string.
    #[error("Non-string provided as watch path: {0}")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Backend error: {0}")]
    BackendError(#[from] notify::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("watcher is closed")]
    Closed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WatchError {
    /// The entry vanished (or a path component is not a directory).
    ///
    /// These are expected races in a live filesystem and never surface as
    /// `error` events.
    pub fn is_not_found(&self) -> bool {
        match self {
            WatchError::IoError(e) => is_missing(e),
            WatchError::BackendError(e) => match &e.kind {
                notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound => true,
                notify::ErrorKind::Io(io) => is_missing(io),
                _ => false,
            },
            _ => false,
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        match self {
            WatchError::IoError(e) => e.kind() == io::ErrorKind::PermissionDenied,
            WatchError::BackendError(e) => matches!(
                &e.kind,
                notify::ErrorKind::Io(io) if io.kind() == io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }
}

/// `ENOENT` / `ENOTDIR`.
pub fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WatchError>;
