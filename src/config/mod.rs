// src/config/mod.rs

//! Configuration for treewatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model and the validated options (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Turn raw values into [`WatchOptions`] with defaults applied (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{AwaitWriteFinish, RawWatchConfig, WatchConfig, WatchOptions};
