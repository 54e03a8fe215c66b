// src/watch/mod.rs

//! Path matching and bookkeeping used by the engine.
//!
//! This module is responsible for:
//! - Path normalization and relativization (`path_utils`).
//! - Glob compilation and segment matching (`patterns`).
//! - The memoized ignore matcher (`ignore`).
//! - Per-root filters built from a watch request (`helper`).
//! - The watched-directory tree (`tree`).
//!
//! It does **not** talk to a backend or emit events; the engine does.

pub mod helper;
pub mod ignore;
pub mod path_utils;
pub mod patterns;
pub mod tree;

pub use helper::WatchHelper;
pub use ignore::{IgnoreMatcher, Ignored};
pub use tree::WatchedDirs;
