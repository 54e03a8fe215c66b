// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{RawWatchConfig, WatchConfig};
use crate::errors::Result;

/// Load a configuration file and return the raw [`RawWatchConfig`].
///
/// This only performs TOML deserialization. Use [`load_and_validate`] to
/// also apply defaults and check values.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWatchConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawWatchConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WatchConfig> {
    let raw_config = load_from_path(&path)?;
    let config = WatchConfig::try_from(raw_config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WatchError;

    #[test]
    fn loads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treewatch.toml");
        fs::write(&path, "paths = [\"src\"]\ndepth = 2\nfollow_symlinks = false\n").unwrap();

        let cfg = load_and_validate(&path).unwrap();
        assert_eq!(cfg.paths, vec!["src"]);
        assert_eq!(cfg.options.depth, Some(2));
        assert!(!cfg.options.follow_symlinks);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from_path(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, WatchError::IoError(_)));
    }
}
