//! Viewer configuration
//!
//! Read from `<config dir>/filmstrip/config.json`; every field is optional and
//! falls back to its default. The thumbnail pool size is fixed and not part of
//! the file.

use image_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    #[serde(flatten)]
    pub cache: CacheConfig,
    /// Step into the next/previous archive when navigating past either end
    pub auto_open_archive: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            auto_open_archive: true,
        }
    }
}

impl ViewerConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("filmstrip")
            .join("config.json")
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path`, or the defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "cache_size": 5 }"#).unwrap();

        let config = ViewerConfig::load(&path).unwrap();
        assert_eq!(config.cache.cache_size, 5);
        assert_eq!(config.cache.thumbnail_size, 128);
        assert!(config.auto_open_archive);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = ViewerConfig::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ cache_size: ").unwrap();

        assert!(matches!(
            ViewerConfig::load_or_default(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_round_trip_is_flat() {
        let config = ViewerConfig {
            auto_open_archive: false,
            ..ViewerConfig::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["cache_size"], 2);
        assert_eq!(json["auto_open_archive"], false);
    }
}
