//! Configuration types for StashDB
//!
//! This module defines configuration structures used across components.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of backup generations kept per store file
pub const DEFAULT_MAX_BACKUP_FILES: usize = 5;
/// Default debounce window before a deferred commit runs
pub const DEFAULT_WRITE_DELAY_MS: u64 = 500;
/// Default ceiling on how long a commit may be deferred
pub const DEFAULT_MAX_DEFERRED_PERIOD_MS: u64 = 60_000;
/// File extension used for store files managed by a storage service
pub const STORE_FILE_EXTENSION: &str = "json";

/// Configuration for a single store file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Primary file the store is read from and written to
    pub file_path: PathBuf,
    /// Number of backup generations to retain
    #[serde(default = "default_max_backup_files")]
    pub max_backup_files: usize,
    /// Debounce window (milliseconds)
    #[serde(default = "default_write_delay_ms")]
    pub write_delay_ms: u64,
    /// Maximum time unflushed mutations may wait (milliseconds)
    #[serde(default = "default_max_deferred_period_ms")]
    pub max_deferred_period_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from("./stashdb.json"),
            max_backup_files: DEFAULT_MAX_BACKUP_FILES,
            write_delay_ms: DEFAULT_WRITE_DELAY_MS,
            max_deferred_period_ms: DEFAULT_MAX_DEFERRED_PERIOD_MS,
        }
    }
}

impl StoreConfig {
    /// Create config for the given primary file with default timings
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Debounce window
    #[must_use]
    pub const fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms)
    }

    /// Staleness ceiling
    #[must_use]
    pub const fn max_deferred_period(&self) -> Duration {
        Duration::from_millis(self.max_deferred_period_ms)
    }

    /// Check that the timings make sense together
    pub fn validate(&self) -> Result<()> {
        if self.file_path.file_name().is_none() {
            return Err(Error::configuration(format!(
                "store path {} has no file name",
                self.file_path.display()
            )));
        }
        if self.write_delay_ms == 0 {
            return Err(Error::configuration("write_delay_ms must be positive"));
        }
        if self.max_deferred_period_ms < self.write_delay_ms {
            return Err(Error::configuration(format!(
                "max_deferred_period_ms ({}) is shorter than write_delay_ms ({})",
                self.max_deferred_period_ms, self.write_delay_ms
            )));
        }
        Ok(())
    }
}

/// Configuration for a directory of named stores
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding store files (and their `backup/` directory)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Number of backup generations to retain per store
    #[serde(default = "default_max_backup_files")]
    pub max_backup_files: usize,
    /// Debounce window (milliseconds)
    #[serde(default = "default_write_delay_ms")]
    pub write_delay_ms: u64,
    /// Maximum time unflushed mutations may wait (milliseconds)
    #[serde(default = "default_max_deferred_period_ms")]
    pub max_deferred_period_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_backup_files: DEFAULT_MAX_BACKUP_FILES,
            write_delay_ms: DEFAULT_WRITE_DELAY_MS,
            max_deferred_period_ms: DEFAULT_MAX_DEFERRED_PERIOD_MS,
        }
    }
}

impl StorageConfig {
    /// Create config with data directory
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::configuration(e.to_string()))
    }

    /// Store configuration for the named store inside `data_dir`
    #[must_use]
    pub fn store_config(&self, name: &str) -> StoreConfig {
        StoreConfig {
            file_path: self
                .data_dir
                .join(format!("{name}.{STORE_FILE_EXTENSION}")),
            max_backup_files: self.max_backup_files,
            write_delay_ms: self.write_delay_ms,
            max_deferred_period_ms: self.max_deferred_period_ms,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./stashdb-data")
}

const fn default_max_backup_files() -> usize {
    DEFAULT_MAX_BACKUP_FILES
}

const fn default_write_delay_ms() -> u64 {
    DEFAULT_WRITE_DELAY_MS
}

const fn default_max_deferred_period_ms() -> u64 {
    DEFAULT_MAX_DEFERRED_PERIOD_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.max_backup_files, 5);
        assert_eq!(config.write_delay(), Duration::from_millis(500));
        assert_eq!(config.max_deferred_period(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_timings() {
        let mut config = StoreConfig::new("/tmp/db.json");
        config.write_delay_ms = 0;
        assert!(config.validate().is_err());

        config.write_delay_ms = 1000;
        config.max_deferred_period_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_config_from_toml() {
        let config = StorageConfig::from_toml_str(
            r#"
            data_dir = "/var/lib/stashdb"
            write_delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/stashdb"));
        assert_eq!(config.write_delay_ms, 250);
        assert_eq!(config.max_backup_files, DEFAULT_MAX_BACKUP_FILES);

        let store = config.store_config("things");
        assert_eq!(store.file_path, PathBuf::from("/var/lib/stashdb/things.json"));
        assert_eq!(store.write_delay_ms, 250);
    }

    #[test]
    fn test_storage_config_rejects_garbage() {
        assert!(StorageConfig::from_toml_str("write_delay_ms = \"soon\"").is_err());
    }
}
