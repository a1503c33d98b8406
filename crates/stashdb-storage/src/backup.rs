//! Backup directory management
//!
//! Every commit leaves a snapshot of the primary file in a `backup`
//! directory next to it, named `<unix_millis>--<primary file name>`:
//!
//! ```text
//! data/
//! ├── things.json
//! └── backup/
//!     ├── 1700000000000--things.json
//!     └── 1700000001500--things.json
//! ```
//!
//! Several primary files may share one backup directory; each manager only
//! sees the files whose name part matches its own primary.

use stashdb_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the backup directory, created next to the primary file
pub const BACKUP_DIR_NAME: &str = "backup";

/// Separator between timestamp and primary file name
pub const SEPARATOR: &str = "--";

/// One backup generation of a primary file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupFile {
    /// Commit time (milliseconds since the Unix epoch)
    pub timestamp: i64,
    /// File name of the primary this is a copy of
    pub original_name: String,
    /// Full path of the backup file
    pub path: PathBuf,
}

impl BackupFile {
    /// Backup file name for a timestamp and primary name
    pub fn file_name(timestamp: i64, original_name: &str) -> String {
        format!("{timestamp}{SEPARATOR}{original_name}")
    }

    /// Parse `<timestamp>--<name>`; `None` for anything else
    pub fn parse(dir: &Path, file_name: &str) -> Option<Self> {
        let (timestamp, original_name) = file_name.split_once(SEPARATOR)?;
        if original_name.is_empty() {
            return None;
        }
        let timestamp = timestamp.parse::<i64>().ok()?;
        Some(Self {
            timestamp,
            original_name: original_name.to_string(),
            path: dir.join(file_name),
        })
    }
}

/// Backup set of a single primary file
#[derive(Clone, Debug)]
pub struct BackupDirectory {
    dir: PathBuf,
    primary_name: String,
}

impl BackupDirectory {
    /// Backup directory for the given primary file
    pub fn for_primary(primary: &Path) -> Result<Self> {
        let primary_name = primary
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::configuration(format!(
                    "store path {} has no usable file name",
                    primary.display()
                ))
            })?
            .to_string();
        let parent = primary.parent().unwrap_or_else(|| Path::new(""));

        Ok(Self {
            dir: parent.join(BACKUP_DIR_NAME),
            primary_name,
        })
    }

    /// Directory holding the backups
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// File name of the primary file these backups belong to
    pub fn primary_name(&self) -> &str {
        &self.primary_name
    }

    /// Path a backup taken at `timestamp` is written to
    pub fn backup_path(&self, timestamp: i64) -> PathBuf {
        self.dir
            .join(BackupFile::file_name(timestamp, &self.primary_name))
    }

    /// Backups of this primary, oldest first
    pub fn list(&self) -> Result<Vec<BackupFile>> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups: Vec<BackupFile> = read_dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name();
                BackupFile::parse(&self.dir, &name.to_string_lossy())
            })
            .filter(|backup| backup.original_name == self.primary_name)
            .collect();

        backups.sort_by_key(|backup| backup.timestamp);
        Ok(backups)
    }

    /// Path of the `age`-th most recent backup (1 = newest)
    pub fn resolve_by_age(&self, age: usize) -> Result<Option<PathBuf>> {
        if age == 0 {
            return Ok(None);
        }
        let backups = self.list()?;
        Ok(backups
            .len()
            .checked_sub(age)
            .map(|index| backups[index].path.clone()))
    }

    /// Delete all but the newest `retention` backups; returns how many went
    pub fn prune(&self, retention: usize) -> Result<usize> {
        let backups = self.list()?;
        let excess = backups.len().saturating_sub(retention);

        let mut removed = 0;
        for backup in backups.into_iter().take(excess) {
            match std::fs::remove_file(&backup.path) {
                Ok(()) => {
                    debug!("Pruned backup {:?}", backup.path);
                    removed += 1;
                }
                Err(e) => warn!("Failed to prune backup {:?}: {}", backup.path, e),
            }
        }

        Ok(removed)
    }
}
