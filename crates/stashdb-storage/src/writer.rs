//! Persistence writer
//!
//! Writes the primary file and a fresh backup from the same encoded bytes,
//! then prunes old backups. Writing both copies in one pass keeps the newest
//! backup identical to the primary without a separate copy step.

use crate::backup::BackupDirectory;
use crate::codec::{self, Document, Record};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};

/// Outcome of one commit
#[derive(Clone, Debug, Default)]
pub(crate) struct CommitReport {
    /// Number of entries written
    pub entries: usize,
    /// Primary file written successfully
    pub primary_written: bool,
    /// Backup written, if it succeeded
    pub backup: Option<PathBuf>,
    /// Old backups removed afterwards
    pub pruned: usize,
}

impl CommitReport {
    pub(crate) const fn succeeded(&self) -> bool {
        self.primary_written && self.backup.is_some()
    }
}

/// Serializes the map to the primary file and a new backup
pub(crate) struct PersistenceWriter {
    primary: PathBuf,
    backups: BackupDirectory,
    max_backup_files: usize,
    /// Commit lock; holds the timestamp of the last backup written
    last_backup: Mutex<i64>,
}

impl PersistenceWriter {
    /// Create a writer; backup timestamps continue after the newest backup
    /// already on disk
    pub(crate) fn new(primary: PathBuf, backups: BackupDirectory, max_backup_files: usize) -> Self {
        let last_backup = match backups.list() {
            Ok(existing) => existing.last().map_or(0, |backup| backup.timestamp),
            Err(e) => {
                warn!("Failed to list backups in {:?}: {}", backups.path(), e);
                0
            }
        };

        Self {
            primary,
            backups,
            max_backup_files,
            last_backup: Mutex::new(last_backup),
        }
    }

    pub(crate) fn backups(&self) -> &BackupDirectory {
        &self.backups
    }

    /// Run one commit.
    ///
    /// `begin` runs first, under the commit lock, and decides whether the
    /// commit goes ahead. The map is snapshotted after it returns, so a
    /// mutation racing with the commit is either in this snapshot or re-arms
    /// the scheduler for the next one.
    pub(crate) fn commit(
        &self,
        entries: &DashMap<String, Record>,
        begin: impl FnOnce() -> bool,
    ) -> Option<CommitReport> {
        let mut last_backup = self.last_backup.lock();
        if !begin() {
            return None;
        }

        let document: Document = entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut report = CommitReport {
            entries: document.len(),
            ..Default::default()
        };

        let data = match codec::encode(&document) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to encode store {:?}: {}", self.primary, e);
                return Some(report);
            }
        };

        match write_file(&self.primary, data.as_bytes()) {
            Ok(()) => report.primary_written = true,
            Err(e) => error!("Error writing store to {:?}: {}", self.primary, e),
        }

        let timestamp = now_millis().max(*last_backup + 1);
        let backup_path = self.backups.backup_path(timestamp);
        match write_file(&backup_path, data.as_bytes()) {
            Ok(()) => {
                *last_backup = timestamp;
                report.backup = Some(backup_path);
            }
            Err(e) => error!("Error writing backup to {:?}: {}", backup_path, e),
        }

        if report.backup.is_some() {
            match self.backups.prune(self.max_backup_files) {
                Ok(pruned) => report.pruned = pruned,
                Err(e) => warn!("Failed to prune backups in {:?}: {}", self.backups.path(), e),
            }
        }

        debug!(
            "Committed {} entries to {:?} (backup: {:?}, pruned: {})",
            report.entries, self.primary, report.backup, report.pruned
        );
        Some(report)
    }
}

/// Write `data` to `path` via a synced temporary file and a rename, then
/// sync the directory so the rename itself is durable
fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let replaced = write_temp(&temp_path, data).and_then(|()| std::fs::rename(&temp_path, path));
    if let Err(e) = replaced {
        if let Err(cleanup) = std::fs::remove_file(&temp_path)
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove {:?}: {}", temp_path, cleanup);
        }
        return Err(e);
    }

    sync_dir(parent)
}

fn write_temp(temp_path: &Path, data: &[u8]) -> std::io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(temp_path)?;

    let mut writer = BufWriter::new(file);
    writer.write_all(data)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

// Directories cannot be opened as files here; the rename is as durable as it gets
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}
