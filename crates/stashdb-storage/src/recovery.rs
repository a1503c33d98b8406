//! Load-time recovery
//!
//! The primary file wins if it decodes. Otherwise backups are tried from the
//! newest down, at most `max_backup_files` of them, and the first one that
//! decodes becomes the initial contents.

use crate::backup::BackupDirectory;
use crate::codec::{self, Document};
use stashdb_common::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a store's initial contents came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoverySource {
    /// The primary file
    Primary,
    /// A backup; `age` 1 is the newest
    Backup { age: usize, path: PathBuf },
    /// Nothing usable was found
    Empty,
}

pub(crate) fn load_initial(
    primary: &Path,
    backups: &BackupDirectory,
    max_backup_files: usize,
) -> (Document, RecoverySource) {
    if primary.exists() {
        match read_document(primary) {
            Ok(document) => return (document, RecoverySource::Primary),
            Err(e) => warn!(
                "Store file {:?} seems to be corrupt ({}) - checking for a backup",
                primary, e
            ),
        }
    } else {
        debug!("Store file {:?} does not exist - checking for a backup", primary);
    }

    for age in 1..=max_backup_files {
        let path = match backups.resolve_by_age(age) {
            Ok(Some(path)) => path,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to list backups in {:?}: {}", backups.path(), e);
                break;
            }
        };

        match read_document(&path) {
            Ok(document) => {
                info!("Store file {:?} restored from backup {} ({:?})", primary, age, path);
                return (document, RecoverySource::Backup { age, path });
            }
            Err(e) => warn!("Backup {:?} is unusable: {}", path, e),
        }
    }

    (Document::new(), RecoverySource::Empty)
}

fn read_document(path: &Path) -> Result<Document> {
    let text = std::fs::read_to_string(path)?;
    codec::decode(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupFile;
    use crate::codec::Entry;
    use serde_json::json;
    use tempfile::tempdir;

    fn document_with(value: i64) -> String {
        let mut document = Document::new();
        document.insert("v".into(), Entry::new("i64", json!(value)).into());
        codec::encode(&document).unwrap()
    }

    fn write_backup(backups: &BackupDirectory, timestamp: i64, text: &str) {
        std::fs::create_dir_all(backups.path()).unwrap();
        std::fs::write(backups.backup_path(timestamp), text).unwrap();
    }

    #[test]
    fn test_primary_preferred() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("things.json");
        let backups = BackupDirectory::for_primary(&primary).unwrap();
        std::fs::write(&primary, document_with(1)).unwrap();
        write_backup(&backups, 100, &document_with(2));

        let (document, source) = load_initial(&primary, &backups, 5);
        assert_eq!(source, RecoverySource::Primary);
        assert_eq!(document["v"], Entry::new("i64", json!(1)));
    }

    #[test]
    fn test_newest_valid_backup_wins() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("things.json");
        let backups = BackupDirectory::for_primary(&primary).unwrap();
        std::fs::write(&primary, "{ definitely not json").unwrap();
        write_backup(&backups, 100, &document_with(1));
        write_backup(&backups, 200, &document_with(2));
        write_backup(&backups, 300, &document_with(3));

        let (document, source) = load_initial(&primary, &backups, 5);
        assert_eq!(
            source,
            RecoverySource::Backup {
                age: 1,
                path: backups.backup_path(300)
            }
        );
        assert_eq!(document["v"], Entry::new("i64", json!(3)));
    }

    #[test]
    fn test_skips_corrupt_backups() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("things.json");
        let backups = BackupDirectory::for_primary(&primary).unwrap();
        write_backup(&backups, 100, &document_with(1));
        write_backup(&backups, 200, "");
        write_backup(&backups, 300, "[garbage");

        let (document, source) = load_initial(&primary, &backups, 5);
        assert!(matches!(source, RecoverySource::Backup { age: 3, .. }));
        assert_eq!(document["v"], Entry::new("i64", json!(1)));
    }

    #[test]
    fn test_search_bounded_by_retention() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("things.json");
        let backups = BackupDirectory::for_primary(&primary).unwrap();
        write_backup(&backups, 100, &document_with(1));
        write_backup(&backups, 200, "null");
        write_backup(&backups, 300, "null");

        let (document, source) = load_initial(&primary, &backups, 2);
        assert_eq!(source, RecoverySource::Empty);
        assert!(document.is_empty());
    }

    #[test]
    fn test_ignores_other_primaries() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("things.json");
        let backups = BackupDirectory::for_primary(&primary).unwrap();
        std::fs::create_dir_all(backups.path()).unwrap();
        std::fs::write(
            backups.path().join(BackupFile::file_name(100, "other.json")),
            document_with(9),
        )
        .unwrap();

        let (document, source) = load_initial(&primary, &backups, 5);
        assert_eq!(source, RecoverySource::Empty);
        assert!(document.is_empty());
    }
}
