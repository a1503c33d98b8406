//! Value store
//!
//! `JsonStore` keeps every entry in a concurrent map and persists the whole
//! map through a background commit thread. Reads decode on demand, so an
//! entry whose type can no longer be resolved is skipped instead of failing
//! the store.

use crate::backup::BackupDirectory;
use crate::codec::{Entry, Record};
use crate::recovery::{self, RecoverySource};
use crate::resolver::{Storable, TypeRegistry, TypeResolver};
use crate::scheduler::{CommitScheduler, Deferral};
use crate::writer::PersistenceWriter;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use stashdb_common::{Result, StoreConfig};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::{debug, error, info, trace, warn};

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of keys held
    pub entries: usize,
    /// Commits that wrote both primary and backup
    pub commits: u64,
    /// Commits where at least one write failed
    pub failed_commits: u64,
    /// Unflushed mutations exist
    pub pending: bool,
    /// Backup generations currently on disk
    pub backups: usize,
}

/// State shared with the commit thread
struct StoreInner {
    entries: DashMap<String, Record>,
    scheduler: CommitScheduler,
    writer: PersistenceWriter,
    commits: AtomicU64,
    failed_commits: AtomicU64,
}

impl StoreInner {
    /// Commit the map. Without `force`, skips when nothing is pending.
    ///
    /// A failed commit leaves the mutations it carried pending, so the commit
    /// thread retries them and shutdown still flushes them.
    fn commit(&self, force: bool) -> bool {
        let mut taken = None;
        let report = self.writer.commit(&self.entries, || {
            taken = self.scheduler.take_pending();
            taken.is_some() || force
        });

        match report {
            Some(report) if report.succeeded() => {
                self.commits.fetch_add(1, Ordering::Relaxed);
                true
            }
            Some(_) => {
                self.failed_commits.fetch_add(1, Ordering::Relaxed);
                if let Some(since) = taken {
                    warn!("Commit failed, keeping changes pending for a retry");
                    self.scheduler.restore(since);
                }
                false
            }
            None => false,
        }
    }

    fn run_commit_loop(&self) {
        debug!("Commit thread started");
        while self.scheduler.wait_for_due() {
            self.commit(false);
        }
        debug!("Commit thread stopped");
    }
}

/// File-backed key-value store with deferred commits
pub struct JsonStore<V> {
    inner: Arc<StoreInner>,
    resolver: Arc<dyn TypeResolver<V>>,
    config: StoreConfig,
    recovered_from: RecoverySource,
    commit_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<V: Storable + DeserializeOwned> JsonStore<V> {
    /// Open a store holding values of type `V` only
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::with_resolver(config, Arc::new(TypeRegistry::<V>::for_value_type()))
    }
}

impl<V: Storable> JsonStore<V> {
    /// Open a store, decoding values through `resolver`
    pub fn with_resolver(
        config: StoreConfig,
        resolver: Arc<dyn TypeResolver<V>>,
    ) -> Result<Self> {
        config.validate()?;

        let backups = BackupDirectory::for_primary(&config.file_path)?;
        let (document, recovered_from) =
            recovery::load_initial(&config.file_path, &backups, config.max_backup_files);

        let inner = Arc::new(StoreInner {
            entries: document.into_iter().collect(),
            scheduler: CommitScheduler::new(config.write_delay(), config.max_deferred_period()),
            writer: PersistenceWriter::new(
                config.file_path.clone(),
                backups,
                config.max_backup_files,
            ),
            commits: AtomicU64::new(0),
            failed_commits: AtomicU64::new(0),
        });

        let thread_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("stashdb-commit".into())
            .spawn(move || thread_inner.run_commit_loop())?;

        info!(
            "Opened store at {:?} ({} entries, source: {:?})",
            config.file_path,
            inner.entries.len(),
            recovered_from
        );

        Ok(Self {
            inner,
            resolver,
            config,
            recovered_from,
            commit_thread: Mutex::new(Some(handle)),
        })
    }

    /// Store `value` under `key`; returns the previous value.
    ///
    /// Fails only if `value` cannot be encoded, in which case the store is
    /// unchanged.
    pub fn put(&self, key: impl Into<String>, value: &V) -> Result<Option<V>> {
        let key = key.into();
        let entry = Entry::encode(value)?;
        let previous = self.inner.entries.insert(key.clone(), Record::Entry(entry));
        self.defer_commit();
        Ok(previous.and_then(|entry| self.decode(&key, entry)))
    }

    /// Remove `key`; returns the removed value
    pub fn remove(&self, key: &str) -> Option<V> {
        let (key, entry) = self.inner.entries.remove(key)?;
        self.defer_commit();
        self.decode(&key, entry)
    }

    /// Value under `key`, or `None` if missing or undecodable
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.inner.entries.get(key)?.value().clone();
        self.decode(key, entry)
    }

    /// Snapshot of the current keys
    pub fn keys(&self) -> BTreeSet<String> {
        self.inner
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Every value that decodes; undecodable entries are left out
    pub fn values(&self) -> Vec<V> {
        let entries: Vec<(String, Record)> = self
            .inner
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        entries
            .into_iter()
            .filter_map(|(key, entry)| self.decode(&key, entry))
            .collect()
    }

    /// Check if a key exists, whether or not its value decodes
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Raw record under `key`, without decoding
    pub fn record(&self, key: &str) -> Option<Record> {
        self.inner.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Write the map now, outside the deferred schedule.
    ///
    /// Returns whether both files were written; failures are logged.
    pub fn commit(&self) -> bool {
        self.inner.commit(true)
    }

    /// Primary file path
    pub fn file_path(&self) -> &Path {
        &self.config.file_path
    }

    /// Configuration the store was opened with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Where the initial contents were loaded from
    pub fn recovered_from(&self) -> &RecoverySource {
        &self.recovered_from
    }

    /// Backup directory of this store
    pub fn backups(&self) -> &BackupDirectory {
        self.inner.writer.backups()
    }

    /// Get statistics
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entries: self.inner.entries.len(),
            commits: self.inner.commits.load(Ordering::Relaxed),
            failed_commits: self.inner.failed_commits.load(Ordering::Relaxed),
            pending: self.inner.scheduler.is_pending(),
            backups: self.backups().list().map_or(0, |backups| backups.len()),
        }
    }

    fn defer_commit(&self) {
        if self.inner.scheduler.defer() == Deferral::Stopped {
            debug!(
                "Store {:?} is shut down; change stays unflushed until commit()",
                self.config.file_path
            );
        }
    }

    fn decode(&self, key: &str, record: Record) -> Option<V> {
        let Record::Entry(entry) = record else {
            error!("Couldn't decode value '{}': not a class/value pair", key);
            return None;
        };
        let type_name = entry.type_name.clone();
        match entry.decode(&*self.resolver) {
            Ok(value) => {
                trace!("Decoded '{}' as {}", key, type_name);
                Some(value)
            }
            Err(e) => {
                error!("Couldn't decode value '{}' of type {}: {}", key, type_name, e);
                None
            }
        }
    }
}

impl<V> JsonStore<V> {
    /// Stop the commit thread and flush anything still pending
    pub fn shutdown(&self) {
        self.inner.scheduler.stop();

        let Some(handle) = self.commit_thread.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            error!("Commit thread for {:?} panicked", self.config.file_path);
        }

        if self.inner.commit(false) {
            info!("Flushed pending changes to {:?} on shutdown", self.config.file_path);
        }
    }
}

impl<V> Drop for JsonStore<V> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
