//! Storage service
//!
//! Hands out one [`JsonStore`] per store name inside a data directory. Stores
//! are opened on first use and shared afterwards, so two callers asking for
//! the same name never end up with two writers on one file.

use crate::backup::SEPARATOR;
use crate::resolver::{Storable, TypeRegistry, TypeResolver};
use crate::store::JsonStore;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use serde::de::DeserializeOwned;
use stashdb_common::{Error, Result, StorageConfig};
use std::sync::Arc;
use tracing::info;

/// Manager for the named stores of one data directory
pub struct StorageService<V> {
    config: StorageConfig,
    resolver: Arc<dyn TypeResolver<V>>,
    stores: DashMap<String, Arc<JsonStore<V>>>,
}

impl<V: Storable + DeserializeOwned> StorageService<V> {
    /// Service whose stores hold values of type `V` only
    pub fn for_value_type(config: StorageConfig) -> Self {
        Self::new(config, Arc::new(TypeRegistry::<V>::for_value_type()))
    }
}

impl<V: Storable> StorageService<V> {
    pub fn new(config: StorageConfig, resolver: Arc<dyn TypeResolver<V>>) -> Self {
        Self {
            config,
            resolver,
            stores: DashMap::new(),
        }
    }

    /// Store named `name`, opening it on first use
    pub fn get_storage(&self, name: &str) -> Result<Arc<JsonStore<V>>> {
        validate_store_name(name)?;

        match self.stores.entry(name.to_string()) {
            MapEntry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            MapEntry::Vacant(entry) => {
                let store = JsonStore::with_resolver(
                    self.config.store_config(name),
                    Arc::clone(&self.resolver),
                )?;
                info!("Opened store '{}'", name);
                Ok(Arc::clone(entry.insert(Arc::new(store)).value()))
            }
        }
    }

    /// Names of the stores opened so far, sorted
    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|s| s.key().clone()).collect();
        names.sort_unstable();
        names
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Flush and stop every open store
    pub fn shutdown(&self) {
        for store in self.stores.iter() {
            store.value().shutdown();
        }
        info!("Storage service shut down ({} stores)", self.stores.len());
    }
}

/// Check that `name` maps to a single file inside the data directory
pub fn validate_store_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains(['/', '\\']) {
        "name contains a path separator"
    } else if name.contains("..") {
        "name contains '..'"
    } else if name.contains(SEPARATOR) {
        "name contains the backup separator"
    } else {
        return Ok(());
    };
    Err(Error::InvalidStoreName(format!("{name:?}: {reason}")))
}
