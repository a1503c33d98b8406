//! StashDB Storage Engine - Deferred-commit JSON key-value store
//!
//! A store keeps every entry in memory and persists the whole map as a
//! single JSON document. Mutations never touch the disk themselves; they arm
//! a debounced commit that a background thread runs once the store has been
//! quiet for the configured write delay.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      JsonStore<V>                        │
//! │  put / remove / get / keys / values / commit             │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │     DashMap<String, Record>  (class + payload)     │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │           │ defer()                 ▲ decode on read     │
//! │  ┌────────▼───────────┐   ┌─────────┴──────────────┐     │
//! │  │  CommitScheduler   │   │     TypeResolver<V>    │     │
//! │  │  (debounce+ceiling)│   └────────────────────────┘     │
//! │  └────────┬───────────┘                                  │
//! │  ┌────────▼──────────────────────────────────────────┐   │
//! │  │  PersistenceWriter: primary + backup in one pass  │   │
//! │  │  BackupDirectory:   <dir>/backup/<ts>--<name>     │   │
//! │  └───────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Recovery
//! 1. Decode the primary file if it exists
//! 2. Otherwise try backups from newest to oldest, up to the retention count
//! 3. Start empty if nothing decodes

pub mod backup;
pub mod codec;
mod recovery;
pub mod resolver;
mod scheduler;
pub mod service;
pub mod store;
mod writer;

// Re-exports
pub use backup::{BackupDirectory, BackupFile};
pub use codec::{Document, Entry, Record};
pub use recovery::RecoverySource;
pub use resolver::{
    DynamicValue, PassthroughResolver, Storable, TypeDescriptor, TypeRegistry, TypeResolver,
};
pub use service::StorageService;
pub use store::{JsonStore, StoreStats};
