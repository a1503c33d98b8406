//! StashDB Common - Shared types and utilities
//!
//! This crate provides the error type and configuration structures
//! used across all StashDB components.

pub mod config;
pub mod error;

pub use config::{StorageConfig, StoreConfig};
pub use error::{Error, Result};
