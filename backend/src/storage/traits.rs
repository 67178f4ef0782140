//! # Storage Traits
//!
//! This module defines the storage abstraction that lets the domain layer run
//! against SQLite on device, an in-memory map in tests, or anything else that
//! can hold string values under string keys.

use anyhow::Result;
use async_trait::async_trait;

/// Trait defining the interface for key-value storage operations
///
/// Every method is fallible. Callers in the domain layer decide whether a
/// failure is fatal (explicit saves) or should degrade to a default (reads).
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Retrieve a value by its key
    async fn get_value(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, overwriting any existing value for the same key
    async fn put_value(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value by its key
    /// Returns true if the key was present
    async fn delete_value(&self, key: &str) -> Result<bool>;
}
