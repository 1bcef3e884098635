//! Backing key-value store seam
//!
//! Entries are hashes with two fields, `value` and `updated`, and a
//! store-managed expiry. The cacher only ever reads the `value` field and
//! writes both fields together with the expiry in one atomic batch.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::StoreError;

/// Hash field holding the encoded payload
pub const VALUE_FIELD: &str = "value";

/// Hash field holding the write timestamp (epoch milliseconds)
pub const UPDATED_FIELD: &str = "updated";

/// A stored entry as written by the cacher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Encoded payload
    pub value: String,
    /// Write time, milliseconds since the Unix epoch
    pub updated: u64,
}

impl CacheEntry {
    /// Entry stamped with the current time.
    pub fn new(value: String) -> Self {
        Self {
            value,
            updated: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Trait for the store the cacher reads from and writes to.
///
/// Implementations must apply [`CacheStore::write_entry`] atomically: both
/// fields and the expiry, or nothing.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Read one field of the hash at `key`; `None` if the key or field is absent.
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Set `value` and `updated` on the hash at `key` and expire it after
    /// `ttl_seconds`, as one atomic operation.
    async fn write_entry(
        &self,
        key: &str,
        entry: &CacheEntry,
        ttl_seconds: u64,
    ) -> Result<(), StoreError>;
}
