//! In-process store backed by Moka
//!
//! Mirrors the Redis hash layout: each key holds a small field map and its own
//! TTL. Useful for tests and for single-process deployments that want the
//! same `fetch` semantics without a server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use crate::error::StoreError;
use crate::store::{CacheEntry, CacheStore, UPDATED_FIELD, VALUE_FIELD};

#[derive(Debug, Clone, Default)]
struct StoredHash {
    fields: HashMap<String, String>,
    /// `None` keeps the entry until it is overwritten with a TTL
    ttl: Option<Duration>,
}

/// Per-entry expiry: every insert restarts the countdown, like `EXPIRE`.
struct HashExpiry;

impl Expiry<String, Arc<StoredHash>> for HashExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<StoredHash>,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<StoredHash>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// [`CacheStore`] kept in local memory
#[derive(Clone)]
pub struct MemoryStore {
    entries: Cache<String, Arc<StoredHash>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let entries = Cache::builder().expire_after(HashExpiry).build();
        Self { entries }
    }

    /// Store `value` under `key` without expiry, as another client might have.
    ///
    /// The payload is written verbatim, so it need not be valid JSON.
    pub async fn seed(&self, key: &str, value: &str, updated: u64) {
        let fields = HashMap::from([
            (VALUE_FIELD.to_owned(), value.to_owned()),
            (UPDATED_FIELD.to_owned(), updated.to_string()),
        ]);
        self.entries
            .insert(key.to_owned(), Arc::new(StoredHash { fields, ttl: None }))
            .await;
    }

    /// Read back a stored entry, if present and unexpired.
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        let hash = self.entries.get(key).await?;
        Some(CacheEntry {
            value: hash.fields.get(VALUE_FIELD)?.clone(),
            updated: hash.fields.get(UPDATED_FIELD)?.parse().ok()?,
        })
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .get(key)
            .await
            .and_then(|hash| hash.fields.get(field).cloned()))
    }

    async fn write_entry(
        &self,
        key: &str,
        entry: &CacheEntry,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        let mut fields = match self.entries.get(key).await {
            Some(existing) => existing.fields.clone(),
            None => HashMap::new(),
        };
        fields.insert(VALUE_FIELD.to_owned(), entry.value.clone());
        fields.insert(UPDATED_FIELD.to_owned(), entry.updated.to_string());

        let hash = StoredHash {
            fields,
            ttl: Some(Duration::from_secs(ttl_seconds)),
        };
        self.entries.insert(key.to_owned(), Arc::new(hash)).await;
        Ok(())
    }
}
