//! Cache-aside fetch
//!
//! [`Cacher::fetch`] reads the derived key from the store and returns the
//! decoded value on a hit. On a miss it runs the request's calculator,
//! returns the result at once and persists it in a spawned task with the
//! request's TTL. Callers must not assume the entry is readable as soon as
//! `fetch` returns; [`Cacher::fetch_tracked`] hands back a [`PersistHandle`]
//! for callers that need to observe the write.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::codec;
use crate::config::{CacheConfig, ReadFailurePolicy};
use crate::error::{CacheError, StoreError};
use crate::key::KeyBuilder;
use crate::request::{Arg, FetchRequest, NormalizedRequest};
use crate::store::{CacheEntry, CacheStore, VALUE_FIELD};

/// Where a fetched value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// Decoded from an existing store entry
    Store,
    /// Produced by the calculator on a miss
    Calculated,
}

/// Result of [`Cacher::fetch_tracked`]
#[derive(Debug)]
pub struct Fetched {
    pub value: Value,
    pub source: FetchSource,
    /// Pending store write; present only for calculated values
    pub persist: Option<PersistHandle>,
}

/// Handle on the background write that follows a calculated miss.
///
/// Dropping the handle does not cancel the write.
#[derive(Debug)]
pub struct PersistHandle {
    key: String,
    task: JoinHandle<Result<(), StoreError>>,
}

impl PersistHandle {
    /// Derived key being written
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the write to finish and return its outcome.
    pub async fn wait(self) -> Result<(), StoreError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Unavailable(format!(
                "write task for `{}` did not complete: {}",
                self.key, e
            ))),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    read_errors: AtomicU64,
    calculations: AtomicU64,
    calculation_errors: AtomicU64,
    writes: AtomicU64,
    write_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of a cacher's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Store reads that failed (each also counted as a miss under fail-open)
    pub read_errors: u64,
    pub calculations: u64,
    pub calculation_errors: u64,
    /// Background writes that completed
    pub writes: u64,
    pub write_errors: u64,
}

impl CacheStats {
    /// Hits as a fraction of all lookups, `0.0` before any lookup
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

/// Cache-aside accessor over a [`CacheStore`]
pub struct Cacher<S: CacheStore> {
    store: Arc<S>,
    config: Arc<CacheConfig>,
    keys: Arc<KeyBuilder>,
    counters: Arc<Counters>,
}

impl<S: CacheStore> Clone for Cacher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            keys: Arc::clone(&self.keys),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<S: CacheStore> Cacher<S> {
    /// Create a cacher over `store`.
    ///
    /// # Arguments
    ///
    /// * `store` - Backing store, shared with any other process using the same prefix
    /// * `config` - Key prefix, default TTL and read failure policy
    ///
    /// Fails with [`CacheError::InvalidArgument`] if the default TTL is zero
    /// or larger than the store accepts, since nothing would ever be cached.
    pub fn new(store: S, config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let keys = KeyBuilder::new(config.prefix.clone());
        Ok(Self {
            store: Arc::new(store),
            config: Arc::new(config),
            keys: Arc::new(keys),
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Derived store key for a request, without touching the store.
    pub fn key_for(&self, request: impl Into<FetchRequest>) -> Result<String, CacheError> {
        let normalized = request.into().normalize(&self.config)?;
        Ok(self
            .keys
            .build(&normalized.options.title, normalized.sub_key.as_ref()))
    }

    /// Return the cached value for the request, computing and caching it on a miss.
    ///
    /// Resolves to `null` on a miss when the request has no calculator.
    /// Must be called from within a tokio runtime.
    pub async fn fetch(&self, request: impl Into<FetchRequest>) -> Result<Value, CacheError> {
        self.fetch_tracked(request).await.map(|fetched| fetched.value)
    }

    /// [`Cacher::fetch`] with positional arguments, see [`FetchRequest::from_args`].
    pub async fn fetch_args(&self, args: Vec<Arg>) -> Result<Value, CacheError> {
        self.fetch(FetchRequest::from_args(args)?).await
    }

    /// Like [`Cacher::fetch`], also reporting where the value came from and
    /// handing back the pending write on a calculated miss.
    pub async fn fetch_tracked(
        &self,
        request: impl Into<FetchRequest>,
    ) -> Result<Fetched, CacheError> {
        let NormalizedRequest {
            options,
            sub_key,
            calculator,
        } = request.into().normalize(&self.config)?;

        let key = self.keys.build(&options.title, sub_key.as_ref());

        if let Some(value) = self.read(&key).await? {
            return Ok(Fetched {
                value,
                source: FetchSource::Store,
                persist: None,
            });
        }

        debug!("Calculating value of `{}`", key);
        Counters::bump(&self.counters.calculations);
        let data = match calculator.run().await {
            Ok(data) => data,
            Err(e) => {
                debug!("Unable to calculate value for `{}`: {}", key, e);
                Counters::bump(&self.counters.calculation_errors);
                return Err(CacheError::Calculation(e));
            }
        };

        let persist = self.persist(key, &data, options.expires);
        Ok(Fetched {
            value: data,
            source: FetchSource::Calculated,
            persist: Some(persist),
        })
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            read_errors: c.read_errors.load(Ordering::Relaxed),
            calculations: c.calculations.load(Ordering::Relaxed),
            calculation_errors: c.calculation_errors.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            write_errors: c.write_errors.load(Ordering::Relaxed),
        }
    }

    /// `Ok(None)` means the calculator has to run.
    async fn read(&self, key: &str) -> Result<Option<Value>, CacheError> {
        match self.store.get_field(key, VALUE_FIELD).await {
            Ok(Some(payload)) if !codec::is_null_payload(&payload) => {
                debug!("Cache hit for `{}`", key);
                Counters::bump(&self.counters.hits);
                Ok(Some(codec::decode(&payload)))
            }
            Ok(_) => {
                debug!("No value in cache for `{}`", key);
                Counters::bump(&self.counters.misses);
                Ok(None)
            }
            Err(e) => {
                Counters::bump(&self.counters.read_errors);
                match self.config.read_failure {
                    ReadFailurePolicy::FailOpen => {
                        warn!(
                            "Unable to retrieve `{}` from cache ({}). Falling back to calculation.",
                            key, e
                        );
                        Counters::bump(&self.counters.misses);
                        Ok(None)
                    }
                    ReadFailurePolicy::FailClosed => {
                        warn!("Unable to retrieve `{}` from cache: {}", key, e);
                        Err(CacheError::StoreUnavailable(e))
                    }
                }
            }
        }
    }

    /// Spawn the store write for a calculated value. Never awaited by `fetch`.
    fn persist(&self, key: String, data: &Value, ttl_seconds: u64) -> PersistHandle {
        let entry = CacheEntry::new(codec::encode(data));
        let store = Arc::clone(&self.store);
        let counters = Arc::clone(&self.counters);
        let task_key = key.clone();

        let task = tokio::spawn(async move {
            match store.write_entry(&task_key, &entry, ttl_seconds).await {
                Ok(()) => {
                    debug!("Saved `{}` to cache for {}s", task_key, ttl_seconds);
                    Counters::bump(&counters.writes);
                    Ok(())
                }
                Err(e) => {
                    error!("Unable to save `{}` value to cache: {}", task_key, e);
                    Counters::bump(&counters.write_errors);
                    Err(e)
                }
            }
        });

        PersistHandle { key, task }
    }
}
