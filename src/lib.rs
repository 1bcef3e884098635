//! redis-cacher - Cache-aside accessor backed by Redis
//!
//! Given a logical key, [`Cacher::fetch`] returns a previously computed value
//! from a shared store if present and unexpired. Otherwise it runs a
//! caller-supplied [`Calculator`], returns the result immediately and
//! persists it in the background with a time-to-live, so later callers
//! (including other processes sharing the store) get a hit.
//!
//! The cacher supports:
//! - String, numeric and object key descriptors, with per-request `expires`
//! - Sub-keys to distinguish entries sharing a title
//! - JSON payloads, falling back to the raw string when a payload is not JSON
//! - Fail-open or fail-closed handling of store read errors
//! - Redis (`HGET` / `MULTI HMSET EXPIRE`) and in-memory (Moka) stores
//!
//! There is no de-duplication of concurrent misses: two callers missing the
//! same key both calculate, and the last write wins.
//!
//! ```ignore
//! use redis_cacher::{CacheConfig, Cacher, Calculator, FetchRequest, RedisEndpoint, RedisStore};
//!
//! let store = RedisStore::connect(&RedisEndpoint::Url { url: "redis://127.0.0.1/".into() }).await?;
//! let cacher = Cacher::new(store, CacheConfig::default())?;
//!
//! let report = cacher
//!     .fetch(
//!         FetchRequest::key(serde_json::json!({"title": "report", "expires": 60}))
//!             .with_sub("2024-q1")
//!             .with_calculator(Calculator::new(|| async { Ok(build_report().await?) })),
//!     )
//!     .await?;
//! ```

mod cacher;
mod calculator;
pub mod codec;
mod config;
mod error;
pub mod key;
mod memory_store;
#[cfg(feature = "python")]
mod python;
mod redis_store;
pub mod request;
mod store;

pub use cacher::{CacheStats, Cacher, FetchSource, Fetched, PersistHandle};
pub use calculator::{Calculator, Completion};
pub use config::{CacheConfig, DEFAULT_EXPIRES, DEFAULT_PREFIX, MAX_EXPIRES, ReadFailurePolicy};
pub use error::{BoxError, CacheError, StoreError};
pub use key::{KeyBuilder, SubKey};
pub use memory_store::MemoryStore;
pub use redis_store::{RedisEndpoint, RedisStore};
pub use request::{Arg, FetchOptions, FetchRequest, NormalizedRequest};
pub use store::{CacheEntry, CacheStore, UPDATED_FIELD, VALUE_FIELD};

// Re-export async_trait for store implementors
pub use async_trait::async_trait;
