//! Redis-backed store
//!
//! Reads with `HGET key value`; writes with
//! `MULTI / HMSET key value .. updated .. / EXPIRE key ttl / EXEC`.

use std::path::PathBuf;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::Deserialize;

use crate::error::StoreError;
use crate::store::{CacheEntry, CacheStore, UPDATED_FIELD, VALUE_FIELD};

/// Where to reach Redis
///
/// Deserializes from any of `{"url": ..}`, `{"socket": ..}` or
/// `{"host": .., "port": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RedisEndpoint {
    Url { url: String },
    Socket { socket: PathBuf },
    HostPort { host: String, port: u16 },
}

impl RedisEndpoint {
    /// Connection URL understood by [`redis::Client::open`].
    pub fn to_url(&self) -> String {
        match self {
            RedisEndpoint::Url { url } => url.clone(),
            RedisEndpoint::Socket { socket } => format!("redis+unix://{}", socket.display()),
            RedisEndpoint::HostPort { host, port } => format!("redis://{}:{}/", host, port),
        }
    }
}

/// [`CacheStore`] over a Redis connection manager
#[derive(Clone)]
pub struct RedisStore {
    redis: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Create a store from an existing client.
    pub async fn new(redis_client: redis::Client) -> Result<Self, redis::RedisError> {
        let redis = redis::aio::ConnectionManager::new(redis_client).await?;
        Ok(Self { redis })
    }

    /// Open a client for `endpoint` and connect.
    pub async fn connect(endpoint: &RedisEndpoint) -> Result<Self, redis::RedisError> {
        Self::new(redis::Client::open(endpoint.to_url().as_str())?).await
    }

    /// Wrap a connection manager the application already owns.
    pub fn from_manager(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.redis.clone();
        let value = conn.hget::<_, _, Option<String>>(key, field).await?;
        Ok(value)
    }

    async fn write_entry(
        &self,
        key: &str,
        entry: &CacheEntry,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        let ttl = i64::try_from(ttl_seconds)
            .map_err(|_| StoreError::Unavailable(format!("TTL out of range: {ttl_seconds}")))?;
        let fields = [
            (VALUE_FIELD, entry.value.clone()),
            (UPDATED_FIELD, entry.updated.to_string()),
        ];

        let mut conn = self.redis.clone();
        redis::pipe()
            .atomic()
            .hset_multiple(key, &fields)
            .ignore()
            .expire(key, ttl)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        assert_eq!(
            RedisEndpoint::HostPort {
                host: "localhost".to_owned(),
                port: 6380
            }
            .to_url(),
            "redis://localhost:6380/"
        );
        assert_eq!(
            RedisEndpoint::Socket {
                socket: PathBuf::from("/tmp/redis.sock")
            }
            .to_url(),
            "redis+unix:///tmp/redis.sock"
        );
    }

    #[test]
    fn test_endpoint_deserialize() {
        let endpoint: RedisEndpoint =
            serde_json::from_str(r#"{"host": "cache", "port": 6379}"#).unwrap();
        assert_eq!(
            endpoint,
            RedisEndpoint::HostPort {
                host: "cache".to_owned(),
                port: 6379
            }
        );

        let endpoint: RedisEndpoint =
            serde_json::from_str(r#"{"url": "redis://127.0.0.1/2"}"#).unwrap();
        assert_eq!(endpoint.to_url(), "redis://127.0.0.1/2");
    }
}
