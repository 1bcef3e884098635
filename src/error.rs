//! Cacher error types

use redis::RedisError;

/// Error type for caller-supplied failures (calculators, backends).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors visible to callers of [`Cacher::fetch`](crate::Cacher::fetch)
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Malformed or missing call arguments; no I/O was attempted.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The calculator reported a failure; nothing was written.
    #[error("Calculation error: {0}")]
    Calculation(#[source] BoxError),

    /// The store read failed and the cacher is configured to fail closed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl CacheError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CacheError::InvalidArgument(message.into())
    }
}

/// Failures at the store boundary
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("{0}")]
    Unavailable(String),
}
