//! Cacher configuration

use serde::{Deserialize, Deserializer};

use crate::error::CacheError;

/// Default prefix prepended to every derived key.
pub const DEFAULT_PREFIX: &str = "cacher:";

/// Default time-to-live for stored entries, in seconds.
pub const DEFAULT_EXPIRES: u64 = 300;

/// Largest TTL the store accepts (`EXPIRE` takes a signed 64-bit count).
pub const MAX_EXPIRES: u64 = i64::MAX as u64;

/// Check that `expires` is a usable TTL: at least one second, at most [`MAX_EXPIRES`].
pub fn check_expires(expires: u64) -> Result<u64, CacheError> {
    if expires == 0 || expires > MAX_EXPIRES {
        return Err(CacheError::invalid(format!(
            "expires should be a positive number of seconds up to {MAX_EXPIRES}, got {expires}"
        )));
    }
    Ok(expires)
}

fn deserialize_expires<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let expires = u64::deserialize(deserializer)?;
    check_expires(expires).map_err(serde::de::Error::custom)
}

/// What `fetch` does when the store read itself fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFailurePolicy {
    /// Log the failure and treat it as a miss, so the calculator still runs.
    #[default]
    FailOpen,
    /// Surface the failure to the caller as [`CacheError::StoreUnavailable`](crate::CacheError).
    FailClosed,
}

/// Configuration for a [`Cacher`](crate::Cacher)
///
/// Fixed at construction. The store handle is not part of the configuration;
/// it is always passed explicitly to [`Cacher::new`](crate::Cacher::new).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Namespace prepended to every key
    pub prefix: String,
    /// Default TTL in seconds, used when a request carries no `expires`.
    /// Must be positive; see [`CacheConfig::validate`].
    #[serde(deserialize_with = "deserialize_expires")]
    pub expires: u64,
    /// Behaviour on store read errors
    pub read_failure: ReadFailurePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_owned(),
            expires: DEFAULT_EXPIRES, // 5 minutes
            read_failure: ReadFailurePolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Replace the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replace the default TTL (seconds).
    pub fn with_expires(mut self, expires: u64) -> Self {
        self.expires = expires;
        self
    }

    pub fn with_read_failure(mut self, policy: ReadFailurePolicy) -> Self {
        self.read_failure = policy;
        self
    }

    /// Reject settings under which nothing would ever be cached.
    pub fn validate(&self) -> Result<(), CacheError> {
        check_expires(self.expires)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.prefix, "cacher:");
        assert_eq!(config.expires, 300);
        assert_eq!(config.read_failure, ReadFailurePolicy::FailOpen);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"prefix": "app:", "read_failure": "fail_closed"}"#)
                .expect("config should parse");
        assert_eq!(config.prefix, "app:");
        assert_eq!(config.expires, DEFAULT_EXPIRES);
        assert_eq!(config.read_failure, ReadFailurePolicy::FailClosed);
    }

    #[test]
    fn test_validate_rejects_unusable_ttl() {
        assert!(CacheConfig::default().validate().is_ok());
        assert!(matches!(
            CacheConfig::default().with_expires(0).validate(),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            CacheConfig::default().with_expires(MAX_EXPIRES + 1).validate(),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(CacheConfig::default().with_expires(MAX_EXPIRES).validate().is_ok());
    }

    #[test]
    fn test_deserialize_rejects_zero_ttl() {
        let result = serde_json::from_str::<CacheConfig>(r#"{"expires": 0}"#);
        assert!(result.is_err());

        let config: CacheConfig = serde_json::from_str(r#"{"expires": 60}"#).unwrap();
        assert_eq!(config.expires, 60);
    }
}
