//! Facade configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{cache::CacheFailurePolicy, options::DEFAULT_TTL};

/// Settings shared by every call of a [`DocCache`](crate::facade::DocCache).
///
/// Deserializes from any serde format; missing keys take their defaults:
///
/// ```ignore
/// let config: DocCacheConfig = serde_json::from_str(r#"{ "default_ttl_secs": 600 }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocCacheConfig {
    /// Lifetime of cache entries written by calls that set no TTL.
    pub default_ttl_secs: u64,
    pub cache_failure: CacheFailurePolicy,
}

impl DocCacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

impl Default for DocCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_TTL.as_secs(),
            cache_failure: CacheFailurePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let config: DocCacheConfig = serde_json::from_str(r#"{ "cache_failure": "escalate" }"#).unwrap();

        assert_eq!(config.default_ttl(), DEFAULT_TTL);
        assert_eq!(config.cache_failure, CacheFailurePolicy::Escalate);
    }
}
