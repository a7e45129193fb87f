use std::{fmt, time::Duration};

use async_trait::async_trait;
use redis::{Client, aio::MultiplexedConnection};

use docache_core::{
    cache::{CacheDriver, CacheDriverBuilder},
    error::{DocCacheError, DocCacheResult},
};

/// Redis cache driver over a multiplexed async connection.
///
/// Entries are written with `SET key value PX ttl`, so Redis expires them on its
/// own. When a namespace is set, every key is stored as `namespace:key`.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    namespace: Option<String>,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    pub fn new(connection: MultiplexedConnection, namespace: Option<String>) -> Self {
        Self { connection, namespace }
    }

    pub fn builder(url: &str) -> RedisCacheBuilder {
        RedisCacheBuilder::new(url)
    }

    fn namespaced(&self, key: &str) -> String {
        namespaced(self.namespace.as_deref(), key)
    }
}

fn namespaced(namespace: Option<&str>, key: &str) -> String {
    match namespace {
        Some(namespace) => format!("{namespace}:{key}"),
        None => key.to_string(),
    }
}

/// Expiry in milliseconds; Redis rejects a zero expiry.
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .max(1)
}

#[async_trait]
impl CacheDriver for RedisCache {
    async fn get(&self, key: &str) -> DocCacheResult<Option<String>> {
        let mut connection = self.connection.clone();

        let value: Option<String> = redis::cmd("GET")
            .arg(self.namespaced(key))
            .query_async(&mut connection)
            .await
            .map_err(|e| DocCacheError::Cache(e.to_string()))?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> DocCacheResult<()> {
        let mut connection = self.connection.clone();

        let _: () = redis::cmd("SET")
            .arg(self.namespaced(key))
            .arg(value)
            .arg("PX")
            .arg(expiry_millis(ttl))
            .query_async(&mut connection)
            .await
            .map_err(|e| DocCacheError::Cache(e.to_string()))?;

        Ok(())
    }

    async fn del(&self, key: &str) -> DocCacheResult<()> {
        let mut connection = self.connection.clone();

        let removed: i64 = redis::cmd("DEL")
            .arg(self.namespaced(key))
            .query_async(&mut connection)
            .await
            .map_err(|e| DocCacheError::Cache(e.to_string()))?;

        tracing::debug!(key, removed, "redis del");

        Ok(())
    }
}

pub struct RedisCacheBuilder {
    url: String,
    namespace: Option<String>,
}

impl RedisCacheBuilder {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            namespace: None,
        }
    }

    /// Prefixes every key with `namespace:`.
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }
}

#[async_trait]
impl CacheDriverBuilder for RedisCacheBuilder {
    type Driver = RedisCache;

    async fn build(self) -> DocCacheResult<Self::Driver> {
        let connection = Client::open(self.url.as_str())
            .map_err(|e| DocCacheError::Initialization(e.to_string()))?
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| DocCacheError::Initialization(e.to_string()))?;

        Ok(RedisCache::new(connection, self.namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed_with_the_namespace() {
        assert_eq!(namespaced(Some("app"), "users:all"), "app:users:all");
        assert_eq!(namespaced(None, "users:all"), "users:all");
    }

    #[test]
    fn expiry_is_never_zero() {
        assert_eq!(expiry_millis(Duration::ZERO), 1);
        assert_eq!(expiry_millis(Duration::from_secs(86_400)), 86_400_000);
    }
}
