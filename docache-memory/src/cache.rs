//! In-memory cache driver with per-entry expiry.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mea::rwlock::RwLock;

use docache_core::{
    cache::{CacheDriver, CacheDriverBuilder},
    error::{DocCacheError, DocCacheResult},
};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Thread-safe in-memory cache driver.
///
/// Expired entries are never returned. They are dropped on lookup and swept on
/// every write.
/// Clones share the same entries.
#[derive(Default, Clone, Debug)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryCacheBuilder {
        InMemoryCacheBuilder::default()
    }

    /// Returns the number of live entries.
    pub async fn len(&self) -> usize {
        let now = Utc::now();

        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns the time left before the entry under `key` expires.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Utc::now();

        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| (entry.expires_at - now).to_std().ok())
    }
}

#[async_trait]
impl CacheDriver for InMemoryCache {
    async fn get(&self, key: &str) -> DocCacheResult<Option<String>> {
        let now = Utc::now();

        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }

        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> DocCacheResult<()> {
        let ttl = TimeDelta::from_std(ttl).map_err(|e| DocCacheError::Cache(e.to_string()))?;
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| DocCacheError::Cache(format!("ttl of {ttl} is out of range")))?;

        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(key.to_string(), Entry { value, expires_at });

        Ok(())
    }

    async fn del(&self, key: &str) -> DocCacheResult<()> {
        self.entries.write().await.remove(key);

        Ok(())
    }
}

/// Builder for [`InMemoryCache`] instances.
#[derive(Debug, Default)]
pub struct InMemoryCacheBuilder;

#[async_trait]
impl CacheDriverBuilder for InMemoryCacheBuilder {
    type Driver = InMemoryCache;

    async fn build(self) -> DocCacheResult<Self::Driver> {
        Ok(InMemoryCache::new())
    }
}
