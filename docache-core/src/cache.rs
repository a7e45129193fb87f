//! Cache driver abstraction and the cache-aside protocol.
//!
//! A [`CacheDriver`] is a plain key-value store of strings with per-entry
//! expiry. The [`CacheCoordinator`] layers the cache-aside protocol on top of
//! it without knowing what is cached: values are encoded as canonical extended
//! JSON on the way in and decoded symmetrically on the way out, so BSON types
//! such as `Int64`, `Double` and `DateTime` survive the round trip.
//!
//! ```ignore
//! let coordinator = CacheCoordinator::new(cache, CacheFailurePolicy::Tolerate);
//!
//! let users: Vec<Document> = coordinator
//!     .read_through("users:all", Duration::from_secs(60), || load_users())
//!     .await?;
//! ```

use std::{fmt::Debug, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use bson::Bson;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{DocCacheError, DocCacheResult};

/// Abstract interface for key-value caches.
///
/// Every method reports collaborator failures as
/// [`DocCacheError::Cache`](crate::error::DocCacheError::Cache).
#[async_trait]
pub trait CacheDriver: Send + Sync + Debug {
    /// Returns the value stored under `key`, or `None` if it is absent or expired.
    async fn get(&self, key: &str) -> DocCacheResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous entry, for `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> DocCacheResult<()>;

    /// Removes the entry stored under `key`. Removing an absent key is not an error.
    async fn del(&self, key: &str) -> DocCacheResult<()>;

    /// Cleanly shuts down the driver, releasing its connections.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocCacheResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<C> CacheDriver for &C
where
    C: CacheDriver,
{
    async fn get(&self, key: &str) -> DocCacheResult<Option<String>> {
        (*self).get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> DocCacheResult<()> {
        (*self).set(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> DocCacheResult<()> {
        (*self).del(key).await
    }
}

#[async_trait]
impl<C> CacheDriver for Arc<C>
where
    C: CacheDriver,
{
    async fn get(&self, key: &str) -> DocCacheResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> DocCacheResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> DocCacheResult<()> {
        (**self).del(key).await
    }

    async fn shutdown(self) -> DocCacheResult<()> {
        match Arc::try_unwrap(self) {
            Ok(driver) => driver.shutdown().await,
            Err(_) => Ok(()),
        }
    }
}

/// Factory for cache drivers.
#[async_trait]
pub trait CacheDriverBuilder {
    type Driver: CacheDriver;

    async fn build(self) -> DocCacheResult<Self::Driver>;
}

/// Placeholder driver of a facade built without a cache.
///
/// It is never reached: calls requesting the cache on such a facade fail with
/// [`DocCacheError::CacheUnavailable`] during routing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl CacheDriver for NoCache {
    async fn get(&self, _key: &str) -> DocCacheResult<Option<String>> {
        Err(DocCacheError::CacheUnavailable)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> DocCacheResult<()> {
        Err(DocCacheError::CacheUnavailable)
    }

    async fn del(&self, _key: &str) -> DocCacheResult<()> {
        Err(DocCacheError::CacheUnavailable)
    }
}

/// What happens when the cache rejects a write after the store succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheFailurePolicy {
    /// Log a warning and return the store result.
    #[default]
    Tolerate,
    /// Fail the call with the cache error.
    Escalate,
}

/// Runs the cache-aside protocol over a [`CacheDriver`].
#[derive(Debug)]
pub struct CacheCoordinator<C> {
    driver: C,
    policy: CacheFailurePolicy,
}

impl<C: CacheDriver> CacheCoordinator<C> {
    pub fn new(driver: C, policy: CacheFailurePolicy) -> Self {
        Self { driver, policy }
    }

    pub fn driver(&self) -> &C {
        &self.driver
    }

    pub fn policy(&self) -> CacheFailurePolicy {
        self.policy
    }

    /// Returns the cached value under `key`, or loads, caches and returns it.
    ///
    /// The loader runs only on a miss. A failing loader leaves the cache untouched.
    ///
    /// # Errors
    ///
    /// - [`DocCacheError::Cache`] if the lookup fails; the loader is not called.
    /// - [`DocCacheError::Serialization`] if the cached entry cannot be decoded.
    /// - The loader's error, unchanged.
    pub async fn read_through<T, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> DocCacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = DocCacheResult<T>>,
    {
        if let Some(raw) = self.driver.get(key).await? {
            tracing::debug!(key, "cache hit");
            return decode(&raw);
        }

        tracing::debug!(key, "cache miss");
        let value = loader().await?;
        self.write_through(key, ttl, &value).await?;

        Ok(value)
    }

    /// Stores `value` under `key` for `ttl`.
    pub async fn write_through<T: Serialize>(&self, key: &str, ttl: Duration, value: &T) -> DocCacheResult<()> {
        let raw = encode(value)?;
        let result = self.driver.set(key, raw, ttl).await;

        self.settle(key, "write", result)
    }

    /// Removes the entry stored under `key`.
    pub async fn invalidate(&self, key: &str) -> DocCacheResult<()> {
        let result = self.driver.del(key).await;

        self.settle(key, "invalidate", result)
    }

    /// Releases the underlying driver.
    pub async fn shutdown(self) -> DocCacheResult<()> {
        self.driver.shutdown().await
    }

    fn settle(&self, key: &str, action: &str, result: DocCacheResult<()>) -> DocCacheResult<()> {
        match (result, self.policy) {
            (Ok(()), _) => Ok(()),
            (Err(err), CacheFailurePolicy::Tolerate) => {
                tracing::warn!(key, action, error = %err, "cache update failed, keeping store result");
                Ok(())
            }
            (Err(err), CacheFailurePolicy::Escalate) => Err(err),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> DocCacheResult<String> {
    Ok(bson::serialize_to_bson(value)?
        .into_canonical_extjson()
        .to_string())
}

fn decode<T: DeserializeOwned>(raw: &str) -> DocCacheResult<T> {
    let value: serde_json::Value = serde_json::from_str(raw)?;

    Ok(bson::deserialize_from_bson(Bson::try_from(value)?)?)
}
