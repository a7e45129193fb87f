//! Per-call options and routing.
//!
//! A [`QueryOptions`] mixes routing-only settings (cache flag, cache key, TTL,
//! schema flag) with the [`StoreOptions`] forwarded to the store driver. Routing
//! consumes the options and hands back only the store part, so routing keys can
//! never reach a driver.
//!
//! Options can be built fluently or parsed from an options bag document:
//!
//! ```ignore
//! let options = QueryOptions::cached("user:chris").validated().with_limit(10);
//!
//! let options = QueryOptions::try_from(doc! {
//!     "cache": true,
//!     "key": "user:chris",
//!     "ttlSeconds": 60,
//!     "limit": 10,
//! })?;
//! ```

use std::time::Duration;

use bson::{Bson, Document, de::deserialize_from_document};
use serde::{Deserialize, Serialize};

use crate::error::{DocCacheError, DocCacheResult};

/// Time-to-live applied to cache entries when a call does not set one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

/// Options forwarded to the store driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StoreOptions {
    /// Maximum number of documents returned by a find.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    /// Number of matching documents skipped by a find.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    /// Sort specification, `{ field: 1 | -1 }`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Document>,
    /// Projection specification, `{ field: 1 }` or `{ field: 0 }`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Document>,
}

impl StoreOptions {
    pub fn is_empty(&self) -> bool {
        self == &StoreOptions::default()
    }
}

/// Where a call's result goes besides the store.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRoute {
    /// The store is called directly.
    Bypass,
    /// The call goes through the cache under `key`.
    Cached { key: String, ttl: Duration },
}

/// The outcome of routing a [`QueryOptions`].
#[derive(Debug, Clone, PartialEq)]
pub struct Routing {
    pub cache: CacheRoute,
    /// Whether the attached schema must validate the payload.
    pub validate: bool,
    pub store: StoreOptions,
}

/// Options accepted by every facade operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Route the call through the cache.
    pub cache: bool,
    /// Cache key; mandatory when `cache` is set.
    pub key: Option<String>,
    /// Entry lifetime; the facade default applies when unset.
    pub ttl: Option<Duration>,
    /// Validate the payload against the attached schema.
    pub schema: bool,
    pub store: StoreOptions,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options routing the call through the cache under `key`.
    pub fn cached(key: impl Into<String>) -> Self {
        Self::default().with_cache(key)
    }

    pub fn with_cache(mut self, key: impl Into<String>) -> Self {
        self.cache = true;
        self.key = Some(key.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Requests schema validation of the payload.
    pub fn validated(mut self) -> Self {
        self.schema = true;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.store.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.store.skip = Some(skip);
        self
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.store.sort = Some(sort);
        self
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.store.projection = Some(projection);
        self
    }

    /// Splits these options into a routing decision and the store options.
    ///
    /// # Errors
    ///
    /// Returns [`DocCacheError::MissingCacheKey`] if caching is requested without
    /// a non-empty key.
    pub fn route(self, default_ttl: Duration) -> DocCacheResult<Routing> {
        let cache = if self.cache {
            match self.key {
                Some(key) if !key.is_empty() => CacheRoute::Cached {
                    key,
                    ttl: self.ttl.unwrap_or(default_ttl),
                },
                _ => return Err(DocCacheError::MissingCacheKey),
            }
        } else {
            CacheRoute::Bypass
        };

        Ok(Routing {
            cache,
            validate: self.schema,
            store: self.store,
        })
    }
}

impl TryFrom<Document> for QueryOptions {
    type Error = DocCacheError;

    /// Parses an options bag. The keys `cache`, `key`, `ttl`/`ttlSeconds` and
    /// `schema` are routing options; every other key must be a store option.
    fn try_from(mut bag: Document) -> Result<Self, Self::Error> {
        let cache = take_flag(&mut bag, "cache")?;
        let schema = take_flag(&mut bag, "schema")?;

        let key = match bag.remove("key") {
            None | Some(Bson::Null) => None,
            Some(Bson::String(key)) => Some(key),
            Some(other) => {
                return Err(DocCacheError::InvalidOptions(format!(
                    "'key' must be a string, got {other}"
                )));
            }
        };

        let ttl = match (bag.remove("ttlSeconds"), bag.remove("ttl")) {
            (Some(value), _) | (None, Some(value)) => Some(parse_ttl(&value)?),
            (None, None) => None,
        };

        let store = deserialize_from_document::<StoreOptions>(bag)
            .map_err(|e| DocCacheError::InvalidOptions(e.to_string()))?;

        Ok(Self { cache, key, ttl, schema, store })
    }
}

fn take_flag(bag: &mut Document, name: &str) -> DocCacheResult<bool> {
    match bag.remove(name) {
        None | Some(Bson::Null) => Ok(false),
        Some(Bson::Boolean(flag)) => Ok(flag),
        Some(other) => Err(DocCacheError::InvalidOptions(format!(
            "'{name}' must be a boolean, got {other}"
        ))),
    }
}

fn parse_ttl(value: &Bson) -> DocCacheResult<Duration> {
    let seconds = match value {
        Bson::Int32(secs) => i64::from(*secs),
        Bson::Int64(secs) => *secs,
        Bson::Double(secs) if secs.fract() == 0.0 => *secs as i64,
        _ => -1,
    };

    u64::try_from(seconds)
        .map(Duration::from_secs)
        .map_err(|_| DocCacheError::InvalidOptions(format!("ttl must be a whole number of seconds, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn uncached_options_bypass_the_cache() {
        let routing = QueryOptions::new().route(DEFAULT_TTL).unwrap();

        assert_eq!(routing.cache, CacheRoute::Bypass);
        assert!(!routing.validate);
    }

    #[test]
    fn cached_options_use_the_default_ttl() {
        let routing = QueryOptions::cached("k").route(Duration::from_secs(5)).unwrap();

        assert_eq!(
            routing.cache,
            CacheRoute::Cached { key: "k".into(), ttl: Duration::from_secs(5) }
        );
    }

    #[test]
    fn caching_without_a_key_is_rejected() {
        let options = QueryOptions { cache: true, ..Default::default() };
        assert!(matches!(options.route(DEFAULT_TTL), Err(DocCacheError::MissingCacheKey)));

        let options = QueryOptions::cached("");
        assert!(matches!(options.route(DEFAULT_TTL), Err(DocCacheError::MissingCacheKey)));
    }

    #[test]
    fn a_key_without_the_cache_flag_is_ignored() {
        let options = QueryOptions { key: Some("k".into()), ..Default::default() };

        assert_eq!(options.route(DEFAULT_TTL).unwrap().cache, CacheRoute::Bypass);
    }

    #[test]
    fn options_bags_are_split_into_routing_and_store_options() {
        let options = QueryOptions::try_from(doc! {
            "cache": true,
            "key": "users:all",
            "schema": true,
            "ttlSeconds": 60,
            "limit": 10,
        })
        .unwrap();

        let routing = options.route(DEFAULT_TTL).unwrap();

        assert_eq!(
            routing.cache,
            CacheRoute::Cached { key: "users:all".into(), ttl: Duration::from_secs(60) }
        );
        assert!(routing.validate);
        assert_eq!(routing.store, StoreOptions { limit: Some(10), ..Default::default() });
    }

    #[test]
    fn options_bags_reject_unknown_keys_and_bad_values() {
        assert!(matches!(
            QueryOptions::try_from(doc! { "upsert": true }),
            Err(DocCacheError::InvalidOptions(_))
        ));
        assert!(matches!(
            QueryOptions::try_from(doc! { "cache": "yes" }),
            Err(DocCacheError::InvalidOptions(_))
        ));
        assert!(matches!(
            QueryOptions::try_from(doc! { "ttl": -3 }),
            Err(DocCacheError::InvalidOptions(_))
        ));
    }
}
