//! Main docache crate: a cache-aside document access layer with schema validation.
//!
//! This crate is the primary entry point for users of docache. It re-exports the
//! core types from `docache-core` and the drivers of the sub-crates.
//!
//! # Features
//!
//! - **Schema validation** - Unknown fields, types, required fields with defaults
//! - **Reference resolution** - `via` fields are replaced by the document they point to
//! - **Cache-aside reads** - Opt-in per call with a key and a TTL
//! - **Write-through and invalidation** - Writes refresh, deletes invalidate the call's key
//! - **Pluggable drivers** - In-memory, MongoDB (`mongodb` feature) and Redis (`redis` feature)
//!
//! # Quick Start
//!
//! ```ignore
//! use docache::{prelude::*, memory::{InMemoryCache, InMemoryStore}};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> DocCacheResult<()> {
//!     let schema = Schema::from_json(r#"{
//!         "email": { "type": "string", "required": true },
//!         "password": { "type": "string", "required": true, "default": "changeme" }
//!     }"#)?;
//!
//!     let docache = DocCache::builder(InMemoryStore::new())
//!         .with_cache(InMemoryCache::new())
//!         .with_schema(schema)
//!         .build();
//!
//!     // Validated insert, filling the default password
//!     let (user, _) = docache
//!         .create(
//!             doc! { "collection": "users", "email": "a@b.com" },
//!             QueryOptions::new().validated(),
//!         )
//!         .await?;
//!
//!     // Cached lookup: the second call is served from the cache
//!     for _ in 0..2 {
//!         let found = docache
//!             .find_one(
//!                 doc! { "collection": "users", "email": "a@b.com" },
//!                 QueryOptions::cached("user:a@b.com"),
//!             )
//!             .await?;
//!         assert_eq!(found.as_ref(), Some(&user));
//!     }
//!
//!     // Deleting through the same key invalidates the cached entry
//!     docache
//!         .delete_one(
//!             doc! { "collection": "users", "email": "a@b.com" },
//!             QueryOptions::cached("user:a@b.com"),
//!         )
//!         .await?;
//!
//!     docache.shutdown().await
//! }
//! ```
//!
//! # Options bags
//!
//! Options can also be given as a document, as they would arrive from a
//! configuration file or a request:
//!
//! ```ignore
//! let options = QueryOptions::try_from(doc! {
//!     "cache": true,
//!     "key": "users:recent",
//!     "ttlSeconds": 300,
//!     "sort": { "created": -1 },
//!     "limit": 20,
//! })?;
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - In-process store and cache for development and testing
//! - [`mongodb`] - MongoDB store (requires `mongodb` feature)
//! - [`redis`] - Redis cache (requires `redis` feature)

pub mod prelude;

pub use docache_core::{
    backend, cache, collection, config, document, error, facade, gateway, options, schema, validator,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory driver implementations.
pub mod memory {
    pub use docache_memory::{InMemoryCache, InMemoryCacheBuilder, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB store driver.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docache_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}

/// Redis cache driver.
///
/// This module is only available when the `redis` feature is enabled.
#[cfg(feature = "redis")]
pub mod redis {
    pub use docache_redis::{RedisCache, RedisCacheBuilder};
}
