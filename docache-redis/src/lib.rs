//! Redis cache driver for docache.
//!
//! Enable it through the `redis` feature of the umbrella crate:
//!
//! ```toml
//! [dependencies]
//! docache = { version = "x.y.z", features = ["redis"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docache::{cache::CacheDriverBuilder, redis::RedisCache};
//!
//! let cache = RedisCache::builder("redis://127.0.0.1/")
//!     .with_namespace("myapp")
//!     .build()
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docache_redis;

pub mod cache;

pub use cache::{RedisCache, RedisCacheBuilder};
