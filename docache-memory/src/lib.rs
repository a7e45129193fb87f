//! In-memory drivers for docache.
//!
//! This crate provides thread-safe, in-memory implementations of the
//! `StoreDriver` and `CacheDriver` traits. They use async-aware read-write locks
//! for concurrent access and are meant for development and testing.
//!
//! # Features
//!
//! - **Filtering** - MongoDB-style equality, comparison, set and logical operators
//! - **Store options** - Sort, skip, limit and projection
//! - **Atomic find-or-insert** - Runs under the store's write lock
//! - **Expiring cache entries** - Per-entry TTL, expired entries are never served
//!
//! # Quick Start
//!
//! ```ignore
//! use docache::{prelude::*, memory::{InMemoryCache, InMemoryStore}};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let docache = DocCache::builder(InMemoryStore::new())
//!         .with_cache(InMemoryCache::new())
//!         .build();
//!
//!     docache
//!         .create(doc! { "collection": "users", "name": "Alice" }, QueryOptions::new())
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docache_memory;

pub mod cache;
pub mod evaluator;
pub mod store;

pub use cache::{InMemoryCache, InMemoryCacheBuilder};
pub use store::{InMemoryStore, InMemoryStoreBuilder};
