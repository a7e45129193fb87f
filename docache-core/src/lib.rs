//! A cache-aside document access layer with schema validation.
//!
//! This crate is the core of the docache project and provides:
//!
//! - **Facade** ([`facade`]) - [`DocCache`](facade::DocCache), the `find`, `find_one`, `find_or_create`,
//!   `create`, `update_one`, `delete_one` and `delete_all` operations
//! - **Schemas** ([`schema`], [`validator`]) - Declarative field rules, validation and reference resolution
//! - **Cache-aside protocol** ([`cache`]) - The cache driver abstraction and the read-through coordinator
//! - **Store access** ([`backend`], [`gateway`]) - The store driver abstraction and its single-call gateway
//! - **Per-call options** ([`options`]) - Cache, key, TTL and schema routing plus store options
//! - **Collections interface** ([`collection`]) - Handles scoped to one collection
//! - **Configuration** ([`config`]) - Default TTL and cache failure policy
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docache_core::{facade::DocCache, options::QueryOptions};
//! use bson::doc;
//!
//! let docache = DocCache::builder(store).with_cache(cache).build();
//!
//! let (user, created) = docache
//!     .find_or_create(
//!         doc! { "collection": "users", "email": "a@b.com" },
//!         doc! { "email": "a@b.com", "password": "x" },
//!         QueryOptions::cached("user:a@b.com"),
//!     )
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docache_core;

pub mod backend;
pub mod cache;
pub mod collection;
pub mod config;
pub mod document;
pub mod error;
pub mod facade;
pub mod gateway;
pub mod options;
pub mod schema;
pub mod validator;
