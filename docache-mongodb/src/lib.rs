//! MongoDB store driver for docache.
//!
//! This crate provides a MongoDB-based implementation of the `StoreDriver` trait.
//! Filters, sort and projection documents are passed to MongoDB unchanged.
//!
//! To use this driver, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docache = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native queries** - Filters use MongoDB's own query engine
//! - **Atomic find-or-insert** - An upsert with `$setOnInsert`; requires a unique index on the
//!   filter fields to insert at most once under concurrency
//! - **Pooled connections** - Every call takes a collection handle from the shared client
//!
//! # Example
//!
//! ```ignore
//! use docache::{backend::StoreDriverBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docache_mongodb;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
