//! Convenient re-exports of commonly used types from docache.
//!
//! ```ignore
//! use docache::prelude::*;
//! ```
//!
//! This provides access to:
//! - The facade, its builder and collection handles
//! - Per-call options and configuration
//! - Schemas and the validator
//! - Driver traits and builders
//! - Error types

pub use docache_core::{
    backend::{StoreDriver, StoreDriverBuilder},
    cache::{CacheCoordinator, CacheDriver, CacheDriverBuilder, CacheFailurePolicy, NoCache},
    collection::Collection,
    config::DocCacheConfig,
    document::Document,
    error::{DocCacheError, DocCacheResult, SchemaError},
    facade::{DocCache, DocCacheBuilder},
    options::{QueryOptions, StoreOptions},
    schema::{FieldRule, FieldType, Schema},
    validator::{ReferenceResolver, SchemaValidator},
};
