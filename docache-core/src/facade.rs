//! The public access surface.
//!
//! [`DocCache`] ties a store driver, an optional cache driver and an optional
//! schema together. Every operation follows the same path:
//!
//! 1. **route**: strip the `collection` field and the routing options, decide
//!    whether the cache is involved (configuration errors surface here, before
//!    any I/O);
//! 2. **validate**: for mutating operations that request it, run the schema;
//! 3. **execute**: one store call through the [`StoreGateway`];
//! 4. **cache**: read-through, write-through or invalidate under the call's key.
//!
//! # Example
//!
//! ```ignore
//! use docache::{prelude::*, memory::{InMemoryCache, InMemoryStore}};
//! use bson::doc;
//!
//! let docache = DocCache::builder(InMemoryStore::new())
//!     .with_cache(InMemoryCache::new())
//!     .with_schema(Schema::from_json(r#"{ "email": "string", "password": "string" }"#)?)
//!     .build();
//!
//! let (user, _) = docache
//!     .create(
//!         doc! { "collection": "users", "email": "a@b.com", "password": "x" },
//!         QueryOptions::new().validated(),
//!     )
//!     .await?;
//!
//! let users = docache
//!     .find(doc! { "collection": "users" }, QueryOptions::cached("users:all"))
//!     .await?;
//! ```

use std::{fmt, sync::Arc, time::Duration};

use bson::Document;
use mea::rwlock::RwLock;

use crate::{
    backend::StoreDriver,
    cache::{CacheCoordinator, CacheDriver, CacheFailurePolicy, NoCache},
    collection::Collection,
    config::DocCacheConfig,
    document::{split_collection, strip_collection},
    error::{DocCacheError, DocCacheResult},
    gateway::StoreGateway,
    options::{CacheRoute, QueryOptions, StoreOptions},
    schema::Schema,
    validator::SchemaValidator,
};

/// A cache-aside document access layer over a store driver `S` and a cache driver `C`.
pub struct DocCache<S, C = NoCache> {
    gateway: StoreGateway<S>,
    cache: Option<CacheCoordinator<C>>,
    schema: RwLock<Option<Arc<Schema>>>,
    config: DocCacheConfig,
}

impl<S: fmt::Debug, C: fmt::Debug> fmt::Debug for DocCache<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocCache")
            .field("gateway", &self.gateway)
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: StoreDriver> DocCache<S> {
    /// Creates an uncached facade over `store` with the default configuration.
    pub fn new(store: S) -> Self {
        Self::builder(store).build()
    }

    /// Creates a builder for a facade over `store`.
    pub fn builder(store: S) -> DocCacheBuilder<S> {
        DocCacheBuilder {
            store,
            cache: None,
            schema: None,
            config: DocCacheConfig::default(),
        }
    }
}

/// Cache route of a single call.
struct Cached<'a, C> {
    coordinator: &'a CacheCoordinator<C>,
    key: String,
    ttl: Duration,
}

impl<C: CacheDriver> Cached<'_, C> {
    async fn write(&self, document: &Document) -> DocCacheResult<()> {
        self.coordinator
            .write_through(&self.key, self.ttl, document)
            .await
    }
}

struct Plan<'a, C> {
    cached: Option<Cached<'a, C>>,
    validate: bool,
    store: StoreOptions,
}

impl<S: StoreDriver, C: CacheDriver> DocCache<S, C> {
    /// Returns every document matching `query`.
    ///
    /// # Errors
    ///
    /// Configuration errors before any I/O, then cache or store errors.
    pub async fn find(&self, query: Document, options: QueryOptions) -> DocCacheResult<Vec<Document>> {
        let (collection, filter) = split_collection(query)?;
        self.find_in(&collection, filter, options).await
    }

    /// Returns the first document matching `query`, if any.
    ///
    /// When cached, an absent result is cached too.
    pub async fn find_one(&self, query: Document, options: QueryOptions) -> DocCacheResult<Option<Document>> {
        let (collection, filter) = split_collection(query)?;
        self.find_one_in(&collection, filter, options).await
    }

    /// Returns the document matching `query`, creating it from `document` when
    /// none exists.
    ///
    /// The flag is `true` when the document was created. `document` is only
    /// validated when no match exists, so an existing match is returned even if
    /// `document` would be rejected.
    pub async fn find_or_create(
        &self,
        query: Document,
        document: Document,
        options: QueryOptions,
    ) -> DocCacheResult<(Document, bool)> {
        let (collection, filter) = split_collection(query)?;
        self.find_or_create_in(&collection, filter, document, options)
            .await
    }

    /// Inserts `document` into the collection it names.
    ///
    /// Returns the stored document, with its generated `_id`, and `true`.
    pub async fn create(&self, document: Document, options: QueryOptions) -> DocCacheResult<(Document, bool)> {
        let (collection, document) = split_collection(document)?;
        self.create_in(&collection, document, options).await
    }

    /// Sets the fields of `patch` on the first document matching `query`.
    ///
    /// Returns the updated document and whether one matched.
    pub async fn update_one(
        &self,
        query: Document,
        patch: Document,
        options: QueryOptions,
    ) -> DocCacheResult<(Option<Document>, bool)> {
        let (collection, filter) = split_collection(query)?;
        self.update_one_in(&collection, filter, patch, options)
            .await
    }

    /// Deletes the first document matching `query` and reports whether one existed.
    ///
    /// When cached, the call's key is invalidated only if a document was deleted.
    pub async fn delete_one(&self, query: Document, options: QueryOptions) -> DocCacheResult<bool> {
        let (collection, filter) = split_collection(query)?;
        self.delete_one_in(&collection, filter, options).await
    }

    /// Deletes every document of the collection named by `query`.
    ///
    /// Only the `collection` field of `query` is read. The cache is never
    /// involved, so cache options are ignored and need no key.
    pub async fn delete_all(&self, query: Document, options: QueryOptions) -> DocCacheResult<u64> {
        let (collection, _) = split_collection(query)?;

        if options.cache {
            tracing::debug!(collection = %collection, "delete_all ignores cache options");
        }

        self.delete_all_in(&collection).await
    }

    /// Validates `document` against the attached schema.
    ///
    /// The store is only consulted to resolve references.
    ///
    /// # Errors
    ///
    /// Returns [`DocCacheError::SchemaNotSet`] if no schema is attached.
    pub async fn validate(&self, document: Document) -> DocCacheResult<Document> {
        self.prepare(document, true).await
    }

    /// Returns a handle on the collection `name`.
    pub fn collection(&self, name: impl Into<String>) -> Collection<'_, S, C> {
        Collection::new(name.into(), self)
    }

    /// Attaches `schema`, replacing the current one.
    ///
    /// Validations already running keep the schema they started with.
    pub async fn set_schema(&self, schema: Schema) {
        *self.schema.write().await = Some(Arc::new(schema));
    }

    /// Detaches the current schema.
    pub async fn clear_schema(&self) {
        *self.schema.write().await = None;
    }

    /// Returns the attached schema, if any.
    pub async fn schema(&self) -> Option<Arc<Schema>> {
        self.schema.read().await.clone()
    }

    pub fn config(&self) -> &DocCacheConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        self.gateway.driver()
    }

    pub fn cache(&self) -> Option<&C> {
        self.cache.as_ref().map(CacheCoordinator::driver)
    }

    /// Shuts down the store driver and the cache driver.
    ///
    /// Both are shut down even if the first fails; the first error is returned.
    pub async fn shutdown(self) -> DocCacheResult<()> {
        let store = self.gateway.shutdown().await;
        let cache = match self.cache {
            Some(cache) => cache.shutdown().await,
            None => Ok(()),
        };

        store.and(cache)
    }

    pub(crate) async fn find_in(
        &self,
        collection: &str,
        filter: Document,
        options: QueryOptions,
    ) -> DocCacheResult<Vec<Document>> {
        let plan = self.plan(options)?;

        match plan.cached {
            None => {
                self.gateway
                    .find_many(collection, filter, plan.store)
                    .await
            }
            Some(cached) => {
                cached
                    .coordinator
                    .read_through(&cached.key, cached.ttl, || {
                        self.gateway
                            .find_many(collection, filter, plan.store)
                    })
                    .await
            }
        }
    }

    pub(crate) async fn find_one_in(
        &self,
        collection: &str,
        filter: Document,
        options: QueryOptions,
    ) -> DocCacheResult<Option<Document>> {
        let plan = self.plan(options)?;

        match plan.cached {
            None => {
                self.gateway
                    .find_one(collection, filter, plan.store)
                    .await
            }
            Some(cached) => {
                cached
                    .coordinator
                    .read_through(&cached.key, cached.ttl, || {
                        self.gateway
                            .find_one(collection, filter, plan.store)
                    })
                    .await
            }
        }
    }

    pub(crate) async fn find_or_create_in(
        &self,
        collection: &str,
        filter: Document,
        mut document: Document,
        options: QueryOptions,
    ) -> DocCacheResult<(Document, bool)> {
        strip_collection(&mut document, collection)?;
        let plan = self.plan(options)?;

        let existing = self
            .gateway
            .find_one(collection, filter.clone(), StoreOptions::default())
            .await?;

        let (document, created) = match existing {
            Some(found) => (found, false),
            None => {
                let document = self.prepare(document, plan.validate).await?;

                // A concurrent caller may have inserted since the lookup.
                self.gateway
                    .find_or_insert(collection, filter, document)
                    .await?
            }
        };

        if let Some(cached) = &plan.cached {
            cached.write(&document).await?;
        }

        Ok((document, created))
    }

    pub(crate) async fn create_in(
        &self,
        collection: &str,
        document: Document,
        options: QueryOptions,
    ) -> DocCacheResult<(Document, bool)> {
        let plan = self.plan(options)?;
        let document = self.prepare(document, plan.validate).await?;

        let created = self
            .gateway
            .insert_one(collection, document)
            .await?;

        if let Some(cached) = &plan.cached {
            cached.write(&created).await?;
        }

        Ok((created, true))
    }

    pub(crate) async fn update_one_in(
        &self,
        collection: &str,
        filter: Document,
        mut patch: Document,
        options: QueryOptions,
    ) -> DocCacheResult<(Option<Document>, bool)> {
        strip_collection(&mut patch, collection)?;
        let plan = self.plan(options)?;
        let patch = self.prepare(patch, plan.validate).await?;

        let (updated, found) = self
            .gateway
            .update_one(collection, filter, patch)
            .await?;

        if let (Some(cached), Some(document)) = (&plan.cached, &updated) {
            cached.write(document).await?;
        }

        Ok((updated, found))
    }

    pub(crate) async fn delete_one_in(
        &self,
        collection: &str,
        filter: Document,
        options: QueryOptions,
    ) -> DocCacheResult<bool> {
        let plan = self.plan(options)?;

        let deleted = self
            .gateway
            .delete_one(collection, filter)
            .await?;

        if let (true, Some(cached)) = (deleted, &plan.cached) {
            cached
                .coordinator
                .invalidate(&cached.key)
                .await?;
        }

        Ok(deleted)
    }

    pub(crate) async fn delete_all_in(&self, collection: &str) -> DocCacheResult<u64> {
        self.gateway.delete_all(collection).await
    }

    /// Routes `options`, failing on configuration errors before any I/O.
    fn plan(&self, options: QueryOptions) -> DocCacheResult<Plan<'_, C>> {
        let routing = options.route(self.config.default_ttl())?;

        let cached = match routing.cache {
            CacheRoute::Bypass => None,
            CacheRoute::Cached { key, ttl } => {
                let coordinator = self
                    .cache
                    .as_ref()
                    .ok_or(DocCacheError::CacheUnavailable)?;

                tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "routing through cache");
                Some(Cached { coordinator, key, ttl })
            }
        };

        Ok(Plan {
            cached,
            validate: routing.validate,
            store: routing.store,
        })
    }

    /// Validates `document` when requested, using a snapshot of the schema.
    async fn prepare(&self, document: Document, validate: bool) -> DocCacheResult<Document> {
        if !validate {
            return Ok(document);
        }

        let schema = self
            .schema()
            .await
            .ok_or(DocCacheError::SchemaNotSet)?;

        SchemaValidator::new(&schema, &self.gateway)
            .validate(document)
            .await
    }
}

/// Builder for [`DocCache`].
#[derive(Debug)]
pub struct DocCacheBuilder<S, C = NoCache> {
    store: S,
    cache: Option<C>,
    schema: Option<Schema>,
    config: DocCacheConfig,
}

impl<S: StoreDriver, C: CacheDriver> DocCacheBuilder<S, C> {
    /// Sets the cache driver, enabling per-call caching.
    pub fn with_cache<D: CacheDriver>(self, cache: D) -> DocCacheBuilder<S, D> {
        DocCacheBuilder {
            store: self.store,
            cache: Some(cache),
            schema: self.schema,
            config: self.config,
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_config(mut self, config: DocCacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_cache_failure_policy(mut self, policy: CacheFailurePolicy) -> Self {
        self.config.cache_failure = policy;
        self
    }

    pub fn build(self) -> DocCache<S, C> {
        let policy = self.config.cache_failure;

        DocCache {
            gateway: StoreGateway::new(self.store),
            cache: self
                .cache
                .map(|driver| CacheCoordinator::new(driver, policy)),
            schema: RwLock::new(self.schema.map(Arc::new)),
            config: self.config,
        }
    }
}
