//! Store driver abstraction.
//!
//! The [`StoreDriver`] trait is the contract a document store must satisfy to
//! sit behind the access layer. Drivers receive a collection name, a filter and
//! the per-call [`StoreOptions`]; routing options and the `collection` field of
//! a payload never reach them.
//!
//! # Traits
//!
//! - [`StoreDriver`]: The core trait for document stores
//! - [`StoreDriverBuilder`]: Factory trait owning connection establishment
//!
//! # Examples
//!
//! ```ignore
//! use docache::backend::StoreDriver;
//! use bson::doc;
//!
//! let driver = MyDriver::new();
//!
//! let stored = driver.insert_one("users", doc! { "name": "Alice" }).await?;
//! let found = driver
//!     .find_one("users", doc! { "_id": stored.get("_id").cloned() }, Default::default())
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bson::Document;

use crate::{error::DocCacheResult, options::StoreOptions};

/// Abstract interface for document stores.
///
/// Filters and update patches are MongoDB-style documents. Every method reports
/// collaborator failures as [`DocCacheError::Store`](crate::error::DocCacheError::Store).
///
/// # Thread Safety
///
/// Implementations must support concurrent calls from multiple async tasks.
#[async_trait]
pub trait StoreDriver: Send + Sync + Debug {
    /// Returns every document of `collection` matching `filter`.
    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        options: StoreOptions,
    ) -> DocCacheResult<Vec<Document>>;

    /// Returns the first document of `collection` matching `filter`, if any.
    ///
    /// `limit` and `skip` have no meaning here and may be ignored.
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: StoreOptions,
    ) -> DocCacheResult<Option<Document>>;

    /// Inserts a document and returns it as stored.
    ///
    /// A document without an `_id` receives a generated one.
    async fn insert_one(&self, collection: &str, document: Document) -> DocCacheResult<Document>;

    /// Sets the fields of `patch` on the first document matching `filter`.
    ///
    /// # Returns
    ///
    /// The document after the update, or `None` if nothing matched.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        patch: Document,
    ) -> DocCacheResult<Option<Document>>;

    /// Deletes the first document matching `filter` and reports whether one existed.
    async fn delete_one(&self, collection: &str, filter: Document) -> DocCacheResult<bool>;

    /// Deletes every document of `collection` and returns how many were removed.
    async fn delete_many(&self, collection: &str) -> DocCacheResult<u64>;

    /// Returns the first document matching `filter`, inserting `document` when
    /// none exists.
    ///
    /// The flag is `true` when `document` was inserted. Drivers with an atomic
    /// primitive for this should override the default, which is a plain lookup
    /// followed by an insert and can insert twice under concurrent callers.
    async fn find_or_insert(
        &self,
        collection: &str,
        filter: Document,
        document: Document,
    ) -> DocCacheResult<(Document, bool)> {
        tracing::warn!(collection, "find_or_insert is not atomic for this store driver");

        if let Some(found) = self
            .find_one(collection, filter, StoreOptions::default())
            .await?
        {
            return Ok((found, false));
        }

        Ok((self.insert_one(collection, document).await?, true))
    }

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
impl<B> StoreDriver for &B
where
    B: StoreDriver,
{
    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        options: StoreOptions,
    ) -> DocCacheResult<Vec<Document>> {
        (*self)
            .find_many(collection, filter, options)
            .await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: StoreOptions,
    ) -> DocCacheResult<Option<Document>> {
        (*self)
            .find_one(collection, filter, options)
            .await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocCacheResult<Document> {
        (*self).insert_one(collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        patch: Document,
    ) -> DocCacheResult<Option<Document>> {
        (*self)
            .update_one(collection, filter, patch)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocCacheResult<bool> {
        (*self).delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str) -> DocCacheResult<u64> {
        (*self).delete_many(collection).await
    }

    async fn find_or_insert(
        &self,
        collection: &str,
        filter: Document,
        document: Document,
    ) -> DocCacheResult<(Document, bool)> {
        (*self)
            .find_or_insert(collection, filter, document)
            .await
    }
}

#[async_trait]
impl<B> StoreDriver for Arc<B>
where
    B: StoreDriver,
{
    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        options: StoreOptions,
    ) -> DocCacheResult<Vec<Document>> {
        (**self)
            .find_many(collection, filter, options)
            .await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: StoreOptions,
    ) -> DocCacheResult<Option<Document>> {
        (**self)
            .find_one(collection, filter, options)
            .await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocCacheResult<Document> {
        (**self).insert_one(collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        patch: Document,
    ) -> DocCacheResult<Option<Document>> {
        (**self)
            .update_one(collection, filter, patch)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocCacheResult<bool> {
        (**self).delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str) -> DocCacheResult<u64> {
        (**self).delete_many(collection).await
    }

    async fn find_or_insert(
        &self,
        collection: &str,
        filter: Document,
        document: Document,
    ) -> DocCacheResult<(Document, bool)> {
        (**self)
            .find_or_insert(collection, filter, document)
            .await
    }

    /// Shuts the inner driver down once the last handle is released.
    async fn shutdown(self) -> DocCacheResult<()> {
        match Arc::try_unwrap(self) {
            Ok(driver) => driver.shutdown().await,
            Err(_) => Ok(()),
        }
    }
}

/// Factory for store drivers.
#[async_trait]
pub trait StoreDriverBuilder {
    type Driver: StoreDriver;

    async fn build(self) -> DocCacheResult<Self::Driver>;
}
