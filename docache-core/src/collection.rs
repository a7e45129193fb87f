//! Collection-scoped access.
//!
//! A [`Collection`] fixes the target collection of every operation, so queries
//! and documents passed to it carry no `collection` field.
//!
//! # Example
//!
//! ```ignore
//! let users = docache.collection("users");
//!
//! let (user, created) = users
//!     .find_or_create(doc! { "email": "a@b.com" }, doc! { "email": "a@b.com" }, QueryOptions::new())
//!     .await?;
//! let found = users
//!     .find_one(doc! { "email": "a@b.com" }, QueryOptions::cached("user:a@b.com"))
//!     .await?;
//! ```

use bson::Document;

use crate::{
    backend::StoreDriver,
    cache::CacheDriver,
    error::DocCacheResult,
    facade::DocCache,
    options::QueryOptions,
};

/// A handle on one collection of a [`DocCache`].
///
/// Operations behave exactly like their [`DocCache`] counterparts.
#[derive(Debug)]
pub struct Collection<'a, S, C> {
    name: String,
    docache: &'a DocCache<S, C>,
}

impl<'a, S: StoreDriver, C: CacheDriver> Collection<'a, S, C> {
    pub(crate) fn new(name: String, docache: &'a DocCache<S, C>) -> Self {
        Self { name, docache }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn find(&self, filter: Document, options: QueryOptions) -> DocCacheResult<Vec<Document>> {
        self.docache
            .find_in(&self.name, filter, options)
            .await
    }

    pub async fn find_one(&self, filter: Document, options: QueryOptions) -> DocCacheResult<Option<Document>> {
        self.docache
            .find_one_in(&self.name, filter, options)
            .await
    }

    pub async fn find_or_create(
        &self,
        filter: Document,
        document: Document,
        options: QueryOptions,
    ) -> DocCacheResult<(Document, bool)> {
        self.docache
            .find_or_create_in(&self.name, filter, document, options)
            .await
    }

    pub async fn create(&self, document: Document, options: QueryOptions) -> DocCacheResult<(Document, bool)> {
        self.docache
            .create_in(&self.name, document, options)
            .await
    }

    pub async fn update_one(
        &self,
        filter: Document,
        patch: Document,
        options: QueryOptions,
    ) -> DocCacheResult<(Option<Document>, bool)> {
        self.docache
            .update_one_in(&self.name, filter, patch, options)
            .await
    }

    pub async fn delete_one(&self, filter: Document, options: QueryOptions) -> DocCacheResult<bool> {
        self.docache
            .delete_one_in(&self.name, filter, options)
            .await
    }

    /// Deletes every document of this collection.
    pub async fn delete_all(&self) -> DocCacheResult<u64> {
        self.docache.delete_all_in(&self.name).await
    }
}
