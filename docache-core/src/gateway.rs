//! Store access for a single logical operation.
//!
//! The [`StoreGateway`] owns the store driver and translates each facade
//! action into exactly one driver call against a named collection.

use bson::{Bson, Document};

use async_trait::async_trait;

use crate::{
    backend::StoreDriver,
    document::ID_FIELD,
    error::DocCacheResult,
    options::StoreOptions,
    validator::ReferenceResolver,
};

#[derive(Debug)]
pub struct StoreGateway<S> {
    driver: S,
}

impl<S: StoreDriver> StoreGateway<S> {
    pub fn new(driver: S) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &S {
        &self.driver
    }

    pub async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        options: StoreOptions,
    ) -> DocCacheResult<Vec<Document>> {
        tracing::debug!(collection, ?filter, "find_many");
        self.driver
            .find_many(collection, filter, options)
            .await
    }

    pub async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: StoreOptions,
    ) -> DocCacheResult<Option<Document>> {
        tracing::debug!(collection, ?filter, "find_one");
        self.driver
            .find_one(collection, filter, options)
            .await
    }

    pub async fn insert_one(&self, collection: &str, document: Document) -> DocCacheResult<Document> {
        tracing::debug!(collection, "insert_one");
        self.driver
            .insert_one(collection, document)
            .await
    }

    /// Applies `patch` with set semantics to the first match of `filter`.
    ///
    /// Returns the updated document, if any, and whether a document matched.
    pub async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        patch: Document,
    ) -> DocCacheResult<(Option<Document>, bool)> {
        tracing::debug!(collection, ?filter, "update_one");
        let updated = self
            .driver
            .update_one(collection, filter, patch)
            .await?;
        let found = updated.is_some();

        Ok((updated, found))
    }

    pub async fn delete_one(&self, collection: &str, filter: Document) -> DocCacheResult<bool> {
        tracing::debug!(collection, ?filter, "delete_one");
        self.driver
            .delete_one(collection, filter)
            .await
    }

    pub async fn delete_all(&self, collection: &str) -> DocCacheResult<u64> {
        tracing::debug!(collection, "delete_all");
        self.driver.delete_many(collection).await
    }

    pub async fn find_or_insert(
        &self,
        collection: &str,
        filter: Document,
        document: Document,
    ) -> DocCacheResult<(Document, bool)> {
        tracing::debug!(collection, ?filter, "find_or_insert");
        self.driver
            .find_or_insert(collection, filter, document)
            .await
    }

    pub async fn shutdown(self) -> DocCacheResult<()> {
        self.driver.shutdown().await
    }
}

#[async_trait]
impl<S: StoreDriver> ReferenceResolver for StoreGateway<S> {
    async fn resolve_reference(&self, collection: &str, id: Bson) -> DocCacheResult<Option<Document>> {
        let mut filter = Document::new();
        filter.insert(ID_FIELD, id);

        self.find_one(collection, filter, StoreOptions::default())
            .await
    }
}
