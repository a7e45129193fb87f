//! MongoDB store driver.
//!
//! Each docache collection maps to the MongoDB collection of the same name in a
//! single database. Filters, sorts and projections are passed through unchanged.
//!
//! `find_or_insert` is an upsert with `$setOnInsert`. MongoDB inserts at most
//! once per filter only when the filter fields carry a unique index; create one
//! for every filter used with `find_or_create`:
//!
//! ```ignore
//! db.users.createIndex({ email: 1 }, { unique: true })
//! ```
//!
//! With the index in place, the losing side of a concurrent upsert fails with a
//! duplicate key error, which the driver answers by re-reading the match.

use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReturnDocument},
};

use docache_core::{
    backend::{StoreDriver, StoreDriverBuilder},
    document::ID_FIELD,
    error::{DocCacheError, DocCacheResult},
    options::StoreOptions,
};

/// Server error code of a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// MongoDB store driver over one database.
///
/// Documents without an `_id` get a generated [`ObjectId`] placed first.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    /// Puts a generated `_id` in front of a document that has none.
    fn with_id(document: Document) -> (Bson, Document) {
        match document.get(ID_FIELD) {
            Some(id) => (id.clone(), document),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                let mut prepared = doc! { ID_FIELD: id.clone() };
                prepared.extend(document);
                (id, prepared)
            }
        }
    }

    async fn shutdown(self) -> DocCacheResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

#[async_trait]
impl StoreDriver for MongoDbStore {
    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        options: StoreOptions,
    ) -> DocCacheResult<Vec<Document>> {
        let mut find_options = FindOptions::default();
        find_options.limit = options.limit;
        find_options.skip = options.skip;
        find_options.sort = options.sort;
        find_options.projection = options.projection;

        self.get_collection(collection)
            .find(filter)
            .with_options(find_options)
            .await
            .map_err(|e| DocCacheError::Store(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| DocCacheError::Store(e.to_string()))
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: StoreOptions,
    ) -> DocCacheResult<Option<Document>> {
        let mut find_options = FindOneOptions::default();
        find_options.skip = options.skip;
        find_options.sort = options.sort;
        find_options.projection = options.projection;

        self.get_collection(collection)
            .find_one(filter)
            .with_options(find_options)
            .await
            .map_err(|e| DocCacheError::Store(e.to_string()))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocCacheResult<Document> {
        let (_, document) = Self::with_id(document);

        self.get_collection(collection)
            .insert_one(&document)
            .await
            .map_err(|e| DocCacheError::Store(e.to_string()))?;

        Ok(document)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        patch: Document,
    ) -> DocCacheResult<Option<Document>> {
        let mut update_options = FindOneAndUpdateOptions::default();
        update_options.return_document = Some(ReturnDocument::After);

        self.get_collection(collection)
            .find_one_and_update(filter, doc! { "$set": patch })
            .with_options(update_options)
            .await
            .map_err(|e| DocCacheError::Store(e.to_string()))
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocCacheResult<bool> {
        Ok(self
            .get_collection(collection)
            .delete_one(filter)
            .await
            .map_err(|e| DocCacheError::Store(e.to_string()))?
            .deleted_count
            > 0)
    }

    async fn delete_many(&self, collection: &str) -> DocCacheResult<u64> {
        Ok(self
            .get_collection(collection)
            .delete_many(doc! {})
            .await
            .map_err(|e| DocCacheError::Store(e.to_string()))?
            .deleted_count)
    }

    /// Upserts with `$setOnInsert`.
    ///
    /// Concurrent callers insert at most once only if the filter fields have a
    /// unique index; a duplicate key error from a lost race returns the match.
    async fn find_or_insert(
        &self,
        collection: &str,
        filter: Document,
        document: Document,
    ) -> DocCacheResult<(Document, bool)> {
        let (id, document) = Self::with_id(document);

        let mut update_options = FindOneAndUpdateOptions::default();
        update_options.upsert = Some(true);
        update_options.return_document = Some(ReturnDocument::Before);

        let existing = match self
            .get_collection(collection)
            .find_one_and_update(filter.clone(), doc! { "$setOnInsert": document })
            .with_options(update_options)
            .await
        {
            Ok(existing) => existing,
            Err(conflict) if is_duplicate_key(&conflict) => {
                let found = self
                    .get_collection(collection)
                    .find_one(filter)
                    .await
                    .map_err(|e| DocCacheError::Store(e.to_string()))?
                    .ok_or_else(|| DocCacheError::Store(conflict.to_string()))?;

                return Ok((found, false));
            }
            Err(e) => return Err(DocCacheError::Store(e.to_string())),
        };

        if let Some(found) = existing {
            return Ok((found, false));
        }

        // The upserted image also carries the equality fields of the filter.
        let inserted = self
            .get_collection(collection)
            .find_one(doc! { ID_FIELD: id })
            .await
            .map_err(|e| DocCacheError::Store(e.to_string()))?
            .ok_or_else(|| DocCacheError::Store(format!("upserted document vanished from '{collection}'")))?;

        Ok((inserted, true))
    }

    async fn shutdown(self) -> DocCacheResult<()> {
        self.shutdown().await
    }
}

fn is_duplicate_key(error: &MongoError) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Command(err) => err.code == DUPLICATE_KEY,
        ErrorKind::Write(WriteFailure::WriteError(err)) => err.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Builder for [`MongoDbStore`] instances.
///
/// The connection string is parsed when the store is built; connections are
/// established lazily by the client.
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreDriverBuilder for MongoDbStoreBuilder {
    type Driver = MongoDbStore;

    async fn build(self) -> DocCacheResult<Self::Driver> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocCacheError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocCacheError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_id_keeps_existing_ids() {
        let (id, document) = MongoDbStore::with_id(doc! { "_id": "u1", "name": "chris" });

        assert_eq!(id, Bson::String("u1".into()));
        assert_eq!(document, doc! { "_id": "u1", "name": "chris" });
    }

    #[test]
    fn with_id_generates_a_leading_object_id() {
        let (id, document) = MongoDbStore::with_id(doc! { "name": "chris" });

        assert!(matches!(id, Bson::ObjectId(_)));
        assert_eq!(document.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(document.get("_id"), Some(&id));
    }
}
