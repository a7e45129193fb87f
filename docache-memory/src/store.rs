//! In-memory store driver.
//!
//! Documents are kept per collection, in insertion order, behind an async-aware
//! read-write lock.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;

use docache_core::{
    backend::{StoreDriver, StoreDriverBuilder},
    document::ID_FIELD,
    error::{DocCacheError, DocCacheResult},
    options::StoreOptions,
};

use crate::evaluator::{FilterEvaluator, compare_by, project};

type CollectionDocs = Vec<Document>;
type StoreMap = HashMap<String, CollectionDocs>;

/// Thread-safe in-memory store driver.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state;
/// clones share the same documents.
///
/// Queries scan every document of a collection. [`StoreDriver::find_or_insert`]
/// runs under the write lock and is therefore atomic.
///
/// # Example
///
/// ```ignore
/// use docache_memory::InMemoryStore;
/// use docache::backend::StoreDriver;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
///
/// let stored = store.insert_one("users", doc! { "name": "Alice" }).await?;
/// assert!(stored.contains_key("_id"));
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Returns the number of documents in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.store
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Lists the names of every collection holding documents.
    pub async fn list_collections(&self) -> Vec<String> {
        self.store
            .read()
            .await
            .iter()
            .filter(|(_, documents)| !documents.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Selects, orders and pages the matches of `filter`.
fn select(documents: &[Document], filter: &Document, options: &StoreOptions) -> DocCacheResult<Vec<Document>> {
    let mut matched = FilterEvaluator::filter_documents(documents, filter)?;

    if let Some(sort) = &options.sort {
        matched.sort_by(|a, b| compare_by(sort, a, b));
    }

    let skip = usize::try_from(options.skip.unwrap_or(0)).unwrap_or(usize::MAX);
    // A negative limit behaves like its absolute value; zero means no limit.
    let limit = match options.limit.map(i64::unsigned_abs) {
        None | Some(0) => usize::MAX,
        Some(limit) => usize::try_from(limit).unwrap_or(usize::MAX),
    };

    Ok(matched
        .into_iter()
        .skip(skip)
        .take(limit)
        .map(|document| match &options.projection {
            Some(projection) => project(projection, document.clone()),
            None => document.clone(),
        })
        .collect())
}

fn position(documents: &[Document], filter: &Document) -> DocCacheResult<Option<usize>> {
    for (index, document) in documents.iter().enumerate() {
        if FilterEvaluator::new(document).matches(filter)? {
            return Ok(Some(index));
        }
    }

    Ok(None)
}

/// Stores `document`, generating an `_id` when it has none.
fn insert(collection: &str, documents: &mut CollectionDocs, document: Document) -> DocCacheResult<Document> {
    let document = if document.contains_key(ID_FIELD) {
        document
    } else {
        let mut with_id = Document::new();
        with_id.insert(ID_FIELD, ObjectId::new());
        with_id.extend(document);
        with_id
    };

    let id = document.get(ID_FIELD);
    if documents.iter().any(|existing| existing.get(ID_FIELD) == id) {
        return Err(DocCacheError::Store(format!(
            "duplicate key in collection '{collection}': _id {}",
            id.map_or(Bson::Null, Clone::clone)
        )));
    }

    documents.push(document.clone());

    Ok(document)
}

#[async_trait]
impl StoreDriver for InMemoryStore {
    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        options: StoreOptions,
    ) -> DocCacheResult<Vec<Document>> {
        let store = self.store.read().await;

        match store.get(collection) {
            Some(documents) => select(documents, &filter, &options),
            None => Ok(vec![]),
        }
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        options: StoreOptions,
    ) -> DocCacheResult<Option<Document>> {
        let options = StoreOptions {
            limit: Some(1),
            ..options
        };

        Ok(self
            .find_many(collection, filter, options)
            .await?
            .into_iter()
            .next())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocCacheResult<Document> {
        let mut store = self.store.write().await;
        let documents = store
            .entry(collection.to_string())
            .or_default();

        insert(collection, documents, document)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        patch: Document,
    ) -> DocCacheResult<Option<Document>> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(None);
        };
        let Some(index) = position(documents, &filter)? else {
            return Ok(None);
        };

        let target = &mut documents[index];

        if let Some(id) = patch.get(ID_FIELD) {
            if target.get(ID_FIELD) != Some(id) {
                return Err(DocCacheError::Store(format!(
                    "the _id of a document in '{collection}' cannot be modified"
                )));
            }
        }

        for (field, value) in patch {
            target.insert(field, value);
        }

        Ok(Some(target.clone()))
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocCacheResult<bool> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(false);
        };

        match position(documents, &filter)? {
            Some(index) => {
                documents.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_many(&self, collection: &str) -> DocCacheResult<u64> {
        let removed = self
            .store
            .write()
            .await
            .remove(collection)
            .map_or(0, |documents| documents.len());

        Ok(removed as u64)
    }

    async fn find_or_insert(
        &self,
        collection: &str,
        filter: Document,
        document: Document,
    ) -> DocCacheResult<(Document, bool)> {
        let mut store = self.store.write().await;
        let documents = store
            .entry(collection.to_string())
            .or_default();

        if let Some(index) = position(documents, &filter)? {
            return Ok((documents[index].clone(), false));
        }

        Ok((insert(collection, documents, document)?, true))
    }
}

/// Builder for [`InMemoryStore`] instances.
///
/// ```ignore
/// use docache_memory::InMemoryStore;
/// use docache::backend::StoreDriverBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreDriverBuilder for InMemoryStoreBuilder {
    type Driver = InMemoryStore;

    /// Always succeeds with an empty store.
    async fn build(self) -> DocCacheResult<Self::Driver> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (name, age) in [("chris", 31), ("alex", 25), ("sam", 40)] {
            store
                .insert_one("users", doc! { "name": name, "age": age })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn insert_generates_a_leading_object_id() {
        let store = InMemoryStore::new();

        let stored = store.insert_one("users", doc! { "name": "chris" }).await.unwrap();

        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
        assert!(matches!(stored.get("_id"), Some(Bson::ObjectId(_))));
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = InMemoryStore::new();
        store.insert_one("users", doc! { "_id": "u1" }).await.unwrap();

        let err = store.insert_one("users", doc! { "_id": "u1" }).await.unwrap_err();

        assert!(err.is_store());
    }

    #[tokio::test]
    async fn find_many_applies_sort_skip_limit_and_projection() {
        let store = seeded().await;
        let options = StoreOptions {
            sort: Some(doc! { "age": -1 }),
            skip: Some(1),
            limit: Some(1),
            projection: Some(doc! { "name": 1, "_id": 0 }),
        };

        let found = store.find_many("users", doc! {}, options).await.unwrap();

        assert_eq!(found, vec![doc! { "name": "chris" }]);
    }

    #[tokio::test]
    async fn missing_collections_are_empty() {
        let store = InMemoryStore::new();

        assert!(store.find_many("nothing", doc! {}, StoreOptions::default()).await.unwrap().is_empty());
        assert!(store.find_one("nothing", doc! {}, StoreOptions::default()).await.unwrap().is_none());
        assert!(!store.delete_one("nothing", doc! {}).await.unwrap());
        assert_eq!(store.delete_many("nothing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_sets_fields_and_returns_the_new_image() {
        let store = seeded().await;

        let updated = store
            .update_one("users", doc! { "name": "alex" }, doc! { "age": 26, "city": "Porto" })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.get_i32("age").unwrap(), 26);
        assert_eq!(updated.get_str("city").unwrap(), "Porto");
        assert!(store.update_one("users", doc! { "name": "nobody" }, doc! { "age": 1 }).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_one_removes_only_the_first_match() {
        let store = seeded().await;

        assert!(store.delete_one("users", doc! { "age": { "$gt": 30 } }).await.unwrap());
        assert_eq!(store.count("users").await, 2);
        assert_eq!(store.delete_many("users").await.unwrap(), 2);
        assert!(store.list_collections().await.is_empty());
    }

    #[tokio::test]
    async fn find_or_insert_inserts_once() {
        let store = InMemoryStore::new();

        let (first, created) = store
            .find_or_insert("users", doc! { "email": "a@b.com" }, doc! { "email": "a@b.com" })
            .await
            .unwrap();
        let (second, created_again) = store
            .find_or_insert("users", doc! { "email": "a@b.com" }, doc! { "email": "a@b.com" })
            .await
            .unwrap();

        assert!(created);
        assert!(!created_again);
        assert_eq!(first, second);
        assert_eq!(store.count("users").await, 1);
    }
}
