use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bson::{Bson, doc, oid::ObjectId};
use docache::{
    memory::{InMemoryCache, InMemoryStore},
    prelude::*,
};

/// Store driver recording every call it receives.
#[derive(Debug, Default)]
struct RecordingStore {
    inner: InMemoryStore,
    calls: Mutex<Vec<&'static str>>,
    options: Mutex<Vec<StoreOptions>>,
    fail: AtomicBool,
}

impl RecordingStore {
    fn record(&self, op: &'static str) -> DocCacheResult<()> {
        self.calls.lock().unwrap().push(op);

        if self.fail.load(Ordering::SeqCst) {
            return Err(DocCacheError::Store("injected failure".into()));
        }
        Ok(())
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, op: &str) -> usize {
        self.calls().into_iter().filter(|c| *c == op).count()
    }

    fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl StoreDriver for RecordingStore {
    async fn find_many(&self, collection: &str, filter: Document, options: StoreOptions) -> DocCacheResult<Vec<Document>> {
        self.record("find_many")?;
        self.options.lock().unwrap().push(options.clone());
        self.inner.find_many(collection, filter, options).await
    }

    async fn find_one(&self, collection: &str, filter: Document, options: StoreOptions) -> DocCacheResult<Option<Document>> {
        self.record("find_one")?;
        self.inner.find_one(collection, filter, options).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocCacheResult<Document> {
        self.record("insert_one")?;
        self.inner.insert_one(collection, document).await
    }

    async fn update_one(&self, collection: &str, filter: Document, patch: Document) -> DocCacheResult<Option<Document>> {
        self.record("update_one")?;
        self.inner.update_one(collection, filter, patch).await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocCacheResult<bool> {
        self.record("delete_one")?;
        self.inner.delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str) -> DocCacheResult<u64> {
        self.record("delete_many")?;
        self.inner.delete_many(collection).await
    }

    async fn find_or_insert(&self, collection: &str, filter: Document, document: Document) -> DocCacheResult<(Document, bool)> {
        self.record("find_or_insert")?;
        self.inner.find_or_insert(collection, filter, document).await
    }
}

/// Cache driver recording every call it receives.
#[derive(Debug, Default)]
struct RecordingCache {
    inner: InMemoryCache,
    calls: Mutex<Vec<&'static str>>,
    ttls: Mutex<Vec<Duration>>,
    fail_writes: AtomicBool,
}

impl RecordingCache {
    fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }
}

#[async_trait]
impl CacheDriver for RecordingCache {
    async fn get(&self, key: &str) -> DocCacheResult<Option<String>> {
        self.calls.lock().unwrap().push("get");
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> DocCacheResult<()> {
        self.calls.lock().unwrap().push("set");
        self.ttls.lock().unwrap().push(ttl);

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DocCacheError::Cache("injected failure".into()));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> DocCacheResult<()> {
        self.calls.lock().unwrap().push("del");
        self.inner.del(key).await
    }
}

type TestCache = DocCache<RecordingStore, RecordingCache>;

fn credentials() -> Schema {
    Schema::from_json(
        r#"{
            "email": { "type": "string" },
            "password": { "type": "string", "required": true, "default": "x" }
        }"#,
    )
    .unwrap()
}

fn docache() -> TestCache {
    DocCache::builder(RecordingStore::default())
        .with_cache(RecordingCache::default())
        .with_schema(credentials())
        .build()
}

fn store(docache: &TestCache) -> &RecordingStore {
    docache.store()
}

fn cache(docache: &TestCache) -> &RecordingCache {
    docache.cache().unwrap()
}

#[tokio::test]
async fn validation_fills_required_defaults() {
    let docache = docache();

    let document = docache.validate(doc! { "email": "a@b.com" }).await.unwrap();

    assert_eq!(document, doc! { "email": "a@b.com", "password": "x" });
}

#[tokio::test]
async fn validated_create_stores_the_normalized_document() {
    let docache = docache();

    let (created, was_created) = docache
        .create(
            doc! { "collection": "users", "email": "a@b.com" },
            QueryOptions::new().validated(),
        )
        .await
        .unwrap();

    assert!(was_created);
    assert_eq!(created.get_str("password").unwrap(), "x");
    assert!(matches!(created.get("_id"), Some(Bson::ObjectId(_))));
    assert!(!created.contains_key("collection"));
}

#[tokio::test]
async fn schema_violations_abort_before_any_store_access() {
    let docache = docache();

    let unknown = docache
        .create(
            doc! { "collection": "users", "email": "a@b.com", "role": "admin" },
            QueryOptions::new().validated(),
        )
        .await
        .unwrap_err();
    let mismatch = docache
        .create(
            doc! { "collection": "users", "email": "a@b.com", "password": 12345 },
            QueryOptions::new().validated(),
        )
        .await
        .unwrap_err();

    assert!(matches!(unknown, DocCacheError::Schema(SchemaError::UnknownField(ref f)) if f == "role"));
    assert!(matches!(mismatch, DocCacheError::Schema(SchemaError::TypeMismatch { ref field, .. }) if field == "password"));
    assert!(store(&docache).calls().is_empty());
}

#[tokio::test]
async fn unvalidated_writes_skip_the_schema() {
    let docache = docache();

    let (created, _) = docache
        .create(doc! { "collection": "users", "nickname": "chris" }, QueryOptions::new())
        .await
        .unwrap();

    assert_eq!(created.get_str("nickname").unwrap(), "chris");
}

#[tokio::test]
async fn cached_find_hits_the_store_once() {
    let docache = docache();
    docache
        .create(doc! { "collection": "users", "_id": "u1", "email": "a@b.com" }, QueryOptions::new())
        .await
        .unwrap();

    let first = docache
        .find(doc! { "collection": "users" }, QueryOptions::cached("users:all"))
        .await
        .unwrap();
    let second = docache
        .find(doc! { "collection": "users" }, QueryOptions::cached("users:all"))
        .await
        .unwrap();

    assert_eq!(first, vec![doc! { "_id": "u1", "email": "a@b.com" }]);
    assert_eq!(first, second);
    assert_eq!(store(&docache).count("find_many"), 1);
    assert_eq!(cache(&docache).count("set"), 1);
}

#[tokio::test]
async fn cached_find_one_caches_absent_results() {
    let docache = docache();

    for _ in 0..2 {
        let found = docache
            .find_one(
                doc! { "collection": "users", "email": "nobody@b.com" },
                QueryOptions::cached("user:nobody"),
            )
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    assert_eq!(store(&docache).count("find_one"), 1);
    assert_eq!(cache(&docache).inner.get("user:nobody").await.unwrap().as_deref(), Some("null"));
}

#[tokio::test]
async fn uncached_reads_always_reach_the_store() {
    let docache = docache();

    for _ in 0..2 {
        docache
            .find_one(doc! { "collection": "users" }, QueryOptions::new())
            .await
            .unwrap();
    }

    assert_eq!(store(&docache).count("find_one"), 2);
    assert_eq!(cache(&docache).count("get"), 0);
}

#[tokio::test]
async fn cached_create_serves_the_next_read_from_cache() {
    let docache = docache();

    let (created, _) = docache
        .create(
            doc! { "collection": "users", "_id": "u1", "email": "a@b.com" },
            QueryOptions::cached("user:u1"),
        )
        .await
        .unwrap();
    store(&docache).reset();

    let found = docache
        .find_one(doc! { "collection": "users", "_id": "u1" }, QueryOptions::cached("user:u1"))
        .await
        .unwrap();

    assert_eq!(found, Some(created));
    assert!(store(&docache).calls().is_empty());
}

#[tokio::test]
async fn default_and_explicit_ttls_reach_the_cache() {
    let docache = DocCache::builder(RecordingStore::default())
        .with_cache(RecordingCache::default())
        .with_default_ttl(Duration::from_secs(120))
        .build();

    docache
        .find(doc! { "collection": "users" }, QueryOptions::cached("a"))
        .await
        .unwrap();
    docache
        .find(doc! { "collection": "users" }, QueryOptions::cached("b").with_ttl(Duration::from_secs(5)))
        .await
        .unwrap();

    let ttls = docache.cache().unwrap().ttls.lock().unwrap().clone();
    assert_eq!(ttls, vec![Duration::from_secs(120), Duration::from_secs(5)]);
}

#[tokio::test]
async fn find_or_create_inserts_once_then_finds() {
    let docache = docache();
    let query = doc! { "collection": "users", "email": "a@b.com" };

    let (first, created) = docache
        .find_or_create(query.clone(), doc! { "email": "a@b.com" }, QueryOptions::new().validated())
        .await
        .unwrap();
    let (second, created_again) = docache
        .find_or_create(query, doc! { "email": "a@b.com" }, QueryOptions::new().validated())
        .await
        .unwrap();

    assert!(created);
    assert!(!created_again);
    assert_eq!(first, second);
    assert_eq!(first.get_str("password").unwrap(), "x");
    assert_eq!(store(&docache).inner.count("users").await, 1);
}

#[tokio::test]
async fn find_or_create_returns_a_match_without_validating_the_fallback() {
    let docache = docache();
    let (existing, _) = docache
        .create(doc! { "collection": "users", "email": "a@b.com" }, QueryOptions::new())
        .await
        .unwrap();
    store(&docache).reset();

    let (found, created) = docache
        .find_or_create(
            doc! { "collection": "users", "email": "a@b.com" },
            doc! { "email": "a@b.com", "extra": 1 },
            QueryOptions::new().validated(),
        )
        .await
        .unwrap();

    assert!(!created);
    assert_eq!(found, existing);
    assert_eq!(store(&docache).calls(), vec!["find_one"]);
}

#[tokio::test]
async fn find_or_create_validates_before_inserting() {
    let docache = docache();

    let err = docache
        .find_or_create(
            doc! { "collection": "users", "email": "a@b.com" },
            doc! { "email": 42 },
            QueryOptions::new().validated(),
        )
        .await
        .unwrap_err();

    assert!(err.is_schema());
    assert_eq!(store(&docache).calls(), vec!["find_one"]);
    assert_eq!(store(&docache).inner.count("users").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_find_or_create_inserts_once() {
    let docache = Arc::new(DocCache::new(InMemoryStore::new()));

    let tasks = (0..16)
        .map(|_| {
            let docache = Arc::clone(&docache);
            tokio::spawn(async move {
                docache
                    .find_or_create(
                        doc! { "collection": "users", "email": "a@b.com" },
                        doc! { "email": "a@b.com" },
                        QueryOptions::new(),
                    )
                    .await
            })
        })
        .collect::<Vec<_>>();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap().unwrap());
    }

    assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
    assert!(results.iter().all(|(document, _)| *document == results[0].0));
    assert_eq!(docache.store().count("users").await, 1);
}

#[tokio::test]
async fn find_or_create_writes_the_result_through() {
    let docache = docache();

    let (document, _) = docache
        .find_or_create(
            doc! { "collection": "users", "email": "a@b.com" },
            doc! { "_id": "u1", "email": "a@b.com" },
            QueryOptions::cached("user:u1"),
        )
        .await
        .unwrap();

    let cached = cache(&docache).inner.get("user:u1").await.unwrap().unwrap();
    assert_eq!(serde_json::from_str::<Document>(&cached).unwrap(), document);
}

#[tokio::test]
async fn cached_reads_return_the_created_document_unchanged() {
    let docache = docache();
    let (created, _) = docache
        .create(
            doc! {
                "collection": "counters",
                "_id": "c1",
                "hits": 5_i64,
                "ratio": 1.0,
                "at": bson::DateTime::from_millis(1_700_000_000_000),
            },
            QueryOptions::cached("counter:c1"),
        )
        .await
        .unwrap();

    let cached = docache
        .find_one(doc! { "collection": "counters", "_id": "c1" }, QueryOptions::cached("counter:c1"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(cached, created);
    assert_eq!(cached.get_i64("hits").unwrap(), 5);
    assert_eq!(store(&docache).count("find_one"), 0);
}

#[tokio::test]
async fn update_writes_the_new_image_through() {
    let docache = docache();
    docache
        .create(doc! { "collection": "users", "_id": "u1", "email": "a@b.com", "password": "old" }, QueryOptions::new())
        .await
        .unwrap();

    let (updated, found) = docache
        .update_one(
            doc! { "collection": "users", "_id": "u1" },
            doc! { "password": "new" },
            QueryOptions::cached("user:u1"),
        )
        .await
        .unwrap();
    store(&docache).reset();

    let cached = docache
        .find_one(doc! { "collection": "users", "_id": "u1" }, QueryOptions::cached("user:u1"))
        .await
        .unwrap();

    assert!(found);
    assert_eq!(updated, Some(doc! { "_id": "u1", "email": "a@b.com", "password": "new" }));
    assert_eq!(cached, updated);
    assert!(store(&docache).calls().is_empty());
}

#[tokio::test]
async fn update_without_a_match_writes_nothing_to_the_cache() {
    let docache = docache();

    let (updated, found) = docache
        .update_one(
            doc! { "collection": "users", "_id": "missing" },
            doc! { "password": "new" },
            QueryOptions::cached("user:missing"),
        )
        .await
        .unwrap();

    assert_eq!((updated, found), (None, false));
    assert_eq!(cache(&docache).count("set"), 0);
}

#[tokio::test]
async fn update_with_cache_but_no_key_fails_before_the_store() {
    let docache = docache();
    let options = QueryOptions { cache: true, ..Default::default() };

    let err = docache
        .update_one(doc! { "collection": "users" }, doc! { "password": "new" }, options)
        .await
        .unwrap_err();

    assert!(matches!(err, DocCacheError::MissingCacheKey));
    assert!(store(&docache).calls().is_empty());
    assert_eq!(cache(&docache).count("get") + cache(&docache).count("set"), 0);
}

#[tokio::test]
async fn delete_of_a_missing_document_does_not_invalidate() {
    let docache = docache();

    let deleted = docache
        .delete_one(doc! { "collection": "users", "_id": "missing" }, QueryOptions::cached("user:missing"))
        .await
        .unwrap();

    assert!(!deleted);
    assert_eq!(cache(&docache).count("del"), 0);
}

#[tokio::test]
async fn delete_invalidates_the_cached_entry() {
    let docache = docache();
    docache
        .create(
            doc! { "collection": "users", "_id": "u1", "email": "a@b.com" },
            QueryOptions::cached("user:u1"),
        )
        .await
        .unwrap();

    let deleted = docache
        .delete_one(doc! { "collection": "users", "_id": "u1" }, QueryOptions::cached("user:u1"))
        .await
        .unwrap();
    let found = docache
        .find_one(doc! { "collection": "users", "_id": "u1" }, QueryOptions::cached("user:u1"))
        .await
        .unwrap();

    assert!(deleted);
    assert_eq!(cache(&docache).count("del"), 1);
    assert_eq!(found, None);
    assert_eq!(store(&docache).count("find_one"), 1);
}

#[tokio::test]
async fn delete_all_ignores_cache_options() {
    let docache = docache();
    for name in ["a", "b", "c"] {
        docache
            .create(doc! { "collection": "users", "name": name }, QueryOptions::new())
            .await
            .unwrap();
    }
    let options = QueryOptions { cache: true, ..Default::default() };

    let removed = docache
        .delete_all(doc! { "collection": "users", "name": "a" }, options)
        .await
        .unwrap();

    assert_eq!(removed, 3);
    assert_eq!(store(&docache).inner.count("users").await, 0);
    assert!(cache(&docache).calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn store_failures_on_a_miss_leave_the_cache_unset() {
    let docache = docache();
    store(&docache).fail.store(true, Ordering::SeqCst);

    let err = docache
        .find(doc! { "collection": "users" }, QueryOptions::cached("users:all"))
        .await
        .unwrap_err();

    assert!(err.is_store());
    assert!(cache(&docache).inner.is_empty().await);
}

#[tokio::test]
async fn tolerated_cache_failures_keep_the_store_result() {
    let docache = docache();
    cache(&docache).fail_writes.store(true, Ordering::SeqCst);

    let (created, _) = docache
        .create(doc! { "collection": "users", "_id": "u1" }, QueryOptions::cached("user:u1"))
        .await
        .unwrap();

    assert_eq!(created, doc! { "_id": "u1" });
}

#[tokio::test]
async fn escalated_cache_failures_fail_the_call() {
    let docache = DocCache::builder(RecordingStore::default())
        .with_cache(RecordingCache::default())
        .with_cache_failure_policy(CacheFailurePolicy::Escalate)
        .build();
    docache.cache().unwrap().fail_writes.store(true, Ordering::SeqCst);

    let err = docache
        .create(doc! { "collection": "users", "_id": "u1" }, QueryOptions::cached("user:u1"))
        .await
        .unwrap_err();

    assert!(err.is_cache());
    // The store write is not rolled back.
    assert_eq!(docache.store().inner.count("users").await, 1);
}

#[tokio::test]
async fn configuration_errors_precede_io() {
    let uncached = DocCache::new(RecordingStore::default());
    let unavailable = uncached
        .find(doc! { "collection": "users" }, QueryOptions::cached("users:all"))
        .await
        .unwrap_err();
    let not_set = uncached
        .create(doc! { "collection": "users" }, QueryOptions::new().validated())
        .await
        .unwrap_err();
    let no_collection = uncached
        .find(doc! { "email": "a@b.com" }, QueryOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(unavailable, DocCacheError::CacheUnavailable));
    assert!(matches!(not_set, DocCacheError::SchemaNotSet));
    assert!(matches!(no_collection, DocCacheError::MissingCollection));
    assert!(uncached.store().calls().is_empty());
}

#[tokio::test]
async fn references_resolve_to_their_documents() {
    let docache = DocCache::new(InMemoryStore::new());
    docache
        .set_schema(
            Schema::builder()
                .field("title", FieldType::String)
                .field("author", FieldRule::new(FieldType::String).via("users"))
                .build()
                .unwrap(),
        )
        .await;
    let author_id = ObjectId::new();
    let author = doc! { "_id": author_id, "name": "chris" };
    docache
        .create(doc! { "collection": "users", "_id": author_id, "name": "chris" }, QueryOptions::new())
        .await
        .unwrap();

    let (post, _) = docache
        .create(
            doc! { "collection": "posts", "title": "Hello", "author": author_id.to_hex() },
            QueryOptions::new().validated(),
        )
        .await
        .unwrap();
    let (orphan, _) = docache
        .create(
            doc! { "collection": "posts", "title": "Bye", "author": ObjectId::new().to_hex() },
            QueryOptions::new().validated(),
        )
        .await
        .unwrap();

    assert_eq!(post.get_document("author").unwrap(), &author);
    assert_eq!(orphan.get("author"), Some(&Bson::Null));
}

#[tokio::test]
async fn schemas_can_be_replaced_and_cleared() {
    let docache = DocCache::new(InMemoryStore::new());
    assert!(docache.schema().await.is_none());

    docache.set_schema(credentials()).await;
    assert_eq!(docache.schema().await.as_deref(), Some(&credentials()));
    assert!(docache.validate(doc! { "email": "a@b.com" }).await.is_ok());

    docache.clear_schema().await;
    assert!(matches!(
        docache.validate(doc! { "email": "a@b.com" }).await,
        Err(DocCacheError::SchemaNotSet)
    ));
}

#[tokio::test]
async fn option_bags_only_forward_store_options() {
    let docache = docache();
    for name in ["a", "b", "c"] {
        docache
            .create(doc! { "collection": "users", "_id": name }, QueryOptions::new())
            .await
            .unwrap();
    }
    let options = QueryOptions::try_from(doc! {
        "cache": true,
        "key": "users:first-two",
        "schema": true,
        "ttlSeconds": 60,
        "limit": 2,
    })
    .unwrap();

    let found = docache
        .find(doc! { "collection": "users" }, options)
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(
        store(&docache).options.lock().unwrap().clone(),
        vec![StoreOptions { limit: Some(2), ..Default::default() }]
    );
    assert_eq!(cache(&docache).ttls.lock().unwrap().clone(), vec![Duration::from_secs(60)]);
}

#[tokio::test]
async fn collection_handles_fix_the_target_collection() {
    let docache = docache();
    let users = docache.collection("users");

    let (created, _) = users
        .create(doc! { "_id": "u1", "email": "a@b.com" }, QueryOptions::new())
        .await
        .unwrap();
    let found = users
        .find(doc! { "email": "a@b.com" }, QueryOptions::new())
        .await
        .unwrap();
    let (updated, _) = users
        .update_one(doc! { "_id": "u1" }, doc! { "password": "y" }, QueryOptions::new())
        .await
        .unwrap();

    assert_eq!(users.name(), "users");
    assert_eq!(found, vec![created]);
    assert_eq!(updated.unwrap().get_str("password").unwrap(), "y");
    assert!(users.delete_one(doc! { "_id": "u1" }, QueryOptions::new()).await.unwrap());
    assert_eq!(users.delete_all().await.unwrap(), 0);
}

#[tokio::test]
async fn shutdown_releases_both_drivers() {
    let docache = DocCache::builder(InMemoryStore::new())
        .with_cache(InMemoryCache::new())
        .build();

    assert!(docache.shutdown().await.is_ok());
}
