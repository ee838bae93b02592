//! Serialized storage: one adapter binding behind a FIFO operation queue.

use crate::adapter::StorageAdapter;
use crate::error::StoreResult;
use std::sync::Arc;
use tidedb_model::{local_id, Doc};
use tokio::sync::Mutex;
use tracing::trace;

/// Handle to a serialization queue.
///
/// Tokio's mutex queues waiters fairly, so holding it for the duration of
/// each operation yields a FIFO queue of concurrency 1. Pass one handle to
/// several [`SerializedStorage`] instances (via
/// [`SerializedStorage::with_queue`]) when cross-instance serialization is
/// required; there is no process-wide queue.
pub type QueueHandle = Arc<Mutex<()>>;

/// One (adapter, namespace, collection) binding whose operations never
/// interleave.
///
/// The underlying adapter may not be atomic across a compound
/// read-modify-write, so every operation runs to completion before the next
/// begins. This is the unit of atomicity for everything built above it.
///
/// Two instances bound to the same physical collection are **not** mutually
/// coordinated unless constructed with a shared [`QueueHandle`]; avoiding
/// duplicate handles is the caller's responsibility.
pub struct SerializedStorage {
    adapter: Arc<dyn StorageAdapter>,
    namespace: String,
    collection: String,
    queue: QueueHandle,
}

impl SerializedStorage {
    /// Creates a storage binding with its own queue.
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        namespace: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self::with_queue(adapter, namespace, collection, Arc::new(Mutex::new(())))
    }

    /// Creates a storage binding serialized on an explicitly shared queue.
    pub fn with_queue(
        adapter: Arc<dyn StorageAdapter>,
        namespace: impl Into<String>,
        collection: impl Into<String>,
        queue: QueueHandle,
    ) -> Self {
        Self {
            adapter,
            namespace: namespace.into(),
            collection: collection.into(),
            queue,
        }
    }

    /// Returns this instance's queue handle for explicit sharing.
    #[must_use]
    pub fn queue(&self) -> QueueHandle {
        Arc::clone(&self.queue)
    }

    /// The storage namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The physical collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Counts the documents in the collection.
    pub async fn count(&self) -> StoreResult<u64> {
        let _guard = self.queue.lock().await;
        self.adapter.count(&self.namespace, &self.collection).await
    }

    /// Loads all documents in the collection.
    pub async fn find(&self) -> StoreResult<Vec<Doc>> {
        let _guard = self.queue.lock().await;
        self.adapter.find(&self.namespace, &self.collection).await
    }

    /// Loads one document by id.
    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<Doc>> {
        let _guard = self.queue.lock().await;
        self.adapter
            .find_by_id(&self.namespace, &self.collection, id)
            .await
    }

    /// Saves a batch of documents, assigning local identities where absent.
    ///
    /// Every document lacking an `_id` gets a freshly generated 24-character
    /// lowercase hex id and `_kmd.local = true`. The possibly mixed batch
    /// goes to the adapter in one call; documents come back in input order
    /// with ids populated.
    pub async fn save(&self, mut docs: Vec<Doc>) -> StoreResult<Vec<Doc>> {
        let _guard = self.queue.lock().await;
        for doc in &mut docs {
            if doc.id().is_none() {
                doc.set_id(local_id());
                doc.set_local(true);
            }
        }
        trace!(
            collection = %self.collection,
            count = docs.len(),
            "saving batch"
        );
        self.adapter
            .save(&self.namespace, &self.collection, docs)
            .await
    }

    /// Removes one document by id, returning the removed count (0 or 1).
    pub async fn remove_by_id(&self, id: &str) -> StoreResult<u64> {
        let _guard = self.queue.lock().await;
        self.adapter
            .remove_by_id(&self.namespace, &self.collection, id)
            .await
    }

    /// Removes every document in the collection.
    pub async fn clear(&self) -> StoreResult<u64> {
        let _guard = self.queue.lock().await;
        self.adapter.clear(&self.namespace, &self.collection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::MemoryAdapter;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tidedb_model::is_local_id_format;

    fn storage() -> SerializedStorage {
        SerializedStorage::new(Arc::new(MemoryAdapter::new()), "ns", "books")
    }

    #[tokio::test]
    async fn save_assigns_local_identity() {
        let storage = storage();
        let saved = storage
            .save(vec![Doc::from_value(json!({"name": "a"})).unwrap()])
            .await
            .unwrap();

        let id = saved[0].id().unwrap();
        assert!(is_local_id_format(id), "unexpected id {id:?}");
        assert!(saved[0].is_local());
    }

    #[tokio::test]
    async fn save_keeps_existing_ids_and_input_order() {
        let storage = storage();
        let saved = storage
            .save(vec![
                Doc::from_value(json!({"_id": "zz", "n": 1})).unwrap(),
                Doc::from_value(json!({"n": 2})).unwrap(),
                Doc::from_value(json!({"_id": "aa", "n": 3})).unwrap(),
            ])
            .await
            .unwrap();

        assert_eq!(saved[0].id(), Some("zz"));
        assert!(saved[1].id().is_some());
        assert_eq!(saved[2].id(), Some("aa"));
        // Documents with supplied ids are not marked local.
        assert!(!saved[0].is_local());
        assert!(saved[1].is_local());
    }

    #[tokio::test]
    async fn remove_by_id_counts() {
        let storage = storage();
        storage
            .save(vec![Doc::from_value(json!({"_id": "a"})).unwrap()])
            .await
            .unwrap();

        assert_eq!(storage.remove_by_id("missing").await.unwrap(), 0);
        assert_eq!(storage.remove_by_id("a").await.unwrap(), 1);
        assert!(storage.find().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn adapter_errors_propagate_unchanged() {
        let adapter = Arc::new(MemoryAdapter::new());
        let storage = SerializedStorage::new(adapter.clone(), "ns", "books");
        adapter.fail_next("adapter exploded");

        let err = storage.find().await.unwrap_err();
        assert!(matches!(err, StoreError::Adapter(_)));
        assert!(err.to_string().contains("adapter exploded"));
    }

    /// Adapter that counts concurrently running operations, suspending
    /// mid-operation so overlap would be observable.
    #[derive(Default)]
    struct ProbeAdapter {
        active: AtomicUsize,
        max_active: AtomicUsize,
        inner: MemoryAdapter,
    }

    impl ProbeAdapter {
        async fn enter(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
        }

        fn exit(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StorageAdapter for ProbeAdapter {
        async fn count(&self, ns: &str, c: &str) -> StoreResult<u64> {
            self.enter().await;
            let out = self.inner.count(ns, c).await;
            self.exit();
            out
        }

        async fn find(&self, ns: &str, c: &str) -> StoreResult<Vec<Doc>> {
            self.enter().await;
            let out = self.inner.find(ns, c).await;
            self.exit();
            out
        }

        async fn find_by_id(&self, ns: &str, c: &str, id: &str) -> StoreResult<Option<Doc>> {
            self.enter().await;
            let out = self.inner.find_by_id(ns, c, id).await;
            self.exit();
            out
        }

        async fn save(&self, ns: &str, c: &str, docs: Vec<Doc>) -> StoreResult<Vec<Doc>> {
            self.enter().await;
            let out = self.inner.save(ns, c, docs).await;
            self.exit();
            out
        }

        async fn remove_by_id(&self, ns: &str, c: &str, id: &str) -> StoreResult<u64> {
            self.enter().await;
            let out = self.inner.remove_by_id(ns, c, id).await;
            self.exit();
            out
        }

        async fn clear(&self, ns: &str, c: &str) -> StoreResult<u64> {
            self.enter().await;
            let out = self.inner.clear(ns, c).await;
            self.exit();
            out
        }

        async fn clear_database(&self, ns: &str, exclude: &[String]) -> StoreResult<()> {
            self.enter().await;
            let out = self.inner.clear_database(ns, exclude).await;
            self.exit();
            out
        }
    }

    #[tokio::test]
    async fn operations_never_interleave() {
        let adapter = Arc::new(ProbeAdapter::default());
        let storage = Arc::new(SerializedStorage::new(adapter.clone(), "ns", "books"));

        let mut handles = Vec::new();
        for i in 0..16 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                storage
                    .save(vec![Doc::from_value(json!({"n": i})).unwrap()])
                    .await
                    .unwrap();
                storage.find().await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(adapter.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(storage.count().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn shared_queue_serializes_across_instances() {
        let adapter = Arc::new(ProbeAdapter::default());
        let first = Arc::new(SerializedStorage::new(adapter.clone(), "ns", "books"));
        let second = Arc::new(SerializedStorage::with_queue(
            adapter.clone(),
            "ns",
            "books",
            first.queue(),
        ));

        let mut handles = Vec::new();
        for (i, storage) in [first, second].into_iter().cycle().take(8).enumerate() {
            handles.push(tokio::spawn(async move {
                storage
                    .save(vec![Doc::from_value(json!({"n": i})).unwrap()])
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(adapter.max_active.load(Ordering::SeqCst), 1);
    }
}
