//! In-memory storage adapter.

use crate::adapter::StorageAdapter;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use tidedb_model::Doc;

type Tables = HashMap<(String, String), BTreeMap<String, Doc>>;

/// An in-memory storage adapter for tests and ephemeral storage.
///
/// Documents live in per-(namespace, collection) tables ordered by id, so
/// `find` is deterministic. The adapter supports single-shot fault injection
/// via [`MemoryAdapter::fail_next`], which makes adapter-error propagation
/// testable without a broken disk.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    tables: RwLock<Tables>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryAdapter {
    /// Creates an empty adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next operation fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }

    fn take_failure(&self) -> StoreResult<()> {
        match self.fail_next.lock().take() {
            Some(message) => Err(StoreError::adapter_message(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn count(&self, namespace: &str, collection: &str) -> StoreResult<u64> {
        self.take_failure()?;
        let tables = self.tables.read();
        Ok(tables
            .get(&(namespace.to_string(), collection.to_string()))
            .map(|t| t.len() as u64)
            .unwrap_or(0))
    }

    async fn find(&self, namespace: &str, collection: &str) -> StoreResult<Vec<Doc>> {
        self.take_failure()?;
        let tables = self.tables.read();
        Ok(tables
            .get(&(namespace.to_string(), collection.to_string()))
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_by_id(
        &self,
        namespace: &str,
        collection: &str,
        id: &str,
    ) -> StoreResult<Option<Doc>> {
        self.take_failure()?;
        let tables = self.tables.read();
        Ok(tables
            .get(&(namespace.to_string(), collection.to_string()))
            .and_then(|t| t.get(id).cloned()))
    }

    async fn save(
        &self,
        namespace: &str,
        collection: &str,
        docs: Vec<Doc>,
    ) -> StoreResult<Vec<Doc>> {
        self.take_failure()?;
        let mut tables = self.tables.write();
        let table = tables
            .entry((namespace.to_string(), collection.to_string()))
            .or_default();
        for doc in &docs {
            let id = doc.id().ok_or_else(|| {
                StoreError::adapter_message("document without _id reached the adapter")
            })?;
            table.insert(id.to_string(), doc.clone());
        }
        Ok(docs)
    }

    async fn remove_by_id(
        &self,
        namespace: &str,
        collection: &str,
        id: &str,
    ) -> StoreResult<u64> {
        self.take_failure()?;
        let mut tables = self.tables.write();
        let removed = tables
            .get_mut(&(namespace.to_string(), collection.to_string()))
            .and_then(|t| t.remove(id));
        Ok(u64::from(removed.is_some()))
    }

    async fn clear(&self, namespace: &str, collection: &str) -> StoreResult<u64> {
        self.take_failure()?;
        let mut tables = self.tables.write();
        Ok(tables
            .remove(&(namespace.to_string(), collection.to_string()))
            .map(|t| t.len() as u64)
            .unwrap_or(0))
    }

    async fn clear_database(&self, namespace: &str, exclude: &[String]) -> StoreResult<()> {
        self.take_failure()?;
        let mut tables = self.tables.write();
        tables.retain(|(ns, collection), _| ns != namespace || exclude.contains(collection));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: i64) -> Doc {
        Doc::from_value(json!({"_id": id, "value": value})).unwrap()
    }

    #[tokio::test]
    async fn save_and_find_roundtrip() {
        let adapter = MemoryAdapter::new();
        adapter
            .save("ns", "books", vec![doc("b", 2), doc("a", 1)])
            .await
            .unwrap();

        assert_eq!(adapter.count("ns", "books").await.unwrap(), 2);
        let found = adapter.find("ns", "books").await.unwrap();
        // Ordered by id.
        assert_eq!(found[0].id(), Some("a"));
        assert_eq!(found[1].id(), Some("b"));

        let one = adapter.find_by_id("ns", "books", "b").await.unwrap();
        assert_eq!(one.unwrap().get("value"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn save_upserts_by_id() {
        let adapter = MemoryAdapter::new();
        adapter.save("ns", "books", vec![doc("a", 1)]).await.unwrap();
        adapter.save("ns", "books", vec![doc("a", 9)]).await.unwrap();

        assert_eq!(adapter.count("ns", "books").await.unwrap(), 1);
        let one = adapter.find_by_id("ns", "books", "a").await.unwrap().unwrap();
        assert_eq!(one.get("value"), Some(&json!(9)));
    }

    #[tokio::test]
    async fn remove_by_id_counts() {
        let adapter = MemoryAdapter::new();
        adapter.save("ns", "books", vec![doc("a", 1)]).await.unwrap();

        assert_eq!(adapter.remove_by_id("ns", "books", "missing").await.unwrap(), 0);
        assert_eq!(adapter.remove_by_id("ns", "books", "a").await.unwrap(), 1);
        assert_eq!(adapter.remove_by_id("ns", "books", "a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_database_honors_exclusions() {
        let adapter = MemoryAdapter::new();
        adapter.save("ns", "books", vec![doc("a", 1)]).await.unwrap();
        adapter.save("ns", "_sync", vec![doc("s", 1)]).await.unwrap();
        adapter.save("other", "books", vec![doc("o", 1)]).await.unwrap();

        adapter
            .clear_database("ns", &["_sync".to_string()])
            .await
            .unwrap();

        assert_eq!(adapter.count("ns", "books").await.unwrap(), 0);
        assert_eq!(adapter.count("ns", "_sync").await.unwrap(), 1);
        // Other namespaces are untouched.
        assert_eq!(adapter.count("other", "books").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fault_injection_fails_once() {
        let adapter = MemoryAdapter::new();
        adapter.fail_next("boom");

        let err = adapter.find("ns", "books").await.unwrap_err();
        assert!(matches!(err, StoreError::Adapter(_)));
        assert!(err.to_string().contains("boom"));

        // The fault is consumed.
        assert!(adapter.find("ns", "books").await.is_ok());
    }

    #[tokio::test]
    async fn save_rejects_unidentified_docs() {
        let adapter = MemoryAdapter::new();
        let unidentified = Doc::from_value(json!({"value": 1})).unwrap();
        let err = adapter.save("ns", "books", vec![unidentified]).await.unwrap_err();
        assert!(matches!(err, StoreError::Adapter(_)));
    }
}
