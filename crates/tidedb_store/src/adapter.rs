//! Storage adapter trait definition.

use crate::error::StoreResult;
use async_trait::async_trait;
use tidedb_model::Doc;

/// A physical storage adapter for TideDB.
///
/// Adapters are **opaque document stores** keyed by (namespace, collection,
/// id). They persist and retrieve whole documents; TideDB owns all document
/// interpretation beyond the `_id` field. Implementations back onto files,
/// embedded SQL, browser key-value stores, or memory.
///
/// # Invariants
///
/// - `save` upserts each document under its `_id` and returns the batch in
///   input order
/// - `find_by_id` returns exactly the document previously saved under that id
/// - `remove_by_id` reports how many documents were removed (0 or 1), never
///   an error for an absent id
/// - Adapters must be `Send + Sync`; no atomicity across calls is assumed,
///   [`super::SerializedStorage`] provides the serialization
///
/// # Errors
///
/// Adapter failures surface as [`crate::StoreError::Adapter`] carrying the
/// adapter's own error unchanged; no retries happen at this layer.
///
/// # Implementors
///
/// - [`super::MemoryAdapter`] - for tests and ephemeral storage
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Counts the documents in a collection.
    async fn count(&self, namespace: &str, collection: &str) -> StoreResult<u64>;

    /// Loads all documents in a collection.
    async fn find(&self, namespace: &str, collection: &str) -> StoreResult<Vec<Doc>>;

    /// Loads one document by id.
    async fn find_by_id(
        &self,
        namespace: &str,
        collection: &str,
        id: &str,
    ) -> StoreResult<Option<Doc>>;

    /// Upserts a batch of documents, each keyed by its `_id`.
    ///
    /// Every document in the batch carries an id by the time it reaches the
    /// adapter. Returns the batch in input order.
    async fn save(
        &self,
        namespace: &str,
        collection: &str,
        docs: Vec<Doc>,
    ) -> StoreResult<Vec<Doc>>;

    /// Removes one document by id, returning the removed count (0 or 1).
    async fn remove_by_id(
        &self,
        namespace: &str,
        collection: &str,
        id: &str,
    ) -> StoreResult<u64>;

    /// Removes every document in a collection, returning the removed count.
    async fn clear(&self, namespace: &str, collection: &str) -> StoreResult<u64>;

    /// Removes all collections under a namespace except the named ones.
    async fn clear_database(&self, namespace: &str, exclude: &[String]) -> StoreResult<()>;
}
