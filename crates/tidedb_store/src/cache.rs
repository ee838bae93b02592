//! Collection-scoped local cache with query-aware reads.

use crate::adapter::StorageAdapter;
use crate::error::{StoreError, StoreResult};
use crate::serialized::SerializedStorage;
use std::sync::Arc;
use tidedb_model::Doc;
use tidedb_query::{evaluate, Aggregation, Query};
use tracing::debug;

/// Collection-scoped document CRUD with query-aware reads.
///
/// `LocalCache` composes a [`SerializedStorage`] instance; it deliberately
/// does not extend it. Reads load the whole collection and run the query
/// evaluator locally, so cached reads behave exactly like remote reads.
///
/// An optional **tag** isolates multiple caches for one logical collection
/// (per-user offline partitions, for example). The tag becomes part of the
/// physical collection name.
pub struct LocalCache {
    storage: SerializedStorage,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache").finish_non_exhaustive()
    }
}

impl LocalCache {
    /// Creates a cache for `collection`, optionally namespaced by `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] for an empty collection name or
    /// a tag not matching `^[a-z0-9-]+$` (case-insensitive).
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        namespace: impl Into<String>,
        collection: impl Into<String>,
        tag: Option<&str>,
    ) -> StoreResult<Self> {
        let collection = collection.into();
        if collection.is_empty() {
            return Err(StoreError::configuration("collection name is empty"));
        }
        let physical = match tag {
            Some(tag) => {
                if !valid_tag(tag) {
                    return Err(StoreError::configuration(format!(
                        "tag {tag:?} must match ^[a-z0-9-]+$ (case-insensitive)"
                    )));
                }
                format!("{collection}.{tag}")
            }
            None => collection,
        };
        Ok(Self {
            storage: SerializedStorage::new(adapter, namespace, physical),
        })
    }

    /// Wraps an existing storage binding.
    #[must_use]
    pub fn from_storage(storage: SerializedStorage) -> Self {
        Self { storage }
    }

    /// The physical collection name (tag included).
    #[must_use]
    pub fn collection(&self) -> &str {
        self.storage.collection()
    }

    /// The underlying serialized storage.
    #[must_use]
    pub fn storage(&self) -> &SerializedStorage {
        &self.storage
    }

    /// Counts all cached documents.
    pub async fn count(&self) -> StoreResult<u64> {
        self.storage.count().await
    }

    /// Loads cached documents, filtered through `query` when supplied.
    pub async fn find(&self, query: Option<&Query>) -> StoreResult<Vec<Doc>> {
        let docs = self.storage.find().await?;
        Ok(match query {
            Some(query) => evaluate(docs, query),
            None => docs,
        })
    }

    /// Loads one cached document by id.
    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<Doc>> {
        self.storage.find_by_id(id).await
    }

    /// Reduces the documents matching `query` with a grouped aggregation.
    pub async fn group(
        &self,
        aggregation: &Aggregation,
        query: Option<&Query>,
    ) -> StoreResult<Vec<Doc>> {
        let docs = self.find(query).await?;
        Ok(aggregation.apply(&docs))
    }

    /// Saves one document, assigning a local identity if needed.
    pub async fn save(&self, doc: Doc) -> StoreResult<Doc> {
        let mut saved = self.storage.save(vec![doc]).await?;
        // A one-element batch comes back as one element.
        saved
            .pop()
            .ok_or_else(|| StoreError::adapter_message("adapter returned an empty batch"))
    }

    /// Saves a batch of documents.
    pub async fn save_batch(&self, docs: Vec<Doc>) -> StoreResult<Vec<Doc>> {
        self.storage.save(docs).await
    }

    /// Removes the documents matching `query` (all of them when `None`),
    /// returning the aggregate removed count.
    pub async fn remove(&self, query: Option<&Query>) -> StoreResult<u64> {
        let matched = self.find(query).await?;
        let mut removed = 0;
        for doc in matched {
            let id = doc.id().ok_or_else(|| StoreError::MissingId {
                collection: self.collection().to_string(),
            })?;
            removed += self.storage.remove_by_id(id).await?;
        }
        debug!(collection = %self.collection(), removed, "removed by query");
        Ok(removed)
    }

    /// Removes one document by id, returning the removed count (0 or 1).
    pub async fn remove_by_id(&self, id: &str) -> StoreResult<u64> {
        self.storage.remove_by_id(id).await
    }

    /// Removes every cached document.
    pub async fn clear(&self) -> StoreResult<u64> {
        self.storage.clear().await
    }
}

fn valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}
