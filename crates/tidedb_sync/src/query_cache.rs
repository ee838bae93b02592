//! Per-query delta bookmarks.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tidedb_model::Doc;
use tidedb_query::{canonical_string, Query};
use tidedb_store::{SerializedStorage, StorageAdapter};
use tracing::warn;

/// Collection holding query-cache entries, inside the same namespace as
/// user data.
pub const QUERY_CACHE_COLLECTION: &str = "_query_cache";

/// Derives the delta-cache key for a query.
///
/// `Some(canonical form)` for unpaginated queries (the empty string denotes
/// "unfiltered"); `None` when the query pages its results (`skip > 0` or a
/// bounded limit), which makes it ineligible for delta caching: such
/// queries always force a full fetch.
#[must_use]
pub fn delta_key(query: Option<&Query>) -> Option<String> {
    match query {
        None => Some(String::new()),
        Some(query) if query.is_paginated() => None,
        Some(query) => Some(canonical_string(query)),
    }
}

/// One per-query synchronization bookmark.
///
/// `last_request` is the backend's own request time, stored verbatim as an
/// opaque token and echoed back as the delta `since` parameter. It is never
/// derived from the client clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCacheEntry {
    /// Storage identifier of the entry itself.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The physical collection the bookmark belongs to.
    #[serde(rename = "collectionName")]
    pub collection_name: String,
    /// Canonical query form; the empty string means "unfiltered".
    pub query: String,
    /// Server-reported time of the last successful pull.
    #[serde(rename = "lastRequest", skip_serializing_if = "Option::is_none")]
    pub last_request: Option<String>,
}

impl QueryCacheEntry {
    /// Creates a fresh, never-pulled entry.
    #[must_use]
    pub fn new(collection_name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: None,
            collection_name: collection_name.into(),
            query: query.into(),
            last_request: None,
        }
    }
}

/// Store of per-query delta bookmarks, persisted as ordinary documents.
pub struct QueryCache {
    storage: SerializedStorage,
}

impl QueryCache {
    /// Opens the query cache for a namespace.
    pub fn new(adapter: Arc<dyn StorageAdapter>, namespace: impl Into<String>) -> Self {
        Self {
            storage: SerializedStorage::new(adapter, namespace, QUERY_CACHE_COLLECTION),
        }
    }

    /// Looks up the entry for (collection, canonical query).
    pub async fn entry(
        &self,
        collection: &str,
        key: &str,
    ) -> SyncResult<Option<QueryCacheEntry>> {
        Ok(self
            .storage
            .find()
            .await?
            .iter()
            .filter_map(entry_of)
            .find(|e| e.collection_name == collection && e.query == key))
    }

    /// Inserts or updates an entry, returning it with its storage id.
    pub async fn upsert(&self, mut entry: QueryCacheEntry) -> SyncResult<QueryCacheEntry> {
        // Lazily created entries adopt the id of an existing bookmark for
        // the same (collection, query) so updates replace, never duplicate.
        if entry.id.is_none() {
            if let Some(existing) = self.entry(&entry.collection_name, &entry.query).await? {
                entry.id = existing.id;
            }
        }
        let value = serde_json::to_value(&entry)
            .map_err(|e| SyncError::payload(format!("unserializable query cache entry: {e}")))?;
        let doc = Doc::from_value(value)
            .ok_or_else(|| SyncError::payload("query cache entry serialized to a non-object"))?;
        let mut saved = self.storage.save(vec![doc]).await?;
        let saved = saved
            .pop()
            .ok_or_else(|| SyncError::payload("query cache save returned an empty batch"))?;
        entry_of(&saved)
            .ok_or_else(|| SyncError::payload("query cache entry did not round-trip"))
    }

    /// Deletes the entry for (collection, canonical query).
    pub async fn remove(&self, collection: &str, key: &str) -> SyncResult<u64> {
        match self.entry(collection, key).await? {
            Some(QueryCacheEntry { id: Some(id), .. }) => {
                Ok(self.storage.remove_by_id(&id).await?)
            }
            _ => Ok(0),
        }
    }

    /// Deletes every entry for a collection.
    pub async fn clear_collection(&self, collection: &str) -> SyncResult<u64> {
        let mut removed = 0;
        for entry in self.storage.find().await?.iter().filter_map(entry_of) {
            if entry.collection_name == collection {
                if let Some(id) = &entry.id {
                    removed += self.storage.remove_by_id(id).await?;
                }
            }
        }
        Ok(removed)
    }
}

fn entry_of(doc: &Doc) -> Option<QueryCacheEntry> {
    match serde_json::from_value(doc.clone().into_value()) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(error = %e, "skipping malformed query cache entry");
            None
        }
    }
}
