//! The data store orchestrator: push, pull and synced reads.

use crate::backend::{Backend, DeltaSet};
use crate::config::{PushPolicy, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::network::NetworkClient;
use crate::query_cache::{delta_key, QueryCache, QueryCacheEntry};
use crate::synclog::{SyncLog, SyncLogEntry, SyncOperation};
use std::collections::HashMap;
use std::sync::Arc;
use tidedb_model::Doc;
use tidedb_query::{Aggregation, Query};
use tidedb_store::{LocalCache, StorageAdapter, StoreError};
use tracing::{debug, warn};

/// Outcome of pushing one sync log entry, attached to its entity.
///
/// Failures are never collapsed into one aggregate error: each failed entity
/// reports its own, and its entry stays queued for the next push.
#[derive(Debug)]
pub struct PushResult {
    /// The entity the outcome belongs to (the backend-assigned id once a
    /// create is acknowledged).
    pub entity_id: String,
    /// The operation that was pushed.
    pub operation: SyncOperation,
    /// The backend's view of the document, for acknowledged creates and
    /// updates.
    pub doc: Option<Doc>,
    /// The failure, if the entry could not be acknowledged.
    pub error: Option<SyncError>,
}

impl PushResult {
    /// True if the entry was acknowledged and destroyed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// A cache-then-network read.
///
/// `cached` is always present and never disturbed by the network leg;
/// `refreshed` reports the post-pull cache state, or the network failure,
/// letting the caller degrade to cache-only.
#[derive(Debug)]
pub struct NetworkRead {
    /// The cache results, produced before any network activity.
    pub cached: Vec<Doc>,
    /// The refreshed results, or why refreshing failed.
    pub refreshed: Result<Vec<Doc>, SyncError>,
}

/// Outcome of a full sync cycle.
#[derive(Debug)]
pub struct SyncSummary {
    /// Per-entity push outcomes.
    pub push: Vec<PushResult>,
    /// Documents applied by the pull leg; `None` if the pull was skipped
    /// because push left entries queued.
    pub pulled: Option<u64>,
}

/// A syncing document store for one collection.
///
/// Composes the local cache, the sync log, the query cache and the backend
/// client. Writes land in the cache and enqueue sync log entries; `push`
/// drains the log FIFO with at most one request in flight; `pull` refreshes
/// the cache via delta sets where a bookmark exists.
pub struct DataStore {
    collection: String,
    cache: LocalCache,
    sync_log: SyncLog,
    query_cache: QueryCache,
    backend: Backend,
    push_policy: PushPolicy,
}

impl DataStore {
    /// Opens a store for `collection`, optionally namespaced by `tag`.
    ///
    /// The tag partitions the local cache and sync state; network requests
    /// always target the logical collection.
    pub async fn new(
        adapter: Arc<dyn StorageAdapter>,
        client: Arc<dyn NetworkClient>,
        config: SyncConfig,
        collection: impl Into<String>,
        tag: Option<&str>,
    ) -> SyncResult<Self> {
        let collection = collection.into();
        let cache = LocalCache::new(
            Arc::clone(&adapter),
            config.namespace.clone(),
            collection.clone(),
            tag,
        )?;
        let sync_log = SyncLog::open(Arc::clone(&adapter), config.namespace.clone()).await?;
        let query_cache = QueryCache::new(adapter, config.namespace.clone());
        let backend = Backend::new(client, &config);
        Ok(Self {
            collection,
            cache,
            sync_log,
            query_cache,
            backend,
            push_policy: config.push_policy,
        })
    }

    /// The logical collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The local cache.
    #[must_use]
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Saves a document locally and enqueues the matching sync log entry:
    /// a create for a document without an id, an update otherwise.
    pub async fn save(&self, doc: Doc) -> SyncResult<Doc> {
        let had_id = doc.id().is_some();
        let saved = self.cache.save(doc).await?;
        let id = saved
            .id()
            .ok_or_else(|| SyncError::payload("saved document came back without an _id"))?;
        let operation = if had_id {
            SyncOperation::Update
        } else {
            SyncOperation::Create
        };
        self.sync_log
            .record(self.cache.collection(), id, operation)
            .await?;
        Ok(saved)
    }

    /// Removes the documents matching `query` (all of them when `None`),
    /// enqueueing a delete entry per removed document.
    pub async fn remove(&self, query: Option<&Query>) -> SyncResult<u64> {
        let matched = self.cache.find(query).await?;
        let mut removed = 0;
        for doc in matched {
            let id = doc
                .id()
                .ok_or_else(|| StoreError::MissingId {
                    collection: self.cache.collection().to_string(),
                })?
                .to_string();
            removed += self.remove_one(&id).await?;
        }
        Ok(removed)
    }

    /// Removes one document by id, enqueueing a delete entry if it existed.
    pub async fn remove_by_id(&self, id: &str) -> SyncResult<u64> {
        self.remove_one(id).await
    }

    async fn remove_one(&self, id: &str) -> SyncResult<u64> {
        let removed = self.cache.remove_by_id(id).await?;
        if removed > 0 {
            self.sync_log
                .record(self.cache.collection(), id, SyncOperation::Delete)
                .await?;
        }
        Ok(removed)
    }

    /// Reads from the cache only.
    pub async fn find(&self, query: Option<&Query>) -> SyncResult<Vec<Doc>> {
        Ok(self.cache.find(query).await?)
    }

    /// Reduces the cached documents matching `query` with a grouped
    /// aggregation.
    pub async fn group(
        &self,
        aggregation: &Aggregation,
        query: Option<&Query>,
    ) -> SyncResult<Vec<Doc>> {
        Ok(self.cache.group(aggregation, query).await?)
    }

    /// Reads the cache, then pulls and re-reads.
    ///
    /// The cache results come from before any network activity and survive a
    /// network failure untouched; the failure is reported alongside them in
    /// [`NetworkRead::refreshed`].
    pub async fn find_with_refresh(&self, query: Option<&Query>) -> SyncResult<NetworkRead> {
        let cached = self.cache.find(query).await?;
        let refreshed = match self.pull(query).await {
            Ok(_) => self.cache.find(query).await.map_err(SyncError::from),
            Err(e) => Err(e),
        };
        Ok(NetworkRead { cached, refreshed })
    }

    /// The number of unacknowledged local mutations.
    pub async fn pending_sync_count(&self) -> SyncResult<u64> {
        self.sync_log.pending_count(self.cache.collection()).await
    }

    /// The unacknowledged local mutations, FIFO.
    pub async fn pending_sync_entries(&self) -> SyncResult<Vec<SyncLogEntry>> {
        self.sync_log.pending(self.cache.collection()).await
    }

    /// Pushes pending mutations to the backend, strictly FIFO, one at a
    /// time.
    ///
    /// Per-entity mutation order is preserved exactly as enqueued. On
    /// failure the entry stays queued; whether the remaining queue is
    /// attempted is the configured [`PushPolicy`].
    pub async fn push(&self) -> SyncResult<Vec<PushResult>> {
        let entries = self.sync_log.pending(self.cache.collection()).await?;
        let mut results = Vec::with_capacity(entries.len());
        // Ids reassigned by an acknowledged create, applied to the entries
        // already loaded for this drain (the persisted ones were rewritten).
        let mut reassigned: HashMap<String, String> = HashMap::new();
        for mut entry in entries {
            if let Some(new_id) = reassigned.get(&entry.entity_id) {
                entry.entity_id = new_id.clone();
            }
            match self.push_entry(&entry).await {
                Ok(result) => {
                    if entry.operation() == SyncOperation::Create
                        && result.succeeded()
                        && result.entity_id != entry.entity_id
                    {
                        reassigned.insert(entry.entity_id.clone(), result.entity_id.clone());
                    }
                    results.push(result);
                }
                Err(error) => {
                    warn!(
                        collection = %self.collection,
                        entity_id = %entry.entity_id,
                        verb = entry.operation().verb(),
                        error = %error,
                        "push entry failed; entry stays queued"
                    );
                    results.push(PushResult {
                        entity_id: entry.entity_id.clone(),
                        operation: entry.operation(),
                        doc: None,
                        error: Some(error),
                    });
                    if self.push_policy == PushPolicy::AbortOnError {
                        break;
                    }
                }
            }
        }
        Ok(results)
    }

    async fn push_entry(&self, entry: &SyncLogEntry) -> SyncResult<PushResult> {
        let entry_id = entry
            .id
            .as_deref()
            .ok_or_else(|| SyncError::payload("sync log entry without a storage id"))?;
        match entry.operation() {
            SyncOperation::Create => {
                let Some(mut doc) = self.cache.find_by_id(&entry.entity_id).await? else {
                    return self.acknowledge_vanished(entry, entry_id).await;
                };
                let local_id = entry.entity_id.clone();
                // The backend assigns the permanent id; the local one and
                // its marker never go over the wire.
                doc.take_id();
                doc.set_local(false);
                let created = self.backend.create(&self.collection, &doc).await?;
                let backend_id = created
                    .id()
                    .ok_or_else(|| SyncError::payload("created document has no _id"))?
                    .to_string();
                self.cache.remove_by_id(&local_id).await?;
                self.cache.save(created.clone()).await?;
                if backend_id != local_id {
                    self.sync_log
                        .reassign_entity_id(self.cache.collection(), &local_id, &backend_id)
                        .await?;
                }
                self.sync_log.remove_entry(entry_id).await?;
                Ok(PushResult {
                    entity_id: backend_id,
                    operation: SyncOperation::Create,
                    doc: Some(created),
                    error: None,
                })
            }
            SyncOperation::Update => {
                let Some(doc) = self.cache.find_by_id(&entry.entity_id).await? else {
                    return self.acknowledge_vanished(entry, entry_id).await;
                };
                let updated = self
                    .backend
                    .update(&self.collection, &entry.entity_id, &doc)
                    .await?;
                // The backend response carries merged metadata.
                self.cache.save(updated.clone()).await?;
                self.sync_log.remove_entry(entry_id).await?;
                Ok(PushResult {
                    entity_id: entry.entity_id.clone(),
                    operation: SyncOperation::Update,
                    doc: Some(updated),
                    error: None,
                })
            }
            SyncOperation::Delete => {
                self.backend.delete(&self.collection, &entry.entity_id).await?;
                self.sync_log.remove_entry(entry_id).await?;
                Ok(PushResult {
                    entity_id: entry.entity_id.clone(),
                    operation: SyncOperation::Delete,
                    doc: None,
                    error: None,
                })
            }
        }
    }

    /// Acknowledges an entry whose document is gone from the cache: there is
    /// nothing left to push.
    async fn acknowledge_vanished(
        &self,
        entry: &SyncLogEntry,
        entry_id: &str,
    ) -> SyncResult<PushResult> {
        debug!(
            collection = %self.collection,
            entity_id = %entry.entity_id,
            "document vanished from cache; dropping its entry"
        );
        self.sync_log.remove_entry(entry_id).await?;
        Ok(PushResult {
            entity_id: entry.entity_id.clone(),
            operation: entry.operation(),
            doc: None,
            error: None,
        })
    }

    /// Pulls remote changes into the cache, returning the number of changed
    /// documents applied.
    ///
    /// Uses a delta fetch when a bookmark exists for the query, a full fetch
    /// otherwise. A backend-rejected `since` token drops the bookmark and
    /// falls back to a full fetch within the same call.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::OutstandingSync`] while local mutations are
    /// unpushed: a pull's id-based upserts could otherwise overwrite state
    /// the backend has never seen.
    pub async fn pull(&self, query: Option<&Query>) -> SyncResult<u64> {
        let pending = self.pending_sync_count().await?;
        if pending > 0 {
            return Err(SyncError::OutstandingSync {
                collection: self.collection.clone(),
                pending,
            });
        }
        let Some(key) = delta_key(query) else {
            // Paginated query: delta caching is bypassed entirely.
            return self.full_fetch(query, None).await;
        };
        let bookmark = self
            .query_cache
            .entry(self.cache.collection(), &key)
            .await?
            .and_then(|e| e.last_request);
        let Some(since) = bookmark else {
            return self.full_fetch(query, Some(&key)).await;
        };

        match self
            .backend
            .fetch_delta(&self.collection, &since, query)
            .await
        {
            Ok((delta, server_time)) => {
                debug!(
                    collection = %self.collection,
                    changed = delta.changed.len(),
                    deleted = delta.deleted.len(),
                    "applying delta set"
                );
                let applied = self.apply_delta(delta).await?;
                self.bookmark(&key, server_time).await?;
                Ok(applied)
            }
            Err(SyncError::StaleDeltaToken) => {
                warn!(
                    collection = %self.collection,
                    "delta token rejected; resetting bookmark and fetching in full"
                );
                self.query_cache.remove(self.cache.collection(), &key).await?;
                self.full_fetch(query, Some(&key)).await
            }
            Err(e) => Err(e),
        }
    }

    /// Pushes, then pulls if the push left the log empty.
    pub async fn sync(&self, query: Option<&Query>) -> SyncResult<SyncSummary> {
        let push = self.push().await?;
        if push.iter().any(|r| !r.succeeded()) {
            return Ok(SyncSummary { push, pulled: None });
        }
        let pulled = self.pull(query).await?;
        Ok(SyncSummary {
            push,
            pulled: Some(pulled),
        })
    }

    /// Clears the collection's cache and discards its sync state.
    ///
    /// Local-only documents and their pending entries are dropped, not
    /// pushed; bookmarks go too, so the next pull fetches in full.
    pub async fn clear_cache(&self) -> SyncResult<u64> {
        let removed = self.cache.clear().await?;
        self.sync_log
            .clear_collection(self.cache.collection())
            .await?;
        self.query_cache
            .clear_collection(self.cache.collection())
            .await?;
        Ok(removed)
    }

    async fn full_fetch(&self, query: Option<&Query>, key: Option<&str>) -> SyncResult<u64> {
        let (delta, server_time) = self.backend.fetch(&self.collection, query).await?;
        let applied = self.apply_delta(delta).await?;
        if let Some(key) = key {
            self.bookmark(key, server_time).await?;
        }
        Ok(applied)
    }

    /// Applies a change set: deletions first, then id-based upserts
    /// (last write wins).
    async fn apply_delta(&self, delta: DeltaSet) -> SyncResult<u64> {
        for id in &delta.deleted {
            self.cache.remove_by_id(id).await?;
        }
        for doc in &delta.changed {
            if doc.id().is_none() {
                return Err(SyncError::payload("changed document without an _id"));
            }
        }
        let applied = delta.changed.len() as u64;
        if !delta.changed.is_empty() {
            self.cache.save_batch(delta.changed).await?;
        }
        Ok(applied)
    }

    /// Persists the delta bookmark from the server-reported time.
    ///
    /// Without a server time there is nothing safe to bookmark (the client
    /// clock is not a substitute); the next pull simply fetches in full
    /// again.
    async fn bookmark(&self, key: &str, server_time: Option<String>) -> SyncResult<()> {
        let Some(time) = server_time else {
            return Ok(());
        };
        let mut entry = QueryCacheEntry::new(self.cache.collection(), key);
        entry.last_request = Some(time);
        self.query_cache.upsert(entry).await?;
        Ok(())
    }
}
