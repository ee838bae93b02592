//! Durable queue of pending local mutations.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tidedb_model::Doc;
use tidedb_store::{SerializedStorage, StorageAdapter};
use tracing::{debug, warn};

/// Collection holding the sync log, inside the same namespace as user data.
pub const SYNC_COLLECTION: &str = "_sync";

/// The remote verb a pending local mutation maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOperation {
    /// A local create, pushed as POST.
    #[serde(rename = "POST")]
    Create,
    /// A local update, pushed as PUT.
    #[serde(rename = "PUT")]
    Update,
    /// A local delete, pushed as DELETE.
    #[serde(rename = "DELETE")]
    Delete,
}

impl SyncOperation {
    /// The HTTP verb this operation pushes as.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            SyncOperation::Create => "POST",
            SyncOperation::Update => "PUT",
            SyncOperation::Delete => "DELETE",
        }
    }
}

/// The persisted `state` block of a sync log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryState {
    /// The pending operation.
    pub operation: SyncOperation,
}

/// One pending local mutation.
///
/// An entry exists exactly as long as its mutation is unacknowledged: it is
/// created on every mutating local operation and destroyed only once the
/// backend acknowledges the corresponding push. `sequence` fixes the FIFO
/// drain order; `timestamp` is client epoch milliseconds, for diagnostics
/// only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Storage identifier of the entry itself.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The physical collection the mutation belongs to.
    pub collection: String,
    /// The mutated document's id.
    #[serde(rename = "entityId")]
    pub entity_id: String,
    /// The pending operation.
    pub state: EntryState,
    /// Monotonic enqueue sequence, the FIFO drain key.
    #[serde(rename = "seq")]
    pub sequence: u64,
    /// Client time at enqueue, epoch milliseconds. Diagnostics only.
    pub timestamp: u64,
}

impl SyncLogEntry {
    /// The pending operation.
    #[must_use]
    pub fn operation(&self) -> SyncOperation {
        self.state.operation
    }
}

/// Durable, ordered record of local mutations pending remote
/// acknowledgement.
///
/// Entries persist as ordinary documents through [`SerializedStorage`], so
/// they inherit the same single-writer discipline as user collections. One
/// log serves every collection in its namespace; entries carry their
/// collection name.
pub struct SyncLog {
    storage: SerializedStorage,
    next_sequence: AtomicU64,
}

impl SyncLog {
    /// Opens the log for a namespace, resuming the sequence counter from
    /// persisted entries.
    pub async fn open(
        adapter: Arc<dyn StorageAdapter>,
        namespace: impl Into<String>,
    ) -> SyncResult<Self> {
        let storage = SerializedStorage::new(adapter, namespace, SYNC_COLLECTION);
        let highest = storage
            .find()
            .await?
            .iter()
            .filter_map(entry_of)
            .map(|e| e.sequence)
            .max()
            .unwrap_or(0);
        Ok(Self {
            storage,
            next_sequence: AtomicU64::new(highest + 1),
        })
    }

    /// Appends an entry for a local mutation, returning it with its storage
    /// id assigned.
    pub async fn record(
        &self,
        collection: &str,
        entity_id: &str,
        operation: SyncOperation,
    ) -> SyncResult<SyncLogEntry> {
        let entry = SyncLogEntry {
            id: None,
            collection: collection.to_string(),
            entity_id: entity_id.to_string(),
            state: EntryState { operation },
            sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
            timestamp: now_ms(),
        };
        debug!(
            collection,
            entity_id,
            verb = operation.verb(),
            sequence = entry.sequence,
            "recording pending mutation"
        );
        let doc = to_doc(&entry)?;
        let mut saved = self.storage.save(vec![doc]).await?;
        let saved = saved
            .pop()
            .ok_or_else(|| SyncError::payload("sync log save returned an empty batch"))?;
        entry_of(&saved)
            .ok_or_else(|| SyncError::payload("sync log entry did not round-trip"))
    }

    /// Returns the pending entries for a collection, FIFO by enqueue order.
    pub async fn pending(&self, collection: &str) -> SyncResult<Vec<SyncLogEntry>> {
        let mut entries: Vec<SyncLogEntry> = self
            .storage
            .find()
            .await?
            .iter()
            .filter_map(entry_of)
            .filter(|e| e.collection == collection)
            .collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    /// Returns the number of pending entries for a collection.
    ///
    /// A non-zero count means the cache cannot be trusted as fully synced.
    pub async fn pending_count(&self, collection: &str) -> SyncResult<u64> {
        Ok(self.pending(collection).await?.len() as u64)
    }

    /// Deletes one entry by its storage id (the backend acknowledged it).
    pub async fn remove_entry(&self, entry_id: &str) -> SyncResult<u64> {
        Ok(self.storage.remove_by_id(entry_id).await?)
    }

    /// Deletes every entry for one entity in a collection.
    pub async fn remove_for_entity(
        &self,
        collection: &str,
        entity_id: &str,
    ) -> SyncResult<u64> {
        let mut removed = 0;
        for entry in self.pending(collection).await? {
            if entry.entity_id == entity_id {
                if let Some(id) = &entry.id {
                    removed += self.storage.remove_by_id(id).await?;
                }
            }
        }
        Ok(removed)
    }

    /// Rewrites queued entries for `old_id` to reference `new_id`.
    ///
    /// Called after the backend assigns a permanent id to a locally created
    /// document, so mutations enqueued behind the create still target the
    /// right entity.
    pub async fn reassign_entity_id(
        &self,
        collection: &str,
        old_id: &str,
        new_id: &str,
    ) -> SyncResult<u64> {
        let mut rewritten = 0;
        for mut entry in self.pending(collection).await? {
            if entry.entity_id == old_id {
                entry.entity_id = new_id.to_string();
                self.storage.save(vec![to_doc(&entry)?]).await?;
                rewritten += 1;
            }
        }
        if rewritten > 0 {
            debug!(collection, old_id, new_id, rewritten, "reassigned entity id");
        }
        Ok(rewritten)
    }

    /// Deletes every entry for a collection, returning the removed count.
    pub async fn clear_collection(&self, collection: &str) -> SyncResult<u64> {
        let mut removed = 0;
        for entry in self.pending(collection).await? {
            if let Some(id) = &entry.id {
                removed += self.storage.remove_by_id(id).await?;
            }
        }
        Ok(removed)
    }
}

fn to_doc(entry: &SyncLogEntry) -> SyncResult<Doc> {
    let value = serde_json::to_value(entry)
        .map_err(|e| SyncError::payload(format!("unserializable sync log entry: {e}")))?;
    Doc::from_value(value)
        .ok_or_else(|| SyncError::payload("sync log entry serialized to a non-object"))
}

fn entry_of(doc: &Doc) -> Option<SyncLogEntry> {
    match serde_json::from_value(doc.clone().into_value()) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(error = %e, "skipping malformed sync log entry");
            None
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
