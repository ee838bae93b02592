//! Schemaless JSON documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved field holding a document's unique identifier.
pub const ID_FIELD: &str = "_id";
/// Reserved field holding a document's access-control blob.
pub const ACL_FIELD: &str = "_acl";
/// Reserved field holding a document's metadata block.
pub const METADATA_FIELD: &str = "_kmd";

/// A single schemaless JSON document.
///
/// `Doc` wraps a JSON object and preserves arbitrary user fields verbatim.
/// The reserved fields `_id`, `_acl` and `_kmd` get typed accessors; the
/// `_acl` blob is opaque and carried unmodified.
///
/// # Invariants
///
/// - `_id` is unique within its (namespace, collection[, tag]) scope
/// - A missing `_id` is only legal before the first local save
/// - `_kmd.local == true` marks a document never confirmed by the backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Doc(Map<String, Value>);

impl Doc {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Creates a document from a JSON object map.
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Creates a document from a JSON value.
    ///
    /// Returns `None` if the value is not an object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Consumes the document, returning it as a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Returns the underlying JSON object map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns the underlying JSON object map mutably.
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Returns the document identifier, if assigned.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Sets the document identifier.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.into(), Value::String(id.into()));
    }

    /// Removes and returns the document identifier.
    pub fn take_id(&mut self) -> Option<String> {
        match self.0.remove(ID_FIELD) {
            Some(Value::String(id)) => Some(id),
            _ => None,
        }
    }

    /// Returns the access-control blob, if present.
    #[must_use]
    pub fn acl(&self) -> Option<&Value> {
        self.0.get(ACL_FIELD)
    }

    /// Returns the metadata block, if present and well-formed.
    #[must_use]
    pub fn metadata(&self) -> Option<Metadata> {
        self.0
            .get(METADATA_FIELD)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Replaces the metadata block.
    pub fn set_metadata(&mut self, metadata: &Metadata) {
        // Metadata serialization cannot fail: every field is a JSON scalar.
        let value = serde_json::to_value(metadata).unwrap_or(Value::Null);
        self.0.insert(METADATA_FIELD.into(), value);
    }

    /// Returns true if the document was created locally and never confirmed
    /// by the backend.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0
            .get(METADATA_FIELD)
            .and_then(|kmd| kmd.get("local"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Sets or clears the local marker in the metadata block.
    ///
    /// Clearing removes the `local` key rather than writing `false`, so a
    /// backend-confirmed document carries no trace of the marker.
    pub fn set_local(&mut self, local: bool) {
        if local {
            let kmd = self
                .0
                .entry(METADATA_FIELD.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(map) = kmd {
                map.insert("local".into(), Value::Bool(true));
            }
        } else if let Some(Value::Object(map)) = self.0.get_mut(METADATA_FIELD) {
            map.remove("local");
        }
    }

    /// Looks up a value by dot-separated path, traversing nested objects.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Inserts a field, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Doc {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Doc> for Value {
    fn from(doc: Doc) -> Self {
        doc.into_value()
    }
}

/// The `_kmd` metadata block of a document.
///
/// `ect` and `lmt` are backend-reported creation and modification times,
/// carried verbatim. Unknown keys survive a round trip through `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Entity creation time, as reported by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ect: Option<String>,
    /// Last modification time, as reported by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lmt: Option<String>,
    /// Marks a document created locally and never confirmed by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<bool>,
    /// Authentication token associated with the document, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authtoken: Option<String>,
    /// Any further metadata keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
