//! Error types for the local persistence layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the local persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid construction-time configuration (tag, collection name).
    #[error("configuration error: {message}")]
    Configuration {
        /// Why the configuration was rejected.
        message: String,
    },

    /// A document was not found where one was required.
    #[error("document {id:?} not found in collection {collection:?}")]
    NotFound {
        /// The collection searched.
        collection: String,
        /// The identifier that was not found.
        id: String,
    },

    /// A document matched for removal carries no identifier.
    ///
    /// Persisted documents always have ids; hitting this means the adapter
    /// returned a document it could never have stored.
    #[error("document matched for removal has no _id in collection {collection:?}")]
    MissingId {
        /// The collection the document came from.
        collection: String,
    },

    /// The underlying adapter failed; the source error is carried unchanged.
    #[error("adapter error: {0}")]
    Adapter(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Query construction failed.
    #[error(transparent)]
    Query(#[from] tidedb_query::QueryError),
}

impl StoreError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wraps an adapter's own error.
    pub fn adapter(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Adapter(Box::new(source))
    }

    /// Creates an adapter error from a bare message.
    pub fn adapter_message(message: impl Into<String>) -> Self {
        Self::Adapter(message.into().into())
    }
}
