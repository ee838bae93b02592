//! Error types for the synchronization engine.

use thiserror::Error;
use tidedb_query::QueryError;
use tidedb_store::StoreError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The transport failed before a response was produced.
    #[error("network error: {message}")]
    Network {
        /// What went wrong.
        message: String,
        /// Whether the request can be retried.
        retryable: bool,
    },

    /// The backend answered with a non-success status.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Backend error code, if the body carried one.
        code: Option<String>,
        /// Human-readable description.
        message: String,
    },

    /// The backend rejected the delta `since` token as stale or invalid.
    ///
    /// The reconciler reacts by dropping the query-cache entry and falling
    /// back to a full fetch; this error only escapes when that fallback
    /// itself fails.
    #[error("delta token rejected by the backend")]
    StaleDeltaToken,

    /// A pull was attempted while local mutations are still unpushed.
    #[error(
        "{pending} sync entries outstanding for collection {collection:?}; push before pulling"
    )]
    OutstandingSync {
        /// The collection with pending entries.
        collection: String,
        /// How many entries are pending.
        pending: u64,
    },

    /// The backend's payload did not have the promised shape.
    #[error("malformed backend payload: {message}")]
    Payload {
        /// What was wrong with the payload.
        message: String,
    },

    /// Local persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Query construction failed.
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl SyncError {
    /// Creates a retryable network error.
    pub fn network_retryable(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable network error.
    pub fn network_fatal(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a payload error.
    pub fn payload(message: impl Into<String>) -> Self {
        Self::Payload {
            message: message.into(),
        }
    }

    /// Returns true if retrying the operation could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { retryable, .. } => *retryable,
            SyncError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::network_retryable("connection reset").is_retryable());
        assert!(!SyncError::network_fatal("bad certificate").is_retryable());
        assert!(SyncError::Server {
            status: 503,
            code: None,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!SyncError::Server {
            status: 400,
            code: None,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!SyncError::StaleDeltaToken.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::OutstandingSync {
            collection: "books".into(),
            pending: 3,
        };
        assert!(err.to_string().contains("books"));
        assert!(err.to_string().contains('3'));
    }
}
