//! Network client contract and mock implementation.
//!
//! The engine is transport-agnostic: any HTTP library (or a loopback for
//! tests) can implement [`NetworkClient`]. Only transport failures are
//! errors; HTTP error statuses come back as ordinary responses and are
//! interpreted by the [`super::Backend`] layer.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Fetch without side effects.
    Get,
    /// Create.
    Post,
    /// Replace.
    Put,
    /// Remove.
    Delete,
}

impl Method {
    /// The method's wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// A request handed to the network client.
#[derive(Debug, Clone)]
pub struct NetworkRequest {
    /// HTTP method.
    pub method: Method,
    /// Fully formed URL, query string included.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
    /// Per-request timeout, forwarded to the transport.
    pub timeout: Option<Duration>,
}

/// A response produced by the network client.
#[derive(Debug, Clone)]
pub struct NetworkResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Parsed JSON body; `Null` for an empty body.
    pub data: Value,
}

impl NetworkResponse {
    /// Creates a JSON response with the given status.
    #[must_use]
    pub fn json(status_code: u16, data: Value) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
            data,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// The transport contract (external collaborator).
///
/// # Errors
///
/// `send` fails only when the transport itself fails (connection refused,
/// timeout, DNS). A response with an error status is still `Ok`.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Sends one request and awaits its response.
    async fn send(&self, request: NetworkRequest) -> SyncResult<NetworkResponse>;
}

enum MockReply {
    Response(NetworkResponse),
    TransportFailure(String),
}

/// A mock network client for tests.
///
/// Replies come from a FIFO of canned responses; every request is recorded
/// for later inspection. Disconnecting makes every send fail with a
/// retryable network error.
#[derive(Default)]
pub struct MockClient {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<NetworkRequest>>,
    connected: AtomicBool,
}

impl MockClient {
    /// Creates a connected mock with an empty reply queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Queues a canned response.
    pub fn enqueue(&self, response: NetworkResponse) {
        self.replies.lock().push_back(MockReply::Response(response));
    }

    /// Queues a transport failure.
    pub fn enqueue_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .push_back(MockReply::TransportFailure(message.into()));
    }

    /// Toggles connectivity.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns the recorded requests, in send order.
    #[must_use]
    pub fn requests(&self) -> Vec<NetworkRequest> {
        self.requests.lock().clone()
    }

    /// Returns how many requests were sent.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl NetworkClient for MockClient {
    async fn send(&self, request: NetworkRequest) -> SyncResult<NetworkResponse> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::network_retryable("mock client is offline"));
        }
        self.requests.lock().push(request);
        match self.replies.lock().pop_front() {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::TransportFailure(message)) => {
                Err(SyncError::network_retryable(message))
            }
            None => Err(SyncError::network_fatal("no mock response queued")),
        }
    }
}
