//! Configuration for the synchronization engine.

use std::time::Duration;

/// What push does when an entry fails against the backend.
///
/// Failures are always reported per entity either way; the policy only
/// decides whether the remaining queue is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushPolicy {
    /// Keep draining the remaining entries best-effort (the default: one
    /// poison entity must not wedge every other entity's queue).
    #[default]
    Continue,
    /// Stop at the first failure, leaving the remainder queued.
    AbortOnError,
}

/// Configuration for a syncing data store.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the backend, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Storage and remote namespace the store operates in.
    pub namespace: String,
    /// Headers attached to every request (authorization, client id, ...).
    pub headers: Vec<(String, String)>,
    /// Per-request timeout forwarded to the network client.
    pub timeout: Option<Duration>,
    /// Push failure policy.
    pub push_policy: PushPolicy,
}

impl SyncConfig {
    /// Creates a configuration for `base_url` and `namespace`.
    pub fn new(base_url: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            namespace: namespace.into(),
            headers: Vec::new(),
            timeout: Some(Duration::from_secs(30)),
            push_policy: PushPolicy::default(),
        }
    }

    /// Adds a default header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the push failure policy.
    #[must_use]
    pub fn with_push_policy(mut self, policy: PushPolicy) -> Self {
        self.push_policy = policy;
        self
    }
}
