//! # TideDB Sync
//!
//! Offline-first synchronization engine for TideDB.
//!
//! This crate provides:
//! - [`NetworkClient`] - the transport-agnostic network contract, plus
//!   [`MockClient`] for tests
//! - [`Backend`] - the typed remote endpoint wrapper (URLs, JSON bodies,
//!   delta-set endpoint, server-time header)
//! - [`SyncLog`] - the durable FIFO queue of pending local mutations
//! - [`QueryCache`] - per-query delta bookmarks
//! - [`DataStore`] - the orchestrator composing cache, log and backend into
//!   push / pull / sync
//!
//! ## Architecture
//!
//! The engine implements a **push-then-pull** synchronization model:
//! 1. Push pending local mutations (the backend must see local edits before
//!    a pull may overwrite them)
//! 2. Pull remote changes, incrementally via delta sets where possible
//! 3. Reconcile the local cache by id-based upsert (last write wins)
//!
//! ## Key Invariants
//!
//! - Per-entity mutation order is preserved exactly as enqueued
//! - At most one push request is in flight at a time
//! - A sync log entry exists exactly as long as its mutation is
//!   unacknowledged
//! - Delta bookmarks carry server-reported time, never the client clock
//! - A pull never runs while sync entries are outstanding

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod error;
mod network;
mod query_cache;
mod store;
mod synclog;

pub use backend::{Backend, DeltaSet, SERVER_TIME_HEADER};
pub use config::{PushPolicy, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use network::{Method, MockClient, NetworkClient, NetworkRequest, NetworkResponse};
pub use query_cache::{delta_key, QueryCache, QueryCacheEntry, QUERY_CACHE_COLLECTION};
pub use store::{DataStore, NetworkRead, PushResult, SyncSummary};
pub use synclog::{EntryState, SyncLog, SyncLogEntry, SyncOperation, SYNC_COLLECTION};
