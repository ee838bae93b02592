//! # TideDB Store
//!
//! Local persistence for TideDB.
//!
//! This crate provides:
//! - [`StorageAdapter`] - the async capability contract physical adapters
//!   implement (file-based, embedded SQL, browser key-value, ...)
//! - [`MemoryAdapter`] - an in-memory adapter for tests and ephemeral use
//! - [`SerializedStorage`] - one adapter binding behind a per-instance FIFO
//!   operation queue of concurrency 1, the unit of atomicity
//! - [`LocalCache`] - collection-scoped CRUD with query-aware reads and
//!   optional tag namespacing
//!
//! ## Design Principles
//!
//! - Adapters are opaque document stores keyed by (namespace, collection,
//!   id); they do not interpret documents beyond reading `_id`
//! - The serialization queue exists because an adapter may not be atomic
//!   across a compound read-modify-write
//! - Everything here is network-oblivious; network errors are never
//!   translated at this layer

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod cache;
mod error;
mod memory;
mod serialized;

pub use adapter::StorageAdapter;
pub use cache::LocalCache;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryAdapter;
pub use serialized::{QueueHandle, SerializedStorage};
