//! # TideDB Model
//!
//! Document model and identifier generation for TideDB.
//!
//! This crate provides:
//! - [`Doc`] - a schemaless JSON document with typed accessors for the
//!   reserved `_id`, `_acl` and `_kmd` fields
//! - [`Metadata`] - the `_kmd` metadata block
//! - [`local_id`] - locally generated document identifiers
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod doc;
mod id;

pub use doc::{Doc, Metadata, ACL_FIELD, ID_FIELD, METADATA_FIELD};
pub use id::{is_local_id_format, local_id, LOCAL_ID_LEN};
