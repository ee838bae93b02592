//! # TideDB Query
//!
//! Declarative query language for TideDB.
//!
//! This crate provides:
//! - [`Query`] - a tagged, composable query value (filter, projection,
//!   multi-key sort, pagination)
//! - [`evaluate`] - the local evaluator applying the exact semantics the
//!   remote endpoint applies, so cache-only and network-backed reads are
//!   observably consistent
//! - [`to_query_params`] / [`canonical_string`] - the wire serialization and
//!   the canonical form used as a delta-cache key
//! - [`Aggregation`] - a closed set of grouped reductions
//!
//! This is a pure crate with no I/O operations. Structurally invalid input
//! (an empty combinator argument, an empty field name, a malformed regular
//! expression) fails synchronously at construction, never at evaluation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aggregation;
mod error;
mod eval;
mod filter;
mod geo;
mod query;
mod wire;

pub use aggregation::{aggregate_with, Aggregation, AggregationKind};
pub use error::{QueryError, QueryResult};
pub use eval::{evaluate, matches};
pub use filter::{Combinator, Filter, Predicate, RegexFlags};
pub use query::{Query, SortOrder};
pub use wire::{canonical_string, to_query_params};
