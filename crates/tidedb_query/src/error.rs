//! Error types for query construction.

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while building a query.
///
/// All variants are raised synchronously at construction; evaluation of a
/// successfully built query is infallible.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A boolean combinator was given no sub-queries.
    #[error("{combinator} requires at least one sub-query")]
    EmptyCombinator {
        /// The combinator that was misused.
        combinator: &'static str,
    },

    /// A field name was empty or otherwise unusable.
    #[error("invalid field name: {reason}")]
    InvalidField {
        /// Why the field name was rejected.
        reason: String,
    },

    /// A regular expression failed to compile.
    #[error("invalid regular expression {pattern:?}: {message}")]
    InvalidRegex {
        /// The offending pattern.
        pattern: String,
        /// The compiler's message.
        message: String,
    },

    /// A polygon was given fewer than three vertices.
    #[error("polygon requires at least three vertices, got {vertices}")]
    InvalidPolygon {
        /// Number of vertices supplied.
        vertices: usize,
    },

    /// A modulo predicate was given a zero divisor.
    #[error("modulo divisor must be non-zero")]
    ZeroDivisor,
}
