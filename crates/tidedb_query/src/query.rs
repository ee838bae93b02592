//! The tagged query type and its fluent builders.

use crate::error::{QueryError, QueryResult};
use crate::filter::{Combinator, Filter, Predicate, RegexFlags};
use serde_json::Value;

/// Sort direction for one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortOrder {
    /// The wire encoding: `1` ascending, `-1` descending.
    #[must_use]
    pub fn to_wire(self) -> i64 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// A declarative query: filter, projection, multi-key sort and pagination.
///
/// `Query` is an explicit tagged type; nothing in TideDB decides "is this a
/// query" by inspecting shape at runtime. The same value drives the local
/// evaluator and the wire serialization, so cache-only and network-backed
/// reads agree.
///
/// Builders consume and return the query, so constraints chain:
///
/// ```
/// use tidedb_query::Query;
/// use serde_json::json;
///
/// let query = Query::new()
///     .greater_than_or_equal("age", json!(18))?
///     .ascending("name")?
///     .limit(10);
/// # Ok::<(), tidedb_query::QueryError>(())
/// ```
///
/// Structurally invalid input fails synchronously at the builder, never at
/// evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    filter: Filter,
    fields: Vec<String>,
    sort: Vec<(String, SortOrder)>,
    limit: Option<u64>,
    skip: u64,
}

fn checked_field(field: &str) -> QueryResult<&str> {
    if field.is_empty() {
        return Err(QueryError::InvalidField {
            reason: "field name is empty".into(),
        });
    }
    Ok(field)
}

impl Query {
    /// Creates an unrestricted query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field` to equal `value` (or, for array fields, contain it).
    pub fn eq(mut self, field: &str, value: Value) -> QueryResult<Self> {
        self.filter.add(checked_field(field)?, Predicate::Eq(value));
        Ok(self)
    }

    /// Requires `field` to differ from `value`. A missing field matches.
    pub fn ne(mut self, field: &str, value: Value) -> QueryResult<Self> {
        self.filter.add(checked_field(field)?, Predicate::Ne(value));
        Ok(self)
    }

    /// Requires `field` to be one of `values`.
    pub fn contained_in(mut self, field: &str, values: Vec<Value>) -> QueryResult<Self> {
        self.filter.add(checked_field(field)?, Predicate::In(values));
        Ok(self)
    }

    /// Requires `field` to be none of `values`. A missing field matches.
    pub fn not_contained_in(mut self, field: &str, values: Vec<Value>) -> QueryResult<Self> {
        self.filter
            .add(checked_field(field)?, Predicate::NotIn(values));
        Ok(self)
    }

    /// Requires the array at `field` to contain every one of `values`.
    pub fn contains_all(mut self, field: &str, values: Vec<Value>) -> QueryResult<Self> {
        self.filter.add(checked_field(field)?, Predicate::All(values));
        Ok(self)
    }

    /// Requires `field` to be strictly greater than `value`.
    pub fn greater_than(mut self, field: &str, value: Value) -> QueryResult<Self> {
        self.filter.add(checked_field(field)?, Predicate::Gt(value));
        Ok(self)
    }

    /// Requires `field` to be greater than or equal to `value`.
    pub fn greater_than_or_equal(mut self, field: &str, value: Value) -> QueryResult<Self> {
        self.filter.add(checked_field(field)?, Predicate::Gte(value));
        Ok(self)
    }

    /// Requires `field` to be strictly less than `value`.
    pub fn less_than(mut self, field: &str, value: Value) -> QueryResult<Self> {
        self.filter.add(checked_field(field)?, Predicate::Lt(value));
        Ok(self)
    }

    /// Requires `field` to be less than or equal to `value`.
    pub fn less_than_or_equal(mut self, field: &str, value: Value) -> QueryResult<Self> {
        self.filter.add(checked_field(field)?, Predicate::Lte(value));
        Ok(self)
    }

    /// Requires `field` to be present (`true`) or absent (`false`).
    pub fn exists(mut self, field: &str, exists: bool) -> QueryResult<Self> {
        self.filter
            .add(checked_field(field)?, Predicate::Exists(exists));
        Ok(self)
    }

    /// Requires `field % divisor == remainder` for integral values.
    pub fn modulo(mut self, field: &str, divisor: i64, remainder: i64) -> QueryResult<Self> {
        if divisor == 0 {
            return Err(QueryError::ZeroDivisor);
        }
        self.filter
            .add(checked_field(field)?, Predicate::Mod { divisor, remainder });
        Ok(self)
    }

    /// Requires string values at `field` to match `pattern`.
    ///
    /// The pattern is compiled here so a malformed expression fails at
    /// construction; `flags` maps to the `i`/`m`/`x`/`s` options on the wire.
    pub fn matches_regex(
        mut self,
        field: &str,
        pattern: &str,
        flags: RegexFlags,
    ) -> QueryResult<Self> {
        checked_field(field)?;
        regex::Regex::new(&format!("{}{}", flags.inline_prefix(), pattern)).map_err(|e| {
            QueryError::InvalidRegex {
                pattern: pattern.to_string(),
                message: e.to_string(),
            }
        })?;
        self.filter.add(
            field,
            Predicate::Regex {
                pattern: pattern.to_string(),
                flags,
            },
        );
        Ok(self)
    }

    /// Requires `field` (a `[longitude, latitude]` pair) to lie within
    /// `max_distance_km` of `center`, nearest unbounded if `None`.
    pub fn near(
        mut self,
        field: &str,
        center: [f64; 2],
        max_distance_km: Option<f64>,
    ) -> QueryResult<Self> {
        self.filter.add(
            checked_field(field)?,
            Predicate::Near {
                center,
                max_distance_km,
            },
        );
        Ok(self)
    }

    /// Requires `field` to lie within the axis-aligned box spanned by
    /// `bottom_left` and `upper_right`.
    pub fn within_box(
        mut self,
        field: &str,
        bottom_left: [f64; 2],
        upper_right: [f64; 2],
    ) -> QueryResult<Self> {
        self.filter.add(
            checked_field(field)?,
            Predicate::WithinBox {
                bottom_left,
                upper_right,
            },
        );
        Ok(self)
    }

    /// Requires `field` to lie within the polygon given by `vertices`.
    pub fn within_polygon(mut self, field: &str, vertices: Vec<[f64; 2]>) -> QueryResult<Self> {
        if vertices.len() < 3 {
            return Err(QueryError::InvalidPolygon {
                vertices: vertices.len(),
            });
        }
        self.filter
            .add(checked_field(field)?, Predicate::WithinPolygon { vertices });
        Ok(self)
    }

    /// Requires the array at `field` to have exactly `size` elements.
    pub fn size(mut self, field: &str, size: usize) -> QueryResult<Self> {
        self.filter.add(checked_field(field)?, Predicate::Size(size));
        Ok(self)
    }

    /// Composes `queries` as a conjunction alongside this query's own filter.
    ///
    /// An empty argument is a construction error.
    pub fn and(self, queries: Vec<Query>) -> QueryResult<Self> {
        self.compose(Combinator::And, queries)
    }

    /// Composes `queries` as a disjunction alongside this query's own filter.
    pub fn or(self, queries: Vec<Query>) -> QueryResult<Self> {
        self.compose(Combinator::Or, queries)
    }

    /// Composes `queries` as a negated disjunction alongside this query's
    /// own filter.
    pub fn nor(self, queries: Vec<Query>) -> QueryResult<Self> {
        self.compose(Combinator::Nor, queries)
    }

    fn compose(mut self, combinator: Combinator, queries: Vec<Query>) -> QueryResult<Self> {
        if queries.is_empty() {
            return Err(QueryError::EmptyCombinator {
                combinator: match combinator {
                    Combinator::And => "and",
                    Combinator::Or => "or",
                    Combinator::Nor => "nor",
                },
            });
        }
        let filters = queries.into_iter().map(|q| q.filter).collect();
        self.filter.compose(combinator, filters);
        Ok(self)
    }

    /// Restricts returned documents to the named fields.
    ///
    /// `_id`, `_acl` and `_kmd` are always retained.
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Appends an ascending sort key.
    pub fn ascending(mut self, field: &str) -> QueryResult<Self> {
        self.sort
            .push((checked_field(field)?.to_string(), SortOrder::Ascending));
        Ok(self)
    }

    /// Appends a descending sort key.
    pub fn descending(mut self, field: &str) -> QueryResult<Self> {
        self.sort
            .push((checked_field(field)?.to_string(), SortOrder::Descending));
        Ok(self)
    }

    /// Returns at most `limit` documents.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `skip` documents after sorting.
    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// The filter part of the query.
    #[must_use]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// The projection field list.
    #[must_use]
    pub fn projected_fields(&self) -> &[String] {
        &self.fields
    }

    /// The sort keys, in application order.
    #[must_use]
    pub fn sort_keys(&self) -> &[(String, SortOrder)] {
        &self.sort
    }

    /// The result limit, if bounded.
    #[must_use]
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// The number of documents skipped after sorting.
    #[must_use]
    pub fn skip_value(&self) -> u64 {
        self.skip
    }

    /// True if the query constrains nothing: no filter, projection or sort.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.filter.is_empty() && self.fields.is_empty() && self.sort.is_empty()
    }

    /// True if the query pages its results (`skip > 0` or a bounded limit).
    ///
    /// Paginated queries see only a window of the collection, so they are
    /// never usable as delta-fetch bookmarks.
    #[must_use]
    pub fn is_paginated(&self) -> bool {
        self.skip > 0 || self.limit.is_some()
    }
}
