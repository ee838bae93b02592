//! Wire serialization for queries.
//!
//! The same [`Query`] value that drives the local evaluator serializes to
//! the HTTP query parameters the remote endpoint expects, so local and
//! remote evaluation share one representation.

use crate::query::{Query, SortOrder};
use serde_json::Value;

/// Serializes a query to HTTP query parameters.
///
/// Emitted keys: `query` (the JSON filter), `fields` (comma-separated),
/// `sort` (JSON object, key order = sort order), `limit` and `skip`.
/// Unconstrained parts are omitted.
#[must_use]
pub fn to_query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = Vec::new();
    if !query.filter().is_empty() {
        params.push(("query".to_string(), query.filter().to_wire_value().to_string()));
    }
    if !query.projected_fields().is_empty() {
        params.push(("fields".to_string(), query.projected_fields().join(",")));
    }
    if !query.sort_keys().is_empty() {
        params.push(("sort".to_string(), sort_json(query.sort_keys())));
    }
    if let Some(limit) = query.limit_value() {
        params.push(("limit".to_string(), limit.to_string()));
    }
    if query.skip_value() > 0 {
        params.push(("skip".to_string(), query.skip_value().to_string()));
    }
    params
}

/// Renders the sort keys as a JSON object, preserving key order.
///
/// Hand-rendered because serde_json's map orders keys alphabetically, and
/// multi-key sort order is significant on the wire.
fn sort_json(keys: &[(String, SortOrder)]) -> String {
    let parts: Vec<String> = keys
        .iter()
        .map(|(field, order)| format!("{}:{}", Value::String(field.clone()), order.to_wire()))
        .collect();
    format!("{{{}}}", parts.join(","))
}

/// Canonical string form of `{filter, fields, sort}`.
///
/// The empty string denotes the unrestricted query. Object keys inside the
/// filter come out sorted, so two queries with the same clauses added in
/// different order canonicalize identically. Pagination is deliberately
/// excluded: paginated queries never participate in delta caching.
#[must_use]
pub fn canonical_string(query: &Query) -> String {
    if query.is_unrestricted() {
        return String::new();
    }
    let fields = Value::from(query.projected_fields().to_vec());
    format!(
        "{{\"fields\":{},\"filter\":{},\"sort\":{}}}",
        fields,
        query.filter().to_wire_value(),
        sort_json(query.sort_keys())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_parameter_set() {
        let query = Query::new()
            .eq("status", json!("open"))
            .unwrap()
            .greater_than("age", json!(21))
            .unwrap()
            .fields(["name", "age"])
            .descending("age")
            .unwrap()
            .ascending("name")
            .unwrap()
            .limit(10)
            .skip(20);

        let params = to_query_params(&query);
        assert_eq!(
            params,
            vec![
                (
                    "query".to_string(),
                    r#"{"age":{"$gt":21},"status":"open"}"#.to_string()
                ),
                ("fields".to_string(), "name,age".to_string()),
                ("sort".to_string(), r#"{"age":-1,"name":1}"#.to_string()),
                ("limit".to_string(), "10".to_string()),
                ("skip".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn unrestricted_query_has_no_params() {
        assert!(to_query_params(&Query::new()).is_empty());
    }

    #[test]
    fn sort_preserves_key_order() {
        let query = Query::new()
            .descending("z")
            .unwrap()
            .ascending("a")
            .unwrap();
        let params = to_query_params(&query);
        assert_eq!(params[0].1, r#"{"z":-1,"a":1}"#);
    }

    #[test]
    fn canonical_string_of_unrestricted_query_is_empty() {
        assert_eq!(canonical_string(&Query::new()), "");
        // Pagination alone does not change the canonical form's emptiness.
        assert_eq!(canonical_string(&Query::new().limit(5).skip(2)), "");
    }

    #[test]
    fn canonical_string_ignores_clause_insertion_order() {
        let ab = Query::new()
            .eq("a", json!(1))
            .unwrap()
            .eq("b", json!(2))
            .unwrap();
        let ba = Query::new()
            .eq("b", json!(2))
            .unwrap()
            .eq("a", json!(1))
            .unwrap();
        assert_eq!(canonical_string(&ab), canonical_string(&ba));
        assert_ne!(canonical_string(&ab), "");
    }

    #[test]
    fn canonical_string_distinguishes_sort_order() {
        let asc = Query::new().eq("a", json!(1)).unwrap().ascending("n").unwrap();
        let desc = Query::new().eq("a", json!(1)).unwrap().descending("n").unwrap();
        assert_ne!(canonical_string(&asc), canonical_string(&desc));
    }

    #[test]
    fn regex_wire_form() {
        let query = Query::new()
            .matches_regex("name", "^a", crate::RegexFlags::from_options("im"))
            .unwrap();
        let params = to_query_params(&query);
        assert_eq!(params[0].0, "query");
        let filter: serde_json::Value = serde_json::from_str(&params[0].1).unwrap();
        assert_eq!(filter, json!({"name": {"$options": "im", "$regex": "^a"}}));
    }
}
