//! Local query evaluation.
//!
//! Applies the same semantics the remote endpoint applies: filter, then
//! stable multi-key sort, then pagination, with projection on the surviving
//! documents. Evaluation of a constructed query is infallible.

use crate::filter::{Combinator, Filter, Predicate};
use crate::geo;
use crate::query::{Query, SortOrder};
use std::cmp::Ordering;
use tidedb_model::{Doc, ACL_FIELD, ID_FIELD, METADATA_FIELD};

use serde_json::Value;

/// Evaluates `query` against an in-memory document set.
///
/// Filtering happens first, then the stable multi-key sort, then `skip` and
/// `limit`, then projection. Result order is deterministic given stable
/// input order and sort keys.
#[must_use]
pub fn evaluate(docs: Vec<Doc>, query: &Query) -> Vec<Doc> {
    let mut matched: Vec<Doc> = docs
        .into_iter()
        .filter(|doc| matches(doc, query.filter()))
        .collect();

    sort_docs(&mut matched, query.sort_keys());

    let skip = usize::try_from(query.skip_value()).unwrap_or(usize::MAX);
    let limit = query
        .limit_value()
        .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);

    let mut out: Vec<Doc> = matched.into_iter().skip(skip).take(limit).collect();

    if !query.projected_fields().is_empty() {
        for doc in &mut out {
            project(doc, query.projected_fields());
        }
    }
    out
}

/// Returns true if `doc` satisfies `filter`.
///
/// Top-level field clauses are implicitly AND-ed; composed combinators apply
/// conjunction (`and`), disjunction (`or`) or negated disjunction (`nor`) on
/// top.
#[must_use]
pub fn matches(doc: &Doc, filter: &Filter) -> bool {
    filter.clauses.iter().all(|(field, predicates)| {
        let value = doc.get(field);
        predicates.iter().all(|p| matches_predicate(value, p))
    }) && filter.composed.iter().all(|(combinator, subs)| match combinator {
        Combinator::And => subs.iter().all(|f| matches(doc, f)),
        Combinator::Or => subs.iter().any(|f| matches(doc, f)),
        Combinator::Nor => !subs.iter().any(|f| matches(doc, f)),
    })
}

fn matches_predicate(value: Option<&Value>, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Exists(want) => value.is_some() == *want,
        // Negated predicates match missing fields.
        Predicate::Ne(target) => !value.map(|v| eq_value(v, target)).unwrap_or(false),
        Predicate::NotIn(targets) => !value.map(|v| in_value(v, targets)).unwrap_or(false),
        _ => {
            let Some(v) = value else { return false };
            match predicate {
                Predicate::Eq(target) => eq_value(v, target),
                Predicate::In(targets) => in_value(v, targets),
                Predicate::All(targets) => all_value(v, targets),
                Predicate::Gt(target) => cmp_value(v, target, Ordering::is_gt),
                Predicate::Gte(target) => cmp_value(v, target, Ordering::is_ge),
                Predicate::Lt(target) => cmp_value(v, target, Ordering::is_lt),
                Predicate::Lte(target) => cmp_value(v, target, Ordering::is_le),
                Predicate::Mod { divisor, remainder } => {
                    fanout(v, |e| mod_value(e, *divisor, *remainder))
                }
                Predicate::Regex { pattern, flags } => {
                    let full = format!("{}{}", flags.inline_prefix(), pattern);
                    match regex::Regex::new(&full) {
                        Ok(re) => fanout(v, |e| e.as_str().map(|s| re.is_match(s)).unwrap_or(false)),
                        // Unreachable for queries built through the public
                        // constructors, which compile the pattern eagerly.
                        Err(_) => false,
                    }
                }
                Predicate::Near {
                    center,
                    max_distance_km,
                } => geo::point_from_value(v)
                    .map(|p| match max_distance_km {
                        Some(max) => geo::haversine_km(p, *center) <= *max,
                        None => true,
                    })
                    .unwrap_or(false),
                Predicate::WithinBox {
                    bottom_left,
                    upper_right,
                } => geo::point_from_value(v)
                    .map(|p| geo::point_in_box(p, *bottom_left, *upper_right))
                    .unwrap_or(false),
                Predicate::WithinPolygon { vertices } => geo::point_from_value(v)
                    .map(|p| geo::point_in_polygon(p, vertices))
                    .unwrap_or(false),
                Predicate::Size(n) => v.as_array().map(|a| a.len() == *n).unwrap_or(false),
                Predicate::Exists(_) | Predicate::Ne(_) | Predicate::NotIn(_) => unreachable!(),
            }
        }
    }
}

/// Applies `f` to the value directly, or to each element of an array value.
fn fanout(value: &Value, f: impl Fn(&Value) -> bool) -> bool {
    f(value)
        || value
            .as_array()
            .map(|a| a.iter().any(|e| f(e)))
            .unwrap_or(false)
}

/// Equality: deep equality, or containment for array values.
fn eq_value(value: &Value, target: &Value) -> bool {
    value == target
        || value
            .as_array()
            .map(|a| a.contains(target))
            .unwrap_or(false)
}

fn in_value(value: &Value, targets: &[Value]) -> bool {
    targets.iter().any(|t| eq_value(value, t))
}

fn all_value(value: &Value, targets: &[Value]) -> bool {
    match value.as_array() {
        Some(array) => targets.iter().all(|t| array.contains(t)),
        // A scalar satisfies contains-all only for a single equal operand.
        None => matches!(targets, [single] if single == value),
    }
}

fn cmp_value(value: &Value, target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    fanout(value, |e| {
        compare_values(e, target).map(&accept).unwrap_or(false)
    })
}

/// Same-type comparison: numbers by value, strings lexicographically.
/// Mixed or non-comparable types never compare.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn mod_value(value: &Value, divisor: i64, remainder: i64) -> bool {
    value
        .as_f64()
        .map(|n| (n.trunc() as i64) % divisor == remainder)
        .unwrap_or(false)
}

/// Stable multi-key sort. Cross-type ordering: missing/null < bool < number
/// < string; arrays and objects tie within their rank and keep input order.
pub(crate) fn sort_docs(docs: &mut [Doc], keys: &[(String, SortOrder)]) {
    if keys.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (field, order) in keys {
            let ordering = compare_for_sort(a.get(field), b.get(field));
            if ordering != Ordering::Equal {
                return match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                };
            }
        }
        Ordering::Equal
    });
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn project(doc: &mut Doc, fields: &[String]) {
    doc.as_map_mut().retain(|key, _| {
        key == ID_FIELD
            || key == ACL_FIELD
            || key == METADATA_FIELD
            || fields.iter().any(|f| f == key)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Doc {
        Doc::from_value(value).unwrap()
    }

    fn docs(values: Vec<serde_json::Value>) -> Vec<Doc> {
        values.into_iter().map(doc).collect()
    }

    fn names(result: &[Doc]) -> Vec<&str> {
        result
            .iter()
            .map(|d| d.get("name").and_then(Value::as_str).unwrap())
            .collect()
    }

    #[test]
    fn equality_and_implicit_and() {
        let set = docs(vec![
            json!({"name": "a", "age": 30, "city": "x"}),
            json!({"name": "b", "age": 30, "city": "y"}),
            json!({"name": "c", "age": 40, "city": "x"}),
        ]);
        let q = Query::new()
            .eq("age", json!(30))
            .unwrap()
            .eq("city", json!("x"))
            .unwrap();
        assert_eq!(names(&evaluate(set, &q)), vec!["a"]);
    }

    #[test]
    fn equality_matches_array_containment() {
        let set = docs(vec![
            json!({"name": "a", "tags": ["red", "blue"]}),
            json!({"name": "b", "tags": ["green"]}),
        ]);
        let q = Query::new().eq("tags", json!("blue")).unwrap();
        assert_eq!(names(&evaluate(set, &q)), vec!["a"]);
    }

    #[test]
    fn not_equal_matches_missing_fields() {
        let set = docs(vec![
            json!({"name": "a", "status": "open"}),
            json!({"name": "b", "status": "closed"}),
            json!({"name": "c"}),
        ]);
        let q = Query::new().ne("status", json!("open")).unwrap();
        assert_eq!(names(&evaluate(set, &q)), vec!["b", "c"]);
    }

    #[test]
    fn containment_operators() {
        let set = docs(vec![
            json!({"name": "a", "n": 1}),
            json!({"name": "b", "n": 2}),
            json!({"name": "c", "n": 3}),
        ]);
        let q = Query::new()
            .contained_in("n", vec![json!(1), json!(3)])
            .unwrap();
        assert_eq!(names(&evaluate(set.clone(), &q)), vec!["a", "c"]);

        let q = Query::new()
            .not_contained_in("n", vec![json!(1), json!(3)])
            .unwrap();
        assert_eq!(names(&evaluate(set, &q)), vec!["b"]);
    }

    #[test]
    fn contains_all() {
        let set = docs(vec![
            json!({"name": "a", "tags": ["x", "y", "z"]}),
            json!({"name": "b", "tags": ["x"]}),
            json!({"name": "c", "tags": "x"}),
        ]);
        let q = Query::new()
            .contains_all("tags", vec![json!("x"), json!("y")])
            .unwrap();
        assert_eq!(names(&evaluate(set.clone(), &q)), vec!["a"]);

        // A scalar satisfies a single-element contains-all.
        let q = Query::new().contains_all("tags", vec![json!("x")]).unwrap();
        assert_eq!(names(&evaluate(set, &q)), vec!["a", "b", "c"]);
    }

    #[test]
    fn range_operators_on_numbers_and_strings() {
        let set = docs(vec![
            json!({"name": "a", "age": 10}),
            json!({"name": "b", "age": 20}),
            json!({"name": "c", "age": 30}),
            json!({"name": "d", "age": "old"}),
        ]);
        let q = Query::new().greater_than("age", json!(10)).unwrap();
        assert_eq!(names(&evaluate(set.clone(), &q)), vec!["b", "c"]);

        let q = Query::new()
            .greater_than_or_equal("age", json!(20))
            .unwrap()
            .less_than("age", json!(30))
            .unwrap();
        assert_eq!(names(&evaluate(set.clone(), &q)), vec!["b"]);

        let q = Query::new().less_than_or_equal("name", json!("b")).unwrap();
        assert_eq!(names(&evaluate(set, &q)), vec!["a", "b"]);
    }

    #[test]
    fn mixed_type_comparison_never_matches() {
        let set = docs(vec![json!({"name": "a", "age": "30"})]);
        let q = Query::new().greater_than("age", json!(10)).unwrap();
        assert!(evaluate(set, &q).is_empty());
    }

    #[test]
    fn exists_operator() {
        let set = docs(vec![
            json!({"name": "a", "nick": "aa"}),
            json!({"name": "b", "nick": null}),
            json!({"name": "c"}),
        ]);
        let q = Query::new().exists("nick", true).unwrap();
        // An explicit null is still present.
        assert_eq!(names(&evaluate(set.clone(), &q)), vec!["a", "b"]);

        let q = Query::new().exists("nick", false).unwrap();
        assert_eq!(names(&evaluate(set, &q)), vec!["c"]);
    }

    #[test]
    fn modulo_operator() {
        let set = docs(vec![
            json!({"name": "a", "n": 4}),
            json!({"name": "b", "n": 5}),
            json!({"name": "c", "n": 6}),
        ]);
        let q = Query::new().modulo("n", 2, 0).unwrap();
        assert_eq!(names(&evaluate(set, &q)), vec!["a", "c"]);
    }

    #[test]
    fn regex_operator_with_flags() {
        let set = docs(vec![
            json!({"name": "Alpha"}),
            json!({"name": "beta"}),
            json!({"name": "ALBATROSS"}),
        ]);
        let q = Query::new()
            .matches_regex("name", "^al", crate::RegexFlags::from_options("i"))
            .unwrap();
        assert_eq!(names(&evaluate(set.clone(), &q)), vec!["Alpha", "ALBATROSS"]);

        let q = Query::new()
            .matches_regex("name", "^al", crate::RegexFlags::default())
            .unwrap();
        assert!(evaluate(set, &q).is_empty());
    }

    #[test]
    fn geo_operators() {
        let set = docs(vec![
            json!({"name": "paris", "loc": [2.3522, 48.8566]}),
            json!({"name": "london", "loc": [-0.1278, 51.5074]}),
            json!({"name": "tokyo", "loc": [139.6917, 35.6895]}),
        ]);
        let q = Query::new()
            .near("loc", [2.0, 48.0], Some(500.0))
            .unwrap();
        assert_eq!(names(&evaluate(set.clone(), &q)), vec!["paris", "london"]);

        let q = Query::new()
            .within_box("loc", [-1.0, 48.0], [3.0, 52.0])
            .unwrap();
        assert_eq!(names(&evaluate(set.clone(), &q)), vec!["paris", "london"]);

        let q = Query::new()
            .within_polygon("loc", vec![[0.0, 47.0], [5.0, 47.0], [2.5, 50.0]])
            .unwrap();
        assert_eq!(names(&evaluate(set, &q)), vec!["paris"]);
    }

    #[test]
    fn size_operator() {
        let set = docs(vec![
            json!({"name": "a", "tags": ["x", "y"]}),
            json!({"name": "b", "tags": ["x"]}),
            json!({"name": "c", "tags": "x"}),
        ]);
        let q = Query::new().size("tags", 2).unwrap();
        assert_eq!(names(&evaluate(set, &q)), vec!["a"]);
    }

    #[test]
    fn combinators() {
        let set = docs(vec![
            json!({"name": "a", "n": 1}),
            json!({"name": "b", "n": 2}),
            json!({"name": "c", "n": 3}),
        ]);

        let or = Query::new()
            .or(vec![
                Query::new().eq("n", json!(1)).unwrap(),
                Query::new().eq("n", json!(3)).unwrap(),
            ])
            .unwrap();
        assert_eq!(names(&evaluate(set.clone(), &or)), vec!["a", "c"]);

        let nor = Query::new()
            .nor(vec![
                Query::new().eq("n", json!(1)).unwrap(),
                Query::new().eq("n", json!(3)).unwrap(),
            ])
            .unwrap();
        assert_eq!(names(&evaluate(set.clone(), &nor)), vec!["b"]);

        let and = Query::new()
            .and(vec![
                Query::new().greater_than("n", json!(1)).unwrap(),
                Query::new().less_than("n", json!(3)).unwrap(),
            ])
            .unwrap();
        assert_eq!(names(&evaluate(set.clone(), &and)), vec!["b"]);

        // Top-level clauses and combinators conjoin.
        let both = Query::new()
            .ne("name", json!("a"))
            .unwrap()
            .or(vec![
                Query::new().eq("n", json!(1)).unwrap(),
                Query::new().eq("n", json!(2)).unwrap(),
            ])
            .unwrap();
        assert_eq!(names(&evaluate(set, &both)), vec!["b"]);
    }

    #[test]
    fn sort_is_stable_and_multi_key() {
        let set = docs(vec![
            json!({"name": "a", "group": 2, "rank": 1}),
            json!({"name": "b", "group": 1, "rank": 2}),
            json!({"name": "c", "group": 1, "rank": 1}),
            json!({"name": "d", "group": 2, "rank": 1}),
        ]);
        let q = Query::new()
            .ascending("group")
            .unwrap()
            .descending("rank")
            .unwrap();
        // Within (group 2, rank 1), input order a before d is preserved.
        assert_eq!(names(&evaluate(set, &q)), vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn missing_sort_fields_come_first() {
        let set = docs(vec![
            json!({"name": "a", "age": 5}),
            json!({"name": "b"}),
            json!({"name": "c", "age": 1}),
        ]);
        let q = Query::new().ascending("age").unwrap();
        assert_eq!(names(&evaluate(set, &q)), vec!["b", "c", "a"]);
    }

    #[test]
    fn pagination_applies_after_sort() {
        let set = docs(vec![
            json!({"name": "d", "n": 4}),
            json!({"name": "b", "n": 2}),
            json!({"name": "a", "n": 1}),
            json!({"name": "c", "n": 3}),
        ]);
        let q = Query::new().ascending("n").unwrap().skip(1).limit(2);
        assert_eq!(names(&evaluate(set.clone(), &q)), vec!["b", "c"]);

        // Skip past the end yields nothing.
        let q = Query::new().skip(10);
        assert!(evaluate(set, &q).is_empty());
    }

    #[test]
    fn projection_keeps_metadata() {
        let set = docs(vec![json!({
            "_id": "1",
            "_kmd": {"lmt": "t"},
            "_acl": {"creator": "u"},
            "name": "a",
            "secret": "s"
        })]);
        let q = Query::new().fields(["name"]);
        let out = evaluate(set, &q);
        assert_eq!(out[0].get("name"), Some(&json!("a")));
        assert_eq!(out[0].get("secret"), None);
        assert_eq!(out[0].id(), Some("1"));
        assert_eq!(out[0].get("_kmd.lmt"), Some(&json!("t")));
        assert_eq!(out[0].get("_acl.creator"), Some(&json!("u")));
    }

    #[test]
    fn nested_path_predicates() {
        let set = docs(vec![
            json!({"name": "a", "address": {"city": "x"}}),
            json!({"name": "b", "address": {"city": "y"}}),
        ]);
        let q = Query::new().eq("address.city", json!("y")).unwrap();
        assert_eq!(names(&evaluate(set, &q)), vec!["b"]);
    }
}
