//! Grouped aggregation over in-memory documents.
//!
//! Aggregations are a closed set of statically defined reduction steps;
//! nothing here is assembled from runtime data. Custom reductions are
//! injected as typed closures through [`aggregate_with`].

use serde_json::{json, Map, Value};
use tidedb_model::Doc;

/// The closed set of built-in reduction kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationKind {
    /// Number of documents per group.
    Count,
    /// Sum of a numeric field per group.
    Sum(String),
    /// Minimum of a numeric field per group.
    Min(String),
    /// Maximum of a numeric field per group.
    Max(String),
    /// Average of a numeric field per group; also reports the count.
    Average(String),
}

/// A grouped aggregation: zero or more group-by key fields plus a reduction
/// kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    by: Vec<String>,
    kind: AggregationKind,
}

impl Aggregation {
    /// Counts documents.
    #[must_use]
    pub fn count() -> Self {
        Self {
            by: Vec::new(),
            kind: AggregationKind::Count,
        }
    }

    /// Sums `field`.
    #[must_use]
    pub fn sum(field: impl Into<String>) -> Self {
        Self {
            by: Vec::new(),
            kind: AggregationKind::Sum(field.into()),
        }
    }

    /// Takes the minimum of `field`.
    #[must_use]
    pub fn min(field: impl Into<String>) -> Self {
        Self {
            by: Vec::new(),
            kind: AggregationKind::Min(field.into()),
        }
    }

    /// Takes the maximum of `field`.
    #[must_use]
    pub fn max(field: impl Into<String>) -> Self {
        Self {
            by: Vec::new(),
            kind: AggregationKind::Max(field.into()),
        }
    }

    /// Averages `field`.
    #[must_use]
    pub fn average(field: impl Into<String>) -> Self {
        Self {
            by: Vec::new(),
            kind: AggregationKind::Average(field.into()),
        }
    }

    /// Groups by the given key fields.
    #[must_use]
    pub fn by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by = fields.into_iter().map(Into::into).collect();
        self
    }

    /// The reduction kind.
    #[must_use]
    pub fn kind(&self) -> &AggregationKind {
        &self.kind
    }

    /// Applies the aggregation, producing one document per group in order
    /// of first appearance.
    ///
    /// Documents whose reduced field is missing or non-numeric contribute
    /// nothing to numeric reductions; a group of only such documents reports
    /// `null`.
    #[must_use]
    pub fn apply(&self, docs: &[Doc]) -> Vec<Doc> {
        let mut groups: Vec<(Value, Vec<&Doc>)> = Vec::new();
        for doc in docs {
            let key = group_key(doc, &self.by);
            match groups.iter().position(|(k, _)| *k == key) {
                Some(i) => groups[i].1.push(doc),
                None => groups.push((key, vec![doc])),
            }
        }

        groups
            .into_iter()
            .map(|(key, members)| {
                let mut out = Map::new();
                if let Value::Object(key_fields) = key {
                    out.extend(key_fields);
                }
                self.reduce(&members, &mut out);
                Doc::from_map(out)
            })
            .collect()
    }

    fn reduce(&self, members: &[&Doc], out: &mut Map<String, Value>) {
        match &self.kind {
            AggregationKind::Count => {
                out.insert("count".into(), json!(members.len()));
            }
            AggregationKind::Sum(field) => {
                let sum: f64 = numeric_values(members, field).sum();
                out.insert("sum".into(), json!(sum));
            }
            AggregationKind::Min(field) => {
                let min = numeric_values(members, field).fold(None::<f64>, |acc, n| {
                    Some(acc.map_or(n, |m| m.min(n)))
                });
                out.insert("min".into(), min.map(|n| json!(n)).unwrap_or(Value::Null));
            }
            AggregationKind::Max(field) => {
                let max = numeric_values(members, field).fold(None::<f64>, |acc, n| {
                    Some(acc.map_or(n, |m| m.max(n)))
                });
                out.insert("max".into(), max.map(|n| json!(n)).unwrap_or(Value::Null));
            }
            AggregationKind::Average(field) => {
                let (sum, count) = numeric_values(members, field)
                    .fold((0.0, 0u64), |(s, c), n| (s + n, c + 1));
                let average = if count == 0 {
                    Value::Null
                } else {
                    json!(sum / count as f64)
                };
                out.insert("average".into(), average);
                out.insert("count".into(), json!(count));
            }
        }
    }
}

fn numeric_values<'a>(
    members: &'a [&'a Doc],
    field: &'a str,
) -> impl Iterator<Item = f64> + 'a {
    members
        .iter()
        .filter_map(move |doc| doc.get(field).and_then(Value::as_f64))
}

fn group_key(doc: &Doc, by: &[String]) -> Value {
    let mut key = Map::new();
    for field in by {
        key.insert(
            field.clone(),
            doc.get(field).cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(key)
}

/// Folds each group with an injected typed reduction step.
///
/// Returns `(group key document, folded value)` pairs in order of first
/// appearance. This is the extension point for reductions outside the
/// built-in set; the step is an ordinary function, never constructed from
/// data.
pub fn aggregate_with<T, F>(docs: &[Doc], by: &[String], init: T, step: F) -> Vec<(Doc, T)>
where
    T: Clone,
    F: Fn(T, &Doc) -> T,
{
    let mut groups: Vec<(Value, T)> = Vec::new();
    for doc in docs {
        let key = group_key(doc, by);
        match groups.iter().position(|(k, _)| *k == key) {
            Some(i) => {
                let folded = step(groups[i].1.clone(), doc);
                groups[i].1 = folded;
            }
            None => {
                let folded = step(init.clone(), doc);
                groups.push((key, folded));
            }
        }
    }
    groups
        .into_iter()
        .map(|(key, acc)| {
            let map = match key {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            (Doc::from_map(map), acc)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs(values: Vec<Value>) -> Vec<Doc> {
        values
            .into_iter()
            .map(|v| Doc::from_value(v).unwrap())
            .collect()
    }

    fn sample() -> Vec<Doc> {
        docs(vec![
            json!({"city": "x", "price": 10}),
            json!({"city": "y", "price": 20}),
            json!({"city": "x", "price": 30}),
            json!({"city": "y"}),
        ])
    }

    #[test]
    fn count_grouped() {
        let out = Aggregation::count().by(["city"]).apply(&sample());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("city"), Some(&json!("x")));
        assert_eq!(out[0].get("count"), Some(&json!(2)));
        assert_eq!(out[1].get("city"), Some(&json!("y")));
        assert_eq!(out[1].get("count"), Some(&json!(2)));
    }

    #[test]
    fn count_ungrouped() {
        let out = Aggregation::count().apply(&sample());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("count"), Some(&json!(4)));
    }

    #[test]
    fn sum_skips_missing_values() {
        let out = Aggregation::sum("price").by(["city"]).apply(&sample());
        assert_eq!(out[0].get("sum"), Some(&json!(40.0)));
        assert_eq!(out[1].get("sum"), Some(&json!(20.0)));
    }

    #[test]
    fn min_max() {
        let out = Aggregation::min("price").by(["city"]).apply(&sample());
        assert_eq!(out[0].get("min"), Some(&json!(10.0)));

        let out = Aggregation::max("price").by(["city"]).apply(&sample());
        assert_eq!(out[0].get("max"), Some(&json!(30.0)));
    }

    #[test]
    fn min_of_empty_group_is_null() {
        let set = docs(vec![json!({"city": "z"})]);
        let out = Aggregation::min("price").by(["city"]).apply(&set);
        assert_eq!(out[0].get("min"), Some(&Value::Null));
    }

    #[test]
    fn average_reports_count() {
        let out = Aggregation::average("price").by(["city"]).apply(&sample());
        assert_eq!(out[0].get("average"), Some(&json!(20.0)));
        assert_eq!(out[0].get("count"), Some(&json!(2)));
        // Group y has one priced doc.
        assert_eq!(out[1].get("average"), Some(&json!(20.0)));
        assert_eq!(out[1].get("count"), Some(&json!(1)));
    }

    #[test]
    fn custom_reducer() {
        let by = vec!["city".to_string()];
        let out = aggregate_with(&sample(), &by, Vec::<String>::new(), |mut acc, doc| {
            if let Some(p) = doc.get("price") {
                acc.push(p.to_string());
            }
            acc
        });
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0.get("city"), Some(&json!("x")));
        assert_eq!(out[0].1, vec!["10", "30"]);
    }
}
