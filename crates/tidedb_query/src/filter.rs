//! Filter clauses, predicates and boolean combinators.

use serde_json::{json, Map, Value};

/// A single per-field predicate.
///
/// Predicates are closed, typed variants; a filter is never assembled from
/// untyped runtime data.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Equality: the value equals the operand, or an array value contains it.
    Eq(Value),
    /// Negated equality. A missing field matches.
    Ne(Value),
    /// The value (or any array element) is one of the operands.
    In(Vec<Value>),
    /// Negation of [`Predicate::In`]. A missing field matches.
    NotIn(Vec<Value>),
    /// An array value contains every operand.
    All(Vec<Value>),
    /// Strictly greater than the operand (numbers and strings).
    Gt(Value),
    /// Greater than or equal to the operand.
    Gte(Value),
    /// Strictly less than the operand.
    Lt(Value),
    /// Less than or equal to the operand.
    Lte(Value),
    /// Presence (or absence) of the field.
    Exists(bool),
    /// `value % divisor == remainder` for integral values.
    Mod {
        /// Divisor, non-zero.
        divisor: i64,
        /// Expected remainder.
        remainder: i64,
    },
    /// Regular-expression match against string values.
    Regex {
        /// The pattern, without inline flags.
        pattern: String,
        /// Matching options.
        flags: RegexFlags,
    },
    /// Geospatial proximity to a `[longitude, latitude]` point.
    Near {
        /// Center of the search, `[longitude, latitude]`.
        center: [f64; 2],
        /// Maximum haversine distance in kilometers, unbounded if absent.
        max_distance_km: Option<f64>,
    },
    /// Containment in an axis-aligned box.
    WithinBox {
        /// Bottom-left corner, `[longitude, latitude]`.
        bottom_left: [f64; 2],
        /// Upper-right corner, `[longitude, latitude]`.
        upper_right: [f64; 2],
    },
    /// Containment in a polygon (at least three vertices).
    WithinPolygon {
        /// Polygon vertices in order.
        vertices: Vec<[f64; 2]>,
    },
    /// An array value with exactly this many elements.
    Size(usize),
}

/// Matching options for the regex predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegexFlags {
    /// Case-insensitive matching (`i`).
    pub case_insensitive: bool,
    /// `^`/`$` match line boundaries (`m`).
    pub multiline: bool,
    /// Ignore pattern whitespace (`x`).
    pub extended: bool,
    /// `.` matches newlines (`s`).
    pub dot_matches_all: bool,
}

impl RegexFlags {
    /// Parses a wire options string such as `"im"`.
    ///
    /// Unknown characters are ignored, matching the tolerant behavior of the
    /// remote endpoint.
    #[must_use]
    pub fn from_options(options: &str) -> Self {
        let mut flags = Self::default();
        for c in options.chars() {
            match c {
                'i' => flags.case_insensitive = true,
                'm' => flags.multiline = true,
                'x' => flags.extended = true,
                's' => flags.dot_matches_all = true,
                _ => {}
            }
        }
        flags
    }

    /// Renders the wire options string (`$options`).
    #[must_use]
    pub fn to_options(&self) -> String {
        let mut out = String::new();
        if self.case_insensitive {
            out.push('i');
        }
        if self.multiline {
            out.push('m');
        }
        if self.extended {
            out.push('x');
        }
        if self.dot_matches_all {
            out.push('s');
        }
        out
    }

    /// Renders an inline flag prefix such as `(?im)` for local evaluation.
    #[must_use]
    pub fn inline_prefix(&self) -> String {
        let options = self.to_options();
        if options.is_empty() {
            String::new()
        } else {
            format!("(?{options})")
        }
    }
}

/// A boolean combinator over sub-filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Conjunction of sub-filters.
    And,
    /// Disjunction of sub-filters.
    Or,
    /// Negated disjunction of sub-filters.
    Nor,
}

impl Combinator {
    /// The wire operator name.
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            Combinator::And => "$and",
            Combinator::Or => "$or",
            Combinator::Nor => "$nor",
        }
    }
}

/// The filter part of a query: per-field predicate clauses plus composed
/// boolean combinators.
///
/// Top-level clauses are implicitly AND-ed; composed combinators apply their
/// own semantics on top.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    pub(crate) clauses: Vec<(String, Vec<Predicate>)>,
    pub(crate) composed: Vec<(Combinator, Vec<Filter>)>,
}

impl Filter {
    /// Returns true if the filter constrains nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty() && self.composed.is_empty()
    }

    /// Adds a predicate to a field's clause, creating the clause if needed.
    pub(crate) fn add(&mut self, field: &str, predicate: Predicate) {
        match self.clauses.iter().position(|(f, _)| f == field) {
            Some(i) => self.clauses[i].1.push(predicate),
            None => self.clauses.push((field.to_string(), vec![predicate])),
        }
    }

    /// Adds a composed combinator clause.
    pub(crate) fn compose(&mut self, combinator: Combinator, filters: Vec<Filter>) {
        self.composed.push((combinator, filters));
    }

    /// Serializes the filter to its wire JSON form.
    ///
    /// Object keys come out sorted (serde_json's map is ordered by key),
    /// which makes the rendering canonical: two filters with the same
    /// clauses in different insertion order serialize identically.
    #[must_use]
    pub fn to_wire_value(&self) -> Value {
        let mut out = Map::new();
        for (field, predicates) in &self.clauses {
            out.insert(field.clone(), clause_value(predicates));
        }
        for (combinator, filters) in &self.composed {
            let rendered: Vec<Value> = filters.iter().map(Filter::to_wire_value).collect();
            // Repeated combinators of the same kind merge into one array.
            let slot = out
                .entry(combinator.wire_name().to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(existing) = slot {
                existing.extend(rendered);
            }
        }
        Value::Object(out)
    }
}

/// Renders one field clause: a bare value for a single equality, an operator
/// object otherwise.
fn clause_value(predicates: &[Predicate]) -> Value {
    if let [Predicate::Eq(value)] = predicates {
        return value.clone();
    }
    let mut ops = Map::new();
    for predicate in predicates {
        match predicate {
            Predicate::Eq(v) => {
                ops.insert("$eq".into(), v.clone());
            }
            Predicate::Ne(v) => {
                ops.insert("$ne".into(), v.clone());
            }
            Predicate::In(vs) => {
                ops.insert("$in".into(), Value::Array(vs.clone()));
            }
            Predicate::NotIn(vs) => {
                ops.insert("$nin".into(), Value::Array(vs.clone()));
            }
            Predicate::All(vs) => {
                ops.insert("$all".into(), Value::Array(vs.clone()));
            }
            Predicate::Gt(v) => {
                ops.insert("$gt".into(), v.clone());
            }
            Predicate::Gte(v) => {
                ops.insert("$gte".into(), v.clone());
            }
            Predicate::Lt(v) => {
                ops.insert("$lt".into(), v.clone());
            }
            Predicate::Lte(v) => {
                ops.insert("$lte".into(), v.clone());
            }
            Predicate::Exists(b) => {
                ops.insert("$exists".into(), Value::Bool(*b));
            }
            Predicate::Mod { divisor, remainder } => {
                ops.insert("$mod".into(), json!([divisor, remainder]));
            }
            Predicate::Regex { pattern, flags } => {
                ops.insert("$regex".into(), Value::String(pattern.clone()));
                let options = flags.to_options();
                if !options.is_empty() {
                    ops.insert("$options".into(), Value::String(options));
                }
            }
            Predicate::Near {
                center,
                max_distance_km,
            } => {
                ops.insert("$nearSphere".into(), json!([center[0], center[1]]));
                if let Some(max) = max_distance_km {
                    ops.insert("$maxDistance".into(), json!(max));
                }
            }
            Predicate::WithinBox {
                bottom_left,
                upper_right,
            } => {
                ops.insert(
                    "$geoWithin".into(),
                    json!({"$box": [[bottom_left[0], bottom_left[1]], [upper_right[0], upper_right[1]]]}),
                );
            }
            Predicate::WithinPolygon { vertices } => {
                let points: Vec<Value> = vertices.iter().map(|v| json!([v[0], v[1]])).collect();
                ops.insert("$geoWithin".into(), json!({ "$polygon": points }));
            }
            Predicate::Size(n) => {
                ops.insert("$size".into(), json!(n));
            }
        }
    }
    Value::Object(ops)
}
