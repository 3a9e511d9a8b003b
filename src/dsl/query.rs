//! Query fragments emitted by the rewriter
//!
//! Fragments are plain typed values. [`QueryFragment::to_json`] renders them
//! in the search engine's query DSL.

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;

/// Range bounds for range queries
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RangeBounds {
    /// Greater than
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    /// Greater than or equal to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    /// Less than
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
    /// Less than or equal to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
    /// Boost factor for scoring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost: Option<f32>,
}

impl RangeBounds {
    /// Inclusive on both ends
    pub fn between(from: Value, to: Value) -> Self {
        Self {
            gte: Some(from),
            lte: Some(to),
            ..Default::default()
        }
    }

    /// Check if a document value falls within these bounds
    ///
    /// Numbers compare numerically, everything else compares as text.
    pub fn contains(&self, value: &Value) -> bool {
        let check = |bound: &Option<Value>, accept: fn(Ordering) -> bool| match bound {
            Some(bound) => compare_values(value, bound).map(accept).unwrap_or(false),
            None => true,
        };

        check(&self.gt, |o| o == Ordering::Greater)
            && check(&self.gte, |o| o != Ordering::Less)
            && check(&self.lt, |o| o == Ordering::Less)
            && check(&self.lte, |o| o != Ordering::Greater)
    }
}

/// Order two scalar JSON values the way a range query would
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::Number(l), Value::String(r)) | (Value::String(r), Value::Number(l))
            if r.parse::<f64>().is_ok() =>
        {
            let (l, r) = (l.as_f64()?, r.parse::<f64>().ok()?);
            if matches!(left, Value::Number(_)) {
                l.partial_cmp(&r)
            } else {
                r.partial_cmp(&l)
            }
        }
        (Value::Null, _) | (_, Value::Null) => None,
        _ => Some(scalar_text(left).cmp(&scalar_text(right))),
    }
}

/// Text form of a scalar value as it is indexed
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Similarity ("more like this") query
#[derive(Clone, Debug, PartialEq)]
pub struct MoreLikeThis {
    pub fields: Vec<String>,
    pub like_text: String,
    pub max_query_terms: u32,
    pub min_word_length: u32,
    pub min_term_freq: u32,
    pub stop_words: Vec<String>,
    pub boost: Option<f32>,
}

/// Boolean query combining multiple clauses
///
/// - `must`: all clauses must match
/// - `should`: at least one clause should match
/// - `must_not`: no clause may match
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<QueryFragment>,
    pub should: Vec<QueryFragment>,
    pub must_not: Vec<QueryFragment>,
    pub minimum_should_match: Option<usize>,
    pub boost: Option<f32>,
}

impl BoolQuery {
    /// Create a new empty boolean query
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a must clause
    pub fn must(mut self, query: QueryFragment) -> Self {
        self.must.push(query);
        self
    }

    /// Add a should clause
    pub fn should(mut self, query: QueryFragment) -> Self {
        self.should.push(query);
        self
    }

    /// Add a must_not clause
    pub fn must_not(mut self, query: QueryFragment) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }
}

/// Span queries, used for proximity matching
#[derive(Clone, Debug, PartialEq)]
pub enum SpanQuery {
    Term {
        field: String,
        value: String,
        boost: Option<f32>,
    },
    /// Wraps a multi-term query (wildcard, prefix, fuzzy, regexp)
    MultiTerm(Box<QueryFragment>),
    Near {
        clauses: Vec<SpanQuery>,
        slop: u32,
        in_order: bool,
        boost: Option<f32>,
    },
}

impl SpanQuery {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        SpanQuery::Term {
            field: field.into(),
            value: value.into(),
            boost: None,
        }
    }

    pub fn multi_term(query: QueryFragment) -> Self {
        SpanQuery::MultiTerm(Box::new(query))
    }

    pub fn near(clauses: Vec<SpanQuery>, slop: u32, in_order: bool) -> Self {
        SpanQuery::Near {
            clauses,
            slop,
            in_order,
            boost: None,
        }
    }

    /// Multiply this span's boost, returning false when the span cannot carry one
    pub fn apply_boost(&mut self, factor: f32) -> bool {
        match self {
            SpanQuery::Term { boost, .. } | SpanQuery::Near { boost, .. } => {
                multiply(boost, factor);
                true
            }
            SpanQuery::MultiTerm(_) => false,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SpanQuery::Term {
                field,
                value,
                boost,
            } => single_field("span_term", field, with_boost("value", json!(value), *boost)),
            SpanQuery::MultiTerm(query) => json!({ "span_multi": { "match": query.to_json() } }),
            SpanQuery::Near {
                clauses,
                slop,
                in_order,
                boost,
            } => {
                let mut body = Map::new();
                body.insert(
                    "clauses".to_string(),
                    Value::Array(clauses.iter().map(SpanQuery::to_json).collect()),
                );
                body.insert("slop".to_string(), json!(slop));
                body.insert("in_order".to_string(), json!(in_order));
                insert_boost(&mut body, *boost);
                json!({ "span_near": body })
            }
        }
    }
}

/// One compiled query fragment
#[derive(Clone, Debug, PartialEq)]
pub enum QueryFragment {
    MatchAll {
        boost: Option<f32>,
    },
    Term {
        field: String,
        value: Value,
        boost: Option<f32>,
    },
    Terms {
        field: String,
        values: Vec<Value>,
        minimum_should_match: Option<usize>,
        boost: Option<f32>,
    },
    MatchPhrase {
        field: String,
        text: String,
        boost: Option<f32>,
    },
    Range {
        field: String,
        bounds: RangeBounds,
    },
    Regexp {
        field: String,
        pattern: String,
        boost: Option<f32>,
    },
    Wildcard {
        field: String,
        pattern: String,
        boost: Option<f32>,
    },
    Prefix {
        field: String,
        value: String,
        boost: Option<f32>,
    },
    Fuzzy {
        field: String,
        value: String,
        prefix_length: u32,
        boost: Option<f32>,
    },
    /// Documents lacking a value for the field
    Missing {
        field: String,
    },
    Exists {
        field: String,
    },
    MoreLikeThis(MoreLikeThis),
    Script {
        source: String,
    },
    Bool(BoolQuery),
    Nested {
        path: String,
        query: Box<QueryFragment>,
        boost: Option<f32>,
    },
    HasChild {
        child_type: String,
        query: Box<QueryFragment>,
        boost: Option<f32>,
    },
    HasParent {
        parent_type: String,
        query: Box<QueryFragment>,
        boost: Option<f32>,
    },
    ConstantScore {
        filter: Box<QueryFragment>,
        boost: Option<f32>,
    },
    Span(SpanQuery),
}

impl QueryFragment {
    pub fn match_all() -> Self {
        QueryFragment::MatchAll { boost: None }
    }

    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        QueryFragment::Term {
            field: field.into(),
            value: value.into(),
            boost: None,
        }
    }

    pub fn terms(field: impl Into<String>, values: Vec<Value>) -> Self {
        QueryFragment::Terms {
            field: field.into(),
            values,
            minimum_should_match: None,
            boost: None,
        }
    }

    pub fn match_phrase(field: impl Into<String>, text: impl Into<String>) -> Self {
        QueryFragment::MatchPhrase {
            field: field.into(),
            text: text.into(),
            boost: None,
        }
    }

    pub fn range(field: impl Into<String>, bounds: RangeBounds) -> Self {
        QueryFragment::Range {
            field: field.into(),
            bounds,
        }
    }

    pub fn regexp(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        QueryFragment::Regexp {
            field: field.into(),
            pattern: pattern.into(),
            boost: None,
        }
    }

    pub fn wildcard(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        QueryFragment::Wildcard {
            field: field.into(),
            pattern: pattern.into(),
            boost: None,
        }
    }

    pub fn prefix(field: impl Into<String>, value: impl Into<String>) -> Self {
        QueryFragment::Prefix {
            field: field.into(),
            value: value.into(),
            boost: None,
        }
    }

    pub fn fuzzy(field: impl Into<String>, value: impl Into<String>, prefix_length: u32) -> Self {
        QueryFragment::Fuzzy {
            field: field.into(),
            value: value.into(),
            prefix_length,
            boost: None,
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        QueryFragment::Missing {
            field: field.into(),
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        QueryFragment::Exists {
            field: field.into(),
        }
    }

    pub fn script(source: impl Into<String>) -> Self {
        QueryFragment::Script {
            source: source.into(),
        }
    }

    pub fn nested(path: impl Into<String>, query: QueryFragment) -> Self {
        QueryFragment::Nested {
            path: path.into(),
            query: Box::new(query),
            boost: None,
        }
    }

    pub fn has_child(child_type: impl Into<String>, query: QueryFragment) -> Self {
        QueryFragment::HasChild {
            child_type: child_type.into(),
            query: Box::new(query),
            boost: None,
        }
    }

    pub fn has_parent(parent_type: impl Into<String>, query: QueryFragment) -> Self {
        QueryFragment::HasParent {
            parent_type: parent_type.into(),
            query: Box::new(query),
            boost: None,
        }
    }

    pub fn constant_score(filter: QueryFragment) -> Self {
        QueryFragment::ConstantScore {
            filter: Box::new(filter),
            boost: None,
        }
    }

    /// `bool { must_not: [query] }`
    pub fn not(query: QueryFragment) -> Self {
        QueryFragment::Bool(BoolQuery::new().must_not(query))
    }

    /// Multiply the fragment's boost by `factor`
    ///
    /// Returns false, leaving the fragment untouched, for kinds that carry no
    /// boost.
    pub fn apply_boost(&mut self, factor: f32) -> bool {
        match self {
            QueryFragment::MatchAll { boost }
            | QueryFragment::Term { boost, .. }
            | QueryFragment::Terms { boost, .. }
            | QueryFragment::MatchPhrase { boost, .. }
            | QueryFragment::Regexp { boost, .. }
            | QueryFragment::Wildcard { boost, .. }
            | QueryFragment::Prefix { boost, .. }
            | QueryFragment::Fuzzy { boost, .. }
            | QueryFragment::Nested { boost, .. }
            | QueryFragment::HasChild { boost, .. }
            | QueryFragment::HasParent { boost, .. }
            | QueryFragment::ConstantScore { boost, .. } => {
                multiply(boost, factor);
                true
            }
            QueryFragment::Range { bounds, .. } => {
                multiply(&mut bounds.boost, factor);
                true
            }
            QueryFragment::MoreLikeThis(mlt) => {
                multiply(&mut mlt.boost, factor);
                true
            }
            QueryFragment::Bool(bool_query) => {
                multiply(&mut bool_query.boost, factor);
                true
            }
            QueryFragment::Span(span) => span.apply_boost(factor),
            QueryFragment::Missing { .. }
            | QueryFragment::Exists { .. }
            | QueryFragment::Script { .. } => false,
        }
    }

    /// DSL name of the fragment
    pub fn kind(&self) -> &'static str {
        match self {
            QueryFragment::MatchAll { .. } => "match_all",
            QueryFragment::Term { .. } => "term",
            QueryFragment::Terms { .. } => "terms",
            QueryFragment::MatchPhrase { .. } => "match_phrase",
            QueryFragment::Range { .. } => "range",
            QueryFragment::Regexp { .. } => "regexp",
            QueryFragment::Wildcard { .. } => "wildcard",
            QueryFragment::Prefix { .. } => "prefix",
            QueryFragment::Fuzzy { .. } => "fuzzy",
            QueryFragment::Missing { .. } => "missing",
            QueryFragment::Exists { .. } => "exists",
            QueryFragment::MoreLikeThis(_) => "more_like_this",
            QueryFragment::Script { .. } => "script",
            QueryFragment::Bool(_) => "bool",
            QueryFragment::Nested { .. } => "nested",
            QueryFragment::HasChild { .. } => "has_child",
            QueryFragment::HasParent { .. } => "has_parent",
            QueryFragment::ConstantScore { .. } => "constant_score",
            QueryFragment::Span(SpanQuery::Term { .. }) => "span_term",
            QueryFragment::Span(SpanQuery::MultiTerm(_)) => "span_multi",
            QueryFragment::Span(SpanQuery::Near { .. }) => "span_near",
        }
    }

    /// Render the fragment as query DSL
    pub fn to_json(&self) -> Value {
        match self {
            QueryFragment::MatchAll { boost } => {
                let mut body = Map::new();
                insert_boost(&mut body, *boost);
                json!({ "match_all": body })
            }
            QueryFragment::Term {
                field,
                value,
                boost,
            } => single_field("term", field, with_boost("value", value.clone(), *boost)),
            QueryFragment::Terms {
                field,
                values,
                minimum_should_match,
                boost,
            } => {
                let mut body = Map::new();
                body.insert(field.clone(), Value::Array(values.clone()));
                if let Some(msm) = minimum_should_match {
                    body.insert("minimum_should_match".to_string(), json!(msm.to_string()));
                }
                insert_boost(&mut body, *boost);
                json!({ "terms": body })
            }
            QueryFragment::MatchPhrase { field, text, boost } => {
                single_field("match_phrase", field, with_boost("query", json!(text), *boost))
            }
            QueryFragment::Range { field, bounds } => single_field("range", field, json!(bounds)),
            QueryFragment::Regexp {
                field,
                pattern,
                boost,
            } => single_field("regexp", field, with_boost("value", json!(pattern), *boost)),
            QueryFragment::Wildcard {
                field,
                pattern,
                boost,
            } => single_field("wildcard", field, with_boost("value", json!(pattern), *boost)),
            QueryFragment::Prefix {
                field,
                value,
                boost,
            } => single_field("prefix", field, with_boost("value", json!(value), *boost)),
            QueryFragment::Fuzzy {
                field,
                value,
                prefix_length,
                boost,
            } => {
                let mut body = Map::new();
                body.insert("value".to_string(), json!(value));
                body.insert("prefix_length".to_string(), json!(prefix_length));
                insert_boost(&mut body, *boost);
                single_field("fuzzy", field, Value::Object(body))
            }
            QueryFragment::Missing { field } => json!({ "missing": { "field": field } }),
            QueryFragment::Exists { field } => json!({ "exists": { "field": field } }),
            QueryFragment::MoreLikeThis(mlt) => {
                let mut body = Map::new();
                body.insert("fields".to_string(), json!(mlt.fields));
                body.insert("like_text".to_string(), json!(mlt.like_text));
                body.insert("max_query_terms".to_string(), json!(mlt.max_query_terms));
                body.insert("min_word_length".to_string(), json!(mlt.min_word_length));
                body.insert("min_term_freq".to_string(), json!(mlt.min_term_freq));
                body.insert("stop_words".to_string(), json!(mlt.stop_words));
                insert_boost(&mut body, mlt.boost);
                json!({ "more_like_this": body })
            }
            QueryFragment::Script { source } => json!({ "script": { "script": source } }),
            QueryFragment::Bool(bool_query) => {
                let mut body = Map::new();
                let clauses = [
                    ("must", &bool_query.must),
                    ("should", &bool_query.should),
                    ("must_not", &bool_query.must_not),
                ];
                for (name, list) in clauses {
                    if !list.is_empty() {
                        body.insert(
                            name.to_string(),
                            Value::Array(list.iter().map(QueryFragment::to_json).collect()),
                        );
                    }
                }
                if let Some(msm) = bool_query.minimum_should_match {
                    body.insert("minimum_should_match".to_string(), json!(msm));
                }
                insert_boost(&mut body, bool_query.boost);
                json!({ "bool": body })
            }
            QueryFragment::Nested { path, query, boost } => {
                wrapper("nested", ("path", path), query, *boost)
            }
            QueryFragment::HasChild {
                child_type,
                query,
                boost,
            } => wrapper("has_child", ("type", child_type), query, *boost),
            QueryFragment::HasParent {
                parent_type,
                query,
                boost,
            } => wrapper("has_parent", ("parent_type", parent_type), query, *boost),
            QueryFragment::ConstantScore { filter, boost } => {
                let mut body = Map::new();
                body.insert("filter".to_string(), filter.to_json());
                insert_boost(&mut body, *boost);
                json!({ "constant_score": body })
            }
            QueryFragment::Span(span) => span.to_json(),
        }
    }
}

impl Serialize for QueryFragment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn multiply(boost: &mut Option<f32>, factor: f32) {
    *boost = Some(boost.unwrap_or(1.0) * factor);
}

fn insert_boost(body: &mut Map<String, Value>, boost: Option<f32>) {
    if let Some(boost) = boost {
        body.insert("boost".to_string(), json!(boost));
    }
}

/// `value` alone, or `{key: value, boost}` when a boost is set
fn with_boost(key: &str, value: Value, boost: Option<f32>) -> Value {
    match boost {
        None => value,
        Some(boost) => json!({ key: value, "boost": boost }),
    }
}

fn single_field(kind: &str, field: &str, body: Value) -> Value {
    json!({ kind: { field: body } })
}

fn wrapper(kind: &str, label: (&str, &String), query: &QueryFragment, boost: Option<f32>) -> Value {
    let mut body = Map::new();
    body.insert(label.0.to_string(), json!(label.1));
    body.insert("query".to_string(), query.to_json());
    insert_boost(&mut body, boost);
    json!({ kind: body })
}
