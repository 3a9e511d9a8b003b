//! Aggregation and suggestion requests

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use super::query::QueryFragment;
use crate::ast::{RangeSpecEntry, SortOrder};

/// Calendar interval of a date histogram
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalendarInterval {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl CalendarInterval {
    /// Recognize an interval keyword; anything else means a terms tally
    pub fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "year" => Some(CalendarInterval::Year),
            "quarter" => Some(CalendarInterval::Quarter),
            "month" => Some(CalendarInterval::Month),
            "week" => Some(CalendarInterval::Week),
            "day" => Some(CalendarInterval::Day),
            "hour" => Some(CalendarInterval::Hour),
            "minute" => Some(CalendarInterval::Minute),
            "second" => Some(CalendarInterval::Second),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarInterval::Year => "year",
            CalendarInterval::Quarter => "quarter",
            CalendarInterval::Month => "month",
            CalendarInterval::Week => "week",
            CalendarInterval::Day => "day",
            CalendarInterval::Hour => "hour",
            CalendarInterval::Minute => "minute",
            CalendarInterval::Second => "second",
        }
    }

    /// Bucket key format, or `None` for intervals without a histogram mapping
    pub fn format(&self) -> Option<&'static str> {
        match self {
            CalendarInterval::Year => Some("yyyy"),
            CalendarInterval::Month => Some("yyyy-MM"),
            CalendarInterval::Day => Some("yyyy-MM-dd"),
            CalendarInterval::Hour => Some("yyyy-MM-dd HH"),
            CalendarInterval::Minute => Some("yyyy-MM-dd HH:mm"),
            CalendarInterval::Second => Some("yyyy-MM-dd HH:mm:ss"),
            CalendarInterval::Quarter | CalendarInterval::Week => None,
        }
    }
}

/// Bucket ordering
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BucketOrder {
    TermAsc,
    TermDesc,
    CountAsc,
    CountDesc,
    KeyAsc,
    KeyDesc,
}

impl BucketOrder {
    /// Order of a terms aggregation
    pub fn for_terms(order: SortOrder) -> Self {
        match order {
            SortOrder::Term => BucketOrder::TermAsc,
            SortOrder::Count => BucketOrder::CountDesc,
            SortOrder::ReverseTerm => BucketOrder::TermDesc,
            SortOrder::ReverseCount => BucketOrder::CountAsc,
        }
    }

    /// Order of a date histogram
    pub fn for_histogram(order: SortOrder) -> Self {
        match order {
            SortOrder::Term => BucketOrder::KeyAsc,
            SortOrder::Count => BucketOrder::CountAsc,
            SortOrder::ReverseTerm => BucketOrder::KeyDesc,
            SortOrder::ReverseCount => BucketOrder::CountDesc,
        }
    }

    pub fn to_json(&self) -> Value {
        let (key, direction) = match self {
            BucketOrder::TermAsc => ("_term", "asc"),
            BucketOrder::TermDesc => ("_term", "desc"),
            BucketOrder::CountAsc => ("_count", "asc"),
            BucketOrder::CountDesc => ("_count", "desc"),
            BucketOrder::KeyAsc => ("_key", "asc"),
            BucketOrder::KeyDesc => ("_key", "desc"),
        };
        json!({ key: direction })
    }
}

/// Aggregation body
#[derive(Clone, Debug, PartialEq)]
pub enum Aggregation {
    Terms {
        field: String,
        size: u32,
        /// 0 asks every shard for all of its terms
        shard_size: u32,
        order: BucketOrder,
        include: Option<String>,
    },
    DateHistogram {
        field: String,
        interval: CalendarInterval,
        format: String,
        order: BucketOrder,
    },
    DateRange {
        field: String,
        ranges: Vec<RangeSpecEntry<String>>,
    },
    Range {
        field: String,
        ranges: Vec<RangeSpecEntry<f64>>,
    },
    SignificantTerms {
        field: String,
        size: u32,
        include: Option<String>,
    },
    ExtendedStats {
        field: String,
    },
    Nested {
        path: String,
    },
    Filter {
        filter: QueryFragment,
    },
    Missing {
        field: String,
    },
}

impl Aggregation {
    /// DSL name of the aggregation
    pub fn kind(&self) -> &'static str {
        match self {
            Aggregation::Terms { .. } => "terms",
            Aggregation::DateHistogram { .. } => "date_histogram",
            Aggregation::DateRange { .. } => "date_range",
            Aggregation::Range { .. } => "range",
            Aggregation::SignificantTerms { .. } => "significant_terms",
            Aggregation::ExtendedStats { .. } => "extended_stats",
            Aggregation::Nested { .. } => "nested",
            Aggregation::Filter { .. } => "filter",
            Aggregation::Missing { .. } => "missing",
        }
    }

    /// Whether this aggregation produces buckets that can hold sub-aggregations
    pub fn is_bucketing(&self) -> bool {
        !matches!(self, Aggregation::ExtendedStats { .. })
    }

    pub fn to_json(&self) -> Value {
        match self {
            Aggregation::Terms {
                field,
                size,
                shard_size,
                order,
                include,
            } => {
                let mut body = Map::new();
                body.insert("field".to_string(), json!(field));
                body.insert("size".to_string(), json!(size));
                body.insert("shard_size".to_string(), json!(shard_size));
                body.insert("order".to_string(), order.to_json());
                if let Some(include) = include {
                    body.insert("include".to_string(), json!(include));
                }
                Value::Object(body)
            }
            Aggregation::DateHistogram {
                field,
                interval,
                format,
                order,
            } => json!({
                "field": field,
                "interval": interval.as_str(),
                "format": format,
                "order": order.to_json(),
            }),
            Aggregation::DateRange { field, ranges } => json!({
                "field": field,
                "ranges": ranges.iter().map(|r| range_json(r, |v| json!(v))).collect::<Vec<_>>(),
            }),
            Aggregation::Range { field, ranges } => json!({
                "field": field,
                "ranges": ranges.iter().map(|r| range_json(r, |v| json!(v))).collect::<Vec<_>>(),
            }),
            Aggregation::SignificantTerms {
                field,
                size,
                include,
            } => {
                let mut body = Map::new();
                body.insert("field".to_string(), json!(field));
                body.insert("size".to_string(), json!(size));
                if let Some(include) = include {
                    body.insert("include".to_string(), json!(include));
                }
                Value::Object(body)
            }
            Aggregation::ExtendedStats { field } | Aggregation::Missing { field } => {
                json!({ "field": field })
            }
            Aggregation::Nested { path } => json!({ "path": path }),
            Aggregation::Filter { filter } => filter.to_json(),
        }
    }
}

fn range_json<T>(entry: &RangeSpecEntry<T>, value: impl Fn(&T) -> Value) -> Value {
    let mut body = Map::new();
    if let Some(key) = &entry.key {
        body.insert("key".to_string(), json!(key));
    }
    if let Some(from) = &entry.from {
        body.insert("from".to_string(), value(from));
    }
    if let Some(to) = &entry.to {
        body.insert("to".to_string(), value(to));
    }
    Value::Object(body)
}

/// A named aggregation with its sub-aggregations
#[derive(Clone, Debug, PartialEq)]
pub struct AggregationNode {
    pub name: String,
    pub aggregation: Aggregation,
    pub sub_aggregations: Vec<AggregationNode>,
}

impl AggregationNode {
    pub fn new(name: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            name: name.into(),
            aggregation,
            sub_aggregations: Vec::new(),
        }
    }

    pub fn with_sub_aggregation(mut self, sub: AggregationNode) -> Self {
        self.sub_aggregations.push(sub);
        self
    }

    /// Render as `{name: {kind: body, "aggs": {...}}}`
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert(
            self.aggregation.kind().to_string(),
            self.aggregation.to_json(),
        );
        if !self.sub_aggregations.is_empty() {
            let mut aggs = Map::new();
            for sub in &self.sub_aggregations {
                if let Value::Object(rendered) = sub.to_json() {
                    aggs.extend(rendered);
                }
            }
            body.insert("aggs".to_string(), Value::Object(aggs));
        }
        json!({ self.name.as_str(): body })
    }
}

impl Serialize for AggregationNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Term suggestion request
#[derive(Clone, Debug, PartialEq)]
pub struct TermSuggestion {
    pub name: String,
    pub text: String,
    pub field: String,
    pub size: u32,
    pub shard_size: u32,
    pub min_word_length: u32,
    pub suggest_mode: String,
}

impl TermSuggestion {
    pub fn new(field: impl Into<String>, text: impl Into<String>, size: u32) -> Self {
        Self {
            name: "suggestions".to_string(),
            text: text.into(),
            field: field.into(),
            size,
            shard_size: size.saturating_mul(10),
            min_word_length: 1,
            suggest_mode: "always".to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            self.name.as_str(): {
                "text": self.text,
                "term": {
                    "field": self.field,
                    "size": self.size,
                    "shard_size": self.shard_size,
                    "min_word_length": self.min_word_length,
                    "suggest_mode": self.suggest_mode,
                }
            }
        })
    }
}

impl Serialize for TermSuggestion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_keywords() {
        assert_eq!(CalendarInterval::parse("month"), Some(CalendarInterval::Month));
        assert_eq!(CalendarInterval::Month.format(), Some("yyyy-MM"));
        assert_eq!(CalendarInterval::parse("week").and_then(|i| i.format()), None);
        assert_eq!(CalendarInterval::parse("fortnight"), None);
    }

    #[test]
    fn test_orders() {
        assert_eq!(
            BucketOrder::for_terms(SortOrder::Count).to_json(),
            json!({"_count": "desc"})
        );
        assert_eq!(
            BucketOrder::for_histogram(SortOrder::Count).to_json(),
            json!({"_count": "asc"})
        );
        assert_eq!(
            BucketOrder::for_histogram(SortOrder::ReverseTerm).to_json(),
            json!({"_key": "desc"})
        );
    }

    #[test]
    fn test_nested_rendering() {
        let node = AggregationNode::new("nested", Aggregation::Nested { path: "tags".into() })
            .with_sub_aggregation(
                AggregationNode::new(
                    "filter",
                    Aggregation::Filter {
                        filter: QueryFragment::match_all(),
                    },
                )
                .with_sub_aggregation(AggregationNode::new(
                    "missing",
                    Aggregation::Missing {
                        field: "tags.name".into(),
                    },
                )),
            );

        assert_eq!(
            node.to_json(),
            json!({"nested": {
                "nested": {"path": "tags"},
                "aggs": {"filter": {
                    "filter": {"match_all": {}},
                    "aggs": {"missing": {"missing": {"field": "tags.name"}}}
                }}
            }})
        );
    }

    #[test]
    fn test_range_buckets() {
        let agg = Aggregation::Range {
            field: "price".into(),
            ranges: vec![RangeSpecEntry {
                key: None,
                from: Some(5.0),
                to: None,
            }],
        };
        assert_eq!(
            agg.to_json(),
            json!({"field": "price", "ranges": [{"from": 5.0}]})
        );
    }

    #[test]
    fn test_suggestion() {
        let suggestion = TermSuggestion::new("title", "rsut", 5);
        assert_eq!(
            suggestion.to_json(),
            json!({"suggestions": {
                "text": "rsut",
                "term": {
                    "field": "title",
                    "size": 5,
                    "shard_size": 50,
                    "min_word_length": 1,
                    "suggest_mode": "always"
                }
            }})
        );
    }
}
