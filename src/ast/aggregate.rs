//! Aggregate and suggest requests attached to a query tree

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RewriteError;
use crate::Result;

/// Bucket ordering requested by the query
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Term,
    Count,
    ReverseTerm,
    ReverseCount,
}

/// Aggregate variants
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregateKind {
    /// Term counts, or a date histogram when `stem` names a calendar interval
    Tally {
        stem: String,
        max_terms: u32,
        #[serde(default)]
        sort_order: SortOrder,
    },
    /// Buckets described by a JSON array of `{key, from, to}` entries
    Range { range_spec: String },
    SignificantTerms { stem: String, max_terms: u32 },
    ExtendedStats,
}

impl AggregateKind {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateKind::Tally { .. } => "tally",
            AggregateKind::Range { .. } => "range",
            AggregateKind::SignificantTerms { .. } => "significant_terms",
            AggregateKind::ExtendedStats => "extended_stats",
        }
    }
}

/// Aggregate request over one field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub kind: AggregateKind,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_aggregate: Option<Box<Aggregate>>,
}

impl Aggregate {
    pub fn new(field: impl Into<String>, kind: AggregateKind) -> Self {
        Self {
            kind,
            field: field.into(),
            nested_path: None,
            sub_aggregate: None,
        }
    }

    pub fn tally(field: impl Into<String>, stem: impl Into<String>, max_terms: u32) -> Self {
        Self::new(
            field,
            AggregateKind::Tally {
                stem: stem.into(),
                max_terms,
                sort_order: SortOrder::default(),
            },
        )
    }

    pub fn with_nested_path(mut self, path: impl Into<String>) -> Self {
        self.nested_path = Some(path.into());
        self
    }

    pub fn with_sub_aggregate(mut self, sub: Aggregate) -> Self {
        self.sub_aggregate = Some(Box::new(sub));
        self
    }

    pub fn is_nested(&self) -> bool {
        self.nested_path.is_some()
    }
}

/// Term-suggestion request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suggest {
    pub field: String,
    pub stem: String,
    pub max_terms: u32,
}

impl Suggest {
    pub fn new(field: impl Into<String>, stem: impl Into<String>, max_terms: u32) -> Self {
        Self {
            field: field.into(),
            stem: stem.into(),
            max_terms,
        }
    }
}

/// One bucket of a range aggregate spec
///
/// `T` is `f64` for numeric ranges and `String` for date ranges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeSpecEntry<T> {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "Option::default")]
    pub from: Option<T>,
    #[serde(default = "Option::default")]
    pub to: Option<T>,
}

impl<T: DeserializeOwned> RangeSpecEntry<T> {
    /// Decode and validate a JSON range spec
    pub fn parse_all(spec: &str) -> Result<Vec<Self>> {
        let entries: Vec<Self> = serde_json::from_str(spec).map_err(|e| {
            RewriteError::InvalidRangeSpec(format!("Problem decoding range spec: {}: {}", spec, e))
        })?;
        for entry in &entries {
            entry.validate()?;
        }
        Ok(entries)
    }
}

impl<T> RangeSpecEntry<T> {
    pub fn validate(&self) -> Result<()> {
        if self.from.is_none() && self.to.is_none() {
            return Err(RewriteError::InvalidRangeSpec(
                "one of 'to' or 'from' must be specified".to_string(),
            ));
        }
        Ok(())
    }
}
