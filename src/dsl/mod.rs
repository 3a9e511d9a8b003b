//! Search engine query DSL
//!
//! Typed query, aggregation and suggestion fragments plus their JSON
//! rendering. The rewriter only ever produces these types; turning them into
//! a request body is a matter of calling `to_json` or serializing them.

mod aggregation;
mod query;

pub use aggregation::{Aggregation, AggregationNode, BucketOrder, CalendarInterval, TermSuggestion};
pub use query::{
    compare_values, scalar_text, BoolQuery, MoreLikeThis, QueryFragment, RangeBounds, SpanQuery,
};
