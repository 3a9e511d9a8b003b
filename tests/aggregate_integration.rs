//! Aggregations and suggestions compiled from JSON query trees

use crossdex::schema::{FieldMapping, IndexMetadata};
use crossdex::testing::InMemoryCluster;
use crossdex::{QueryRewriter, QueryTree, RewriteError};
use serde_json::json;
use std::sync::Arc;

fn rewriter(tree_json: &str) -> QueryRewriter {
    let mut cluster = InMemoryCluster::new();
    cluster.add_index(
        IndexMetadata::new("sales", "id")
            .field("sold", FieldMapping::keyword())
            .field("sold.date", FieldMapping::date())
            .field("region", FieldMapping::keyword())
            .field("amount", FieldMapping::double())
            .field("lines", FieldMapping::new(crossdex::FieldType::Nested))
            .field("lines.sku", FieldMapping::keyword()),
    );
    let cluster = Arc::new(cluster);

    QueryRewriter::builder("sales", QueryTree::from_json_str(tree_json).unwrap())
        .resolver(cluster.clone())
        .executor(cluster)
        .build()
        .unwrap()
}

#[test]
fn test_month_tally_on_dated_field() {
    let mut rewriter = rewriter(
        r#"{"aggregate": {"field": "sold", "kind": {"type": "tally", "stem": "month", "max_terms": 10}}}"#,
    );
    let agg = rewriter.rewrite_aggregations().unwrap().unwrap();

    assert_eq!(
        agg.to_json()["sold"]["date_histogram"],
        json!({
            "field": "sold.date",
            "interval": "month",
            "format": "yyyy-MM",
            "order": {"_key": "asc"}
        })
    );
}

#[test]
fn test_month_tally_without_date_companion_is_terms() {
    let mut rewriter = rewriter(
        r#"{"aggregate": {"field": "region", "kind": {"type": "tally", "stem": "month", "max_terms": 10}}}"#,
    );
    let json = rewriter.rewrite_aggregations().unwrap().unwrap().to_json();

    assert_eq!(json["region"]["terms"]["field"], json!("region"));
    assert_eq!(json["region"]["terms"]["include"], json!("month"));
    assert!(json["region"].get("date_histogram").is_none());
}

#[test]
fn test_range_specs() {
    let mut dated = rewriter(
        r#"{"aggregate": {"field": "sold", "kind": {"type": "range", "range_spec": "[{\"key\": \"old\", \"to\": \"2020-01-01\"}]"}}}"#,
    );
    let json = dated.rewrite_aggregations().unwrap().unwrap().to_json();
    assert_eq!(json["sold"]["date_range"]["field"], json!("sold.date"));

    let mut numeric = rewriter(
        r#"{"aggregate": {"field": "amount", "kind": {"type": "range", "range_spec": "[{\"from\": 10, \"to\": 20}]"}}}"#,
    );
    let json = numeric.rewrite_aggregations().unwrap().unwrap().to_json();
    assert_eq!(json["amount"]["range"]["field"], json!("amount"));

    let mut open = rewriter(
        r#"{"aggregate": {"field": "amount", "kind": {"type": "range", "range_spec": "[{\"key\": \"none\"}]"}}}"#,
    );
    assert!(matches!(
        open.rewrite_aggregations().unwrap_err(),
        RewriteError::InvalidRangeSpec(_)
    ));

    let mut garbled = rewriter(
        r#"{"aggregate": {"field": "amount", "kind": {"type": "range", "range_spec": "not json"}}}"#,
    );
    assert!(matches!(
        garbled.rewrite_aggregations().unwrap_err(),
        RewriteError::InvalidRangeSpec(_)
    ));
}

#[test]
fn test_nested_aggregate_filters_by_query() {
    let mut rewriter = rewriter(
        r#"{
            "query": {"type": "and", "children": [
                {"type": "word", "field": "lines.sku", "value": "A-1"},
                {"type": "word", "field": "region", "value": "north"}
            ]},
            "aggregate": {
                "field": "lines.sku",
                "nested_path": "lines",
                "kind": {"type": "tally", "stem": "^.*", "max_terms": 5}
            }
        }"#,
    );
    let json = rewriter.rewrite_aggregations().unwrap().unwrap().to_json();
    let nested = &json["nested"];

    assert_eq!(nested["nested"]["path"], json!("lines"));
    let filter = &nested["aggs"]["filter"]["filter"];
    // only the nested leaf constrains the aggregation
    assert_eq!(
        filter,
        &json!({
            "bool": {
                "must": [
                    {"nested": {"path": "lines", "query": {"term": {"lines.sku": "A-1"}}}},
                    {"match_all": {}}
                ]
            }
        })
    );
    assert!(rewriter.is_aggregate_nested());
}

#[test]
fn test_double_negation_collapses_in_aggregate_filter() {
    let mut rewriter = rewriter(
        r#"{
            "query": {"type": "not", "children": [
                {"type": "not", "children": [{"type": "word", "field": "lines.sku", "value": "A-1"}]}
            ]},
            "aggregate": {
                "field": "lines.sku",
                "nested_path": "lines",
                "kind": {"type": "tally", "stem": "^.*", "max_terms": 5}
            }
        }"#,
    );

    let query = rewriter.rewrite_query().unwrap();
    assert_eq!(
        query.to_json(),
        json!({"bool": {"must_not": [{"bool": {"must_not": [
            {"nested": {"path": "lines", "query": {"term": {"lines.sku": "A-1"}}}}
        ]}}]}})
    );

    let json = rewriter.rewrite_aggregations().unwrap().unwrap().to_json();
    assert_eq!(json["nested"]["aggs"]["filter"]["filter"], json!({"match_all": {}}));
}

#[test]
fn test_suggestion() {
    let mut rewriter =
        rewriter(r#"{"suggest": {"field": "region", "stem": "nor", "max_terms": 3}}"#);

    assert!(rewriter.rewrite_aggregations().unwrap().is_none());
    let suggestion = rewriter.rewrite_suggestions().unwrap().unwrap();
    assert_eq!(suggestion.to_json()["suggestions"]["term"]["field"], json!("region"));
    assert_eq!(rewriter.aggregate_index_name().unwrap(), "sales");
}
