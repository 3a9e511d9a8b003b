//! End-to-end compilation of query trees against an in-memory cluster
//!
//! Each test compiles a tree, checks the emitted fragment and, where the
//! in-memory evaluator understands the fragment, the documents it matches.

use crossdex::ast::{NodeSpec, Operator, QueryTreeSpec};
use crossdex::dsl::{BoolQuery, QueryFragment, RangeBounds, SpanQuery};
use crossdex::schema::{FieldMapping, FieldType, IndexMetadata, FULLTEXT_ANALYZER};
use crossdex::testing::InMemoryCluster;
use crossdex::{QueryRewriter, RewriteError, RewriterConfig};
use serde_json::{json, Value};
use std::sync::Arc;

fn cluster() -> Arc<InMemoryCluster> {
    let mut cluster = InMemoryCluster::new();
    cluster.add_index(
        IndexMetadata::new("books", "id")
            .field("title", FieldMapping::text())
            .field(
                "abstract",
                FieldMapping::new(FieldType::text_with_analyzer(FULLTEXT_ANALYZER)),
            )
            .field("tags", FieldMapping::keyword())
            .field("price", FieldMapping::double())
            .field("authors", FieldMapping::new(FieldType::Nested))
            .field("authors.name", FieldMapping::keyword())
            .field("authors.role", FieldMapping::keyword())
            .field("reviews", FieldMapping::new(FieldType::Nested))
            .field("reviews.stars", FieldMapping::long()),
    );
    cluster
        .add_documents(
            "books",
            vec![
                json!({
                    "id": 1,
                    "title": "Programming Rust",
                    "tags": ["systems", "lang"],
                    "price": 39.5,
                    "authors": [
                        {"name": "jim", "role": "lead"},
                        {"name": "jason", "role": "editor"}
                    ]
                }),
                json!({
                    "id": 2,
                    "title": "Rust in Action",
                    "tags": ["systems"],
                    "price": 45.0,
                    "authors": [{"name": "tim", "role": "lead"}]
                }),
                json!({
                    "id": 3,
                    "title": "Learning Python",
                    "tags": ["lang", "web"],
                    "price": 30.0,
                    "authors": [{"name": "mark", "role": "lead"}]
                }),
            ],
        )
        .unwrap();
    Arc::new(cluster)
}

fn rewriter_with(cluster: &Arc<InMemoryCluster>, spec: QueryTreeSpec, config: RewriterConfig) -> QueryRewriter {
    QueryRewriter::builder("books", spec.into())
        .resolver(cluster.clone())
        .executor(cluster.clone())
        .config(config)
        .build()
        .unwrap()
}

fn compile(cluster: &Arc<InMemoryCluster>, query: NodeSpec) -> crossdex::Result<QueryFragment> {
    rewriter_with(cluster, QueryTreeSpec::new(query), RewriterConfig::default()).rewrite_query()
}

fn matching_ids(cluster: &InMemoryCluster, query: &QueryFragment) -> Vec<i64> {
    cluster
        .search("books", query)
        .unwrap()
        .iter()
        .filter_map(|doc| doc.get("id").and_then(Value::as_i64))
        .collect()
}

#[test]
fn test_and_or_not() {
    let cluster = cluster();
    let tree = NodeSpec::and(vec![
        NodeSpec::word("title", "rust"),
        NodeSpec::or(vec![
            NodeSpec::word("tags", "web"),
            NodeSpec::word("tags", "systems"),
        ]),
        NodeSpec::not(NodeSpec::word("tags", "lang")),
    ]);

    let query = compile(&cluster, tree).unwrap();
    let expected = QueryFragment::Bool(
        BoolQuery::new()
            .must(QueryFragment::term("title", "rust"))
            .must(QueryFragment::Bool(
                BoolQuery::new()
                    .should(QueryFragment::term("tags", "web"))
                    .should(QueryFragment::term("tags", "systems")),
            ))
            .must(QueryFragment::not(QueryFragment::term("tags", "lang"))),
    );
    assert_eq!(query, expected);
    assert_eq!(matching_ids(&cluster, &query), vec![2]);
}

#[test]
fn test_conjunction_renders_as_bool_must() {
    let cluster = cluster();
    let query = compile(
        &cluster,
        NodeSpec::and(vec![NodeSpec::number("id", 1), NodeSpec::word("tags", "lang")]),
    )
    .unwrap();

    assert_eq!(
        query.to_json(),
        json!({
            "bool": {
                "must": [
                    {"term": {"id": 1}},
                    {"term": {"tags": "lang"}}
                ]
            }
        })
    );
}

#[test]
fn test_ne_is_negated_eq() {
    let cluster = cluster();
    let eq = compile(&cluster, NodeSpec::word("tags", "web").with_operator(Operator::Eq)).unwrap();
    let ne = compile(&cluster, NodeSpec::word("tags", "web").with_operator(Operator::Ne)).unwrap();

    assert_eq!(ne, QueryFragment::not(eq.clone()));
    assert_eq!(matching_ids(&cluster, &eq), vec![3]);
    assert_eq!(matching_ids(&cluster, &ne), vec![1, 2]);
}

#[test]
fn test_double_negation_matches_original() {
    let cluster = cluster();
    let plain = compile(&cluster, NodeSpec::word("title", "rust")).unwrap();
    let doubled = compile(
        &cluster,
        NodeSpec::not(NodeSpec::not(NodeSpec::word("title", "rust"))),
    )
    .unwrap();

    assert_eq!(doubled, QueryFragment::not(QueryFragment::not(plain.clone())));
    assert_eq!(matching_ids(&cluster, &doubled), matching_ids(&cluster, &plain));
}

#[test]
fn test_single_token_phrase_is_a_word() {
    let cluster = cluster();
    let phrase = compile(&cluster, NodeSpec::phrase("title", "Rust")).unwrap();
    let word = compile(&cluster, NodeSpec::word("title", "Rust")).unwrap();
    assert_eq!(phrase, word);

    let phrase = compile(&cluster, NodeSpec::phrase("title", "Programming Rust")).unwrap();
    assert_eq!(phrase, QueryFragment::match_phrase("title", "programming rust"));
    assert_eq!(matching_ids(&cluster, &phrase), vec![1]);
}

#[test]
fn test_proximity_carries_slop_and_order() {
    let cluster = cluster();
    let query = compile(
        &cluster,
        NodeSpec::proximity_phrase("title", "rust programming", 3, false),
    )
    .unwrap();

    assert_eq!(
        query,
        QueryFragment::Span(SpanQuery::near(
            vec![
                SpanQuery::term("title", "rust"),
                SpanQuery::term("title", "programming"),
            ],
            3,
            false,
        ))
    );
}

#[test]
fn test_wildcard_phrase_becomes_span() {
    let cluster = cluster();
    let query = compile(&cluster, NodeSpec::phrase("title", "program* rust")).unwrap();

    assert_eq!(
        query,
        QueryFragment::Span(SpanQuery::near(
            vec![
                SpanQuery::multi_term(QueryFragment::prefix("title", "program")),
                SpanQuery::term("title", "rust"),
            ],
            0,
            true,
        ))
    );

    let single = compile(&cluster, NodeSpec::phrase("title", "r?st")).unwrap();
    assert_eq!(single, QueryFragment::wildcard("title", "r?st"));
    assert_eq!(matching_ids(&cluster, &single), vec![1, 2]);
}

#[test]
fn test_with_shares_one_nested_scope() {
    let cluster = cluster();
    let same_author = compile(
        &cluster,
        NodeSpec::with(vec![
            NodeSpec::word("authors.name", "jim"),
            NodeSpec::word("authors.role", "lead"),
        ]),
    )
    .unwrap();
    assert_eq!(
        same_author,
        QueryFragment::nested(
            "authors",
            QueryFragment::Bool(
                BoolQuery::new()
                    .must(QueryFragment::term("authors.name", "jim"))
                    .must(QueryFragment::term("authors.role", "lead")),
            ),
        )
    );
    assert_eq!(matching_ids(&cluster, &same_author), vec![1]);

    let across_authors = compile(
        &cluster,
        NodeSpec::with(vec![
            NodeSpec::word("authors.name", "jim"),
            NodeSpec::word("authors.role", "editor"),
        ]),
    )
    .unwrap();
    assert!(matching_ids(&cluster, &across_authors).is_empty());
}

#[test]
fn test_nested_leaf_outside_with() {
    let cluster = cluster();
    let query = compile(&cluster, NodeSpec::word("authors.name", "tim")).unwrap();
    assert_eq!(
        query,
        QueryFragment::nested("authors", QueryFragment::term("authors.name", "tim"))
    );
    assert_eq!(matching_ids(&cluster, &query), vec![2]);
}

#[test]
fn test_with_rejects_mixed_nested_paths() {
    let cluster = cluster();
    let err = compile(
        &cluster,
        NodeSpec::with(vec![
            NodeSpec::word("authors.name", "jim"),
            NodeSpec::number("reviews.stars", 5),
        ]),
    )
    .unwrap_err();
    assert!(matches!(err, RewriteError::NestedPathConflict { .. }));
}

#[test]
fn test_comparison_operators() {
    let cluster = cluster();
    let query = compile(&cluster, NodeSpec::number("price", 40).with_operator(Operator::Gt)).unwrap();
    assert_eq!(
        query,
        QueryFragment::range(
            "price",
            RangeBounds {
                gt: Some(json!(40)),
                ..Default::default()
            }
        )
    );
    assert_eq!(matching_ids(&cluster, &query), vec![2]);

    let between = compile(&cluster, NodeSpec::range("price", 30, 40)).unwrap();
    assert_eq!(matching_ids(&cluster, &between), vec![1, 3]);

    let err = compile(&cluster, NodeSpec::null("tags").with_operator(Operator::Gt)).unwrap_err();
    assert_eq!(err.to_string(), "Unsupported operator > for null node");
}

#[test]
fn test_concept_term_frequency_follows_analyzer() {
    let cluster = cluster();
    let min_term_freq = |field: &str| {
        match compile(&cluster, NodeSpec::word(field, "memory safety").with_operator(Operator::Concept)).unwrap() {
            QueryFragment::MoreLikeThis(mlt) => mlt.min_term_freq,
            other => panic!("expected more_like_this, got {:?}", other),
        }
    };

    assert_eq!(min_term_freq("abstract"), 2);
    assert_eq!(min_term_freq("title"), 1);
}

#[test]
fn test_fuzzy_concept_is_unsupported() {
    let cluster = cluster();
    let err = compile(
        &cluster,
        NodeSpec::word("title", "rust").with_operator(Operator::FuzzyConcept),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        RewriteError::UnsupportedOperator {
            operator: Operator::FuzzyConcept,
            ..
        }
    ));
}

#[test]
fn test_arrays() {
    let cluster = cluster();
    let all_of = compile(
        &cluster,
        NodeSpec::array("tags", vec![json!("systems"), json!("lang")], true),
    )
    .unwrap();
    assert_eq!(matching_ids(&cluster, &all_of), vec![1]);

    let any_of = compile(
        &cluster,
        NodeSpec::array("tags", vec![json!("systems"), json!("lang")], false),
    )
    .unwrap();
    assert_eq!(matching_ids(&cluster, &any_of), vec![1, 2, 3]);

    let spec = QueryTreeSpec::new(NodeSpec::array_data("id", "picked")).with_array_data("picked", "[1, 3]");
    let from_data = rewriter_with(&cluster, spec, RewriterConfig::default())
        .rewrite_query()
        .unwrap();
    assert_eq!(from_data, QueryFragment::terms("id", vec![json!("1"), json!("3")]));
    assert_eq!(matching_ids(&cluster, &from_data), vec![1, 3]);
}

#[test]
fn test_boost_is_rendered() {
    let cluster = cluster();
    let query = compile(&cluster, NodeSpec::word("title", "rust").with_boost(2.0)).unwrap();
    assert_eq!(
        query.to_json(),
        json!({"term": {"title": {"value": "rust", "boost": 2.0}}})
    );
}

#[test]
fn test_not_null_on_primary_key_matches_everything() {
    let cluster = cluster();
    assert_eq!(
        compile(&cluster, NodeSpec::not_null("id")).unwrap(),
        QueryFragment::match_all()
    );
    assert_eq!(
        compile(&cluster, NodeSpec::not_null("price")).unwrap(),
        QueryFragment::exists("price")
    );
}

#[test]
fn test_child_scope_follows_config() {
    let cluster = cluster();
    let tree = || QueryTreeSpec::new(NodeSpec::child("comment", vec![NodeSpec::word("title", "rust")]));

    let plain = rewriter_with(&cluster, tree(), RewriterConfig::default())
        .rewrite_query()
        .unwrap();
    assert_eq!(plain, QueryFragment::term("title", "rust"));

    let joined = rewriter_with(&cluster, tree(), RewriterConfig::default().with_parent_child(true))
        .rewrite_query()
        .unwrap();
    assert_eq!(
        joined,
        QueryFragment::has_child("comment", QueryFragment::term("title", "rust"))
    );
}

#[test]
fn test_search_index_name() {
    let cluster = cluster();
    let mut rewriter = rewriter_with(
        &cluster,
        QueryTreeSpec::new(NodeSpec::word("title", "rust")),
        RewriterConfig::default(),
    );
    rewriter.rewrite_query().unwrap();
    assert_eq!(rewriter.search_index_name().unwrap(), "books");
    assert!(rewriter.dump().contains("title"));
}

#[test]
fn test_fuzzy_token_turns_phrase_into_span() {
    let cluster = cluster();
    let query = compile(&cluster, NodeSpec::phrase("title", "rust~2 lang")).unwrap();

    assert_eq!(
        query,
        QueryFragment::Span(SpanQuery::near(
            vec![
                SpanQuery::multi_term(QueryFragment::fuzzy("title", "rust", 2)),
                SpanQuery::term("title", "lang"),
            ],
            0,
            true,
        ))
    );

    let single = compile(&cluster, NodeSpec::phrase("title", "rust~1")).unwrap();
    assert_eq!(single, QueryFragment::fuzzy("title", "rust", 1));

    let escaped = compile(&cluster, NodeSpec::escaped_phrase("title", r"rust\~2 lang")).unwrap();
    assert_eq!(escaped, QueryFragment::match_phrase("title", "rust~2 lang"));
}

#[test]
fn test_explicit_proximity_clauses() {
    let cluster = cluster();
    let query = compile(
        &cluster,
        NodeSpec::proximity(
            "title",
            4,
            false,
            vec![
                NodeSpec::proximity(
                    "title",
                    1,
                    true,
                    vec![NodeSpec::word("title", "rust"), NodeSpec::word("title", "programming")],
                ),
                NodeSpec::null("title"),
                NodeSpec::not_null("title"),
                NodeSpec::fuzzy("title", "rust", 1),
                NodeSpec::phrase("title", "Rust in Action"),
                NodeSpec::word("title", "python").with_boost(2.0),
            ],
        ),
    )
    .unwrap();

    let mut boosted = SpanQuery::term("title", "python");
    boosted.apply_boost(2.0);
    assert_eq!(
        query,
        QueryFragment::Span(SpanQuery::near(
            vec![
                SpanQuery::near(
                    vec![
                        SpanQuery::term("title", "rust"),
                        SpanQuery::term("title", "programming"),
                    ],
                    1,
                    true,
                ),
                SpanQuery::term("title", "null"),
                SpanQuery::multi_term(QueryFragment::wildcard("title", "*")),
                SpanQuery::multi_term(QueryFragment::fuzzy("title", "rust", 1)),
                SpanQuery::near(
                    vec![
                        SpanQuery::term("title", "rust"),
                        SpanQuery::term("title", "in"),
                        SpanQuery::term("title", "action"),
                    ],
                    0,
                    true,
                ),
                boosted,
            ],
            4,
            false,
        ))
    );
    assert_eq!(query.to_json()["span_near"]["slop"], json!(4));
    assert_eq!(
        query.to_json()["span_near"]["clauses"][2],
        json!({"span_multi": {"match": {"wildcard": {"title": "*"}}}})
    );
}

#[test]
fn test_primary_key_match_ignores_case() {
    let cluster = cluster();
    assert_eq!(
        compile(&cluster, NodeSpec::not_null("ID")).unwrap(),
        QueryFragment::match_all()
    );
}
