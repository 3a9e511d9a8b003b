//! Nested exchange format for parsed query trees
//!
//! The parser hands trees over as nested JSON. [`NodeSpec`] mirrors that
//! shape and is flattened into the [`Ast`] arena by [`NodeSpec::insert`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{
    Aggregate, ArrayValues, Ast, IndexLink, Node, NodeId, NodeKind, Operator, QueryTree, Suggest,
};
use crate::Result;

/// One node of a nested query tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            field: None,
            operator: Operator::default(),
            boost: None,
            nested_path: None,
            children: Vec::new(),
        }
    }

    fn leaf(field: &str, kind: NodeKind) -> Self {
        Self::new(kind).with_field(field)
    }

    fn composite(kind: NodeKind, children: Vec<NodeSpec>) -> Self {
        Self {
            children,
            ..Self::new(kind)
        }
    }

    pub fn word(field: &str, value: impl Into<Value>) -> Self {
        Self::leaf(field, NodeKind::Word { value: value.into() })
    }

    /// Phrase whose text carries no escapes
    pub fn phrase(field: &str, text: &str) -> Self {
        Self::leaf(
            field,
            NodeKind::Phrase {
                value: text.to_string(),
                escaped: None,
                distance: 0,
                ordered: true,
            },
        )
    }

    /// Phrase given in its escaped source form; the plain value drops the backslashes
    pub fn escaped_phrase(field: &str, escaped: &str) -> Self {
        let mut value = String::with_capacity(escaped.len());
        let mut chars = escaped.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    value.push(next);
                }
            } else {
                value.push(c);
            }
        }
        Self::leaf(
            field,
            NodeKind::Phrase {
                value,
                escaped: Some(escaped.to_string()),
                distance: 0,
                ordered: true,
            },
        )
    }

    /// Phrase whose words may be up to `distance` positions apart
    pub fn proximity_phrase(field: &str, text: &str, distance: u32, ordered: bool) -> Self {
        Self::leaf(
            field,
            NodeKind::Phrase {
                value: text.to_string(),
                escaped: None,
                distance,
                ordered,
            },
        )
    }

    pub fn number(field: &str, value: impl Into<Value>) -> Self {
        Self::leaf(field, NodeKind::Number { value: value.into() })
    }

    pub fn boolean(field: &str, value: bool) -> Self {
        Self::leaf(field, NodeKind::Boolean { value })
    }

    pub fn range(field: &str, from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self::leaf(
            field,
            NodeKind::Range {
                from: from.into(),
                to: to.into(),
            },
        )
    }

    pub fn wildcard(field: &str, pattern: &str) -> Self {
        Self::leaf(
            field,
            NodeKind::Wildcard {
                pattern: pattern.to_string(),
            },
        )
    }

    pub fn fuzzy(field: &str, value: &str, fuzziness: u32) -> Self {
        Self::leaf(
            field,
            NodeKind::Fuzzy {
                value: value.to_string(),
                fuzziness,
            },
        )
    }

    pub fn prefix(field: &str, value: &str) -> Self {
        Self::leaf(
            field,
            NodeKind::Prefix {
                value: value.to_string(),
            },
        )
    }

    pub fn null(field: &str) -> Self {
        Self::leaf(field, NodeKind::Null)
    }

    pub fn not_null(field: &str) -> Self {
        Self::leaf(field, NodeKind::NotNull)
    }

    /// Literal array; `conjunctive` requires every value to match
    pub fn array(field: &str, values: Vec<Value>, conjunctive: bool) -> Self {
        Self::leaf(
            field,
            NodeKind::Array {
                values: ArrayValues::Literal(values),
                conjunctive,
            },
        )
    }

    pub fn array_data(field: &str, key: &str) -> Self {
        Self::leaf(field, NodeKind::ArrayData { key: key.to_string() })
    }

    pub fn script(source: &str) -> Self {
        Self::new(NodeKind::Script {
            source: source.to_string(),
        })
    }

    pub fn and(children: Vec<NodeSpec>) -> Self {
        Self::composite(NodeKind::And, children)
    }

    pub fn or(children: Vec<NodeSpec>) -> Self {
        Self::composite(NodeKind::Or, children)
    }

    pub fn not(child: NodeSpec) -> Self {
        Self::composite(NodeKind::Not, vec![child])
    }

    pub fn with(children: Vec<NodeSpec>) -> Self {
        Self::composite(NodeKind::With, children)
    }

    pub fn child(type_name: &str, children: Vec<NodeSpec>) -> Self {
        Self::composite(
            NodeKind::Child {
                type_name: type_name.to_string(),
            },
            children,
        )
    }

    pub fn parent(type_name: &str, children: Vec<NodeSpec>) -> Self {
        Self::composite(
            NodeKind::Parent {
                type_name: type_name.to_string(),
            },
            children,
        )
    }

    pub fn proximity(field: &str, distance: u32, ordered: bool, children: Vec<NodeSpec>) -> Self {
        Self::composite(NodeKind::Proximity { distance, ordered }, children).with_field(field)
    }

    pub fn expansion(link: IndexLink, query: NodeSpec) -> Self {
        Self::composite(
            NodeKind::Expansion {
                link,
                generated: false,
            },
            vec![query],
        )
    }

    /// Expansion synthesized by the link optimizer
    pub fn generated_expansion(link: IndexLink, query: NodeSpec) -> Self {
        Self::composite(
            NodeKind::Expansion {
                link,
                generated: true,
            },
            vec![query],
        )
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = Some(boost);
        self
    }

    pub fn with_nested_path(mut self, path: impl Into<String>) -> Self {
        self.nested_path = Some(path.into());
        self
    }

    /// Flatten this node and its descendants into `ast`, returning the new root id
    pub fn insert(self, ast: &mut Ast) -> NodeId {
        let NodeSpec {
            kind,
            field,
            operator,
            boost,
            nested_path,
            children,
        } = self;

        let mut node = Node::new(kind).with_operator(operator);
        node.field = field;
        node.boost = boost;
        node.nested_path = nested_path;

        let id = ast.push(node);
        for child in children {
            let child_id = child.insert(ast);
            ast.add_child(id, child_id);
        }
        id
    }
}

/// A whole parsed query in exchange form
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryTreeSpec {
    pub options: Vec<IndexLink>,
    pub query: Option<NodeSpec>,
    pub aggregate: Option<Aggregate>,
    pub suggest: Option<Suggest>,
    pub array_data: HashMap<String, String>,
}

impl QueryTreeSpec {
    pub fn new(query: NodeSpec) -> Self {
        Self {
            query: Some(query),
            ..Self::default()
        }
    }

    pub fn with_option(mut self, link: IndexLink) -> Self {
        self.options.push(link);
        self
    }

    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn with_suggest(mut self, suggest: Suggest) -> Self {
        self.suggest = Some(suggest);
        self
    }

    pub fn with_array_data(mut self, key: impl Into<String>, data: impl Into<String>) -> Self {
        self.array_data.insert(key.into(), data.into());
        self
    }
}

impl From<QueryTreeSpec> for QueryTree {
    fn from(spec: QueryTreeSpec) -> Self {
        let mut tree = QueryTree::new();
        tree.root = spec.query.map(|query| query.insert(&mut tree.ast));
        tree.options = spec.options;
        tree.aggregate = spec.aggregate;
        tree.suggest = spec.suggest;
        tree.array_data = spec.array_data;
        tree
    }
}

impl QueryTree {
    pub fn from_spec(spec: QueryTreeSpec) -> Self {
        spec.into()
    }

    /// Decode a tree from its JSON exchange form
    pub fn from_json_str(json: &str) -> Result<Self> {
        let spec: QueryTreeSpec = serde_json::from_str(json)?;
        Ok(spec.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_preserves_order() {
        let mut ast = Ast::new();
        let root = NodeSpec::and(vec![
            NodeSpec::word("a", "1"),
            NodeSpec::not(NodeSpec::word("b", "2")),
        ])
        .insert(&mut ast);

        let children = ast.children(root).to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(ast.node(children[0]).field_name(), "a");
        assert_eq!(ast.node(children[1]).kind, NodeKind::Not);
        assert_eq!(ast.parent(children[1]), Some(root));
    }

    #[test]
    fn test_tree_from_json() {
        let tree = QueryTree::from_json_str(
            r#"{
                "options": [{"name": "vol", "left_field": "id", "index_name": "db.public.volumes", "right_field": "book_id"}],
                "query": {
                    "type": "or",
                    "children": [
                        {"type": "word", "field": "title", "value": "rust", "operator": "EQ", "boost": 2.0},
                        {"type": "phrase", "field": "body", "value": "hello world", "distance": 3, "ordered": false}
                    ]
                }
            }"#,
        )
        .unwrap();

        let root = tree.root.unwrap();
        assert_eq!(tree.ast.node(root).kind, NodeKind::Or);
        let word = tree.ast.node(tree.ast.children(root)[0]);
        assert_eq!(word.operator, Operator::Eq);
        assert_eq!(word.boost, Some(2.0));
        assert_eq!(word.json_value(), json!("rust"));
        assert_eq!(tree.options[0].name.as_deref(), Some("vol"));

        let phrase = tree.ast.node(tree.ast.children(root)[1]);
        assert_eq!(
            phrase.kind,
            NodeKind::Phrase {
                value: "hello world".to_string(),
                escaped: None,
                distance: 3,
                ordered: false
            }
        );
    }

    #[test]
    fn test_escaped_phrase_unescapes_value() {
        let spec = NodeSpec::escaped_phrase("f", r"a\*b c");
        match spec.kind {
            NodeKind::Phrase { value, escaped, .. } => {
                assert_eq!(value, "a*b c");
                assert_eq!(escaped.as_deref(), Some(r"a\*b c"));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_bad_tree_is_parse_error() {
        let err = QueryTree::from_json_str(r#"{"query": {"type": "nonsense"}}"#).unwrap_err();
        assert!(matches!(err, crate::RewriteError::ParseDelegation(_)));
    }
}
