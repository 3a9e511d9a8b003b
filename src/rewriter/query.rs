//! Node-by-node query compilation

use serde_json::Value;

use super::QueryRewriter;
use crate::ast::{ArrayValues, Node, NodeId, NodeKind, Operator};
use crate::dsl::{BoolQuery, MoreLikeThis, QueryFragment, RangeBounds};
use crate::error::RewriteError;
use crate::schema::FULLTEXT_ANALYZER;
use crate::Result;

/// Delimiters between values of an array-data block
const ARRAY_DATA_DELIMITERS: &[char] = &[',', ' ', '\r', '\n', '\t', '\u{c}', '"', '\'', '[', ']'];

/// Prefix length used for fuzzy terms that carry no explicit fuzziness
pub(super) fn fuzzy_prefix_length(fuzziness: u32) -> u32 {
    if fuzziness == 0 {
        3
    } else {
        fuzziness
    }
}

/// Split an array-data block into values, honouring backslash escapes
pub(super) fn split_array_data(data: &str) -> Vec<Value> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = data.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if ARRAY_DATA_DELIMITERS.contains(&c) {
            if !current.is_empty() {
                values.push(Value::String(std::mem::take(&mut current)));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        values.push(Value::String(current));
    }
    values
}

impl QueryRewriter {
    /// Compile the subtree at `id`
    pub(super) fn build(&mut self, id: NodeId) -> Result<QueryFragment> {
        let node = self.tree.ast.node(id).clone();

        match &node.kind {
            NodeKind::And => {
                let mut bool_query = BoolQuery::new();
                for child in node.children() {
                    bool_query = bool_query.must(self.build(*child)?);
                }
                Ok(QueryFragment::Bool(bool_query))
            }
            NodeKind::Or => {
                let mut bool_query = BoolQuery::new();
                for child in node.children() {
                    bool_query = bool_query.should(self.build(*child)?);
                }
                Ok(QueryFragment::Bool(bool_query))
            }
            NodeKind::Not => {
                if self.state.building_aggregate {
                    return Ok(QueryFragment::match_all());
                }
                let mut bool_query = BoolQuery::new();
                for child in node.children() {
                    bool_query = bool_query.must_not(self.build(*child)?);
                }
                Ok(QueryFragment::Bool(bool_query))
            }
            NodeKind::With => self.build_with(id, &node),
            NodeKind::Child { type_name } => match node.children().first() {
                None => Ok(QueryFragment::match_all()),
                Some(child) => {
                    let inner = self.build(*child)?;
                    if self.config.use_parent_child {
                        Ok(QueryFragment::has_child(type_name.as_str(), inner))
                    } else {
                        Ok(inner)
                    }
                }
            },
            NodeKind::Parent { type_name } => {
                if self.state.building_aggregate {
                    return Ok(QueryFragment::match_all());
                }
                match node.children().first() {
                    None => Ok(QueryFragment::match_all()),
                    Some(child) => {
                        let inner = self.build(*child)?;
                        if self.config.use_parent_child {
                            Ok(QueryFragment::has_parent(type_name.as_str(), inner))
                        } else {
                            Ok(inner)
                        }
                    }
                }
            }
            NodeKind::Expansion { generated, .. } => self.build_expansion(id, *generated),
            _ => {
                let mut fragment = self.build_leaf(&node)?;
                if let Some(boost) = node.boost {
                    fragment.apply_boost(boost);
                }
                Ok(fragment)
            }
        }
    }

    pub(super) fn build_leaf(&mut self, node: &Node) -> Result<QueryFragment> {
        let field = node.field_name().to_string();

        match &node.kind {
            NodeKind::Word { value } | NodeKind::Number { value } => {
                let value = value.clone();
                self.build_standard(node, || Ok(QueryFragment::term(field, value)))
            }
            NodeKind::Boolean { value } => {
                validate_operator(node)?;
                let value = *value;
                self.build_standard(node, || Ok(QueryFragment::term(field, value)))
            }
            NodeKind::Phrase { .. } => self.build_phrase(node),
            NodeKind::Range { from, to } => {
                validate_operator(node)?;
                let bounds = RangeBounds::between(from.clone(), to.clone());
                self.build_standard(node, || Ok(QueryFragment::range(field, bounds)))
            }
            NodeKind::Wildcard { pattern } => {
                validate_operator(node)?;
                let pattern = pattern.clone();
                self.build_standard(node, || Ok(QueryFragment::wildcard(field, pattern)))
            }
            NodeKind::Fuzzy { value, fuzziness } => {
                validate_operator(node)?;
                let prefix_length = fuzzy_prefix_length(*fuzziness);
                let value = value.clone();
                self.build_standard(node, || {
                    Ok(QueryFragment::fuzzy(field, value, prefix_length))
                })
            }
            NodeKind::Prefix { value } => {
                validate_operator(node)?;
                let value = value.clone();
                self.build_standard(node, || Ok(QueryFragment::prefix(field, value)))
            }
            NodeKind::Null => {
                validate_operator(node)?;
                self.build_standard(node, || Ok(QueryFragment::missing(field)))
            }
            NodeKind::NotNull => {
                // every document has a primary key, whatever case it is spelled in
                let md = self.metadata.metadata_for_field(&field)?;
                if md.primary_key.eq_ignore_ascii_case(&field) {
                    return Ok(QueryFragment::match_all());
                }
                validate_operator(node)?;
                self.build_standard(node, || Ok(QueryFragment::exists(field)))
            }
            NodeKind::Array {
                values,
                conjunctive,
            } => {
                validate_operator(node)?;
                let count = match values {
                    ArrayValues::Literal(values) => values.len(),
                    ArrayValues::External { total_hits, .. } => *total_hits as usize,
                };
                let is_ne = node.operator == Operator::Ne;
                let minimum_should_match = (*conjunctive != is_ne).then_some(count);
                let values = values.values().to_vec();
                self.build_standard(node, || {
                    Ok(QueryFragment::Terms {
                        field,
                        values,
                        minimum_should_match,
                        boost: None,
                    })
                })
            }
            NodeKind::ArrayData { key } => {
                validate_operator(node)?;
                let data = self.tree.array_data.get(key).cloned().ok_or_else(|| {
                    RewriteError::Rewrite(format!("No array data for key '{}'", key))
                })?;
                self.build_standard(node, || {
                    Ok(QueryFragment::terms(field, split_array_data(&data)))
                })
            }
            NodeKind::Script { source } => Ok(QueryFragment::script(source.trim())),
            NodeKind::Proximity { .. } => self.build_proximity(node),
            other => Err(RewriteError::Rewrite(format!(
                "Unexpected node type: {}",
                other.name()
            ))),
        }
    }

    fn build_with(&mut self, id: NodeId, node: &Node) -> Result<QueryFragment> {
        if self.state.with_depth == 0 {
            self.state.with_nested_path = self.shared_nested_path(id)?;
        }

        self.state.with_depth += 1;
        let mut bool_query = BoolQuery::new();
        let mut outcome = Ok(());
        for child in node.children() {
            match self.build(*child) {
                Ok(fragment) => bool_query = bool_query.must(fragment),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        self.state.with_depth -= 1;
        outcome?;

        if self.state.with_depth > 0 {
            return Ok(QueryFragment::Bool(bool_query));
        }
        match self.state.with_nested_path.take() {
            Some(path) => Ok(QueryFragment::nested(path, QueryFragment::Bool(bool_query))),
            None => Ok(QueryFragment::Bool(bool_query)),
        }
    }

    /// The one nested path used by the leaves below a `With` node
    fn shared_nested_path(&mut self, id: NodeId) -> Result<Option<String>> {
        let mut shared: Option<String> = None;
        for leaf in self.tree.ast.descendants(id) {
            let node = self.tree.ast.node(leaf).clone();
            if !node.kind.is_leaf() {
                continue;
            }
            let Some(path) = self.nested_path_of(&node)? else {
                continue;
            };
            match &shared {
                None => shared = Some(path),
                Some(active) if *active != path => {
                    return Err(RewriteError::NestedPathConflict {
                        path,
                        active: active.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(shared)
    }

    /// Nested scope of a leaf, from the parser or the field's mapping
    pub(super) fn nested_path_of(&mut self, node: &Node) -> Result<Option<String>> {
        if let Some(path) = &node.nested_path {
            return Ok(Some(path.clone()));
        }
        let Some(field) = node.field.as_deref() else {
            return Ok(None);
        };
        let md = self.metadata.metadata_for_field(field)?;
        Ok(md.nested_path(field).map(str::to_string))
    }

    /// Compile a leaf according to its operator
    ///
    /// `base` produces the fragment for EQ and CONTAINS; the other
    /// operators derive theirs from the node itself.
    pub(super) fn build_standard(
        &mut self,
        node: &Node,
        base: impl FnOnce() -> Result<QueryFragment>,
    ) -> Result<QueryFragment> {
        let field = node.field_name();
        let fragment = match node.operator {
            Operator::Eq | Operator::Contains => base()?,
            Operator::Ne => QueryFragment::not(base()?),
            Operator::Lt => QueryFragment::range(
                field,
                RangeBounds {
                    lt: Some(node.json_value()),
                    ..Default::default()
                },
            ),
            Operator::Gt => QueryFragment::range(
                field,
                RangeBounds {
                    gt: Some(node.json_value()),
                    ..Default::default()
                },
            ),
            Operator::Lte => QueryFragment::range(
                field,
                RangeBounds {
                    lte: Some(node.json_value()),
                    ..Default::default()
                },
            ),
            Operator::Gte => QueryFragment::range(
                field,
                RangeBounds {
                    gte: Some(node.json_value()),
                    ..Default::default()
                },
            ),
            Operator::Regex => QueryFragment::regexp(field, node.escaped_value()),
            Operator::Concept => {
                let md = self.metadata.metadata_for_field(field)?;
                let min_term_freq = match md.analyzer(field) {
                    Some(name) if name.eq_ignore_ascii_case(FULLTEXT_ANALYZER) => 2,
                    _ => 1,
                };
                let concept = &self.config.concept;
                QueryFragment::MoreLikeThis(MoreLikeThis {
                    fields: vec![field.to_string()],
                    like_text: node.string_value(),
                    max_query_terms: concept.max_query_terms,
                    min_word_length: concept.min_word_length,
                    min_term_freq,
                    stop_words: concept.stop_words.clone(),
                    boost: None,
                })
            }
            Operator::FuzzyConcept => {
                return Err(RewriteError::UnsupportedOperator {
                    operator: node.operator,
                    kind: node.kind.name(),
                })
            }
        };

        self.maybe_nest(node, fragment)
    }

    /// Wrap a leaf's fragment in its nested scope when needed
    fn maybe_nest(&mut self, node: &Node, fragment: QueryFragment) -> Result<QueryFragment> {
        let Some(path) = self.nested_path_of(node)? else {
            // aggregation filters only constrain nested documents
            if self.state.building_aggregate {
                return Ok(QueryFragment::match_all());
            }
            return Ok(fragment);
        };

        if self.state.with_depth == 0 {
            return Ok(QueryFragment::nested(path, fragment));
        }

        match &self.state.with_nested_path {
            Some(active) if *active != path => Err(RewriteError::NestedPathConflict {
                path,
                active: active.clone(),
            }),
            _ => Ok(fragment),
        }
    }
}

/// Only EQ, NE and CONTAINS make sense for most leaf kinds
fn validate_operator(node: &Node) -> Result<()> {
    match node.operator {
        Operator::Eq | Operator::Ne | Operator::Contains => Ok(()),
        operator => Err(RewriteError::UnsupportedOperator {
            operator,
            kind: node.kind.name(),
        }),
    }
}
