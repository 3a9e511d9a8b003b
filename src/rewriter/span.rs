//! Phrases and proximity (span) queries
//!
//! Phrase text is analyzed like the target field before it is compiled.
//! Wildcards and escapes would not survive analysis, so they are swapped
//! for marker words first and swapped back on the resulting tokens.

use serde_json::Value;

use super::query::fuzzy_prefix_length;
use super::QueryRewriter;
use crate::ast::{Node, NodeKind, Operator};
use crate::dsl::{QueryFragment, SpanQuery};
use crate::error::RewriteError;
use crate::Result;

/// Marker words and the characters they stand for
const MARKERS: [(&str, char); 4] = [
    ("ZDB_ESCAPE_ZDB", '\\'),
    ("ZDB_STAR_ZDB", '*'),
    ("ZDB_QUESTION_ZDB", '?'),
    ("ZDB_TILDE_ZDB", '~'),
];

/// Replace escapes and wildcard characters with marker words
pub(super) fn protect_wildcards(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match MARKERS.iter().find(|(_, ch)| *ch == c) {
            Some((marker, _)) => out.push_str(marker),
            None => out.push(c),
        }
    }
    out
}

/// Undo [`protect_wildcards`] on an analyzed token
///
/// Analysis may have changed the markers' case, so matching ignores it.
pub(super) fn restore_wildcards(token: &str) -> String {
    let lower = token.to_ascii_lowercase();
    let mut out = String::with_capacity(token.len());
    let mut i = 0;

    'outer: while i < token.len() {
        for (marker, ch) in MARKERS {
            if lower[i..].starts_with(&marker.to_ascii_lowercase()) {
                out.push(ch);
                i += marker.len();
                continue 'outer;
            }
        }
        // advance one whole character
        let c = token[i..].chars().next().unwrap_or_default();
        out.push(c);
        i += c.len_utf8().max(1);
    }
    out
}

/// Number of unescaped `*` and `?` characters
pub(super) fn count_valid_wildcards(token: &str) -> usize {
    let mut count = 0;
    let mut escaped = false;
    for c in token.chars() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '*' || c == '?' {
            count += 1;
        }
    }
    count
}

/// Remove backslash escapes
pub(super) fn unescape(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Byte offset of a trailing unescaped `~digits` suffix, with its fuzziness
fn fuzzy_suffix(token: &str) -> Option<(usize, u32)> {
    let mut escaped = false;
    let mut tilde = None;
    for (i, c) in token.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '~' {
            tilde = Some(i);
        }
    }

    let at = tilde?;
    let digits = &token[at + 1..];
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let fuzziness = if digits.is_empty() {
        0
    } else {
        digits.parse().ok()?
    };
    Some((at, fuzziness))
}

/// Whether a phrase token needs a multi-term query
fn is_wildcard_token(token: &str) -> bool {
    count_valid_wildcards(token) > 0 || fuzzy_suffix(token).is_some()
}

/// Node kind for one phrase token
pub(super) fn token_kind(token: &str) -> NodeKind {
    if let Some((at, fuzziness)) = fuzzy_suffix(token) {
        let stem = &token[..at];
        if at > 0 && count_valid_wildcards(stem) == 0 {
            return NodeKind::Fuzzy {
                value: unescape(stem),
                fuzziness,
            };
        }
    }

    match count_valid_wildcards(token) {
        0 => NodeKind::Word {
            value: Value::String(unescape(token)),
        },
        1 if token.ends_with('*') && !token.ends_with("\\*") => NodeKind::Prefix {
            value: unescape(&token[..token.len() - 1]),
        },
        _ => NodeKind::Wildcard {
            pattern: token.to_string(),
        },
    }
}

/// Leaf node standing in for one token of `phrase`
fn token_node(phrase: &Node, token: &str) -> Node {
    let mut node = Node::new(token_kind(token)).with_operator(phrase.operator);
    node.field = phrase.field.clone();
    node.nested_path = phrase.nested_path.clone();
    node
}

impl QueryRewriter {
    /// Analyze a phrase into tokens with wildcards and escapes restored
    fn tokenize_phrase(&mut self, node: &Node) -> Result<Vec<String>> {
        let field = node.field_name();
        let md = self.metadata.metadata_for_field(field)?;
        let field_type = md.field_type(field).cloned();

        let protected = protect_wildcards(&node.escaped_value());
        let tokens = self
            .analyzer
            .analyze(field, field_type.as_ref(), &protected)?
            .iter()
            .map(|token| restore_wildcards(token))
            .filter(|token| token != "\\")
            .collect();
        Ok(tokens)
    }

    pub(super) fn build_phrase(&mut self, node: &Node) -> Result<QueryFragment> {
        let field = node.field_name().to_string();
        let value = node.string_value();

        if node.operator == Operator::Regex {
            return self.build_standard(node, || Ok(QueryFragment::term(field, value)));
        }

        let (distance, ordered) = match &node.kind {
            NodeKind::Phrase {
                distance, ordered, ..
            } => (*distance, *ordered),
            _ => (0, true),
        };

        let tokens = self.tokenize_phrase(node)?;
        let has_wildcards =
            distance > 0 || !ordered || tokens.iter().any(|token| is_wildcard_token(token));

        match tokens.len() {
            0 => self.build_standard(node, || Ok(QueryFragment::term(field, value))),
            1 if has_wildcards => self.build_leaf(&token_node(node, &tokens[0])),
            _ if has_wildcards => {
                let mut clauses = Vec::with_capacity(tokens.len());
                for token in &tokens {
                    clauses.push(self.build_span_node(node, &token_node(node, token))?);
                }
                Ok(QueryFragment::Span(SpanQuery::near(clauses, distance, ordered)))
            }
            1 => self.build_standard(node, || Ok(QueryFragment::term(field, value))),
            _ => {
                let text = tokens
                    .iter()
                    .map(|token| unescape(token))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.build_standard(node, || Ok(QueryFragment::match_phrase(field, text)))
            }
        }
    }

    pub(super) fn build_proximity(&mut self, node: &Node) -> Result<QueryFragment> {
        Ok(QueryFragment::Span(self.build_span_near(node)?))
    }

    fn build_span_near(&mut self, prox: &Node) -> Result<SpanQuery> {
        let (distance, ordered) = match &prox.kind {
            NodeKind::Proximity { distance, ordered } => (*distance, *ordered),
            _ => (0, true),
        };

        let mut clauses = Vec::with_capacity(prox.children().len());
        for child in prox.children() {
            let node = self.tree.ast.node(*child).clone();
            clauses.push(self.build_span_node(prox, &node)?);
        }
        Ok(SpanQuery::near(clauses, distance, ordered))
    }

    fn build_span_node(&mut self, prox: &Node, node: &Node) -> Result<SpanQuery> {
        let field = prox.field_name();

        let mut span = match &node.kind {
            NodeKind::Word { .. } if prox.operator == Operator::Regex => SpanQuery::multi_term(
                QueryFragment::regexp(node.field_name(), node.escaped_value()),
            ),
            NodeKind::Word { .. }
            | NodeKind::Number { .. }
            | NodeKind::Boolean { .. }
            | NodeKind::Null => SpanQuery::term(field, node.string_value()),
            NodeKind::Fuzzy { value, fuzziness } => SpanQuery::multi_term(QueryFragment::fuzzy(
                field,
                value.as_str(),
                fuzzy_prefix_length(*fuzziness),
            )),
            NodeKind::Prefix { value } => {
                SpanQuery::multi_term(QueryFragment::prefix(field, value.as_str()))
            }
            NodeKind::Wildcard { pattern } => {
                SpanQuery::multi_term(QueryFragment::wildcard(field, pattern.as_str()))
            }
            NodeKind::NotNull => {
                return Ok(SpanQuery::multi_term(QueryFragment::wildcard(field, "*")))
            }
            NodeKind::Phrase { .. } => self.build_span_phrase(prox, node)?,
            NodeKind::Proximity { .. } => self.build_span_near(node)?,
            other => {
                return Err(RewriteError::Rewrite(format!(
                    "Unsupported proximity node: {}",
                    other.name()
                )))
            }
        };

        if let Some(boost) = node.boost {
            span.apply_boost(boost);
        }
        Ok(span)
    }

    fn build_span_phrase(&mut self, prox: &Node, node: &Node) -> Result<SpanQuery> {
        if prox.operator == Operator::Regex {
            return Ok(SpanQuery::multi_term(QueryFragment::regexp(
                node.field_name(),
                node.escaped_value(),
            )));
        }

        let tokens = self.tokenize_phrase(node)?;
        if tokens.len() == 1 {
            return self.build_span_node(prox, &token_node(node, &tokens[0]));
        }

        let mut clauses = Vec::with_capacity(tokens.len());
        for token in &tokens {
            clauses.push(self.build_span_node(prox, &token_node(node, token))?);
        }
        Ok(SpanQuery::near(clauses, 0, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protect_and_restore() {
        let protected = protect_wildcards(r"fo\o* b?r~2");
        assert_eq!(
            protected,
            "foZDB_ESCAPE_ZDBoZDB_STAR_ZDB bZDB_QUESTION_ZDBrZDB_TILDE_ZDB2"
        );
        assert_eq!(restore_wildcards(&protected), r"fo\o* b?r~2");
        // analyzers may lowercase the markers
        assert_eq!(restore_wildcards("barzdb_star_zdb"), "bar*");
        assert_eq!(restore_wildcards("caf\u{e9}zdb_question_zdb"), "caf\u{e9}?");
    }

    #[test]
    fn test_count_valid_wildcards() {
        assert_eq!(count_valid_wildcards("a*b?"), 2);
        assert_eq!(count_valid_wildcards(r"a\*b"), 0);
        assert_eq!(count_valid_wildcards(r"a\\*"), 1);
        assert_eq!(count_valid_wildcards("plain"), 0);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\*b"), "a*b");
        assert_eq!(unescape(r"a\\b"), r"a\b");
        assert_eq!(unescape(r"trailing\"), "trailing");
    }

    #[test]
    fn test_token_kind() {
        assert_eq!(
            token_kind("rust"),
            NodeKind::Word {
                value: Value::String("rust".to_string())
            }
        );
        assert_eq!(
            token_kind("ru*"),
            NodeKind::Prefix {
                value: "ru".to_string()
            }
        );
        assert_eq!(
            token_kind("r*st"),
            NodeKind::Wildcard {
                pattern: "r*st".to_string()
            }
        );
        assert_eq!(
            token_kind("ru?t*"),
            NodeKind::Wildcard {
                pattern: "ru?t*".to_string()
            }
        );
        assert_eq!(
            token_kind("rust~2"),
            NodeKind::Fuzzy {
                value: "rust".to_string(),
                fuzziness: 2
            }
        );
        assert_eq!(
            token_kind("rust~"),
            NodeKind::Fuzzy {
                value: "rust".to_string(),
                fuzziness: 0
            }
        );
        assert_eq!(
            token_kind(r"rust\*"),
            NodeKind::Word {
                value: Value::String("rust*".to_string())
            }
        );
        assert_eq!(
            token_kind(r"rust\~2"),
            NodeKind::Word {
                value: Value::String("rust~2".to_string())
            }
        );
    }
}
