//! Evaluate compiled fragments against in-memory JSON documents
//!
//! Covers the fragment kinds the in-memory cluster needs to answer scans:
//! match-all, term, terms, range, missing, exists, bool, constant-score,
//! nested, prefix, wildcard, regexp and match-phrase. Join queries evaluate
//! their inner query against the same document. Other kinds never match.

use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

use crate::dsl::{compare_values, scalar_text, BoolQuery, QueryFragment};

/// Whether `doc` satisfies `fragment`
pub fn evaluate(fragment: &QueryFragment, doc: &Value) -> bool {
    match fragment {
        QueryFragment::MatchAll { .. } => true,
        QueryFragment::Term { field, value, .. } => {
            field_values(doc, field).any(|v| value_matches(v, value))
        }
        QueryFragment::Terms {
            field,
            values,
            minimum_should_match,
            ..
        } => {
            let matched = values
                .iter()
                .filter(|term| field_values(doc, field).any(|v| value_matches(v, term)))
                .count();
            matched > 0 && matched >= minimum_should_match.unwrap_or(1)
        }
        QueryFragment::MatchPhrase { field, text, .. } => {
            let needle = text.to_lowercase();
            field_values(doc, field)
                .any(|v| scalar_text(v).to_lowercase().contains(&needle))
        }
        QueryFragment::Range { field, bounds } => {
            field_values(doc, field).any(|v| bounds.contains(v))
        }
        QueryFragment::Regexp { field, pattern, .. } => {
            match Regex::new(&format!("^(?:{})$", pattern)) {
                Ok(regex) => any_term(doc, field, |term| regex.is_match(term)),
                Err(_) => false,
            }
        }
        QueryFragment::Wildcard { field, pattern, .. } => match wildcard_regex(pattern) {
            Some(regex) => any_term(doc, field, |term| regex.is_match(term)),
            None => false,
        },
        QueryFragment::Prefix { field, value, .. } => {
            let prefix = value.to_lowercase();
            any_term(doc, field, |term| term.starts_with(&prefix))
        }
        QueryFragment::Missing { field } => field_values(doc, field).next().is_none(),
        QueryFragment::Exists { field } => field_values(doc, field).next().is_some(),
        QueryFragment::Bool(query) => evaluate_bool(query, doc),
        QueryFragment::ConstantScore { filter, .. } => evaluate(filter, doc),
        QueryFragment::Nested { path, query, .. } => evaluate_nested(path, query, doc),
        QueryFragment::HasChild { query, .. } | QueryFragment::HasParent { query, .. } => {
            evaluate(query, doc)
        }
        QueryFragment::Fuzzy { .. }
        | QueryFragment::MoreLikeThis(_)
        | QueryFragment::Script { .. }
        | QueryFragment::Span(_) => false,
    }
}

fn evaluate_bool(query: &BoolQuery, doc: &Value) -> bool {
    if !query.must.iter().all(|q| evaluate(q, doc)) {
        return false;
    }
    if query.must_not.iter().any(|q| evaluate(q, doc)) {
        return false;
    }
    if query.should.is_empty() {
        return true;
    }

    let required = match query.minimum_should_match {
        Some(n) => n,
        None if query.must.is_empty() => 1,
        None => 0,
    };
    query.should.iter().filter(|q| evaluate(q, doc)).count() >= required
}

/// Match when one object under `path` satisfies the query on its own
fn evaluate_nested(path: &str, query: &QueryFragment, doc: &Value) -> bool {
    let Some(Value::Array(items)) = doc.get(path) else {
        return evaluate(query, doc);
    };

    items.iter().any(|item| {
        let mut scoped = doc.clone();
        if let Some(object) = scoped.as_object_mut() {
            object.insert(path.to_string(), item.clone());
        }
        evaluate(query, &scoped)
    })
}

/// Non-null values of a (possibly dotted) field, arrays flattened
pub fn field_values<'a>(doc: &'a Value, field: &str) -> impl Iterator<Item = &'a Value> + 'a {
    let mut out = Vec::new();
    match doc.get(field) {
        Some(value) => flatten(value, &mut out),
        None => collect_path(doc, &field.split('.').collect::<Vec<_>>(), &mut out),
    }
    out.into_iter()
}

fn collect_path<'a>(value: &'a Value, path: &[&str], out: &mut Vec<&'a Value>) {
    match (value, path.split_first()) {
        (Value::Array(items), _) => {
            for item in items {
                collect_path(item, path, out);
            }
        }
        (Value::Object(object), Some((head, rest))) => {
            if let Some(next) = object.get(*head) {
                if rest.is_empty() {
                    flatten(next, out);
                } else {
                    collect_path(next, rest, out);
                }
            }
        }
        _ => {}
    }
}

fn flatten<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                flatten(item, out);
            }
        }
        other => out.push(other),
    }
}

/// Exact match, or a case-insensitive match against one word of a string
fn value_matches(doc_value: &Value, term: &Value) -> bool {
    if compare_values(doc_value, term) == Some(Ordering::Equal) {
        return true;
    }
    match (doc_value, term) {
        (Value::String(text), Value::String(term)) => {
            let term = term.to_lowercase();
            text.to_lowercase() == term || words(text).any(|word| word == term)
        }
        _ => false,
    }
}

/// Apply `predicate` to the whole lowercased value and to each of its words
fn any_term(doc: &Value, field: &str, predicate: impl Fn(&str) -> bool) -> bool {
    field_values(doc, field).any(|v| {
        let text = scalar_text(v).to_lowercase();
        predicate(&text) || words(&text).any(|word| predicate(&word))
    })
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

/// Convert a wildcard pattern to an anchored, case-insensitive regex
///
/// Backslash-escaped `*` and `?` match literally.
pub fn wildcard_regex(pattern: &str) -> Option<Regex> {
    let mut regex_pattern = String::from("(?i)^");
    let mut chars = pattern.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '*' => regex_pattern.push_str(".*"),
            '?' => regex_pattern.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    regex_pattern.push_str(&regex::escape(&next.to_string()));
                }
            }
            _ => regex_pattern.push_str(&regex::escape(&ch.to_string())),
        }
    }

    regex_pattern.push('$');
    Regex::new(&regex_pattern).ok()
}
