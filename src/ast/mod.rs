//! Abstract Syntax Tree for parsed queries
//!
//! The tree produced by the query parser is stored in an [`Ast`] arena and
//! addressed by [`NodeId`]. Nodes keep both their child edges and a parent
//! back-reference, so the expansion engine can replace a node in place by
//! overwriting its arena slot: every id that pointed at the old node now
//! resolves to its replacement.

pub mod aggregate;
pub mod spec;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::{self, Write};

pub use aggregate::{Aggregate, AggregateKind, RangeSpecEntry, SortOrder, Suggest};
pub use spec::{NodeSpec, QueryTreeSpec};

/// Index of a node inside an [`Ast`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Comparison operator attached to a node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Eq,
    Ne,
    #[default]
    Contains,
    Lt,
    Gt,
    Lte,
    Gte,
    Regex,
    Concept,
    FuzzyConcept,
}

impl Operator {
    /// Query-language spelling of the operator
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Contains => ":",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Lte => "<=",
            Operator::Gte => ">=",
            Operator::Regex => ":~",
            Operator::Concept => ":@",
            Operator::FuzzyConcept => ":@~",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Join between the current index and another index
///
/// `left_field` lives in the index the link is evaluated from, `right_field`
/// in `index_name`. A link carrying a `name` makes fields addressable as
/// `name.field`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub left_field: String,
    pub index_name: String,
    pub right_field: String,
}

impl IndexLink {
    pub fn new(
        left_field: impl Into<String>,
        index_name: impl Into<String>,
        right_field: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            left_field: left_field.into(),
            index_name: index_name.into(),
            right_field: right_field.into(),
        }
    }

    /// Create a link whose fields are addressed through `name.`
    pub fn named(
        name: impl Into<String>,
        left_field: impl Into<String>,
        index_name: impl Into<String>,
        right_field: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(left_field, index_name, right_field)
        }
    }
}

impl fmt::Display for IndexLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{}:", name)?;
        }
        write!(f, "{}=<{}>{}", self.left_field, self.index_name, self.right_field)
    }
}

/// Values of an array leaf
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayValues {
    /// Values written in the query text
    Literal(Vec<Value>),
    /// Values materialized by an expansion scan
    External { values: Vec<Value>, total_hits: u64 },
}

impl ArrayValues {
    pub fn values(&self) -> &[Value] {
        match self {
            ArrayValues::Literal(values) => values,
            ArrayValues::External { values, .. } => values,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, ArrayValues::External { .. })
    }
}

/// Node variants
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Word {
        value: Value,
    },
    Phrase {
        value: String,
        /// Phrase text with its backslash escapes intact
        #[serde(default, skip_serializing_if = "Option::is_none")]
        escaped: Option<String>,
        #[serde(default)]
        distance: u32,
        #[serde(default = "default_ordered")]
        ordered: bool,
    },
    Range {
        from: Value,
        to: Value,
    },
    Wildcard {
        pattern: String,
    },
    Fuzzy {
        value: String,
        #[serde(default)]
        fuzziness: u32,
    },
    Prefix {
        value: String,
    },
    Null,
    NotNull,
    Boolean {
        value: bool,
    },
    Number {
        value: Value,
    },
    Array {
        values: ArrayValues,
        /// All values must match rather than any one of them
        #[serde(default)]
        conjunctive: bool,
    },
    /// Reference to a block of values supplied next to the query text
    ArrayData {
        key: String,
    },
    Script {
        source: String,
    },
    And,
    Or,
    Not,
    With,
    Child {
        type_name: String,
    },
    Parent {
        type_name: String,
    },
    Proximity {
        distance: u32,
        #[serde(default = "default_ordered")]
        ordered: bool,
    },
    /// Cross-index reference; child 0 is the query evaluated against `link`
    Expansion {
        link: IndexLink,
        /// Synthesized by the link optimizer rather than written by the user
        #[serde(default)]
        generated: bool,
    },
}

fn default_ordered() -> bool {
    true
}

impl NodeKind {
    /// Get the node type name for errors and dumps
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Word { .. } => "word",
            NodeKind::Phrase { .. } => "phrase",
            NodeKind::Range { .. } => "range",
            NodeKind::Wildcard { .. } => "wildcard",
            NodeKind::Fuzzy { .. } => "fuzzy",
            NodeKind::Prefix { .. } => "prefix",
            NodeKind::Null => "null",
            NodeKind::NotNull => "not_null",
            NodeKind::Boolean { .. } => "boolean",
            NodeKind::Number { .. } => "number",
            NodeKind::Array { .. } => "array",
            NodeKind::ArrayData { .. } => "array_data",
            NodeKind::Script { .. } => "script",
            NodeKind::And => "and",
            NodeKind::Or => "or",
            NodeKind::Not => "not",
            NodeKind::With => "with",
            NodeKind::Child { .. } => "child",
            NodeKind::Parent { .. } => "parent",
            NodeKind::Proximity { .. } => "proximity",
            NodeKind::Expansion { .. } => "expansion",
        }
    }

    /// Whether this kind is a field predicate rather than a composite
    pub fn is_leaf(&self) -> bool {
        !matches!(
            self,
            NodeKind::And
                | NodeKind::Or
                | NodeKind::Not
                | NodeKind::With
                | NodeKind::Child { .. }
                | NodeKind::Parent { .. }
                | NodeKind::Proximity { .. }
                | NodeKind::Expansion { .. }
        )
    }
}

/// A node of the query tree
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub field: Option<String>,
    pub operator: Operator,
    pub boost: Option<f32>,
    pub nested_path: Option<String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            field: None,
            operator: Operator::default(),
            boost: None,
            nested_path: None,
            children: Vec::new(),
            parent: None,
        }
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

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Field name, or an empty string for field-less nodes
    pub fn field_name(&self) -> &str {
        self.field.as_deref().unwrap_or("")
    }

    /// The node's value rendered as text
    pub fn string_value(&self) -> String {
        match &self.kind {
            NodeKind::Word { value } | NodeKind::Number { value } => match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            NodeKind::Phrase { value, .. } => value.clone(),
            NodeKind::Wildcard { pattern } => pattern.clone(),
            NodeKind::Fuzzy { value, .. } | NodeKind::Prefix { value } => value.clone(),
            NodeKind::Null => "null".to_string(),
            NodeKind::NotNull => "*".to_string(),
            NodeKind::Boolean { value } => value.to_string(),
            NodeKind::Script { source } => source.clone(),
            NodeKind::ArrayData { key } => key.clone(),
            _ => String::new(),
        }
    }

    /// The node's value as it should appear in a term-level query
    pub fn json_value(&self) -> Value {
        match &self.kind {
            NodeKind::Word { value } | NodeKind::Number { value } => value.clone(),
            NodeKind::Boolean { value } => Value::Bool(*value),
            _ => Value::String(self.string_value()),
        }
    }

    /// The node's value with backslash escapes retained
    pub fn escaped_value(&self) -> String {
        match &self.kind {
            NodeKind::Phrase {
                value, escaped, ..
            } => escaped.clone().unwrap_or_else(|| value.clone()),
            _ => self.string_value(),
        }
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(field) = &self.field {
            parts.push(format!("fieldname={}", field));
        }
        if self.kind.is_leaf() || matches!(self.kind, NodeKind::Proximity { .. }) {
            parts.push(format!("operator={:?}", self.operator));
        }
        match &self.kind {
            NodeKind::Array { values, conjunctive } => {
                parts.push(format!("values={}", values.values().len()));
                if values.is_external() {
                    parts.push("external".to_string());
                }
                if *conjunctive {
                    parts.push("and".to_string());
                }
            }
            NodeKind::Range { from, to } => parts.push(format!("range=[{} TO {}]", from, to)),
            NodeKind::Phrase {
                distance, ordered, ..
            }
            | NodeKind::Proximity { distance, ordered } => {
                if let NodeKind::Phrase { .. } = self.kind {
                    parts.push(format!("value={}", self.escaped_value()));
                }
                parts.push(format!("distance={}", distance));
                parts.push(format!("ordered={}", ordered));
            }
            NodeKind::Child { type_name } | NodeKind::Parent { type_name } => {
                parts.push(format!("type={}", type_name));
            }
            NodeKind::Expansion { link, generated } => {
                parts.push(format!("link={}", link));
                if *generated {
                    parts.push("generated".to_string());
                }
            }
            kind if kind.is_leaf() => parts.push(format!("value={}", self.string_value())),
            _ => {}
        }
        if let Some(boost) = self.boost {
            parts.push(format!("boost={}", boost));
        }
        if let Some(path) = &self.nested_path {
            parts.push(format!("nested={}", path));
        }

        if parts.is_empty() {
            self.kind.name().to_string()
        } else {
            format!("{} ({})", self.kind.name(), parts.join(", "))
        }
    }
}

/// Arena holding every node of one parsed query
#[derive(Clone, Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a detached node to the arena
    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Append `child` to the children of `parent`
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Add a node and append it to `parent` in one step
    pub fn push_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.push(node);
        self.add_child(parent, id);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.nodes[id.0].children.get(index).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Point child edge `index` of `parent` at `child`, appending when the
    /// edge does not exist yet
    pub fn set_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        if index < children.len() {
            children[index] = child;
        } else {
            children.push(child);
        }
    }

    /// Overwrite the slot of `target` with the node at `source`
    ///
    /// `target` keeps its position in the tree (its parent edge is
    /// untouched) and adopts the children of `source`. The `source` slot is
    /// left detached.
    pub fn replace(&mut self, target: NodeId, source: NodeId) {
        if target == source {
            return;
        }

        let mut replacement = self.nodes[source.0].clone();
        replacement.parent = self.nodes[target.0].parent;
        for child in &replacement.children {
            self.nodes[child.0].parent = Some(target);
        }
        self.nodes[target.0] = replacement;

        let detached = &mut self.nodes[source.0];
        detached.children.clear();
        detached.parent = None;
    }

    /// Pre-order list of `root` and everything below it
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    /// First node below `root` (inclusive, pre-order) matching `predicate`
    pub fn find(&self, root: NodeId, predicate: impl Fn(&Node) -> bool) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|id| predicate(self.node(*id)))
    }

    /// Indented textual rendering of the subtree at `root`
    pub fn dump(&self, root: NodeId) -> String {
        let mut out = String::new();
        self.dump_into(root, 1, &mut out);
        out
    }

    fn dump_into(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let _ = writeln!(out, "{}{}", "   ".repeat(depth), node.describe());
        for child in &node.children {
            self.dump_into(*child, depth + 1, out);
        }
    }
}

/// Root of one parsed query
#[derive(Clone, Debug, Default)]
pub struct QueryTree {
    pub ast: Ast,
    pub root: Option<NodeId>,
    /// Index links declared by the query's options block
    pub options: Vec<IndexLink>,
    pub aggregate: Option<Aggregate>,
    pub suggest: Option<Suggest>,
    /// Raw value blocks referenced by array-data leaves
    pub array_data: HashMap<String, String>,
}

impl QueryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every field name referenced below the root, in tree order
    pub fn field_names(&self) -> Vec<String> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        self.ast
            .descendants(root)
            .into_iter()
            .filter_map(|id| self.ast.node(id).field.clone())
            .collect()
    }

    /// First node below the root matching `predicate`
    pub fn find(&self, predicate: impl Fn(&Node) -> bool) -> Option<NodeId> {
        self.root.and_then(|root| self.ast.find(root, predicate))
    }

    /// Diagnostic dump of the whole tree
    pub fn dump(&self) -> String {
        let mut out = String::from("QueryTree\n");
        for link in &self.options {
            let _ = writeln!(out, "   option ({})", link);
        }
        if let Some(root) = self.root {
            out.push_str(&self.ast.dump(root));
        }
        if let Some(aggregate) = &self.aggregate {
            let _ = writeln!(
                out,
                "   aggregate ({}, fieldname={})",
                aggregate.kind.name(),
                aggregate.field
            );
        }
        if let Some(suggest) = &self.suggest {
            let _ = writeln!(
                out,
                "   suggest (fieldname={}, stem={})",
                suggest.field, suggest.stem
            );
        }
        out
    }
}
