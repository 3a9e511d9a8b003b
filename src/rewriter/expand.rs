//! Cross-index expansion resolution
//!
//! An expansion evaluates its query against a linked index and substitutes
//! the matching join values back into the tree. Nested expansions resolve
//! innermost first; each resolved expansion is overwritten in place so a
//! second compile of the same tree never scans again.

use tracing::{debug, info};

use super::QueryRewriter;
use crate::ast::{ArrayValues, Ast, IndexLink, Node, NodeId, NodeKind};
use crate::dsl::QueryFragment;
use crate::error::RewriteError;
use crate::metadata::{hop_field, hop_index};
use crate::search::{collect_field_values, ScanRequest};
use crate::Result;

/// Remove `prefix.` from every field at or below `root`
pub(super) fn strip_path(ast: &mut Ast, root: NodeId, prefix: &str) {
    let dotted = format!("{}.", prefix);
    for id in ast.descendants(root) {
        let node = ast.node_mut(id);
        if let Some(stripped) = node
            .field
            .as_deref()
            .and_then(|field| field.strip_prefix(&dotted))
        {
            node.field = Some(stripped.to_string());
        }
    }
}

/// Expansions at or below `root`, outermost first
///
/// Only the query of an expansion is searched for further expansions.
pub(super) fn expansion_stack(ast: &Ast, root: NodeId) -> Vec<NodeId> {
    let mut stack = Vec::new();
    collect_expansions(ast, root, &mut stack);
    stack
}

fn collect_expansions(ast: &Ast, id: NodeId, stack: &mut Vec<NodeId>) {
    if let NodeKind::Expansion { .. } = ast.node(id).kind {
        stack.push(id);
        if let Some(query) = ast.child(id, 0) {
            collect_expansions(ast, query, stack);
        }
    } else {
        for child in ast.children(id) {
            collect_expansions(ast, *child, stack);
        }
    }
}

impl QueryRewriter {
    pub(super) fn build_expansion(&mut self, id: NodeId, generated: bool) -> Result<QueryFragment> {
        if generated {
            self.state.generated_expansions.push(id);
        }
        let result = self.expand(id);
        if generated {
            self.state.generated_expansions.pop();
        }
        result
    }

    fn expand(&mut self, root: NodeId) -> Result<QueryFragment> {
        let link = expansion_link(self.tree.ast.node(root))?;
        let stack = expansion_stack(&self.tree.ast, root);

        let my_index = self.metadata.my_index().clone();
        let target = if self.state.generated_expansions.is_empty() {
            my_index.clone()
        } else {
            link.clone()
        };

        if let Some(name) = &link.name {
            strip_path(&mut self.tree.ast, root, name);
        }

        let resolved = self.resolve_stack(stack, &my_index, &target);
        self.metadata.set_my_index(my_index);
        debug!(index = %self.metadata.my_index().index_name, "Restored primary index");

        match resolved? {
            Some(last) => self.build(last),
            None => Ok(QueryFragment::match_all()),
        }
    }

    /// Resolve every pending expansion, returning the slot of the last one
    fn resolve_stack(
        &mut self,
        mut stack: Vec<NodeId>,
        my_index: &IndexLink,
        target: &IndexLink,
    ) -> Result<Option<NodeId>> {
        let mut last = None;

        while let Some(expansion) = stack.pop() {
            let node = self.tree.ast.node(expansion).clone();
            let link = expansion_link(&node)?;
            let generated = matches!(node.kind, NodeKind::Expansion { generated: true, .. });

            let resolved = if self.state.generated_expansions.is_empty() && link == *my_index {
                debug!(link = %link, "Expansion targets the primary index, substituting its query");
                query_of(&self.tree.ast, expansion)?
            } else if generated {
                self.resolve_generated(expansion, &node, &link, my_index)?
            } else {
                self.resolve_link(expansion, &link, target)?
            };

            self.tree.ast.replace(expansion, resolved);
            if node.boost.is_some() {
                self.tree.ast.node_mut(expansion).boost = node.boost;
            }
            last = Some(expansion);
        }

        Ok(last)
    }

    fn resolve_link(
        &mut self,
        expansion: NodeId,
        link: &IndexLink,
        target: &IndexLink,
    ) -> Result<NodeId> {
        let path = self.metadata.join_path(target, link)?;

        let (left, right, one_to_one) = match path.as_slice() {
            [left, right] => {
                let one_to_one = self.is_primary_key_hop(left)? && self.is_primary_key_hop(right)?;
                (hop_field(left), hop_field(right), one_to_one)
            }
            [left, middle, right] => {
                if !(self.metadata.fields_equivalent(left, middle)
                    && self.metadata.fields_equivalent(middle, right))
                {
                    return Err(RewriteError::EquivalenceUnresolved {
                        left: left.clone(),
                        middle: middle.clone(),
                        right: right.clone(),
                    });
                }
                (hop_field(left), hop_field(right), false)
            }
            _ => return Err(RewriteError::UnsupportedIndirection(path.len())),
        };

        if one_to_one
            && self.metadata.used_indexes().len() == 1
            && self.config.allow_single_index
        {
            debug!(link = %link, "One-to-one link within a single index, substituting its query");
            return query_of(&self.tree.ast, expansion);
        }

        let (left, right) = (left.to_string(), right.to_string());
        self.load_field_data(expansion, link, &left, &right)
    }

    /// Two hops: the generated link itself, then back onto the primary key space
    fn resolve_generated(
        &mut self,
        expansion: NodeId,
        node: &Node,
        link: &IndexLink,
        my_index: &IndexLink,
    ) -> Result<NodeId> {
        let mut last =
            self.load_field_data(expansion, link, &link.left_field, &link.right_field)?;

        let field = node
            .field
            .clone()
            .unwrap_or_else(|| link.right_field.clone());
        let source = self.metadata.find_field(&field)?;
        if source != *my_index {
            self.tree.ast.set_child(expansion, 0, last);

            let left = my_index.right_field.clone();
            let right = self.metadata.metadata(&link.index_name)?.primary_key.clone();
            last = self.load_field_data(expansion, link, &left, &right)?;
        }
        Ok(last)
    }

    fn is_primary_key_hop(&mut self, hop: &str) -> Result<bool> {
        let index = hop_index(hop);
        if index.is_empty() {
            return Ok(false);
        }
        Ok(self.metadata.metadata(index)?.is_primary_key(hop_field(hop)))
    }

    /// Materialize the expansion's query as an array of `right` values bound to `left`
    fn load_field_data(
        &mut self,
        expansion: NodeId,
        link: &IndexLink,
        left: &str,
        right: &str,
    ) -> Result<NodeId> {
        let query_id = query_of(&self.tree.ast, expansion)?;
        let query = self.tree.ast.node(query_id).clone();

        let link_md = self.metadata.metadata(&link.index_name)?;
        let left_md = self.metadata.metadata_for_field(left)?;
        let right_md = self.metadata.metadata_for_field(right)?;
        let is_pkey = query.field.as_deref() == Some(link_md.primary_key.as_str())
            && left_md.is_primary_key(left)
            && right_md.is_primary_key(right);

        if matches!(query.kind, NodeKind::NotNull) && is_pkey {
            debug!(field = %left, "Primary key join, skipping scan");
            return Ok(self.tree.ast.push(Node::new(NodeKind::NotNull).with_field(left)));
        }

        let filter = self.build_scan_query(query_id)?;
        let post_filter = self.visibility_filter(expansion, link)?;

        let request = ScanRequest {
            index: link.index_name.clone(),
            query: QueryFragment::constant_score(filter),
            post_filter,
            field: right.to_string(),
            batch_size: self.config.scan.batch_size,
            keep_alive: self.config.scan.keep_alive(),
            continuation_keep_alive: self.config.scan.continuation_keep_alive(),
            preference: self.config.search_preference.clone(),
        };

        info!(index = %request.index, field = %right, "Scanning linked index");
        let (values, total_hits) = collect_field_values(self.executor.as_ref(), &request)?;
        debug!(values = values.len(), total_hits, "Expansion resolved");

        let array = Node::new(NodeKind::Array {
            values: ArrayValues::External { values, total_hits },
            conjunctive: false,
        })
        .with_field(left);
        Ok(self.tree.ast.push(array))
    }

    /// Compile a subtree for a scan, outside aggregate mode
    fn build_scan_query(&mut self, id: NodeId) -> Result<QueryFragment> {
        let building_aggregate = std::mem::replace(&mut self.state.building_aggregate, false);
        let result = self.build(id);
        self.state.building_aggregate = building_aggregate;
        result
    }

    /// Post-filter restricting scans to documents visible through the tree's parent scope
    fn visibility_filter(
        &mut self,
        expansion: NodeId,
        link: &IndexLink,
    ) -> Result<Option<QueryFragment>> {
        if self.metadata.metadata(&link.index_name)?.no_xact {
            return Ok(None);
        }

        let Some(parent) = self
            .tree
            .find(|node| matches!(node.kind, NodeKind::Parent { .. }))
        else {
            return Ok(None);
        };

        let mut cursor = Some(expansion);
        while let Some(id) = cursor {
            if id == parent {
                return Ok(None);
            }
            cursor = self.tree.ast.parent(id);
        }

        Ok(Some(self.build_scan_query(parent)?))
    }
}

fn expansion_link(node: &Node) -> Result<IndexLink> {
    match &node.kind {
        NodeKind::Expansion { link, .. } => Ok(link.clone()),
        other => Err(RewriteError::Rewrite(format!(
            "Expected an expansion node, found {}",
            other.name()
        ))),
    }
}

fn query_of(ast: &Ast, expansion: NodeId) -> Result<NodeId> {
    ast.child(expansion, 0)
        .ok_or_else(|| RewriteError::Rewrite("Expansion has no query".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expansion(ast: &mut Ast, link: IndexLink) -> NodeId {
        ast.push(Node::new(NodeKind::Expansion {
            link,
            generated: false,
        }))
    }

    #[test]
    fn test_expansion_stack_is_outermost_first() {
        let mut ast = Ast::new();
        let and = ast.push(Node::new(NodeKind::And));
        let outer = expansion(&mut ast, IndexLink::new("a", "one", "b"));
        ast.add_child(and, outer);
        let inner = expansion(&mut ast, IndexLink::new("c", "two", "d"));
        ast.add_child(outer, inner);
        ast.push_child(inner, Node::new(NodeKind::NotNull).with_field("e"));
        let sibling = expansion(&mut ast, IndexLink::new("f", "three", "g"));
        ast.add_child(and, sibling);

        assert_eq!(expansion_stack(&ast, and), vec![outer, inner, sibling]);
        assert_eq!(expansion_stack(&ast, inner), vec![inner]);
    }

    #[test]
    fn test_strip_path() {
        let mut ast = Ast::new();
        let and = ast.push(Node::new(NodeKind::And));
        let a = ast.push_child(and, Node::new(NodeKind::Null).with_field("author.name"));
        let b = ast.push_child(and, Node::new(NodeKind::Null).with_field("authority"));

        strip_path(&mut ast, and, "author");
        assert_eq!(ast.node(a).field.as_deref(), Some("name"));
        assert_eq!(ast.node(b).field.as_deref(), Some("authority"));
    }

    #[test]
    fn test_query_of_requires_child() {
        let mut ast = Ast::new();
        let id = expansion(&mut ast, IndexLink::new("a", "b", "c"));
        assert!(query_of(&ast, id).is_err());
        assert!(expansion_link(&Node::new(NodeKind::And)).is_err());
    }
}
