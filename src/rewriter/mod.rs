//! Query rewriting
//!
//! A [`QueryRewriter`] owns one parsed [`QueryTree`] and compiles it into
//! search engine fragments. Compilation is a recursive walk over the arena
//! AST; cross-index expansions are resolved on the way by scanning the
//! linked index and substituting the collected values back into the tree.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut rewriter = QueryRewriter::builder("db.public.books", tree)
//!     .resolver(cluster.clone())
//!     .executor(cluster)
//!     .build()?;
//!
//! let query = rewriter.rewrite_query()?;
//! let index = rewriter.search_index_name()?;
//! ```

mod aggregate;
mod expand;
mod query;
mod span;

use std::sync::Arc;
use tracing::{debug, info};

use crate::ast::{NodeId, QueryTree};
use crate::config::RewriterConfig;
use crate::dsl::QueryFragment;
use crate::error::RewriteError;
use crate::metadata::{MetadataCache, MetadataResolver};
use crate::search::SearchExecutor;
use crate::tokenizer::{PhraseAnalyzer, Tokenizer};
use crate::Result;

/// Mutable state of one compile pass
#[derive(Debug, Default)]
struct CompileState {
    /// Depth of enclosing `With` scopes
    with_depth: usize,
    /// Nested path shared by the outermost `With` scope
    with_nested_path: Option<String>,
    /// Compiling the aggregation filter rather than the query
    building_aggregate: bool,
    /// Generated expansions currently being resolved, innermost last
    generated_expansions: Vec<NodeId>,
}

/// Compiles one query tree against one primary index
pub struct QueryRewriter {
    tree: QueryTree,
    config: RewriterConfig,
    metadata: MetadataCache,
    analyzer: Arc<dyn PhraseAnalyzer>,
    executor: Arc<dyn SearchExecutor>,
    state: CompileState,
    query_rewritten: bool,
}

impl QueryRewriter {
    /// Start building a rewriter for `tree` issued against `index_name`
    pub fn builder(index_name: impl Into<String>, tree: QueryTree) -> QueryRewriterBuilder {
        QueryRewriterBuilder {
            index_name: index_name.into(),
            tree,
            resolver: None,
            executor: None,
            analyzer: None,
            config: RewriterConfig::default(),
        }
    }

    /// Compile the query, resolving any expansions in place
    ///
    /// A tree without a query compiles to match-all.
    pub fn rewrite_query(&mut self) -> Result<QueryFragment> {
        info!(
            index = %self.metadata.original_index().index_name,
            "Rewriting query"
        );

        let result = match self.tree.root {
            Some(root) => self.build(root),
            None => Ok(QueryFragment::match_all()),
        };
        self.query_rewritten = true;
        result
    }

    /// Index the compiled query should be sent to
    ///
    /// When the query only touched one index and single-index mode is
    /// allowed that index is used, otherwise the primary index.
    pub fn search_index_name(&self) -> Result<String> {
        if !self.query_rewritten {
            return Err(RewriteError::Usage(
                "Must call rewrite_query() before search_index_name()".to_string(),
            ));
        }

        let used = self.metadata.used_indexes();
        if used.len() == 1 && self.config.allow_single_index {
            Ok(used[0].index_name.clone())
        } else {
            Ok(self.metadata.my_index().index_name.clone())
        }
    }

    /// Textual dump of the tree in its current (possibly rewritten) state
    pub fn dump(&self) -> String {
        self.tree.dump()
    }
}

/// Builder for [`QueryRewriter`]
pub struct QueryRewriterBuilder {
    index_name: String,
    tree: QueryTree,
    resolver: Option<Arc<dyn MetadataResolver>>,
    executor: Option<Arc<dyn SearchExecutor>>,
    analyzer: Option<Arc<dyn PhraseAnalyzer>>,
    config: RewriterConfig,
}

impl QueryRewriterBuilder {
    /// Set the metadata resolver
    pub fn resolver(mut self, resolver: Arc<dyn MetadataResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set the executor used for expansion scans
    pub fn executor(mut self, executor: Arc<dyn SearchExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the phrase analyzer (defaults to [`Tokenizer`])
    pub fn analyzer(mut self, analyzer: Arc<dyn PhraseAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn config(mut self, config: RewriterConfig) -> Self {
        self.config = config;
        self
    }

    /// Load metadata and prepare the rewriter
    ///
    /// When the tree carries an aggregate or suggest on a field of another
    /// index, that index becomes the primary index.
    pub fn build(self) -> Result<QueryRewriter> {
        let resolver = self
            .resolver
            .ok_or_else(|| RewriteError::Usage("a metadata resolver is required".to_string()))?;
        let executor = self
            .executor
            .ok_or_else(|| RewriteError::Usage("a search executor is required".to_string()))?;
        let analyzer = match self.analyzer {
            Some(analyzer) => analyzer,
            None => Arc::new(Tokenizer::new(&self.config.tokenizer)),
        };

        let mut metadata =
            MetadataCache::new(resolver, &self.index_name, self.tree.options.clone())?;

        let aggregate_field = self
            .tree
            .aggregate
            .as_ref()
            .map(|agg| agg.field.clone())
            .or_else(|| self.tree.suggest.as_ref().map(|s| s.field.clone()));
        if let Some(field) = aggregate_field {
            let link = metadata.find_field(&field)?;
            if &link != metadata.my_index() {
                debug!(index = %link.index_name, field = %field, "Primary index follows aggregate field");
                metadata.set_my_index(link);
            }
        }

        for field in self.tree.field_names() {
            metadata.find_field(&field)?;
        }

        Ok(QueryRewriter {
            tree: self.tree,
            config: self.config,
            metadata,
            analyzer,
            executor,
            state: CompileState::default(),
            query_rewritten: false,
        })
    }
}
