pub mod ast;
pub mod config;
pub mod dsl;
pub mod error;
pub mod metadata;
pub mod rewriter;
pub mod schema;
pub mod search;
pub mod testing;
pub mod tokenizer;

pub use ast::{Ast, IndexLink, Node, NodeId, NodeKind, NodeSpec, Operator, QueryTree, QueryTreeSpec};
pub use config::{ConceptSettings, RewriterConfig, ScanSettings, TokenizerConfig};
pub use dsl::{AggregationNode, QueryFragment, TermSuggestion};
pub use error::{Result, RewriteError};
pub use metadata::{MetadataCache, MetadataResolver};
pub use rewriter::{QueryRewriter, QueryRewriterBuilder};
pub use schema::{FieldMapping, FieldType, IndexMetadata};
pub use search::{ScanCursor, ScanRequest, SearchExecutor};
pub use tokenizer::{PhraseAnalyzer, Tokenizer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
