//! Testing infrastructure
//!
//! This module provides:
//! - An in-memory cluster implementing both [`MetadataResolver`] and
//!   [`SearchExecutor`], so rewrites including expansion scans run without a
//!   search engine
//! - A fragment evaluator used by the cluster to answer scans
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use crossdex::testing::InMemoryCluster;
//!
//! let mut cluster = InMemoryCluster::new();
//! cluster.add_index(IndexMetadata::new("books", "id"));
//! cluster.add_document("books", json!({"id": 1}))?;
//!
//! let cluster = Arc::new(cluster);
//! let mut rewriter = QueryRewriter::builder("books", tree)
//!     .resolver(cluster.clone())
//!     .executor(cluster.clone())
//!     .build()?;
//! let hits = cluster.search("books", &rewriter.rewrite_query()?)?;
//! ```
//!
//! [`MetadataResolver`]: crate::metadata::MetadataResolver
//! [`SearchExecutor`]: crate::search::SearchExecutor

pub mod evaluate;
pub mod memory;

pub use evaluate::{evaluate, field_values, wildcard_regex};
pub use memory::{ClusterFixture, InMemoryCluster, JoinPathOverride};
