//! Remote search execution
//!
//! Expansion scans are the only I/O the rewriter performs. They go through
//! the narrow [`SearchExecutor`] / [`ScanCursor`] pair so the rewriter can
//! run against any backend, including an in-memory one.

mod scan;

pub use scan::collect_field_values;

use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::dsl::QueryFragment;
use crate::Result;

/// A scoped scan projecting one field from every matching document
#[derive(Clone, Debug, PartialEq)]
pub struct ScanRequest {
    pub index: String,
    pub query: QueryFragment,
    /// Further restricts the hits of `query`
    pub post_filter: Option<QueryFragment>,
    pub field: String,
    pub batch_size: usize,
    pub keep_alive: Duration,
    pub continuation_keep_alive: Duration,
    pub preference: Option<String>,
}

/// One failed shard of a scan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardFailure {
    pub index: String,
    pub shard: u32,
    pub reason: String,
}

impl fmt::Display for ShardFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shard [{}][{}] failed: {}",
            self.index, self.shard, self.reason
        )
    }
}

/// One page of scan results
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanBatch {
    /// Number of documents in this page
    pub hit_count: usize,
    /// Projected field values of those documents, flattened
    pub values: Vec<Value>,
    pub failed_shards: Vec<ShardFailure>,
}

/// An open scan
pub trait ScanCursor {
    /// Total hit count declared by the initial response
    fn total_hits(&self) -> u64;

    /// Shard failures reported by the initial response
    fn failed_shards(&self) -> &[ShardFailure];

    /// Fetch the next page
    fn next_batch(&mut self) -> Result<ScanBatch>;
}

/// Executes scans against the backing search cluster
pub trait SearchExecutor: Send + Sync {
    fn scan(&self, request: &ScanRequest) -> Result<Box<dyn ScanCursor + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_failure_display() {
        let failure = ShardFailure {
            index: "books".to_string(),
            shard: 3,
            reason: "timeout".to_string(),
        };
        assert_eq!(failure.to_string(), "shard [books][3] failed: timeout");
    }
}
