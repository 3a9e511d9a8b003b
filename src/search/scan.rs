use ordered_float::OrderedFloat;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

use super::{ScanRequest, SearchExecutor, ShardFailure};
use crate::error::RewriteError;
use crate::Result;

/// Total order over scalar field values
///
/// Integers are keyed exactly so that ids beyond 2^53 stay distinct.
/// `UInt` only holds values above `i64::MAX`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Number(OrderedFloat<f64>),
    String(String),
}

impl SortKey {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null | Value::Array(_) => None,
            Value::Bool(b) => Some(SortKey::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(SortKey::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Some(SortKey::UInt(u))
                } else {
                    n.as_f64().map(|f| SortKey::Number(OrderedFloat(f)))
                }
            }
            Value::String(s) => Some(SortKey::String(s.clone())),
            Value::Object(_) => Some(SortKey::String(value.to_string())),
        }
    }
}

fn shard_error(failures: &[ShardFailure]) -> RewriteError {
    let detail = failures
        .iter()
        .map(|f| format!("{}\n", f))
        .collect::<String>();
    RewriteError::RemoteExecution {
        failed_shards: failures.len(),
        detail,
    }
}

fn insert_values(values: Vec<Value>, into: &mut BTreeMap<SortKey, Value>) {
    for value in values {
        if let Value::Array(items) = value {
            insert_values(items, into);
        } else if let Some(key) = SortKey::of(&value) {
            into.entry(key).or_insert(value);
        }
    }
}

/// Run a scan to completion and collect the distinct projected values
///
/// Returns the values in ascending order together with the number of hits
/// that produced them. Any shard failure aborts the scan, as does a page that
/// comes back empty before the declared total is reached.
pub fn collect_field_values(
    executor: &dyn SearchExecutor,
    request: &ScanRequest,
) -> Result<(Vec<Value>, u64)> {
    let mut cursor = executor.scan(request)?;
    let total = cursor.total_hits();

    if !cursor.failed_shards().is_empty() {
        warn!(index = %request.index, failed = cursor.failed_shards().len(), "Scan failed on some shards");
        return Err(shard_error(cursor.failed_shards()));
    }
    if total == 0 {
        debug!(index = %request.index, field = %request.field, "Scan matched no documents");
        return Ok((Vec::new(), 0));
    }

    let mut values = BTreeMap::new();
    let mut seen = 0u64;
    while seen < total {
        let batch = cursor.next_batch()?;
        if !batch.failed_shards.is_empty() {
            warn!(index = %request.index, seen, total, "Scan continuation failed on some shards");
            return Err(shard_error(&batch.failed_shards));
        }
        if batch.hit_count == 0 {
            return Err(RewriteError::RemoteExecution {
                failed_shards: 0,
                detail: format!(
                    "scan of {} ended after {} of {} hits",
                    request.index, seen, total
                ),
            });
        }

        seen += batch.hit_count as u64;
        insert_values(batch.values, &mut values);
        trace!(index = %request.index, seen, total, "Scan page received");
    }

    debug!(
        index = %request.index,
        field = %request.field,
        hits = seen,
        distinct = values.len(),
        "Scan complete"
    );
    Ok((values.into_values().collect(), seen))
}
