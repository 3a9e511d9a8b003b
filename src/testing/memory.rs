//! In-memory metadata resolver and search executor

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::evaluate::{evaluate, field_values};
use crate::ast::IndexLink;
use crate::dsl::QueryFragment;
use crate::error::RewriteError;
use crate::metadata::MetadataResolver;
use crate::schema::IndexMetadata;
use crate::search::{ScanBatch, ScanCursor, ScanRequest, SearchExecutor, ShardFailure};
use crate::Result;

/// Explicit join path between two indexes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinPathOverride {
    pub from: String,
    pub to: String,
    pub path: Vec<String>,
}

/// Serializable description of a cluster
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterFixture {
    pub indexes: Vec<IndexMetadata>,
    /// Documents keyed by index name
    pub documents: HashMap<String, Vec<Value>>,
    pub join_paths: Vec<JoinPathOverride>,
}

impl ClusterFixture {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RewriteError::Usage(format!("cannot read fixture {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }
}

/// A search cluster held entirely in memory
///
/// Join paths default to the direct two-hop path
/// `[from.index:to.left_field, to.index:to.right_field]`. Every scan is
/// recorded so tests can assert how many remote round trips a rewrite made.
#[derive(Default)]
pub struct InMemoryCluster {
    indexes: HashMap<String, IndexMetadata>,
    documents: HashMap<String, Vec<Value>>,
    join_paths: HashMap<(String, String), Vec<String>>,
    shard_failures: HashMap<String, Vec<ShardFailure>>,
    scan_log: Mutex<Vec<ScanRequest>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cluster from a fixture, validating every document
    pub fn from_fixture(fixture: ClusterFixture) -> Result<Self> {
        let mut cluster = Self::new();
        for md in fixture.indexes {
            cluster.add_index(md);
        }
        for (index, docs) in fixture.documents {
            cluster.add_documents(&index, docs)?;
        }
        for join in fixture.join_paths {
            cluster.set_join_path(&join.from, &join.to, join.path);
        }
        Ok(cluster)
    }

    pub fn add_index(&mut self, md: IndexMetadata) {
        self.documents.entry(md.index_name.clone()).or_default();
        self.indexes.insert(md.index_name.clone(), md);
    }

    /// Add a document after checking it against the index mapping
    pub fn add_document(&mut self, index: &str, doc: Value) -> Result<()> {
        let md = self
            .indexes
            .get(index)
            .ok_or_else(|| RewriteError::MissingMetadata(index.to_string()))?;

        let Some(object) = doc.as_object() else {
            return Err(RewriteError::Usage(format!(
                "documents in {} must be JSON objects",
                index
            )));
        };
        for (field, value) in object {
            if let Some(field_type) = md.field_type(field) {
                field_type.validate(value).map_err(|e| {
                    RewriteError::Usage(format!("{}.{}: {}", index, field, e))
                })?;
            }
        }

        self.documents.entry(index.to_string()).or_default().push(doc);
        Ok(())
    }

    pub fn add_documents(&mut self, index: &str, docs: Vec<Value>) -> Result<()> {
        docs.into_iter()
            .try_for_each(|doc| self.add_document(index, doc))
    }

    /// Merge `patch` into the document whose primary key equals `key`
    pub fn update_document(&mut self, index: &str, key: &Value, patch: Value) -> Result<()> {
        let pk = self
            .indexes
            .get(index)
            .map(|md| md.primary_key.clone())
            .ok_or_else(|| RewriteError::MissingMetadata(index.to_string()))?;

        let doc = self
            .documents
            .get_mut(index)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.get(&pk) == Some(key)))
            .ok_or_else(|| RewriteError::Usage(format!("no document {} in {}", key, index)))?;

        if let (Some(target), Value::Object(fields)) = (doc.as_object_mut(), patch) {
            target.extend(fields);
        }
        Ok(())
    }

    pub fn set_join_path(&mut self, from: &str, to: &str, path: Vec<String>) {
        self.join_paths
            .insert((from.to_string(), to.to_string()), path);
    }

    /// Make every scan of `index` report a failed shard
    pub fn fail_shard(&mut self, index: &str, shard: u32, reason: &str) {
        self.shard_failures
            .entry(index.to_string())
            .or_default()
            .push(ShardFailure {
                index: index.to_string(),
                shard,
                reason: reason.to_string(),
            });
    }

    /// Documents of `index` matching `query`
    pub fn search(&self, index: &str, query: &QueryFragment) -> Result<Vec<Value>> {
        let docs = self
            .documents
            .get(index)
            .ok_or_else(|| RewriteError::MissingMetadata(index.to_string()))?;
        Ok(docs
            .iter()
            .filter(|doc| evaluate(query, doc))
            .cloned()
            .collect())
    }

    /// Every scan issued so far
    pub fn scans(&self) -> Vec<ScanRequest> {
        self.scan_log.lock().clone()
    }

    pub fn scan_count(&self) -> usize {
        self.scan_log.lock().len()
    }
}

impl MetadataResolver for InMemoryCluster {
    fn index_metadata(&self, index_name: &str) -> Result<IndexMetadata> {
        self.indexes
            .get(index_name)
            .cloned()
            .ok_or_else(|| RewriteError::MissingMetadata(index_name.to_string()))
    }

    fn join_path(&self, from: &IndexLink, to: &IndexLink) -> Result<Vec<String>> {
        let key = (from.index_name.clone(), to.index_name.clone());
        if let Some(path) = self.join_paths.get(&key) {
            return Ok(path.clone());
        }
        Ok(vec![
            format!("{}:{}", from.index_name, to.left_field),
            format!("{}:{}", to.index_name, to.right_field),
        ])
    }
}

impl SearchExecutor for InMemoryCluster {
    fn scan(&self, request: &ScanRequest) -> Result<Box<dyn ScanCursor + '_>> {
        self.scan_log.lock().push(request.clone());

        let docs = self
            .documents
            .get(&request.index)
            .ok_or_else(|| RewriteError::MissingMetadata(request.index.clone()))?;

        let hits: Vec<Vec<Value>> = docs
            .iter()
            .filter(|doc| evaluate(&request.query, doc))
            .filter(|doc| {
                request
                    .post_filter
                    .as_ref()
                    .map_or(true, |filter| evaluate(filter, doc))
            })
            .map(|doc| field_values(doc, &request.field).cloned().collect())
            .collect();

        debug!(index = %request.index, hits = hits.len(), "In-memory scan");
        Ok(Box::new(MemoryCursor {
            hits,
            position: 0,
            batch_size: request.batch_size.max(1),
            failures: self
                .shard_failures
                .get(&request.index)
                .cloned()
                .unwrap_or_default(),
        }))
    }
}

struct MemoryCursor {
    /// Projected values per matching document
    hits: Vec<Vec<Value>>,
    position: usize,
    batch_size: usize,
    failures: Vec<ShardFailure>,
}

impl ScanCursor for MemoryCursor {
    fn total_hits(&self) -> u64 {
        self.hits.len() as u64
    }

    fn failed_shards(&self) -> &[ShardFailure] {
        &self.failures
    }

    fn next_batch(&mut self) -> Result<ScanBatch> {
        let end = (self.position + self.batch_size).min(self.hits.len());
        let page = &self.hits[self.position..end];
        self.position = end;

        Ok(ScanBatch {
            hit_count: page.len(),
            values: page.iter().flatten().cloned().collect(),
            failed_shards: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldMapping;
    use crate::search::collect_field_values;
    use serde_json::json;
    use std::io::Write;
    use std::time::Duration;

    fn cluster() -> InMemoryCluster {
        let mut cluster = InMemoryCluster::new();
        cluster.add_index(
            IndexMetadata::new("books", "id")
                .field("title", FieldMapping::text())
                .field("author_id", FieldMapping::long()),
        );
        cluster
            .add_documents(
                "books",
                vec![
                    json!({"id": 1, "title": "one", "author_id": 7}),
                    json!({"id": 2, "title": "two", "author_id": 7}),
                    json!({"id": 3, "title": "three", "author_id": 9}),
                ],
            )
            .unwrap();
        cluster
    }

    fn request(query: QueryFragment) -> ScanRequest {
        ScanRequest {
            index: "books".to_string(),
            query,
            post_filter: None,
            field: "author_id".to_string(),
            batch_size: 2,
            keep_alive: Duration::from_secs(600),
            continuation_keep_alive: Duration::from_secs(10),
            preference: None,
        }
    }

    #[test]
    fn test_scan_pages_and_logs() {
        let cluster = cluster();
        let (values, hits) =
            collect_field_values(&cluster, &request(QueryFragment::match_all())).unwrap();
        assert_eq!(values, vec![json!(7), json!(9)]);
        assert_eq!(hits, 3);
        assert_eq!(cluster.scan_count(), 1);
    }

    #[test]
    fn test_post_filter_restricts_hits() {
        let cluster = cluster();
        let mut req = request(QueryFragment::match_all());
        req.post_filter = Some(QueryFragment::term("title", "three"));
        let (values, hits) = collect_field_values(&cluster, &req).unwrap();
        assert_eq!(values, vec![json!(9)]);
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_injected_shard_failure() {
        let mut cluster = cluster();
        cluster.fail_shard("books", 2, "node left");
        let err = collect_field_values(&cluster, &request(QueryFragment::match_all())).unwrap_err();
        assert!(err.is_retriable());
        assert!(err.to_string().contains("shard [books][2] failed: node left"));
    }

    #[test]
    fn test_document_validation() {
        let mut cluster = cluster();
        assert!(cluster
            .add_document("books", json!({"id": 4, "author_id": "seven"}))
            .is_err());
        assert!(cluster.add_document("nope", json!({"id": 1})).is_err());
        assert!(cluster.add_document("books", json!([1])).is_err());
    }

    #[test]
    fn test_update_document() {
        let mut cluster = cluster();
        cluster
            .update_document("books", &json!(3), json!({"title": "four"}))
            .unwrap();
        let hits = cluster
            .search("books", &QueryFragment::term("title", "four"))
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_join_path_default_and_override() {
        let mut cluster = cluster();
        let from = IndexLink::new("id", "books", "id");
        let to = IndexLink::new("author_id", "authors", "id");
        assert_eq!(
            cluster.join_path(&from, &to).unwrap(),
            vec!["books:author_id", "authors:id"]
        );

        let path = vec!["books:a".to_string(), "x:a".to_string(), "authors:a".to_string()];
        cluster.set_join_path("books", "authors", path.clone());
        assert_eq!(cluster.join_path(&from, &to).unwrap(), path);
    }

    #[test]
    fn test_fixture_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "indexes": [{{"index_name": "tags", "primary_key": "id",
                              "fields": {{"name": {{"field_type": {{"keyword": {{}}}}}}}}}}],
                "documents": {{"tags": [{{"id": 1, "name": "rust"}}]}}
            }}"#
        )
        .unwrap();

        let fixture = ClusterFixture::from_file(file.path()).unwrap();
        let cluster = InMemoryCluster::from_fixture(fixture).unwrap();
        let hits = cluster
            .search("tags", &QueryFragment::term("name", "rust"))
            .unwrap();
        assert_eq!(hits.len(), 1);

        assert!(ClusterFixture::from_file(file.path().with_extension("missing")).is_err());
    }
}
