//! Per-rewrite metadata cache

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::MetadataResolver;
use crate::ast::IndexLink;
use crate::schema::IndexMetadata;
use crate::Result;

/// Metadata fetched lazily per referenced index and kept for one rewrite
///
/// Also tracks the rewrite's primary index ("my index") and which indexes the
/// query touches.
pub struct MetadataCache {
    resolver: Arc<dyn MetadataResolver>,
    cache: HashMap<String, Arc<IndexMetadata>>,
    original: IndexLink,
    my_index: IndexLink,
    links: Vec<IndexLink>,
    used: Vec<IndexLink>,
}

impl MetadataCache {
    /// Create a cache rooted at `index_name`, loading it and every linked index
    pub fn new(
        resolver: Arc<dyn MetadataResolver>,
        index_name: &str,
        links: Vec<IndexLink>,
    ) -> Result<Self> {
        let mut cache = HashMap::new();
        let root = Arc::new(resolver.index_metadata(index_name)?);
        let original = IndexLink::new(
            root.primary_key.clone(),
            index_name,
            root.primary_key.clone(),
        );
        cache.insert(index_name.to_string(), root);

        let mut this = Self {
            resolver,
            cache,
            my_index: original.clone(),
            original,
            links,
            used: Vec::new(),
        };

        let names: Vec<String> = this.links.iter().map(|l| l.index_name.clone()).collect();
        for name in names {
            this.metadata(&name)?;
        }
        Ok(this)
    }

    /// Metadata for an index, fetched on first use
    pub fn metadata(&mut self, index_name: &str) -> Result<Arc<IndexMetadata>> {
        if let Some(md) = self.cache.get(index_name) {
            return Ok(Arc::clone(md));
        }

        debug!(index = %index_name, "Loading index metadata");
        let md = Arc::new(self.resolver.index_metadata(index_name)?);
        self.cache.insert(index_name.to_string(), Arc::clone(&md));
        Ok(md)
    }

    /// Find the index link that owns `field`, recording the index as used
    ///
    /// A `name.` prefix selects a named link. Otherwise the primary index
    /// wins, then the first linked index with the field, then the index the
    /// rewrite was issued against. Unknown fields are attributed to the
    /// primary index.
    pub fn find_field(&mut self, field: &str) -> Result<IndexLink> {
        let link = self.locate_field(field)?;
        if !self.used.contains(&link) {
            self.used.push(link.clone());
        }
        Ok(link)
    }

    fn locate_field(&mut self, field: &str) -> Result<IndexLink> {
        if let Some((prefix, _)) = field.split_once('.') {
            if let Some(link) = self.link_by_name(prefix) {
                return Ok(link.clone());
            }
        }

        let my_index = self.my_index.clone();
        if self.metadata(&my_index.index_name)?.has_field(field) {
            return Ok(my_index);
        }

        for link in self.links.clone() {
            if self.metadata(&link.index_name)?.has_field(field) {
                return Ok(link);
            }
        }

        let original = self.original.clone();
        if original != my_index && self.metadata(&original.index_name)?.has_field(field) {
            return Ok(original);
        }

        Ok(my_index)
    }

    /// Metadata of the index owning `field`
    pub fn metadata_for_field(&mut self, field: &str) -> Result<Arc<IndexMetadata>> {
        let link = self.find_field(field)?;
        self.metadata(&link.index_name)
    }

    pub fn metadata_for_my_index(&mut self) -> Result<Arc<IndexMetadata>> {
        let name = self.my_index.index_name.clone();
        self.metadata(&name)
    }

    pub fn link_by_name(&self, name: &str) -> Option<&IndexLink> {
        self.links
            .iter()
            .find(|link| link.name.as_deref() == Some(name))
    }

    pub fn my_index(&self) -> &IndexLink {
        &self.my_index
    }

    pub fn set_my_index(&mut self, link: IndexLink) {
        self.my_index = link;
    }

    /// Link of the index the rewrite was issued against
    pub fn original_index(&self) -> &IndexLink {
        &self.original
    }

    /// Indexes touched so far, in first-use order
    pub fn used_indexes(&self) -> &[IndexLink] {
        &self.used
    }

    pub fn join_path(&self, from: &IndexLink, to: &IndexLink) -> Result<Vec<String>> {
        self.resolver.join_path(from, to)
    }

    pub fn fields_equivalent(&self, left: &str, right: &str) -> bool {
        self.resolver.are_fields_equivalent(left, right)
    }
}
