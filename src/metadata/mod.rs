//! Index metadata resolution
//!
//! [`MetadataResolver`] is the seam to whatever owns index mappings and the
//! relationships between indexes. [`MetadataCache`] wraps a resolver for the
//! lifetime of one rewrite.

mod cache;

pub use cache::MetadataCache;

use crate::ast::IndexLink;
use crate::schema::IndexMetadata;
use crate::Result;

/// Source of index mappings and join paths
pub trait MetadataResolver: Send + Sync {
    /// Fetch the metadata of one index
    fn index_metadata(&self, index_name: &str) -> Result<IndexMetadata>;

    /// Join path from `from` to `to` as ordered `index:field` hops
    fn join_path(&self, from: &IndexLink, to: &IndexLink) -> Result<Vec<String>>;

    /// Whether two `index:field` hops hold the same values
    fn are_fields_equivalent(&self, left: &str, right: &str) -> bool {
        hop_field(left) == hop_field(right)
    }
}

/// Field part of an `index:field` hop
pub fn hop_field(hop: &str) -> &str {
    hop.split_once(':').map(|(_, field)| field).unwrap_or(hop)
}

/// Index part of an `index:field` hop
pub fn hop_index(hop: &str) -> &str {
    hop.split_once(':').map(|(index, _)| index).unwrap_or("")
}
