//! Index metadata and field type system
//!
//! This module defines what the rewriter knows about an index:
//! - Field types (Text, Keyword, Long, Double, Boolean, Date, Nested)
//! - Per-field mappings (type plus nested scope)
//! - Index-level metadata (primary key, visibility filtering)

mod field_type;
mod mapping;

pub use field_type::{FieldType, FULLTEXT_ANALYZER};
pub use mapping::{FieldMapping, IndexMetadata, DATE_COMPANION_SUFFIX};
