//! Index metadata definitions
//!
//! Metadata describes one index as the rewriter sees it: its field types,
//! nested scopes and primary key.

use super::field_type::FieldType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Suffix of the date-typed companion indexed alongside a field
pub const DATE_COMPANION_SUFFIX: &str = ".date";

/// Field mapping configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field data type
    pub field_type: FieldType,

    /// Nested document scope the field lives in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_path: Option<String>,
}

impl FieldMapping {
    /// Create a new field mapping with the given type
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            nested_path: None,
        }
    }

    pub fn text() -> Self {
        Self::new(FieldType::text())
    }

    pub fn keyword() -> Self {
        Self::new(FieldType::keyword())
    }

    pub fn long() -> Self {
        Self::new(FieldType::Long)
    }

    pub fn double() -> Self {
        Self::new(FieldType::Double)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn date() -> Self {
        Self::new(FieldType::date())
    }

    /// Place the field inside a nested document scope
    pub fn with_nested_path(mut self, path: impl Into<String>) -> Self {
        self.nested_path = Some(path.into());
        self
    }
}

/// Metadata for one index
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub index_name: String,

    /// Field holding each document's unique key
    pub primary_key: String,

    /// Skip transaction-visibility post filtering when scanning this index
    #[serde(default)]
    pub no_xact: bool,

    /// Field mappings keyed by full (dotted) field name
    #[serde(default)]
    pub fields: HashMap<String, FieldMapping>,
}

impl IndexMetadata {
    pub fn new(index_name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        let primary_key = primary_key.into();
        let mut fields = HashMap::new();
        fields.insert(primary_key.clone(), FieldMapping::long());
        Self {
            index_name: index_name.into(),
            primary_key,
            no_xact: false,
            fields,
        }
    }

    /// Add a field mapping
    pub fn field(mut self, name: impl Into<String>, mapping: FieldMapping) -> Self {
        self.fields.insert(name.into(), mapping);
        self
    }

    pub fn with_no_xact(mut self, no_xact: bool) -> Self {
        self.no_xact = no_xact;
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.get(name)
    }

    /// Check if a field exists; the primary key always does
    pub fn has_field(&self, name: &str) -> bool {
        self.primary_key == name || self.fields.contains_key(name)
    }

    pub fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.get_field(name).map(|m| &m.field_type)
    }

    pub fn analyzer(&self, name: &str) -> Option<&str> {
        self.field_type(name).and_then(FieldType::analyzer)
    }

    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key == name
    }

    /// Check if `name` has a date-typed companion field
    pub fn has_date_companion(&self, name: &str) -> bool {
        matches!(
            self.field_type(&format!("{}{}", name, DATE_COMPANION_SUFFIX)),
            Some(FieldType::Date { .. })
        )
    }

    /// Nested scope of a field, from its own mapping or an enclosing nested field
    pub fn nested_path(&self, name: &str) -> Option<&str> {
        if let Some(path) = self.get_field(name).and_then(|m| m.nested_path.as_deref()) {
            return Some(path);
        }

        let mut prefix = name;
        while let Some((parent, _)) = prefix.rsplit_once('.') {
            if let Some(FieldType::Nested) = self.field_type(parent) {
                return self.fields.get_key_value(parent).map(|(k, _)| k.as_str());
            }
            prefix = parent;
        }
        None
    }

    /// Get all field names, sorted
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }
}
