//! Field type definitions
//!
//! Defines how different data types are indexed and which queries suit them.

use serde::{Deserialize, Serialize};

/// Analyzer whose fields get a stricter more-like-this term frequency
pub const FULLTEXT_ANALYZER: &str = "fulltext";

/// Field data type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Analyzed text field
    ///
    /// Text fields are tokenized before indexing and support phrase and
    /// proximity queries.
    Text {
        #[serde(default = "default_analyzer")]
        analyzer: String,
    },

    /// Exact match keyword field
    ///
    /// The entire value is indexed as a single term.
    Keyword {
        #[serde(default)]
        normalizer: Option<String>,
    },

    /// 64-bit signed integer
    Long,

    /// 64-bit floating point
    Double,

    Boolean,

    /// Date/time field
    Date {
        #[serde(default = "default_date_format")]
        format: String,
    },

    /// Array of objects indexed as separate nested documents
    Nested,
}

fn default_analyzer() -> String {
    "standard".to_string()
}

fn default_date_format() -> String {
    "strict_date_optional_time||epoch_millis".to_string()
}

impl Default for FieldType {
    fn default() -> Self {
        FieldType::text()
    }
}

impl FieldType {
    /// Create a text field with the standard analyzer
    pub fn text() -> Self {
        FieldType::Text {
            analyzer: default_analyzer(),
        }
    }

    /// Create a text field with a specific analyzer
    pub fn text_with_analyzer(analyzer: impl Into<String>) -> Self {
        FieldType::Text {
            analyzer: analyzer.into(),
        }
    }

    pub fn keyword() -> Self {
        FieldType::Keyword { normalizer: None }
    }

    pub fn date() -> Self {
        FieldType::Date {
            format: default_date_format(),
        }
    }

    /// Check if values of this type are strings
    ///
    /// Terms aggregations only get an inclusion pattern for string fields.
    pub fn is_string(&self) -> bool {
        matches!(self, FieldType::Text { .. } | FieldType::Keyword { .. })
    }

    /// Check if this field type is tokenized at index time
    pub fn is_analyzed(&self) -> bool {
        matches!(self, FieldType::Text { .. })
    }

    /// Name of the analyzer applied to this field, if any
    pub fn analyzer(&self) -> Option<&str> {
        match self {
            FieldType::Text { analyzer } => Some(analyzer),
            FieldType::Keyword { normalizer } => normalizer.as_deref(),
            _ => None,
        }
    }

    /// Get the type name as reported in mappings
    pub fn storage_type(&self) -> &'static str {
        match self {
            FieldType::Text { .. } => "text",
            FieldType::Keyword { .. } => "keyword",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
            FieldType::Date { .. } => "date",
            FieldType::Nested => "nested",
        }
    }

    /// Validate a document value against this field type
    ///
    /// `null` is accepted for every type. Arrays are validated element-wise.
    pub fn validate(&self, value: &serde_json::Value) -> Result<(), String> {
        if let Some(items) = value.as_array() {
            if !matches!(self, FieldType::Nested) {
                return items.iter().try_for_each(|item| self.validate(item));
            }
        }

        match (self, value) {
            (_, serde_json::Value::Null) => Ok(()),
            (FieldType::Text { .. } | FieldType::Keyword { .. }, v) if v.is_string() => Ok(()),
            (FieldType::Text { .. } | FieldType::Keyword { .. }, _) => {
                Err(format!("{} field requires a string value", self.storage_type()))
            }
            (FieldType::Long, v) if v.is_i64() || v.is_u64() => Ok(()),
            (FieldType::Long, _) => Err("Long field requires an integer value".to_string()),
            (FieldType::Double, v) if v.is_number() => Ok(()),
            (FieldType::Double, _) => Err("Double field requires a numeric value".to_string()),
            (FieldType::Boolean, v) if v.is_boolean() => Ok(()),
            (FieldType::Boolean, _) => Err("Boolean field requires a boolean value".to_string()),
            // Accept string (ISO format) or number (timestamp)
            (FieldType::Date { .. }, v) if v.is_string() || v.is_number() => Ok(()),
            (FieldType::Date { .. }, _) => {
                Err("Date field requires a string or number value".to_string())
            }
            (FieldType::Nested, v) if v.is_array() || v.is_object() => Ok(()),
            (FieldType::Nested, _) => {
                Err("Nested field requires an object or array value".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_type_text() {
        let field = FieldType::text_with_analyzer(FULLTEXT_ANALYZER);
        assert!(field.is_string());
        assert!(field.is_analyzed());
        assert_eq!(field.analyzer(), Some("fulltext"));
    }

    #[test]
    fn test_field_type_keyword() {
        let field = FieldType::keyword();
        assert!(field.is_string());
        assert!(!field.is_analyzed());
        assert_eq!(field.analyzer(), None);
    }

    #[test]
    fn test_field_type_long() {
        let field = FieldType::Long;
        assert!(!field.is_string());
        assert!(!field.is_analyzed());
    }

    #[test]
    fn test_validate() {
        assert!(FieldType::text().validate(&json!("hello")).is_ok());
        assert!(FieldType::text().validate(&json!(123)).is_err());
        assert!(FieldType::Long.validate(&json!([1, 2, null])).is_ok());
        assert!(FieldType::Long.validate(&json!("x")).is_err());
        assert!(FieldType::Nested.validate(&json!([{"a": 1}])).is_ok());
    }

    #[test]
    fn test_serialization() {
        let field = FieldType::text_with_analyzer("english");
        let json = serde_json::to_string(&field).unwrap();
        assert!(json.contains("\"text\""));
        assert!(json.contains("\"analyzer\":\"english\""));

        let deserialized: FieldType = serde_json::from_str(&json).unwrap();
        assert_eq!(field, deserialized);
        let long: FieldType = serde_json::from_str("\"long\"").unwrap();
        assert_eq!(long, FieldType::Long);
    }
}
