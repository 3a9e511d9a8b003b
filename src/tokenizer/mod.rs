//! Phrase analysis
//!
//! Phrases are split into tokens the way the target field is analyzed at
//! index time. The rewriter asks a [`PhraseAnalyzer`] for those tokens;
//! [`Tokenizer`] is the built-in implementation.

mod tokenizer;

pub use tokenizer::Tokenizer;

use crate::schema::FieldType;
use crate::Result;

/// Splits phrase text into index-time tokens for a field
pub trait PhraseAnalyzer: Send + Sync {
    /// `field_type` is `None` when the field is not mapped
    fn analyze(&self, field: &str, field_type: Option<&FieldType>, text: &str)
        -> Result<Vec<String>>;
}
