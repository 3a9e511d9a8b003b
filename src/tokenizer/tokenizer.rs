use rust_stemmers::{Algorithm, Stemmer};
use unicode_segmentation::UnicodeSegmentation;

use super::PhraseAnalyzer;
use crate::config::TokenizerConfig;
use crate::schema::FieldType;
use crate::Result;

/// Unicode word tokenizer with optional stemming
///
/// Analyzed (text) fields are split on word boundaries; every other field
/// type is indexed as a single token.
pub struct Tokenizer {
    config: TokenizerConfig,
    stemmer: Option<Stemmer>,
}

impl Tokenizer {
    /// Create a new tokenizer from configuration
    pub fn new(config: &TokenizerConfig) -> Self {
        let stemmer = if config.stem {
            Some(Stemmer::create(Algorithm::English))
        } else {
            None
        };

        Self {
            config: config.clone(),
            stemmer,
        }
    }

    /// Tokenize text into a vector of terms
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .map(|word| self.normalize(word))
            .filter(|token| token.len() <= self.config.max_token_length)
            .collect()
    }

    /// Apply case folding and stemming to one token
    pub fn normalize(&self, word: &str) -> String {
        let mut token = if self.config.lowercase {
            word.to_lowercase()
        } else {
            word.to_string()
        };

        if let Some(stemmer) = &self.stemmer {
            token = stemmer.stem(&token).to_string();
        }
        token
    }

    /// Tokens of `text` as a field of type `field_type` would index them
    pub fn tokenize_for(&self, field_type: Option<&FieldType>, text: &str) -> Vec<String> {
        match field_type {
            Some(field_type) if !field_type.is_analyzed() => vec![text.to_string()],
            _ => self.tokenize(text),
        }
    }
}

impl PhraseAnalyzer for Tokenizer {
    fn analyze(
        &self,
        _field: &str,
        field_type: Option<&FieldType>,
        text: &str,
    ) -> Result<Vec<String>> {
        Ok(self.tokenize_for(field_type, text))
    }
}
