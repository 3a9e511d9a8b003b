use serde::{Deserialize, Serialize};
use std::time::Duration;
use stop_words::{get, LANGUAGE};

use crate::Result;

/// Rewriter configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriterConfig {
    /// Report the single index a query stayed within as the search index
    pub allow_single_index: bool,
    /// Compile child/parent scopes into has_child/has_parent joins
    pub use_parent_child: bool,
    /// Search preference forwarded to expansion scans
    pub search_preference: Option<String>,
    pub scan: ScanSettings,
    pub concept: ConceptSettings,
    pub tokenizer: TokenizerConfig,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            allow_single_index: true,
            use_parent_child: false,
            search_preference: None,
            scan: ScanSettings::default(),
            concept: ConceptSettings::default(),
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl RewriterConfig {
    /// Load a configuration document, filling unspecified settings with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Allow or forbid reporting a single used index as the search index
    pub fn with_single_index(mut self, allow: bool) -> Self {
        self.allow_single_index = allow;
        self
    }

    /// Enable or disable parent/child joins
    pub fn with_parent_child(mut self, enabled: bool) -> Self {
        self.use_parent_child = enabled;
        self
    }

    /// Set the search preference used for expansion scans
    pub fn with_search_preference(mut self, preference: impl Into<String>) -> Self {
        self.search_preference = Some(preference.into());
        self
    }

    /// Set the number of hits fetched per scan page
    pub fn with_scan_batch_size(mut self, batch_size: usize) -> Self {
        self.scan.batch_size = batch_size;
        self
    }
}

/// Paging behaviour of expansion scans
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub batch_size: usize,
    /// Keep-alive for the initial scan request, in seconds
    pub keep_alive_secs: u64,
    /// Keep-alive for each continuation, in seconds
    pub continuation_keep_alive_secs: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            batch_size: 10_240,
            keep_alive_secs: 600,
            continuation_keep_alive_secs: 10,
        }
    }
}

impl ScanSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn continuation_keep_alive(&self) -> Duration {
        Duration::from_secs(self.continuation_keep_alive_secs)
    }
}

/// Parameters of the more-like-this query emitted for CONCEPT
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptSettings {
    pub max_query_terms: u32,
    pub min_word_length: u32,
    pub stop_words: Vec<String>,
}

impl Default for ConceptSettings {
    fn default() -> Self {
        Self {
            max_query_terms: 80,
            min_word_length: 3,
            stop_words: get(LANGUAGE::English)
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }
}

/// Tokenizer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub lowercase: bool,
    pub stem: bool,
    pub max_token_length: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            stem: false,
            max_token_length: 255,
        }
    }
}
