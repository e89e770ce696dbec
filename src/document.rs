use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata key naming where a document came from
pub const SOURCE_KEY: &str = "source";

/// A unit of text plus its origin metadata.
///
/// Loaders produce one `Document` per file (or remote document); the splitter
/// produces chunks of the same shape, each carrying its parent's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document tagged with its source
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }

    /// Length in characters, not bytes
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}
