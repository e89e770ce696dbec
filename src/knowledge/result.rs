use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::store::ScoredDocument;

pub const INVALID_TERM_ANSWER: &str = "Please provide a valid term to look up.";
pub const QUERY_FAILED_ANSWER: &str =
    "Query failed, please check that the knowledge base has been created.";
pub const CREATE_FAILED_ANSWER: &str = "Knowledge base creation failed.";

pub fn fallback_answer(term: &str) -> String {
    format!("Unable to provide an explanation for '{}'.", term)
}

pub fn load_failed_answer(path: &str) -> String {
    format!("Failed to load knowledge base: {}", path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Success,
    Fallback,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub content: String,
    pub metadata: HashMap<String, String>,
}

impl From<ScoredDocument> for Source {
    fn from(scored: ScoredDocument) -> Self {
        Self {
            content: scored.document.content,
            metadata: scored.document.metadata,
        }
    }
}

/// Answer to one question plus the chunks it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<Source>,
    pub status: QueryStatus,
}

impl QueryResult {
    /// A fixed answer with no sources
    pub fn canned(answer: impl Into<String>, status: QueryStatus) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Initialized,
    NotInitialized,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Initialized => "initialized",
            IndexStatus::NotInitialized => "not_initialized",
        }
    }
}

/// Outcome of a successful build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Documents that loaded successfully
    pub file_count: usize,
    /// Chunks now in the index
    pub chunk_count: usize,
}
