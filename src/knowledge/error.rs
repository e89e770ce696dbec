use thiserror::Error;

use crate::external::ExternalError;

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("No documents found, please check the file paths")]
    NoDocuments,

    #[error("Knowledge base has not been created yet")]
    IndexAbsent,

    #[error("Failed to load {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("Invalid chunking parameters: chunk_size={chunk_size}, overlap={overlap}")]
    InvalidChunking { chunk_size: usize, overlap: usize },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Collaborator(#[from] ExternalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
