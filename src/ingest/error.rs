use thiserror::Error;

use crate::external::ExternalError;
use crate::knowledge::KnowledgeError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No document path provided and {variable} is not set")]
    MissingPath { variable: String },

    #[error("File {0} does not exist")]
    NotFound(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
