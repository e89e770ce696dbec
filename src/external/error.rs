use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("Missing required configuration: {variable} is not set")]
    MissingCredential { variable: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Chat model error: {0}")]
    LlmError(String),

    #[error("Remote document platform error: {0}")]
    RemotePlatformError(String),
}

impl ExternalError {
    pub fn missing(variable: &str) -> Self {
        Self::MissingCredential {
            variable: variable.to_string(),
        }
    }
}
