mod embedding;
pub mod error;
pub mod feishu;
mod llm;
mod openai_compatible;
pub mod selector;

pub use embedding::{EmbeddingConfig, Embedder, OllamaEmbedder};
pub use error::ExternalError;
pub use feishu::{FeishuClient, RemoteDocument};
pub use llm::{ChatModel, OllamaChat};
pub use openai_compatible::OpenAiCompatibleChat;
pub use selector::{select_model, BackendSettings, ModelConfig, ModelKind};

#[cfg(test)]
pub use embedding::MockEmbedder;
#[cfg(test)]
pub use llm::MockChatModel;
