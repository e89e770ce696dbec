use async_trait::async_trait;
use ollama_rs::{
    generation::{completion::request::GenerationRequest, options::GenerationOptions},
    Ollama,
};
use url::Url;

use crate::external::error::ExternalError;
use crate::external::selector::ModelKind;

/// A chat-completion backend: prompt in, generated text out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn backend(&self) -> ModelKind;

    fn model_name(&self) -> &str;

    fn temperature(&self) -> f32;

    async fn complete(&self, prompt: &str) -> Result<String, ExternalError>;
}

/// Local chat backend served by Ollama
pub struct OllamaChat {
    client: Ollama,
    model: String,
    temperature: f32,
}

impl OllamaChat {
    pub fn new(base_url: &str, model: &str, temperature: f32) -> Result<Self, ExternalError> {
        let url = Url::parse(base_url)
            .map_err(|e| ExternalError::ConfigError(format!("Invalid URL: {}", e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ExternalError::ConfigError(format!("No host in URL: {}", base_url)))?;
        let port = url.port_or_known_default().unwrap_or(11434);

        let client = Ollama::new(format!("{}://{}", url.scheme(), host), port);

        Ok(Self {
            client,
            model: model.to_string(),
            temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn backend(&self) -> ModelKind {
        ModelKind::Ollama
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    async fn complete(&self, prompt: &str) -> Result<String, ExternalError> {
        let mut request = GenerationRequest::new(self.model.clone(), prompt.to_string());
        request.options = Some(GenerationOptions::default().temperature(self.temperature));

        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| ExternalError::LlmError(e.to_string()))?;

        Ok(response.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_chat_from_url() {
        let chat = OllamaChat::new("http://localhost:11434", "llama3", 0.7).unwrap();
        assert_eq!(chat.backend(), ModelKind::Ollama);
        assert_eq!(chat.model_name(), "llama3");
        assert_eq!(chat.temperature(), 0.7);
    }

    #[test]
    fn test_ollama_chat_rejects_bad_url() {
        let result = OllamaChat::new("not a url", "llama3", 0.7);
        assert!(matches!(result, Err(ExternalError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_mock_chat_model() {
        let mut mock = MockChatModel::new();

        mock.expect_complete()
            .times(1)
            .returning(|_| Ok("Rust is a systems programming language.".to_string()));

        let response = mock.complete("What is Rust?").await.unwrap();
        assert!(!response.is_empty());
    }
}
