//! Chat backends that speak the OpenAI chat-completions protocol.
//!
//! DeepSeek, Qianwen (DashScope compatible mode) and Doubao (Ark) differ only
//! in base URL, model name and API key.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::external::error::ExternalError;
use crate::external::llm::ChatModel;
use crate::external::selector::ModelKind;

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

pub struct OpenAiCompatibleChat {
    kind: ModelKind,
    model: String,
    api_key: String,
    base_url: String,
    temperature: f32,
    client: Client,
}

impl OpenAiCompatibleChat {
    pub fn new(
        kind: ModelKind,
        base_url: &str,
        model: &str,
        api_key: &str,
        temperature: f32,
    ) -> Result<Self, ExternalError> {
        let base_url = base_url.trim_end_matches('/');
        Url::parse(base_url)
            .map_err(|e| ExternalError::ConfigError(format!("Invalid URL '{}': {}", base_url, e)))?;

        Ok(Self {
            kind,
            model: model.to_string(),
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            temperature,
            client: Client::new(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    fn backend(&self) -> ModelKind {
        self.kind
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    async fn complete(&self, prompt: &str) -> Result<String, ExternalError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": &self.model,
                "messages": [
                    { "role": "user", "content": prompt }
                ],
                "temperature": self.temperature,
                "stream": false,
            }))
            .send()
            .await
            .map_err(|e| ExternalError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalError::LlmError(format!(
                "{} returned {}: {}",
                self.kind, status, body
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::LlmError(format!("Malformed completion: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ExternalError::LlmError("Completion had no content".to_string()))
    }
}
