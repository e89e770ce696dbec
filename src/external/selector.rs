//! Chooses the chat backend named by configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::external::error::ExternalError;
use crate::external::llm::{ChatModel, OllamaChat};
use crate::external::openai_compatible::OpenAiCompatibleChat;

/// The fixed set of interchangeable chat backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Primary backend, also the fallback for every other kind
    DeepSeek,
    Qianwen,
    Doubao,
    /// Local backend served by Ollama
    Ollama,
}

impl ModelKind {
    pub const PRIMARY: ModelKind = ModelKind::DeepSeek;

    /// Parse a configured backend name, falling back to the primary backend
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "deepseek" => ModelKind::DeepSeek,
            "qianwen" => ModelKind::Qianwen,
            "doubao" => ModelKind::Doubao,
            "ollama" => ModelKind::Ollama,
            other => {
                warn!(
                    model_type = other,
                    "No valid model type configured, defaulting to {}",
                    Self::PRIMARY
                );
                Self::PRIMARY
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::DeepSeek => "deepseek",
            ModelKind::Qianwen => "qianwen",
            ModelKind::Doubao => "doubao",
            ModelKind::Ollama => "ollama",
        }
    }

    /// Environment variable holding the credential, for backends that need one
    pub fn credential_variable(&self) -> Option<&'static str> {
        match self {
            ModelKind::DeepSeek => Some("DEEPSEEK_API_KEY"),
            ModelKind::Qianwen => Some("QIANWEN_API_KEY"),
            ModelKind::Doubao => Some("DOUBAO_API_KEY"),
            ModelKind::Ollama => None,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model name, credential and endpoint of one backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub temperature: f32,
    pub deepseek: BackendSettings,
    pub qianwen: BackendSettings,
    pub doubao: BackendSettings,
    pub ollama: BackendSettings,
}

impl ModelConfig {
    pub fn settings(&self, kind: ModelKind) -> &BackendSettings {
        match kind {
            ModelKind::DeepSeek => &self.deepseek,
            ModelKind::Qianwen => &self.qianwen,
            ModelKind::Doubao => &self.doubao,
            ModelKind::Ollama => &self.ollama,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::PRIMARY,
            temperature: 0.7,
            deepseek: BackendSettings {
                model: "deepseek-chat".to_string(),
                api_key: None,
                base_url: "https://api.deepseek.com".to_string(),
            },
            qianwen: BackendSettings {
                model: "qwen-turbo".to_string(),
                api_key: None,
                base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            },
            doubao: BackendSettings {
                model: "ERNIE-Bot".to_string(),
                api_key: None,
                base_url: "https://ark.cn-beijing.volces.com/api/v3".to_string(),
            },
            ollama: BackendSettings {
                model: "llama3".to_string(),
                api_key: None,
                base_url: "http://localhost:11434".to_string(),
            },
        }
    }
}

fn build(
    kind: ModelKind,
    temperature: f32,
    config: &ModelConfig,
) -> Result<Arc<dyn ChatModel>, ExternalError> {
    let settings = config.settings(kind);

    let api_key = match kind.credential_variable() {
        Some(variable) => match settings.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => Some(key),
            None => return Err(ExternalError::missing(variable)),
        },
        None => None,
    };

    match kind {
        ModelKind::DeepSeek | ModelKind::Qianwen | ModelKind::Doubao => {
            Ok(Arc::new(OpenAiCompatibleChat::new(
                kind,
                &settings.base_url,
                &settings.model,
                api_key.unwrap_or_default(),
                temperature,
            )?))
        }
        ModelKind::Ollama => Ok(Arc::new(OllamaChat::new(
            &settings.base_url,
            &settings.model,
            temperature,
        )?)),
    }
}

/// Construct the chat backend for `kind`.
///
/// A missing credential is returned as [`ExternalError::MissingCredential`].
/// Any other construction failure falls back to the primary backend; if the
/// primary backend itself cannot be built, that error is returned.
pub fn select_model(
    kind: ModelKind,
    temperature: f32,
    config: &ModelConfig,
) -> Result<Arc<dyn ChatModel>, ExternalError> {
    match build(kind, temperature, config) {
        Ok(model) => {
            info!(backend = %kind, model = model.model_name(), temperature, "Chat model initialized");
            Ok(model)
        }
        Err(err @ ExternalError::MissingCredential { .. }) => Err(err),
        Err(err) if kind == ModelKind::PRIMARY => Err(err),
        Err(err) => {
            warn!(
                backend = %kind,
                error = %err,
                "Failed to initialize model, falling back to {}",
                ModelKind::PRIMARY
            );
            build(ModelKind::PRIMARY, temperature, config)
        }
    }
}
