use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::external::{feishu, BackendSettings, EmbeddingConfig, ModelConfig, ModelKind};

pub const DEFAULT_WELCOME_MESSAGE: &str =
    "Welcome! I am a RAG expert providing term explanations.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Prompt template from the environment; `None` selects the built-in one
    pub prompt_template: Option<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_concurrent_requests: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            prompt_template: None,
            chunk_size: 1000,
            chunk_overlap: 200,
            max_concurrent_requests: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub word_doc_path: Option<PathBuf>,
    pub docs_path: PathBuf,
    pub welcome_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeishuConfig {
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub document_id: Option<String>,
    pub knowledge_base_id: Option<String>,
    pub api_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub api_port: u16,
    pub rag_port: u16,
    pub knowledge_base_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub embedding: EmbeddingConfig,
    pub knowledge: KnowledgeConfig,
    pub ingest: IngestConfig,
    pub feishu: FeishuConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Non-empty value of an environment variable
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    var(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn backend(prefix: &str, url_suffix: &str, defaults: &BackendSettings) -> BackendSettings {
    BackendSettings {
        model: var_or(&format!("{}_MODEL", prefix), &defaults.model),
        api_key: var(&format!("{}_API_KEY", prefix)),
        base_url: var_or(&format!("{}_{}", prefix, url_suffix), &defaults.base_url),
    }
}

fn port(name: &str, default: u16) -> u16 {
    match var(name) {
        None => default,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid port configuration '{}' in {}, using default port {}", value, name, default);
            default
        }),
    }
}

/// Overlap must stay below the chunk size; otherwise every split fails
fn chunking(chunk_size: usize, chunk_overlap: usize, defaults: &KnowledgeConfig) -> (usize, usize) {
    if chunk_size == 0 {
        warn!(
            "CHUNK_SIZE must be positive, using defaults {}/{}",
            defaults.chunk_size, defaults.chunk_overlap
        );
        return (defaults.chunk_size, defaults.chunk_overlap);
    }
    if chunk_overlap >= chunk_size {
        let clamped = chunk_size / 5;
        warn!(
            "CHUNK_OVERLAP {} is not below CHUNK_SIZE {}, using overlap {}",
            chunk_overlap, chunk_size, clamped
        );
        return (chunk_size, clamped);
    }
    (chunk_size, chunk_overlap)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = ModelConfig::default();
        let model = ModelConfig {
            kind: ModelKind::parse_or_default(&var_or("MODEL_TYPE", "deepseek")),
            temperature: parsed_or("TEMPERATURE", defaults.temperature),
            deepseek: backend("DEEPSEEK", "BASE_URL", &defaults.deepseek),
            qianwen: backend("QIANWEN", "BASE_URL", &defaults.qianwen),
            doubao: backend("DOUBAO", "BASE_URL", &defaults.doubao),
            ollama: backend("OLLAMA", "BASE_URL", &defaults.ollama),
        };

        let embedding = EmbeddingConfig {
            model: var_or("OLLAMA_EMBEDDING_MODEL", "nomic-embed-text"),
            host: var_or("OLLAMA_HOST", "localhost"),
            port: parsed_or("OLLAMA_PORT", 11434),
        };

        let knowledge_defaults = KnowledgeConfig::default();
        let (chunk_size, chunk_overlap) = chunking(
            parsed_or("CHUNK_SIZE", knowledge_defaults.chunk_size),
            parsed_or("CHUNK_OVERLAP", knowledge_defaults.chunk_overlap),
            &knowledge_defaults,
        );
        let knowledge = KnowledgeConfig {
            prompt_template: var("RAG_PROMPT_TEMPLATE"),
            chunk_size,
            chunk_overlap,
            max_concurrent_requests: parsed_or(
                "MAX_CONCURRENT_REQUESTS",
                knowledge_defaults.max_concurrent_requests,
            )
            .max(1),
        };

        let ingest = IngestConfig {
            word_doc_path: var("WORD_DOC_PATH").map(PathBuf::from),
            docs_path: PathBuf::from(var_or("DOCS_PATH", "sample_docs")),
            welcome_message: var_or("WELCOME_MESSAGE", DEFAULT_WELCOME_MESSAGE),
        };

        let feishu = FeishuConfig {
            app_id: var("FEISHU_APP_ID"),
            app_secret: var("FEISHU_APP_SECRET"),
            document_id: var("FEISHU_DOCUMENT_ID"),
            knowledge_base_id: var("FEISHU_KNOWLEDGE_BASE_ID"),
            api_base_url: var_or("FEISHU_API_BASE_URL", feishu::DEFAULT_API_BASE_URL),
        };

        let server = ServerConfig {
            api_port: port("API_SERVER_PORT", 8000),
            rag_port: port("RAG_API_PORT", 8001),
            knowledge_base_path: PathBuf::from(var_or("KNOWLEDGE_BASE_PATH", "word_knowledge_base")),
        };

        let logging = LoggingConfig {
            level: var_or("LOG_LEVEL", "info"),
            format: match var_or("LOG_FORMAT", "pretty").to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Self {
            model,
            embedding,
            knowledge,
            ingest,
            feishu,
            server,
            logging,
        }
    }
}
