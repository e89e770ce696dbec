//! The knowledge base: embedding, indexing and retrieval-augmented answers.
//!
//! Index and answer pipeline live together in one [`IndexState`] behind a
//! lock. Every rebuild constructs a complete new pipeline first and swaps it
//! in as a single reference, so a failed rebuild leaves the previous state
//! untouched and a query always sees one consistent pipeline.

pub mod error;
pub mod pipeline;
pub mod result;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::{Config, KnowledgeConfig};
use crate::document::Document;
use crate::external::{
    select_model, ChatModel, Embedder, ExternalError, ModelKind, OllamaEmbedder,
};
use crate::loader;
use crate::splitter::split_documents;
use crate::store::VectorIndex;

pub use error::KnowledgeError;
pub use pipeline::{AnswerPipeline, PromptTemplate, DEFAULT_PROMPT_TEMPLATE};
pub use result::{BuildReport, IndexStatus, QueryResult, QueryStatus, Source};

/// Number of chunks retrieved per question
pub const TOP_K: usize = 5;

#[derive(Debug, Clone)]
pub struct KnowledgeSettings {
    pub template: PromptTemplate,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_concurrent_requests: usize,
    pub top_k: usize,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            template: PromptTemplate::default(),
            chunk_size: 1000,
            chunk_overlap: 200,
            max_concurrent_requests: 4,
            top_k: TOP_K,
        }
    }
}

impl KnowledgeSettings {
    pub fn from_config(config: &KnowledgeConfig) -> Self {
        Self {
            template: PromptTemplate::from_configured(config.prompt_template.as_deref()),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            max_concurrent_requests: config.max_concurrent_requests,
            top_k: TOP_K,
        }
    }
}

enum IndexState {
    NotBuilt,
    Ready(Arc<AnswerPipeline>),
}

pub struct KnowledgeBase {
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    settings: KnowledgeSettings,
    state: RwLock<IndexState>,
}

impl KnowledgeBase {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        settings: KnowledgeSettings,
    ) -> Self {
        Self {
            embedder,
            chat,
            settings,
            state: RwLock::new(IndexState::NotBuilt),
        }
    }

    /// Build the embedding function and select the chat model from configuration
    pub fn from_config(config: &Config) -> Result<Self, ExternalError> {
        let embedder = OllamaEmbedder::new(config.embedding.clone())?;
        let chat = select_model(config.model.kind, config.model.temperature, &config.model)?;
        info!(
            backend = %chat.backend(),
            model = chat.model_name(),
            embedding_model = embedder.model(),
            "Knowledge base initialized"
        );

        Ok(Self::new(
            Arc::new(embedder),
            chat,
            KnowledgeSettings::from_config(&config.knowledge),
        ))
    }

    pub fn model_kind(&self) -> ModelKind {
        self.chat.backend()
    }

    pub fn settings(&self) -> &KnowledgeSettings {
        &self.settings
    }

    pub async fn index_status(&self) -> IndexStatus {
        match *self.state.read().await {
            IndexState::NotBuilt => IndexStatus::NotInitialized,
            IndexState::Ready(_) => IndexStatus::Initialized,
        }
    }

    async fn pipeline(&self) -> Option<Arc<AnswerPipeline>> {
        match &*self.state.read().await {
            IndexState::NotBuilt => None,
            IndexState::Ready(pipeline) => Some(Arc::clone(pipeline)),
        }
    }

    /// Bind a new pipeline to `index` and make it current
    async fn install(&self, index: VectorIndex) {
        let pipeline = Arc::new(AnswerPipeline::new(
            Arc::new(index),
            self.settings.template.clone(),
            Arc::clone(&self.embedder),
            Arc::clone(&self.chat),
            self.settings.top_k,
        ));
        *self.state.write().await = IndexState::Ready(pipeline);
    }

    /// Embed chunks with bounded concurrency, keeping input order.
    ///
    /// A chunk that fails to embed drops every chunk of its source document.
    async fn embed_chunks(
        &self,
        chunks: Vec<Document>,
    ) -> Result<Vec<(Document, Vec<f32>)>, KnowledgeError> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let results: Vec<Result<Vec<f32>, ExternalError>> = stream::iter(texts)
            .map(|text| {
                let embedder = Arc::clone(&self.embedder);
                async move { embedder.embed(&text).await }
            })
            .buffered(self.settings.max_concurrent_requests.max(1))
            .collect()
            .await;

        let mut failed_sources: HashSet<String> = HashSet::new();
        let mut first_error = None;
        let mut embedded = Vec::with_capacity(chunks.len());

        for (chunk, result) in chunks.into_iter().zip(results) {
            match result {
                Ok(vector) => embedded.push((chunk, vector)),
                Err(e) => {
                    let source = chunk.source().unwrap_or_default().to_string();
                    warn!(source = %source, error = %e, "Failed to embed chunk, dropping document");
                    failed_sources.insert(source);
                    first_error.get_or_insert(e);
                }
            }
        }

        if !failed_sources.is_empty() {
            embedded.retain(|(chunk, _)| !failed_sources.contains(chunk.source().unwrap_or_default()));
        }

        if embedded.is_empty() {
            return Err(first_error
                .map(KnowledgeError::from)
                .unwrap_or(KnowledgeError::NoDocuments));
        }
        Ok(embedded)
    }

    /// Chunk, embed and index `documents`, replacing the current index
    pub async fn create_from_documents(
        &self,
        documents: Vec<Document>,
    ) -> Result<BuildReport, KnowledgeError> {
        if documents.is_empty() {
            error!("No documents found, please check the file paths");
            return Err(KnowledgeError::NoDocuments);
        }

        let chunks = split_documents(
            &documents,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
        )?;
        if chunks.is_empty() {
            return Err(KnowledgeError::NoDocuments);
        }

        let embedded = self.embed_chunks(chunks).await?;
        let index = VectorIndex::from_embedded(embedded)?;
        let report = BuildReport {
            file_count: documents.len(),
            chunk_count: index.len(),
        };
        self.install(index).await;

        info!(
            documents = report.file_count,
            chunks = report.chunk_count,
            "Knowledge base created"
        );
        Ok(report)
    }

    /// Load every path and build a fresh index from the result.
    ///
    /// Fails with [`KnowledgeError::NoDocuments`] when nothing could be loaded;
    /// any failure keeps the previous index.
    pub async fn create_knowledge_base<P: AsRef<Path> + Sync>(
        &self,
        paths: &[P],
    ) -> Result<BuildReport, KnowledgeError> {
        let documents = loader::load_all(paths);
        self.create_from_documents(documents).await
    }

    pub async fn query_knowledge_base(&self, question: &str) -> Result<QueryResult, KnowledgeError> {
        let Some(pipeline) = self.pipeline().await else {
            error!("Knowledge base has not been created, call create_knowledge_base first");
            return Err(KnowledgeError::IndexAbsent);
        };

        pipeline.answer(question).await.map_err(|e| {
            error!(error = %e, "Query failed");
            e
        })
    }

    /// Answer `term`, never failing. Without an answer the result is either a
    /// fallback explanation or an error-status message.
    pub async fn get_knowledge_answer(&self, term: &str, use_fallback: bool) -> QueryResult {
        if term.trim().is_empty() {
            return QueryResult::canned(result::INVALID_TERM_ANSWER, QueryStatus::Error);
        }

        match self.query_knowledge_base(term).await {
            Ok(mut answer) => {
                answer.status = QueryStatus::Success;
                answer
            }
            Err(_) if use_fallback => {
                QueryResult::canned(result::fallback_answer(term), QueryStatus::Fallback)
            }
            Err(_) => QueryResult::canned(result::QUERY_FAILED_ANSWER, QueryStatus::Error),
        }
    }

    pub async fn create_and_query_knowledge_base<P: AsRef<Path> + Sync>(
        &self,
        paths: &[P],
        query: &str,
        save_path: Option<&Path>,
    ) -> QueryResult {
        if let Err(e) = self.create_knowledge_base(paths).await {
            error!(error = %e, "Knowledge base creation failed");
            return QueryResult::canned(result::CREATE_FAILED_ANSWER, QueryStatus::Error);
        }

        if let Some(path) = save_path {
            if let Err(e) = self.save_knowledge_base(path).await {
                warn!(path = %path.display(), error = %e, "Continuing without a saved copy");
            }
        }

        self.get_knowledge_answer(query, false).await
    }

    pub async fn load_and_query_knowledge_base(&self, path: &Path, query: &str) -> QueryResult {
        if self.load_knowledge_base(path).await.is_err() {
            return QueryResult::canned(
                result::load_failed_answer(&path.display().to_string()),
                QueryStatus::Error,
            );
        }

        self.get_knowledge_answer(query, false).await
    }

    pub async fn save_knowledge_base(&self, path: &Path) -> Result<(), KnowledgeError> {
        let Some(pipeline) = self.pipeline().await else {
            error!("No knowledge base to save");
            return Err(KnowledgeError::IndexAbsent);
        };

        pipeline.index().save(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to save knowledge base");
            e
        })
    }

    /// Replace the current index with one restored from `path`.
    /// Returns the number of chunks loaded.
    pub async fn load_knowledge_base(&self, path: &Path) -> Result<usize, KnowledgeError> {
        let index = VectorIndex::load(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to load knowledge base");
            e
        })?;

        let chunks = index.len();
        self.install(index).await;
        info!(path = %path.display(), chunks, "Knowledge base loaded");
        Ok(chunks)
    }

    /// Embed `chunks` and merge them into the current index, or build a new
    /// index when none exists. Returns the number of chunks added.
    pub async fn add_documents(&self, chunks: Vec<Document>) -> Result<usize, KnowledgeError> {
        if chunks.is_empty() {
            return Err(KnowledgeError::NoDocuments);
        }

        let embedded = self.embed_chunks(chunks).await?;
        let added = embedded.len();

        let index = match self.pipeline().await {
            Some(current) => {
                let mut merged = VectorIndex::clone(current.index());
                merged.extend(embedded)?;
                merged
            }
            None => VectorIndex::from_embedded(embedded)?,
        };

        let total = index.len();
        self.install(index).await;
        info!(added, total, "Added documents to knowledge base");
        Ok(added)
    }
}
