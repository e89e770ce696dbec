use std::path::Path;

use tracing::{error, info, warn};

use crate::config::FeishuConfig;
use crate::document::Document;
use crate::external::{FeishuClient, RemoteDocument};
use crate::ingest::{save_or_warn, IngestError, IngestReport};
use crate::knowledge::{KnowledgeBase, KnowledgeError};
use crate::splitter::split_documents;

pub const DEFAULT_SAVE_PATH: &str = "feishu_knowledge_base";

/// Remote documents are split without overlap
pub const FEISHU_CHUNK_SIZE: usize = 1000;
pub const FEISHU_CHUNK_OVERLAP: usize = 0;

impl From<RemoteDocument> for Document {
    fn from(remote: RemoteDocument) -> Self {
        let document = Document::new(remote.content, format!("feishu:{}", remote.document_id));
        match remote.title {
            Some(title) => document.with_metadata("title", title),
            None => document,
        }
    }
}

async fn fetch_documents(client: &FeishuClient, config: &FeishuConfig) -> Vec<RemoteDocument> {
    let mut documents = Vec::new();

    if let Some(document_id) = config.document_id.as_deref() {
        info!(document_id, "Fetching Feishu cloud document");
        match client.document_content(document_id).await {
            Ok(content) if !content.is_empty() => documents.push(RemoteDocument {
                document_id: document_id.to_string(),
                title: None,
                content,
            }),
            Ok(_) => warn!(document_id, "Feishu document is empty"),
            Err(e) => error!(document_id, error = %e, "Failed to fetch Feishu document"),
        }
    }

    if let Some(knowledge_base_id) = config.knowledge_base_id.as_deref() {
        info!(knowledge_base_id, "Fetching Feishu knowledge collection");
        match client.collection_documents(knowledge_base_id).await {
            Ok(mut fetched) => documents.append(&mut fetched),
            Err(e) => error!(knowledge_base_id, error = %e, "Failed to fetch Feishu collection"),
        }
    }

    documents
}

/// Authenticate, fetch the configured document and/or collection, add each
/// document to the knowledge base and save it.
pub async fn ingest_feishu(
    kb: &KnowledgeBase,
    config: &FeishuConfig,
    save_path: &Path,
) -> Result<IngestReport, IngestError> {
    if config.document_id.is_none() && config.knowledge_base_id.is_none() {
        return Err(IngestError::MissingPath {
            variable: "FEISHU_DOCUMENT_ID or FEISHU_KNOWLEDGE_BASE_ID".to_string(),
        });
    }

    let client = FeishuClient::authenticate(
        &config.api_base_url,
        config.app_id.as_deref().unwrap_or_default(),
        config.app_secret.as_deref().unwrap_or_default(),
    )
    .await?;

    let mut documents = 0;
    let mut chunks = 0;
    for remote in fetch_documents(&client, config).await {
        let document_id = remote.document_id.clone();
        let split = split_documents(
            &[Document::from(remote)],
            FEISHU_CHUNK_SIZE,
            FEISHU_CHUNK_OVERLAP,
        )?;

        match kb.add_documents(split).await {
            Ok(added) => {
                documents += 1;
                chunks += added;
            }
            Err(e) => warn!(document_id = %document_id, error = %e, "Document not added"),
        }
    }

    if documents == 0 {
        error!("No Feishu documents could be added");
        return Err(KnowledgeError::NoDocuments.into());
    }

    info!(documents, chunks, "Feishu knowledge base created");
    Ok(IngestReport {
        documents,
        chunks,
        saved_to: save_or_warn(kb, save_path).await,
    })
}
