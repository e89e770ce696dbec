//! Minimal client for the Feishu open platform document APIs.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::external::error::ExternalError;

pub const DEFAULT_API_BASE_URL: &str = "https://open.feishu.cn/open-apis";

/// Every Feishu response wraps its payload in `{code, msg, data}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DocumentContent {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct CollectionEntry {
    document_id: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionListing {
    #[serde(default)]
    documents: Vec<CollectionEntry>,
}

/// Text of one remote document
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub document_id: String,
    pub title: Option<String>,
    pub content: String,
}

/// Authenticated Feishu client holding a tenant access token
pub struct FeishuClient {
    client: Client,
    base_url: String,
    token: String,
}

impl FeishuClient {
    /// Exchange an app id/secret for a tenant access token
    pub async fn authenticate(
        base_url: &str,
        app_id: &str,
        app_secret: &str,
    ) -> Result<Self, ExternalError> {
        if app_id.is_empty() {
            return Err(ExternalError::missing("FEISHU_APP_ID"));
        }
        if app_secret.is_empty() {
            return Err(ExternalError::missing("FEISHU_APP_SECRET"));
        }

        let base_url = base_url.trim_end_matches('/').to_string();
        let client = Client::new();
        let url = format!("{}/auth/v3/tenant_access_token/internal", base_url);

        let response = client
            .post(&url)
            .json(&json!({ "app_id": app_id, "app_secret": app_secret }))
            .send()
            .await
            .map_err(|e| ExternalError::ConnectionError(e.to_string()))?;

        let body: TokenResponse = Self::parse(response, "tenant access token").await?;
        if body.code != 0 {
            error!(code = body.code, msg = %body.msg, "Failed to obtain Feishu access token");
            return Err(ExternalError::RemotePlatformError(format!(
                "Failed to obtain access token: {}",
                body.msg
            )));
        }

        let token = body.tenant_access_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            ExternalError::RemotePlatformError("Token response had no tenant_access_token".into())
        })?;

        info!("Obtained Feishu access token");
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, ExternalError> {
        let status = response.status();
        if !status.is_success() {
            error!(%status, "Feishu request for {} failed", what);
            return Err(ExternalError::RemotePlatformError(format!(
                "Request for {} failed with status {}",
                what, status
            )));
        }

        response.json::<T>().await.map_err(|e| {
            error!(error = %e, "Malformed Feishu response for {}", what);
            ExternalError::RemotePlatformError(format!("Malformed response for {}: {}", what, e))
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T, ExternalError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ExternalError::ConnectionError(e.to_string()))?;

        let envelope: Envelope<T> = Self::parse(response, what).await?;
        if envelope.code != 0 {
            error!(code = envelope.code, msg = %envelope.msg, "Feishu rejected request for {}", what);
            return Err(ExternalError::RemotePlatformError(format!(
                "Request for {} rejected: {}",
                what, envelope.msg
            )));
        }

        envelope.data.ok_or_else(|| {
            ExternalError::RemotePlatformError(format!("Response for {} had no data", what))
        })
    }

    /// Fetch the text content of a single cloud document
    pub async fn document_content(&self, document_id: &str) -> Result<String, ExternalError> {
        let data: DocumentContent = self
            .get(&format!("/doc/v2/{}/content", document_id), "document content")
            .await?;
        Ok(data.content)
    }

    /// Fetch every document of a knowledge collection.
    ///
    /// Documents whose content cannot be fetched, or is empty, are skipped.
    pub async fn collection_documents(
        &self,
        knowledge_base_id: &str,
    ) -> Result<Vec<RemoteDocument>, ExternalError> {
        let listing: CollectionListing = self
            .get(
                &format!("/knowledge/v1/bases/{}/documents", knowledge_base_id),
                "collection listing",
            )
            .await?;

        let mut documents = Vec::with_capacity(listing.documents.len());
        for entry in listing.documents {
            info!(document_id = %entry.document_id, title = ?entry.title, "Fetching document");
            match self.document_content(&entry.document_id).await {
                Ok(content) if !content.is_empty() => documents.push(RemoteDocument {
                    document_id: entry.document_id,
                    title: entry.title,
                    content,
                }),
                Ok(_) => warn!(document_id = %entry.document_id, "Document is empty, skipping"),
                Err(e) => warn!(document_id = %entry.document_id, error = %e, "Skipping document"),
            }
        }

        Ok(documents)
    }
}
