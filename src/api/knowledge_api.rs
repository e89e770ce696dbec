//! Knowledge API: create, query, persist and upload over one shared knowledge base.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tempfile::TempDir;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::types::{to_data, ApiError, ApiResponse, RootResponse, StatusResponse};
use crate::ingest::word::{build_from_word, resolve_word_path};
use crate::ingest::IngestError;
use crate::knowledge::{KnowledgeBase, KnowledgeError, QueryResult, QueryStatus};

pub const DEFAULT_UPLOAD_QUERY: &str = "Please explain the main content of the documents.";

const UPLOAD_BODY_LIMIT: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct KnowledgeApiState {
    pub kb: Arc<KnowledgeBase>,
    pub word_doc_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub file_paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub use_fallback: bool,
}

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    pub save_path: String,
}

#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub file_path: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAndQueryRequest {
    pub file_paths: Vec<String>,
    pub query: String,
    #[serde(default)]
    pub save_path: Option<String>,
}

fn default_word_save_path() -> String {
    crate::ingest::word::DEFAULT_SAVE_PATH.to_string()
}

#[derive(Debug, Deserialize)]
pub struct ProcessWordRequest {
    #[serde(default)]
    pub doc_path: Option<String>,
    #[serde(default = "default_word_save_path")]
    pub save_path: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub query: Option<String>,
}

pub fn router(state: KnowledgeApiState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/status", get(status))
        .route("/knowledge/create", post(create))
        .route("/knowledge/query", post(query))
        .route("/knowledge/save", post(save))
        .route("/knowledge/load", post(load))
        .route("/knowledge/create_and_query", post(create_and_query))
        .route("/knowledge/process_word", post(process_word))
        .route(
            "/knowledge/upload_and_query",
            post(upload_and_query).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse::running("Welcome to the RAG knowledge base API"))
}

pub async fn status(State(state): State<KnowledgeApiState>) -> Json<StatusResponse> {
    Json(StatusResponse::running(
        state.kb.model_kind(),
        state.kb.index_status().await,
    ))
}

pub async fn create(
    State(state): State<KnowledgeApiState>,
    Json(request): Json<CreateRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    match state.kb.create_knowledge_base(&request.file_paths).await {
        Ok(report) => Ok(Json(ApiResponse::ok(
            "Knowledge base created",
            to_data(&report)?,
        ))),
        Err(KnowledgeError::NoDocuments) => {
            warn!("Knowledge base creation failed, no documents loaded");
            Ok(Json(ApiResponse::failure(
                "Knowledge base creation failed, please check the file paths and formats",
            )))
        }
        Err(e) => {
            warn!(error = %e, "Knowledge base creation failed");
            Ok(Json(ApiResponse::failure(format!(
                "Knowledge base creation failed: {}",
                e
            ))))
        }
    }
}

/// Success unless the answer carries the error status
fn query_response(
    result: &QueryResult,
    succeeded: &str,
    failed: &str,
) -> Result<Json<ApiResponse>, ApiError> {
    let data = to_data(result)?;
    let response = if result.status == QueryStatus::Error {
        ApiResponse::failure(failed).with_data(data)
    } else {
        ApiResponse::ok(succeeded, data)
    };
    Ok(Json(response))
}

pub async fn query(
    State(state): State<KnowledgeApiState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let result = state
        .kb
        .get_knowledge_answer(&request.question, request.use_fallback)
        .await;
    query_response(
        &result,
        "Query succeeded",
        "Query failed, please check that the knowledge base has been created",
    )
}

pub async fn save(
    State(state): State<KnowledgeApiState>,
    Json(request): Json<SaveRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    match state.kb.save_knowledge_base(Path::new(&request.save_path)).await {
        Ok(()) => Ok(Json(ApiResponse::ok(
            "Knowledge base saved",
            json!({ "save_path": request.save_path }),
        ))),
        Err(_) => Ok(Json(ApiResponse::failure("Failed to save knowledge base"))),
    }
}

pub async fn load(
    State(state): State<KnowledgeApiState>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    match state.kb.load_knowledge_base(Path::new(&request.file_path)).await {
        Ok(chunks) => Ok(Json(ApiResponse::ok(
            "Knowledge base loaded",
            json!({ "file_path": request.file_path, "chunk_count": chunks }),
        ))),
        Err(_) => Ok(Json(ApiResponse::failure(
            "Failed to load knowledge base, please check the path",
        ))),
    }
}

pub async fn create_and_query(
    State(state): State<KnowledgeApiState>,
    Json(request): Json<CreateAndQueryRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let result = state
        .kb
        .create_and_query_knowledge_base(
            &request.file_paths,
            &request.query,
            request.save_path.as_deref().map(Path::new),
        )
        .await;
    query_response(
        &result,
        "Knowledge base created and queried",
        "Failed to create and query knowledge base",
    )
}

pub async fn process_word(
    State(state): State<KnowledgeApiState>,
    Json(request): Json<ProcessWordRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let explicit = request.doc_path.as_deref().map(Path::new);
    let doc_path = resolve_word_path(explicit, state.word_doc_path.as_deref()).map_err(
        |e| match e {
            IngestError::NotFound(_) => ApiError::not_found(e.to_string()),
            IngestError::MissingPath { .. } | IngestError::UnsupportedFormat(_) => {
                ApiError::bad_request(e.to_string())
            }
            other => ApiError::internal(other.to_string()),
        },
    )?;

    match build_from_word(&state.kb, &doc_path, Path::new(&request.save_path)).await {
        Ok(report) => Ok(Json(ApiResponse::ok(
            "Word document processed and knowledge base created",
            json!({
                "doc_path": doc_path.display().to_string(),
                "save_path": request.save_path,
                "save_success": report.saved_to.is_some(),
                "chunk_count": report.chunks,
            }),
        ))),
        Err(IngestError::Knowledge(e)) => {
            warn!(error = %e, "Word knowledge base creation failed");
            Ok(Json(ApiResponse::failure("Knowledge base creation failed")))
        }
        Err(e) => {
            error!(error = %e, "Error while processing Word document");
            Err(ApiError::internal(format!(
                "Error while processing Word document: {}",
                e
            )))
        }
    }
}

/// Write one uploaded file into `dir`, keeping only the final path component
/// of the client-supplied name.
pub fn stage_upload(dir: &Path, file_name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .unwrap_or_else(|| format!("upload-{}", Uuid::new_v4()));

    let mut path = dir.join(&base);
    if path.exists() {
        path = dir.join(format!("{}-{}", Uuid::new_v4(), base));
    }
    fs::write(&path, bytes)?;
    Ok(path)
}

pub async fn upload_and_query(
    State(state): State<KnowledgeApiState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse>, ApiError> {
    // Removed when dropped, on every return path
    let staging = TempDir::new()
        .map_err(|e| ApiError::internal(format!("Failed to create staging directory: {}", e)))?;

    let mut paths = Vec::new();
    let mut query = params.query;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);

        match (name.as_deref(), file_name) {
            (_, Some(file_name)) => {
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read file '{}': {}", file_name, e))
                })?;
                let path = stage_upload(staging.path(), &file_name, &bytes).map_err(|e| {
                    ApiError::internal(format!("Failed to stage file '{}': {}", file_name, e))
                })?;
                paths.push(path);
            }
            (Some("query"), None) => {
                let text = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read query field: {}", e))
                })?;
                query = Some(text);
            }
            _ => {}
        }
    }

    if paths.is_empty() {
        return Err(ApiError::bad_request("No files uploaded"));
    }

    let query = query
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_UPLOAD_QUERY.to_string());
    info!(files = paths.len(), query = %query, "Creating knowledge base from uploaded files");

    let result = state
        .kb
        .create_and_query_knowledge_base(&paths, &query, None)
        .await;
    query_response(
        &result,
        "Uploaded files queried",
        "Failed to query uploaded files",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ExternalError, MockChatModel, MockEmbedder, ModelKind};
    use crate::knowledge::testing::stub_knowledge_base;
    use crate::knowledge::KnowledgeSettings;
    use crate::loader::tests::write_docx;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(word_doc_path: Option<PathBuf>) -> (Router, Arc<KnowledgeBase>) {
        let kb = Arc::new(stub_knowledge_base());
        let state = KnowledgeApiState {
            kb: Arc::clone(&kb),
            word_doc_path,
        };
        (router(state), kb)
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_root_and_status() {
        let (app, _) = app(None);
        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["model_type"], "deepseek");
        assert_eq!(body["index_status"], "not_initialized");

        assert_eq!(root().await.0.status, "running");
    }

    #[tokio::test]
    async fn test_query_without_index() {
        let (app, _) = app(None);
        let (status, body) = post_json(
            app.clone(),
            "/knowledge/query",
            json!({ "question": "RAG" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["status"], "error");

        let (_, body) = post_json(
            app,
            "/knowledge/query",
            json!({ "question": "RAG", "use_fallback": true }),
        )
        .await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "fallback");
    }

    #[tokio::test]
    async fn test_create_query_save_load() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("notes.txt");
        fs::write(&doc, "RAG combines retrieval with generation").unwrap();
        let (app, _) = app(None);

        let (_, body) = post_json(
            app.clone(),
            "/knowledge/create",
            json!({ "file_paths": [doc.display().to_string()] }),
        )
        .await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["file_count"], 1);

        let (_, body) = post_json(app.clone(), "/knowledge/query", json!({ "question": "RAG" })).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["answer"], "Answer to: RAG");
        assert_eq!(body["data"]["sources"].as_array().unwrap().len(), 1);

        let saved = dir.path().join("kb");
        let (_, body) = post_json(
            app.clone(),
            "/knowledge/save",
            json!({ "save_path": saved.display().to_string() }),
        )
        .await;
        assert_eq!(body["success"], true);

        let (_, body) = post_json(
            app,
            "/knowledge/load",
            json!({ "file_path": saved.display().to_string() }),
        )
        .await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["chunk_count"], 1);
    }

    #[tokio::test]
    async fn test_business_failures_are_not_transport_errors() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(None);

        let (status, body) = post_json(
            app.clone(),
            "/knowledge/create",
            json!({ "file_paths": ["/no/such/file.txt"] }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);

        let (_, body) = post_json(
            app.clone(),
            "/knowledge/save",
            json!({ "save_path": dir.path().join("kb").display().to_string() }),
        )
        .await;
        assert_eq!(body["success"], false);

        let (_, body) = post_json(
            app,
            "/knowledge/create_and_query",
            json!({ "file_paths": [], "query": "RAG" }),
        )
        .await;
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["answer"], "Knowledge base creation failed.");
    }

    #[tokio::test]
    async fn test_process_word_validation() {
        let dir = TempDir::new().unwrap();
        let (app_without_path, _) = app(None);
        let (status, body) =
            post_json(app_without_path.clone(), "/knowledge/process_word", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("WORD_DOC_PATH"));

        let missing = dir.path().join("missing.docx");
        let (status, _) = post_json(
            app_without_path.clone(),
            "/knowledge/process_word",
            json!({ "doc_path": missing.display().to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let text = dir.path().join("terms.txt");
        fs::write(&text, "plain").unwrap();
        let (status, _) = post_json(
            app_without_path,
            "/knowledge/process_word",
            json!({ "doc_path": text.display().to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_process_word_from_configured_path() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("terms.docx");
        write_docx(&doc, &["RAG: retrieval augmented generation"]);
        let save_path = dir.path().join("word_kb");
        let (app, kb) = app(Some(doc));

        let (status, body) = post_json(
            app,
            "/knowledge/process_word",
            json!({ "save_path": save_path.display().to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["save_success"], true);
        assert_eq!(
            kb.index_status().await,
            crate::knowledge::IndexStatus::Initialized
        );
    }

    #[test]
    fn test_stage_upload_strips_directories() {
        let dir = TempDir::new().unwrap();

        let path = stage_upload(dir.path(), "../../etc/notes.txt", b"x").unwrap();
        assert_eq!(path, dir.path().join("notes.txt"));

        let windows = stage_upload(dir.path(), r"C:\docs\terms.txt", b"y").unwrap();
        assert_eq!(windows, dir.path().join("terms.txt"));

        let duplicate = stage_upload(dir.path(), "notes.txt", b"z").unwrap();
        assert_ne!(duplicate, path);
        assert!(duplicate.starts_with(dir.path()));

        let unnamed = stage_upload(dir.path(), "..", b"w").unwrap();
        assert!(unnamed.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_upload_and_query_removes_staged_files() {
        let (app, _) = app(None);
        let boundary = "X-BOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"notes.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nRAG combines retrieval with generation\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"query\"\r\n\r\nWhat is RAG?\r\n\
             --{b}--\r\n",
            b = boundary
        );
        let request = Request::builder()
            .method("POST")
            .uri("/knowledge/upload_and_query")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["answer"], "Answer to: What is RAG?");
        let staged = body["data"]["sources"][0]["metadata"]["source"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(staged.ends_with("notes.txt"));
        assert!(!Path::new(&staged).exists());
    }

    #[tokio::test]
    async fn test_upload_without_files_is_rejected() {
        let (app, _) = app(None);
        let boundary = "X-BOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"query\"\r\n\r\nhello\r\n--{b}--\r\n",
            b = boundary
        );
        let request = Request::builder()
            .method("POST")
            .uri("/knowledge/upload_and_query")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_failure_reports_cause() {
        let dir = TempDir::new().unwrap();
        let notes = dir.path().join("notes.txt");
        fs::write(&notes, "RAG notes").unwrap();

        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .returning(|_| Err(ExternalError::EmbeddingError("model not pulled".to_string())));
        let mut chat = MockChatModel::new();
        chat.expect_backend().return_const(ModelKind::DeepSeek);
        let state = KnowledgeApiState {
            kb: Arc::new(KnowledgeBase::new(
                Arc::new(embedder),
                Arc::new(chat),
                KnowledgeSettings::default(),
            )),
            word_doc_path: None,
        };

        let (status, body) = post_json(
            router(state),
            "/knowledge/create",
            json!({ "file_paths": [notes.display().to_string()] }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("model not pulled"), "{}", message);
        assert!(!message.contains("check the file paths"));

        let (_, body) = post_json(
            app(None).0,
            "/knowledge/create",
            json!({ "file_paths": ["/no/such/file.txt"] }),
        )
        .await;
        assert!(body["message"].as_str().unwrap().contains("check the file paths"));
    }
}
