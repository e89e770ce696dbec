//! Question API: answers questions from a knowledge base built from the
//! configured Word document, initializing it lazily when startup failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::api::types::{ApiError, RootResponse, StatusResponse};
use crate::external::{ExternalError, ModelKind};
use crate::ingest::word::{build_from_word, resolve_word_path};
use crate::ingest::IngestError;
use crate::knowledge::{IndexStatus, KnowledgeBase};
use crate::store::INDEX_FILE;

pub const NO_ANSWER_TEXT: &str =
    "Sorry, I could not find relevant information in the knowledge base.";

pub type KnowledgeBaseFactory =
    Arc<dyn Fn() -> Result<KnowledgeBase, ExternalError> + Send + Sync>;

pub struct RagState {
    factory: KnowledgeBaseFactory,
    word_doc_path: Option<PathBuf>,
    knowledge_base_path: PathBuf,
    model_type: ModelKind,
    current: RwLock<Option<Arc<KnowledgeBase>>>,
    /// Serializes lazy initialization so `current` is only locked to install
    init: Mutex<()>,
}

impl RagState {
    pub fn new(
        factory: KnowledgeBaseFactory,
        word_doc_path: Option<PathBuf>,
        knowledge_base_path: PathBuf,
        model_type: ModelKind,
    ) -> Self {
        Self {
            factory,
            word_doc_path,
            knowledge_base_path,
            model_type,
            current: RwLock::new(None),
            init: Mutex::new(()),
        }
    }

    /// Build a fresh knowledge base from the Word document and save it to `save_path`
    async fn build(&self, save_path: &Path) -> Result<Arc<KnowledgeBase>, IngestError> {
        let doc_path = resolve_word_path(None, self.word_doc_path.as_deref())?;
        let kb = (self.factory)()?;
        build_from_word(&kb, &doc_path, save_path).await?;
        Ok(Arc::new(kb))
    }

    /// Restore a saved index when one exists at `path`, else build from Word
    async fn load_or_build(&self, path: &Path) -> Result<Arc<KnowledgeBase>, IngestError> {
        if path.join(INDEX_FILE).exists() {
            let kb = (self.factory)()?;
            match kb.load_knowledge_base(path).await {
                Ok(_) => return Ok(Arc::new(kb)),
                Err(e) => warn!(path = %path.display(), error = %e, "Rebuilding from Word document"),
            }
        }
        self.build(path).await
    }

    /// Startup build; a failure leaves the state empty for lazy initialization
    pub async fn initialize(&self) {
        info!(model_type = %self.model_type, "Initializing knowledge base");
        match self.build(&self.knowledge_base_path).await {
            Ok(kb) => {
                *self.current.write().await = Some(kb);
                info!("Knowledge base initialized");
            }
            Err(e) => warn!(error = %e, "Knowledge base not initialized, retrying on first request"),
        }
    }

    async fn current(&self) -> Option<Arc<KnowledgeBase>> {
        self.current.read().await.clone()
    }

    async fn current_or_init(&self, path: &Path) -> Option<Arc<KnowledgeBase>> {
        if let Some(kb) = self.current().await {
            return Some(kb);
        }

        let _init = self.init.lock().await;
        if let Some(kb) = self.current().await {
            return Some(kb);
        }

        info!(path = %path.display(), "Knowledge base not initialized, initializing now");
        match self.load_or_build(path).await {
            Ok(kb) => {
                *self.current.write().await = Some(Arc::clone(&kb));
                Some(kb)
            }
            Err(e) => {
                error!(error = %e, "Knowledge base initialization failed");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
    #[serde(default)]
    pub use_fallback: bool,
    #[serde(default)]
    pub knowledge_base_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReloadParams {
    pub knowledge_base_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

fn elapsed_seconds(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 100.0).round() / 100.0
}

pub fn router(state: Arc<RagState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/status", get(status))
        .route("/query", post(query))
        .route("/reload_knowledge_base", post(reload))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse::running("Welcome to the RAG question answering API"))
}

pub async fn status(State(state): State<Arc<RagState>>) -> Json<StatusResponse> {
    let index_status = match state.current().await {
        Some(kb) => kb.index_status().await,
        None => IndexStatus::NotInitialized,
    };
    Json(StatusResponse::running(state.model_type, index_status))
}

pub async fn query(
    State(state): State<Arc<RagState>>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let start = Instant::now();
    let path = request
        .knowledge_base_path
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| state.knowledge_base_path.clone());

    let kb = state.current_or_init(&path).await.ok_or_else(|| {
        ApiError::unavailable(
            "Knowledge base initialization failed, please check the Word document path and model configuration",
        )
    })?;

    let answer = match kb.query_knowledge_base(&request.question).await {
        Ok(result) if !result.answer.trim().is_empty() => Some(result.answer),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "No answer from knowledge base");
            None
        }
    };

    match answer {
        Some(answer) => Ok(Json(AnswerResponse {
            success: true,
            message: "Query succeeded".to_string(),
            answer: Some(answer),
            processing_time: Some(elapsed_seconds(start)),
        })),
        None if request.use_fallback => Ok(Json(AnswerResponse {
            success: true,
            message: "Query succeeded, but no relevant information was found".to_string(),
            answer: Some(NO_ANSWER_TEXT.to_string()),
            processing_time: Some(elapsed_seconds(start)),
        })),
        None => Err(ApiError::not_found(
            "No relevant information found in the knowledge base",
        )),
    }
}

pub async fn reload(
    State(state): State<Arc<RagState>>,
    Query(params): Query<ReloadParams>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let path = params
        .knowledge_base_path
        .map(PathBuf::from)
        .unwrap_or_else(|| state.knowledge_base_path.clone());
    info!(path = %path.display(), "Reloading knowledge base");

    let kb = state.build(&path).await.map_err(|e| {
        error!(error = %e, "Knowledge base reload failed");
        ApiError::internal(format!("Knowledge base reload failed: {}", e))
    })?;
    *state.current.write().await = Some(kb);

    Ok(Json(AnswerResponse {
        success: true,
        message: "Knowledge base reloaded".to_string(),
        answer: None,
        processing_time: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{MockChatModel, MockEmbedder};
    use crate::knowledge::testing::stub_knowledge_base;
    use crate::knowledge::KnowledgeSettings;
    use crate::loader::tests::write_docx;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn state(word_doc_path: Option<PathBuf>, knowledge_base_path: PathBuf) -> Arc<RagState> {
        Arc::new(RagState::new(
            Arc::new(|| Ok::<_, ExternalError>(stub_knowledge_base())),
            word_doc_path,
            knowledge_base_path,
            ModelKind::DeepSeek,
        ))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn ask(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_startup_failure_keeps_serving() {
        let dir = TempDir::new().unwrap();
        let state = state(None, dir.path().join("kb"));
        state.initialize().await;

        let app = router(Arc::clone(&state));
        let (status, body) = send(
            app.clone(),
            Request::builder().uri("/status").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["index_status"], "not_initialized");

        let (status, body) = send(app, ask(json!({ "question": "RAG" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["detail"].as_str().unwrap().contains("initialization failed"));
    }

    #[tokio::test]
    async fn test_lazy_build_then_answer() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("terms.docx");
        write_docx(&doc, &["RAG: retrieval augmented generation"]);
        let kb_path = dir.path().join("kb");
        let app = router(state(Some(doc), kb_path.clone()));

        let (status, body) = send(app.clone(), ask(json!({ "question": "What is RAG?" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["answer"], "Answer to: What is RAG?");
        assert!(body["processing_time"].as_f64().unwrap() >= 0.0);
        assert!(kb_path.join(INDEX_FILE).exists());

        let (_, body) = send(
            app,
            Request::builder().uri("/status").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(body["index_status"], "initialized");
        assert_eq!(body["model_type"], "deepseek");
    }

    #[tokio::test]
    async fn test_lazy_load_from_saved_index() {
        let dir = TempDir::new().unwrap();
        let saved = dir.path().join("saved");
        let seed = stub_knowledge_base();
        seed.add_documents(vec![crate::document::Document::new("saved facts", "notes.txt")])
            .await
            .unwrap();
        seed.save_knowledge_base(&saved).await.unwrap();

        let app = router(state(None, dir.path().join("default")));
        let (status, body) = send(
            app,
            ask(json!({
                "question": "facts",
                "knowledge_base_path": saved.display().to_string()
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "Answer to: facts");
    }

    #[tokio::test]
    async fn test_empty_answer_uses_fallback_or_404() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("terms.docx");
        write_docx(&doc, &["RAG"]);
        let silent: KnowledgeBaseFactory = Arc::new(|| {
            let mut embedder = MockEmbedder::new();
            embedder.expect_embed().returning(|_| Ok(vec![1.0, 0.0]));
            let mut chat = MockChatModel::new();
            chat.expect_backend().return_const(ModelKind::DeepSeek);
            chat.expect_complete().returning(|_| Ok("  ".to_string()));
            Ok::<_, ExternalError>(KnowledgeBase::new(
                Arc::new(embedder),
                Arc::new(chat),
                KnowledgeSettings::default(),
            ))
        });
        let app = router(Arc::new(RagState::new(
            silent,
            Some(doc),
            dir.path().join("kb"),
            ModelKind::DeepSeek,
        )));

        let (status, _) = send(app.clone(), ask(json!({ "question": "RAG" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(app, ask(json!({ "question": "RAG", "use_fallback": true }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["answer"], NO_ANSWER_TEXT);
    }

    #[tokio::test]
    async fn test_reload() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("terms.docx");
        write_docx(&doc, &["RAG"]);
        let target = dir.path().join("reloaded");
        let app = router(state(Some(doc), dir.path().join("kb")));

        let uri = format!("/reload_knowledge_base?knowledge_base_path={}", target.display());
        let (status, body) = send(
            app,
            Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Knowledge base reloaded");
        assert!(body.get("answer").is_none());
        assert!(target.join(INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn test_reload_failure_is_500() {
        let dir = TempDir::new().unwrap();
        let app = router(state(None, dir.path().join("kb")));
        let (status, body) = send(
            app,
            Request::builder()
                .method("POST")
                .uri("/reload_knowledge_base")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("WORD_DOC_PATH"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_status_answers_during_lazy_initialization() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("terms.docx");
        write_docx(&doc, &["RAG: retrieval augmented generation"]);

        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let started_tx = std::sync::Mutex::new(started_tx);
        let release_rx = std::sync::Mutex::new(release_rx);
        let gated: KnowledgeBaseFactory = Arc::new(move || {
            started_tx.lock().unwrap().send(()).ok();
            release_rx.lock().unwrap().recv().ok();
            Ok::<_, ExternalError>(stub_knowledge_base())
        });
        let app = router(Arc::new(RagState::new(
            gated,
            Some(doc),
            dir.path().join("kb"),
            ModelKind::DeepSeek,
        )));

        let pending = tokio::spawn(send(app.clone(), ask(json!({ "question": "What is RAG?" }))));
        tokio::task::spawn_blocking(move || started_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();

        let (status, body) = tokio::time::timeout(
            Duration::from_secs(5),
            send(
                app.clone(),
                Request::builder().uri("/status").body(Body::empty()).unwrap(),
            ),
        )
        .await
        .expect("status waited for initialization");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["index_status"], "not_initialized");

        release_tx.send(()).unwrap();
        let (status, body) = pending.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "Answer to: What is RAG?");
    }
}
