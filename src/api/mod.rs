//! HTTP front-ends over the knowledge base.

pub mod knowledge_api;
pub mod rag_api;
pub mod types;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

pub use knowledge_api::KnowledgeApiState;
pub use rag_api::RagState;
pub use types::{ApiError, ApiResponse};

/// Serve `router` on all interfaces until the process exits
pub async fn serve(router: Router, port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(address = %listener.local_addr()?, "Listening");
    axum::serve(listener, router).await
}
