pub mod api;
pub mod config;
pub mod document;
pub mod external;
pub mod ingest;
pub mod knowledge;
pub mod loader;
pub mod logging;
pub mod splitter;
pub mod store;

pub use config::Config;
pub use document::Document;
pub use external::{ChatModel, Embedder, ExternalError, ModelKind};
pub use ingest::{IngestError, IngestReport};
pub use knowledge::{KnowledgeBase, KnowledgeError, QueryResult, QueryStatus};
pub use store::VectorIndex;
