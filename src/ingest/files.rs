use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::ingest::{save_or_warn, IngestError, IngestReport};
use crate::knowledge::KnowledgeBase;
use crate::loader;

pub const DEFAULT_SAVE_PATH: &str = "faiss_knowledge_base";

const SAMPLE_FILE_NAME: &str = "langchain_intro.txt";
const SAMPLE_CONTENT: &str = "\
LangChain is a framework for building applications on top of large language models.
It provides tools, components and interfaces that make end-to-end applications easier to build.

Key features of LangChain:
1. Model integration: works with many language models such as OpenAI and DeepSeek
2. Retrieval augmentation: gives models access to external knowledge bases
3. Agents: supports agents driven by an LLM
4. Chains: simplifies building complex workflows

Core components:
- Models: LLMs and chat models
- Prompts: prompt templates and management
- Chains: linking components together
- Document loaders: loading documents in many formats
- Vector stores: storing and retrieving embeddings
- Agents: systems that use an LLM to make decisions
";

/// Explicit paths win; otherwise the configured documents directory is used.
/// Directories are expanded to the supported files they contain.
pub fn resolve_paths(explicit: &[PathBuf], docs_path: &Path) -> Vec<PathBuf> {
    let roots: Vec<&Path> = if explicit.is_empty() {
        vec![docs_path]
    } else {
        explicit.iter().map(PathBuf::as_path).collect()
    };

    roots
        .into_iter()
        .flat_map(loader::collect_paths)
        .collect()
}

/// Write a sample document into `dir` if it holds no supported files yet
pub fn ensure_sample_document(dir: &Path) -> Result<Option<PathBuf>, IngestError> {
    if dir.is_dir() && loader::collect_paths(dir).iter().any(|p| p.is_file()) {
        return Ok(None);
    }

    fs::create_dir_all(dir)?;
    let path = dir.join(SAMPLE_FILE_NAME);
    fs::write(&path, SAMPLE_CONTENT)?;
    info!(path = %path.display(), "Created sample document");
    Ok(Some(path))
}

/// Build the knowledge base from local files and save it
pub async fn ingest_files(
    kb: &KnowledgeBase,
    paths: &[PathBuf],
    save_path: &Path,
) -> Result<IngestReport, IngestError> {
    info!(files = paths.len(), "Creating knowledge base from local files");
    let report = kb.create_knowledge_base(paths).await?;

    Ok(IngestReport {
        documents: report.file_count,
        chunks: report.chunk_count,
        saved_to: save_or_warn(kb, save_path).await,
    })
}
