use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::ingest::{save_or_warn, IngestError, IngestReport};
use crate::knowledge::KnowledgeBase;
use crate::loader::DocumentFormat;

pub const DEFAULT_SAVE_PATH: &str = "word_knowledge_base";
pub const WORD_DOC_PATH_VARIABLE: &str = "WORD_DOC_PATH";

/// Pick the Word document to ingest: the explicit path, else the configured
/// one. The file must exist and be a `.docx`.
pub fn resolve_word_path(
    explicit: Option<&Path>,
    configured: Option<&Path>,
) -> Result<PathBuf, IngestError> {
    let path = explicit.or(configured).ok_or_else(|| {
        error!("No document path provided and WORD_DOC_PATH is not set");
        IngestError::MissingPath {
            variable: WORD_DOC_PATH_VARIABLE.to_string(),
        }
    })?;

    if !path.exists() {
        error!(path = %path.display(), "Word document does not exist");
        return Err(IngestError::NotFound(path.display().to_string()));
    }

    if DocumentFormat::from_path(path) != Some(DocumentFormat::Word) {
        error!(path = %path.display(), "Only .docx documents are supported");
        return Err(IngestError::UnsupportedFormat(format!(
            "{} (only .docx is supported)",
            path.display()
        )));
    }

    Ok(path.to_path_buf())
}

/// Build the knowledge base from one Word document and save it.
/// A failed save is reported in the result rather than as an error.
pub async fn build_from_word(
    kb: &KnowledgeBase,
    path: &Path,
    save_path: &Path,
) -> Result<IngestReport, IngestError> {
    info!(path = %path.display(), backend = %kb.model_kind(), "Creating knowledge base from Word document");
    let report = kb.create_knowledge_base(&[path]).await?;

    Ok(IngestReport {
        documents: report.file_count,
        chunks: report.chunk_count,
        saved_to: save_or_warn(kb, save_path).await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::testing::stub_knowledge_base;
    use crate::knowledge::IndexStatus;
    use crate::loader::tests::write_docx;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_path() {
        assert!(matches!(
            resolve_word_path(None, None),
            Err(IngestError::MissingPath { variable }) if variable == "WORD_DOC_PATH"
        ));
    }

    #[test]
    fn test_explicit_path_wins() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("explicit.docx");
        write_docx(&explicit, &["text"]);

        let resolved =
            resolve_word_path(Some(&explicit), Some(Path::new("/elsewhere/terms.docx"))).unwrap();
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn test_not_found_and_wrong_format() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.docx");
        assert!(matches!(
            resolve_word_path(None, Some(&missing)),
            Err(IngestError::NotFound(_))
        ));

        let text = dir.path().join("terms.txt");
        fs::write(&text, "not word").unwrap();
        assert!(matches!(
            resolve_word_path(Some(&text), None),
            Err(IngestError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_build_from_word() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("terms.docx");
        write_docx(&doc, &["RAG: retrieval augmented generation", "LLM: large language model"]);
        let save_path = dir.path().join("word_kb");

        let kb = stub_knowledge_base();
        let report = build_from_word(&kb, &doc, &save_path).await.unwrap();

        assert_eq!(report.documents, 1);
        assert_eq!(report.chunks, 1);
        assert_eq!(report.saved_to, Some(save_path));
        assert_eq!(kb.index_status().await, IndexStatus::Initialized);
    }

    #[tokio::test]
    async fn test_unsaved_build_is_still_ok() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("terms.docx");
        write_docx(&doc, &["RAG"]);
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "a file where a directory should go").unwrap();

        let kb = stub_knowledge_base();
        let report = build_from_word(&kb, &doc, &blocker).await.unwrap();
        assert_eq!(report.saved_to, None);
    }
}
