//! Drivers that feed a [`KnowledgeBase`] from a particular source.

pub mod error;
pub mod feishu;
pub mod files;
pub mod interactive;
pub mod word;

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::knowledge::KnowledgeBase;

pub use error::IngestError;
pub use interactive::{is_exit_command, run_read_loop};

/// What a driver put into the knowledge base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    /// Where the index was written, if saving succeeded
    pub saved_to: Option<PathBuf>,
}

/// Save the index; a failure is logged and reported as `None`
pub(crate) async fn save_or_warn(kb: &KnowledgeBase, path: &Path) -> Option<PathBuf> {
    match kb.save_knowledge_base(path).await {
        Ok(()) => Some(path.to_path_buf()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Knowledge base built but not saved");
            None
        }
    }
}
