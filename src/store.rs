//! In-process vector index with directory persistence.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::Document;
use crate::knowledge::KnowledgeError;

pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: Uuid,
    pub document: Document,
    pub embedding: Vec<f32>,
}

/// A retrieved chunk and its cosine similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorIndex {
    /// Build an index from embedded chunks. All vectors must share one length.
    pub fn from_embedded(embedded: Vec<(Document, Vec<f32>)>) -> Result<Self, KnowledgeError> {
        let dimension = embedded
            .first()
            .map(|(_, v)| v.len())
            .ok_or(KnowledgeError::NoDocuments)?;

        let mut index = Self {
            dimension,
            entries: Vec::with_capacity(embedded.len()),
        };
        index.extend(embedded)?;
        Ok(index)
    }

    /// Append embedded chunks. Nothing is added if any vector has the wrong length.
    pub fn extend(&mut self, embedded: Vec<(Document, Vec<f32>)>) -> Result<usize, KnowledgeError> {
        if let Some((_, bad)) = embedded.iter().find(|(_, v)| v.len() != self.dimension) {
            return Err(KnowledgeError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        let added = embedded.len();
        self.entries
            .extend(embedded.into_iter().map(|(document, embedding)| IndexEntry {
                id: Uuid::new_v4(),
                document,
                embedding,
            }));
        debug!(added, total = self.entries.len(), "Extended vector index");
        Ok(added)
    }

    /// The `k` entries most similar to `query`, best first.
    /// Equal scores keep insertion order.
    pub fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredDocument>, KnowledgeError> {
        if query.len() != self.dimension {
            return Err(KnowledgeError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(query, &entry.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredDocument {
                document: self.entries[i].document.clone(),
                score,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn file_in(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE)
    }

    /// Write the index into `dir`, creating the directory if needed
    pub fn save(&self, dir: &Path) -> Result<(), KnowledgeError> {
        fs::create_dir_all(dir)?;
        let file = Self::file_in(dir);
        fs::write(&file, serde_json::to_vec(self)?)?;
        info!(path = %file.display(), entries = self.entries.len(), "Saved vector index");
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, KnowledgeError> {
        let file = Self::file_in(dir);
        let bytes = fs::read(&file).map_err(|e| KnowledgeError::Load {
            path: file.display().to_string(),
            reason: e.to_string(),
        })?;
        let index: Self = serde_json::from_slice(&bytes)?;

        if let Some(bad) = index
            .entries
            .iter()
            .find(|e| e.embedding.len() != index.dimension)
        {
            return Err(KnowledgeError::DimensionMismatch {
                expected: index.dimension,
                actual: bad.embedding.len(),
            });
        }

        info!(path = %file.display(), entries = index.entries.len(), "Loaded vector index");
        Ok(index)
    }
}
