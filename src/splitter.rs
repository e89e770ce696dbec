use tracing::debug;

use crate::document::Document;
use crate::knowledge::KnowledgeError;

/// Split documents into overlapping fixed-size character windows.
///
/// Each window starts `chunk_size - overlap` characters after the previous
/// one; the final window ends at the end of the content. Chunks keep their
/// parent's metadata and the parent's order.
pub fn split_documents(
    documents: &[Document],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Document>, KnowledgeError> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(KnowledgeError::InvalidChunking {
            chunk_size,
            overlap,
        });
    }

    let chunks: Vec<Document> = documents
        .iter()
        .flat_map(|doc| {
            split_text(&doc.content, chunk_size, overlap)
                .into_iter()
                .map(move |content| Document {
                    content,
                    metadata: doc.metadata.clone(),
                })
        })
        .collect();

    debug!(
        documents = documents.len(),
        chunks = chunks.len(),
        chunk_size,
        overlap,
        "Split documents"
    );
    Ok(chunks)
}

fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}
