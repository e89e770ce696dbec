use std::sync::Arc;

use crate::external::{MockChatModel, MockEmbedder, ModelKind};
use crate::knowledge::{KnowledgeBase, KnowledgeSettings, PromptTemplate};

/// Counts of a few marker letters, plus a constant so no vector is zero
pub(crate) fn letter_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut vector: Vec<f32> = ['a', 'e', 'r', 's', 't']
        .iter()
        .map(|c| lower.matches(*c).count() as f32)
        .collect();
    vector.push(1.0);
    vector
}

/// Knowledge base over mocks: letter-count embeddings and a model that
/// answers with the first line of its prompt (the question).
pub(crate) fn stub_knowledge_base() -> KnowledgeBase {
    let mut embedder = MockEmbedder::new();
    embedder
        .expect_embed()
        .returning(|text| Ok(letter_vector(text)));

    let mut chat = MockChatModel::new();
    chat.expect_backend().return_const(ModelKind::DeepSeek);
    chat.expect_complete().returning(|prompt| {
        Ok(format!(
            "Answer to: {}",
            prompt.lines().next().unwrap_or_default()
        ))
    });

    KnowledgeBase::new(
        Arc::new(embedder),
        Arc::new(chat),
        KnowledgeSettings {
            template: PromptTemplate::new("{question}\n{context}"),
            ..KnowledgeSettings::default()
        },
    )
}
