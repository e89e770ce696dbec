use std::sync::Arc;

use tracing::{debug, warn};

use crate::external::{ChatModel, Embedder};
use crate::knowledge::error::KnowledgeError;
use crate::knowledge::result::{QueryResult, QueryStatus, Source};
use crate::store::VectorIndex;

pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"
<instruction>
You are a RAG expert who explains terms. Complete the task as follows:
1. Produce an accurate, concise explanation of the term {question}.
2. Cover its basic definition and, where relevant, common uses or background.
3. Answer in plain text without XML tags or formatting symbols.
4. If the term cannot be recognized or explained, say clearly that no explanation can be provided.
</instruction>

<input>
Term to explain: {question}
</input>

Context:
{context}
"#;

/// Prompt text with `{question}` and `{context}` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate(String);

impl Default for PromptTemplate {
    fn default() -> Self {
        Self(DEFAULT_PROMPT_TEMPLATE.to_string())
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Configured template, or the built-in one when none is set
    pub fn from_configured(template: Option<&str>) -> Self {
        match template.filter(|t| !t.trim().is_empty()) {
            Some(t) => Self::new(t),
            None => {
                warn!("RAG_PROMPT_TEMPLATE not set, using the default template");
                Self::default()
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute both placeholders in one pass, so substituted text is never
    /// itself scanned for placeholders.
    pub fn render(&self, question: &str, context: &str) -> String {
        let mut out = String::with_capacity(self.0.len() + question.len() + context.len());
        let mut rest = self.0.as_str();

        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix("{question}") {
                out.push_str(question);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{context}") {
                out.push_str(context);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

/// Index, template and models bound together to answer questions.
///
/// A pipeline is built from exactly one index and never mutated; a rebuilt
/// index always gets a new pipeline.
pub struct AnswerPipeline {
    index: Arc<VectorIndex>,
    template: PromptTemplate,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    top_k: usize,
}

impl AnswerPipeline {
    pub fn new(
        index: Arc<VectorIndex>,
        template: PromptTemplate,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            template,
            embedder,
            chat,
            top_k,
        }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub async fn answer(&self, question: &str) -> Result<QueryResult, KnowledgeError> {
        let query_vector = self.embedder.embed(question).await?;
        let hits = self.index.similarity_search(&query_vector, self.top_k)?;
        debug!(question, hits = hits.len(), "Retrieved context");

        let context = hits
            .iter()
            .map(|hit| hit.document.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = self.template.render(question, &context);
        let answer = self.chat.complete(&prompt).await?;

        Ok(QueryResult {
            answer,
            sources: hits.into_iter().map(Source::from).collect(),
            status: QueryStatus::Success,
        })
    }
}
