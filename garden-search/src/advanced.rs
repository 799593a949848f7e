//! Advanced search: retrieve bookmark context, synthesize an answer.

use std::sync::Arc;

use garden_db::{DbPool, SourceKind, SourceRepository, VectorStore};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::embeddings::EmbeddingProvider;
use crate::errors::{SearchError, SearchResult};
use crate::llm::AnswerModel;

/// Default number of bookmarks retrieved for context.
const DEFAULT_CONTEXT_DOCS: usize = 8;
/// Total character budget for the assembled context block.
const CONTEXT_CHAR_BUDGET: usize = 8_000;

const ANSWER_PROMPT: &str = "You are a research assistant answering from a personal bookmark \
collection. Use only the context below; if it does not contain the answer, say so. Cite \
bookmarks by title.";

#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub bookmark_id: Uuid,
    pub title: String,
    pub url: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvancedAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub used_context_chars: usize,
}

pub struct AdvancedSearch {
    sources: SourceRepository,
    vectors: VectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    model: Arc<dyn AnswerModel>,
    strategy: String,
}

impl AdvancedSearch {
    pub fn new(
        db: &DbPool,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn AnswerModel>,
        strategy: &str,
    ) -> Self {
        Self {
            sources: SourceRepository::new(db),
            vectors: VectorStore::new(db),
            embedder,
            model,
            strategy: strategy.to_string(),
        }
    }

    /// Answer a query from bookmark context. Structured queries are
    /// stringified to JSON before embedding.
    pub async fn answer(&self, query: &Value) -> SearchResult<AdvancedAnswer> {
        let query_text = flatten_query(query)?;
        if query_text.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let query_vec = self.embedder.embed_one(&query_text).await?;
        let hits = self
            .vectors
            .query(
                SourceKind::Bookmark,
                &self.strategy,
                &query_vec,
                DEFAULT_CONTEXT_DOCS,
            )
            .await?;

        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        let bookmarks = self.sources.bookmarks_by_ids(&ids).await?;

        // Hits arrive best-first; keep that order when assembling and
        // let the budget drop the tail (the lowest-scored items).
        let mut citations = Vec::new();
        let mut context = String::new();
        for (id, distance) in &hits {
            let Some(doc) = bookmarks.iter().find(|b| b.id.to_string() == *id) else {
                continue;
            };
            let block = format!(
                "Title: {}\nURL: {}\nSummary: {}\n\n",
                doc.title,
                doc.url,
                doc.summary.as_deref().unwrap_or("(none)")
            );
            if context.len() + block.len() > CONTEXT_CHAR_BUDGET {
                debug!(bookmark = %doc.id, "context budget reached, dropping remainder");
                break;
            }
            context.push_str(&block);
            citations.push(Citation {
                bookmark_id: doc.id,
                title: doc.title.clone(),
                url: doc.url.clone(),
                score: ((1.0 - *distance as f64) + 1.0) / 2.0,
            });
        }

        let used_context_chars = context.len();
        let prompt = format!("{ANSWER_PROMPT}\n\nContext:\n{context}\nQuestion: {query_text}\n");
        let answer = self.model.generate(&prompt).await?;

        Ok(AdvancedAnswer {
            answer,
            citations,
            used_context_chars,
        })
    }
}

/// Free-text queries pass through; structured ones are stringified.
fn flatten_query(query: &Value) -> SearchResult<String> {
    match query {
        Value::String(s) => Ok(s.clone()),
        Value::Object(_) | Value::Array(_) => Ok(query.to_string()),
        Value::Null => Err(SearchError::EmptyQuery),
        other => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_query_passes_through() {
        let q = json!("what is raft?");
        assert_eq!(flatten_query(&q).unwrap(), "what is raft?");
    }

    #[test]
    fn object_query_is_stringified() {
        let q = json!({"topic": "raft", "depth": 2});
        let flat = flatten_query(&q).unwrap();
        assert!(flat.contains("\"topic\""));
        assert!(flat.contains("raft"));
    }

    #[test]
    fn null_query_rejected() {
        assert!(flatten_query(&Value::Null).is_err());
    }
}
