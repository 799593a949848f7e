//! Source adapters: one per searchable corpus.
//!
//! Every adapter answers the same three passes (exact, fuzzy, vector);
//! kinds without a vector index simply contribute nothing to the
//! vector pass.

use async_trait::async_trait;
use garden_db::{DbPool, SourceKind, SourceRepository, VectorStore};

use crate::errors::SearchResult;
use crate::lexical;
use crate::models::Candidate;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Whether this corpus maintains an embedding index.
    fn has_vector_index(&self) -> bool;

    /// Case-insensitive substring match over indexed fields.
    async fn exact(&self, query: &str, cap: usize) -> SearchResult<Vec<Candidate>>;

    /// Edit-distance similarity over titles/names, filtered by threshold.
    async fn fuzzy(&self, query: &str, threshold: f64, cap: usize)
    -> SearchResult<Vec<Candidate>>;

    /// Nearest neighbors for the query vector.
    async fn vector(&self, query_vec: &[f32], top_k: usize) -> SearchResult<Vec<Candidate>>;
}

/// The SQLite-backed adapter used for all seven source kinds.
pub struct DbSourceAdapter {
    kind: SourceKind,
    sources: SourceRepository,
    vectors: Option<VectorStore>,
    strategy: String,
}

impl DbSourceAdapter {
    pub fn new(db: &DbPool, kind: SourceKind, strategy: &str) -> Self {
        // Only the document-like corpora carry embeddings; the rest are
        // lexical-only.
        let vectors = match kind {
            SourceKind::Bookmark | SourceKind::Note | SourceKind::Item => {
                Some(VectorStore::new(db))
            }
            _ => None,
        };
        Self {
            kind,
            sources: SourceRepository::new(db),
            vectors,
            strategy: strategy.to_string(),
        }
    }

    /// An adapter for every source kind, in kind order.
    pub fn all(db: &DbPool, strategy: &str) -> Vec<Self> {
        SourceKind::ALL
            .iter()
            .map(|kind| Self::new(db, *kind, strategy))
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for DbSourceAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn has_vector_index(&self) -> bool {
        self.vectors.is_some()
    }

    async fn exact(&self, query: &str, cap: usize) -> SearchResult<Vec<Candidate>> {
        let rows = self.sources.exact_match(self.kind, query, cap).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut c = Candidate::from_row(self.kind, row);
                c.exact_hit = true;
                c.lexical_similarity = 1.0;
                c
            })
            .collect())
    }

    async fn fuzzy(
        &self,
        query: &str,
        threshold: f64,
        cap: usize,
    ) -> SearchResult<Vec<Candidate>> {
        // The cap bounds what this pass contributes, not how far it
        // scans; a match on the last row of the corpus still counts.
        let rows = self.sources.titles(self.kind).await?;
        let mut out = Vec::new();
        for row in rows {
            let Some(title) = row.title.as_deref() else {
                continue;
            };
            let sim = lexical::similarity(query, title);
            if sim >= threshold {
                let mut c = Candidate::from_row(self.kind, row);
                c.lexical_similarity = sim;
                out.push(c);
            }
        }
        out.sort_by(|a, b| {
            b.lexical_similarity
                .partial_cmp(&a.lexical_similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out.truncate(cap);
        Ok(out)
    }

    async fn vector(&self, query_vec: &[f32], top_k: usize) -> SearchResult<Vec<Candidate>> {
        let Some(vectors) = &self.vectors else {
            return Ok(Vec::new());
        };

        let hits = vectors
            .query(self.kind, &self.strategy, query_vec, top_k)
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        let rows = self.sources.by_ids(self.kind, &ids).await?;

        let mut out = Vec::new();
        for (id, distance) in hits {
            let Some(row) = rows.iter().find(|r| r.id == id) else {
                // Stale index entry; the row was deleted underneath it.
                continue;
            };
            let mut c = Candidate::from_row(self.kind, row.clone());
            c.vector_similarity = cosine_similarity_score(distance);
            out.push(c);
        }
        Ok(out)
    }
}

/// Map a vec0 cosine distance (`1 - cos`) into `[0,1]` via `(cos+1)/2`.
fn cosine_similarity_score(distance: f32) -> f64 {
    let cos = 1.0 - distance as f64;
    ((cos + 1.0) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        assert!((cosine_similarity_score(0.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_score_half() {
        assert!((cosine_similarity_score(1.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn opposite_vectors_score_zero() {
        assert!(cosine_similarity_score(2.0).abs() < 1e-9);
    }
}
