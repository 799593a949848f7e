//! The unified ranker: fan out across adapters, fuse signals, order.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use garden_core::SearchSettings;
use garden_db::{DbPool, SourceKind};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::adapters::{DbSourceAdapter, SourceAdapter};
use crate::embeddings::EmbeddingProvider;
use crate::errors::{SearchError, SearchResult};
use crate::models::{Candidate, SearchOutcome, SearchWeights, UnifiedSearchResult};
use crate::{recency, text};

pub struct UnifiedSearch {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    settings: SearchSettings,
}

impl UnifiedSearch {
    pub fn new(
        db: &DbPool,
        settings: SearchSettings,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        let adapters = DbSourceAdapter::all(db, &settings.default_strategy)
            .into_iter()
            .map(|a| Arc::new(a) as Arc<dyn SourceAdapter>)
            .collect();
        Self {
            adapters,
            embedder,
            settings,
        }
    }

    /// Construct over an explicit adapter set. Used by tests that need
    /// frozen or failing adapters.
    pub fn with_adapters(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        settings: SearchSettings,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        Self {
            adapters,
            embedder,
            settings,
        }
    }

    pub async fn search_all(
        &self,
        query: &str,
        weights: SearchWeights,
        limit: usize,
    ) -> SearchResult<SearchOutcome> {
        self.search_all_with_cancel(query, weights, limit, CancellationToken::new())
            .await
    }

    pub async fn search_all_with_cancel(
        &self,
        query: &str,
        weights: SearchWeights,
        limit: usize,
        cancel: CancellationToken,
    ) -> SearchResult<SearchOutcome> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let limit = limit.clamp(1, self.settings.max_limit);
        let normalized = text::normalize(query);

        let mut errors = Vec::new();

        let query_vec = if weights.similarity > 0.0 {
            match &self.embedder {
                Some(embedder) => match embedder.embed_one(&normalized.text).await {
                    Ok(vec) => Some(vec),
                    Err(err) => {
                        // Lexical-only downgrade: the request still runs.
                        warn!(error = %err, "query embedding failed, skipping vector pass");
                        errors.push(format!("embedding: {err}"));
                        None
                    }
                },
                None => None,
            }
        } else {
            None
        };

        let semaphore = Arc::new(Semaphore::new(self.settings.fanout.max(1)));
        let query_vec = Arc::new(query_vec);
        let query_text = Arc::new(normalized.text);

        let mut tasks = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let adapter = Arc::clone(adapter);
            let semaphore = Arc::clone(&semaphore);
            let query_vec = Arc::clone(&query_vec);
            let query_text = Arc::clone(&query_text);
            let cancel = cancel.clone();
            let fuzzy_threshold = self.settings.fuzzy_threshold;
            let adapter_cap = self.settings.adapter_cap;
            let vector_top_k = self.settings.vector_top_k;
            let vector_timeout = Duration::from_millis(self.settings.vector_timeout_ms);

            tasks.push(tokio::spawn(async move {
                // Cancellation abandons the adapter mid-flight, not
                // just between pairs of passes.
                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(SearchError::Cancelled),
                    result = async {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|_| SearchError::Cancelled)?;
                        run_adapter(
                            adapter.as_ref(),
                            &query_text,
                            query_vec.as_deref(),
                            fuzzy_threshold,
                            adapter_cap,
                            vector_top_k,
                            vector_timeout,
                        )
                        .await
                    } => result,
                };
                (adapter.kind(), result)
            }));
        }

        let mut merged: HashMap<(SourceKind, String), Candidate> = HashMap::new();
        for task in tasks {
            let (kind, result) = match task.await {
                Ok(pair) => pair,
                Err(err) => {
                    errors.push(format!("adapter task failed: {err}"));
                    continue;
                }
            };
            match result {
                Ok((candidates, vector_timed_out)) => {
                    if vector_timed_out {
                        errors.push(format!("{kind}: vector pass exceeded budget"));
                    }
                    for candidate in candidates {
                        merged
                            .entry((candidate.source_kind, candidate.source_id.clone()))
                            .and_modify(|existing| existing.absorb(&candidate))
                            .or_insert(candidate);
                    }
                }
                Err(err) => errors.push(format!("{kind}: {err}")),
            }
        }

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let now = Utc::now();
        let tau = self.settings.recency_tau_days;
        let mut results: Vec<UnifiedSearchResult> = merged
            .into_values()
            .map(|c| fuse(c, &weights, now, tau))
            .collect();
        results.sort_by(compare_results);
        results.truncate(limit);

        Ok(SearchOutcome {
            partial: !errors.is_empty(),
            results,
            errors,
        })
    }
}

/// Returns the adapter's candidates plus whether its vector pass blew
/// the soft budget (skipped, reported upstream as a partial result).
async fn run_adapter(
    adapter: &dyn SourceAdapter,
    query: &str,
    query_vec: Option<&[f32]>,
    fuzzy_threshold: f64,
    cap: usize,
    top_k: usize,
    vector_timeout: Duration,
) -> SearchResult<(Vec<Candidate>, bool)> {
    let mut candidates = adapter.exact(query, cap).await?;
    candidates.extend(adapter.fuzzy(query, fuzzy_threshold, cap).await?);

    let mut vector_timed_out = false;
    if let Some(vec) = query_vec
        && adapter.has_vector_index()
    {
        match tokio::time::timeout(vector_timeout, adapter.vector(vec, top_k)).await {
            Ok(hits) => candidates.extend(hits?),
            Err(_) => {
                warn!(kind = %adapter.kind(), "vector pass exceeded budget, skipping");
                vector_timed_out = true;
            }
        }
    }

    candidates.truncate(cap);
    Ok((candidates, vector_timed_out))
}

fn fuse(
    candidate: Candidate,
    weights: &SearchWeights,
    now: chrono::DateTime<Utc>,
    tau_days: f64,
) -> UnifiedSearchResult {
    let age_seconds = (now - candidate.created_at).num_seconds();
    let s_exact = if candidate.exact_hit { 1.0 } else { 0.0 };
    let s_sim = candidate
        .lexical_similarity
        .max(candidate.vector_similarity);
    let s_rec = recency::score(age_seconds, tau_days);
    let score =
        weights.exact_match * s_exact + weights.similarity * s_sim + weights.recency * s_rec;

    UnifiedSearchResult {
        source_kind: candidate.source_kind,
        source_id: candidate.source_id,
        title: candidate.title,
        text: candidate.text,
        score,
        exact_hit: candidate.exact_hit,
        lexical_similarity: candidate.lexical_similarity,
        vector_similarity: candidate.vector_similarity,
        recency: s_rec,
        created_at: candidate.created_at,
        updated_at: candidate.updated_at,
    }
}

/// Descending score, then most-recent `updated_at`, then kind, then id.
fn compare_results(a: &UnifiedSearchResult, b: &UnifiedSearchResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.source_kind.as_str().cmp(b.source_kind.as_str()))
        .then_with(|| a.source_id.cmp(&b.source_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result(score: f64, updated: i64, kind: SourceKind, id: &str) -> UnifiedSearchResult {
        let ts = Utc.timestamp_opt(updated, 0).unwrap();
        UnifiedSearchResult {
            source_kind: kind,
            source_id: id.to_string(),
            title: None,
            text: String::new(),
            score,
            exact_hit: false,
            lexical_similarity: 0.0,
            vector_similarity: 0.0,
            recency: 0.0,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn ordering_prefers_score_then_recency_then_kind_then_id() {
        let mut rows = vec![
            result(1.0, 100, SourceKind::Note, "b"),
            result(2.0, 50, SourceKind::Session, "z"),
            result(1.0, 200, SourceKind::Bookmark, "a"),
            result(1.0, 100, SourceKind::Bookmark, "c"),
            result(1.0, 100, SourceKind::Bookmark, "a"),
        ];
        rows.sort_by(compare_results);

        assert_eq!(rows[0].score, 2.0);
        assert_eq!(rows[1].updated_at.timestamp(), 200);
        // same score and updated_at: bookmark < note lexicographically
        assert_eq!(rows[2].source_kind, SourceKind::Bookmark);
        assert_eq!(rows[2].source_id, "a");
        assert_eq!(rows[3].source_id, "c");
        assert_eq!(rows[4].source_kind, SourceKind::Note);
    }

    #[test]
    fn fuse_takes_max_of_lexical_and_vector() {
        let now = Utc::now();
        let candidate = Candidate {
            source_kind: SourceKind::Note,
            source_id: "n".into(),
            title: None,
            text: String::new(),
            created_at: now,
            updated_at: now,
            exact_hit: false,
            lexical_similarity: 0.4,
            vector_similarity: 0.9,
        };
        let fused = fuse(candidate, &SearchWeights::default(), now, 30.0);
        // 2.0 * 0.9 + 1.0 * 1.0 (zero age)
        assert!((fused.score - 2.8).abs() < 1e-9);
    }
}
