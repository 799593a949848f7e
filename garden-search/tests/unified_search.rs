//! End-to-end ranker behavior over both stub adapters and a real
//! in-memory database.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use garden_core::SearchSettings;
use garden_db::{DbPool, SourceKind, SourceRepository};
use garden_search::{
    Candidate, DbSourceAdapter, EmbeddingProvider, SearchError, SearchResult, SearchWeights,
    SourceAdapter, UnifiedSearch,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// An adapter with frozen pass outputs, for deterministic fusion tests.
struct StubAdapter {
    kind: SourceKind,
    exact: Vec<Candidate>,
    fuzzy: Vec<Candidate>,
    fail: bool,
    stall: bool,
    slow_vector: bool,
}

impl StubAdapter {
    fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            exact: Vec::new(),
            fuzzy: Vec::new(),
            fail: false,
            stall: false,
            slow_vector: false,
        }
    }
}

#[async_trait]
impl SourceAdapter for StubAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn has_vector_index(&self) -> bool {
        self.slow_vector
    }

    async fn exact(&self, _query: &str, _cap: usize) -> SearchResult<Vec<Candidate>> {
        if self.fail {
            return Err(SearchError::Embedding("stub adapter down".into()));
        }
        if self.stall {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
        Ok(self.exact.clone())
    }

    async fn fuzzy(
        &self,
        _query: &str,
        _threshold: f64,
        _cap: usize,
    ) -> SearchResult<Vec<Candidate>> {
        Ok(self.fuzzy.clone())
    }

    async fn vector(&self, _query_vec: &[f32], _top_k: usize) -> SearchResult<Vec<Candidate>> {
        if self.slow_vector {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
        Ok(Vec::new())
    }
}

/// A provider that returns a fixed vector without any I/O.
struct StubEmbedder;

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed_batch(&self, inputs: &[String]) -> SearchResult<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|_| vec![0.0, 0.0, 1.0]).collect())
    }
}

fn candidate(kind: SourceKind, id: &str, age_days: i64) -> Candidate {
    let ts = Utc::now() - Duration::days(age_days);
    Candidate {
        source_kind: kind,
        source_id: id.to_string(),
        title: Some(id.to_string()),
        text: String::new(),
        created_at: ts,
        updated_at: ts,
        exact_hit: false,
        lexical_similarity: 0.0,
        vector_similarity: 0.0,
    }
}

fn ranker_over(adapters: Vec<StubAdapter>) -> UnifiedSearch {
    let adapters = adapters
        .into_iter()
        .map(|a| Arc::new(a) as Arc<dyn SourceAdapter>)
        .collect();
    UnifiedSearch::with_adapters(adapters, SearchSettings::default(), None)
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let ranker = ranker_over(vec![StubAdapter::new(SourceKind::Note)]);
    let err = ranker
        .search_all("   ", SearchWeights::default(), 10)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::EmptyQuery));
}

#[tokio::test]
async fn ordering_is_deterministic_for_frozen_adapters() {
    let ts = Utc::now() - Duration::days(3);
    let build = || {
        let mut notes = StubAdapter::new(SourceKind::Note);
        let mut books = StubAdapter::new(SourceKind::Bookmark);
        let mut hit = candidate(SourceKind::Note, "n1", 3);
        hit.exact_hit = true;
        hit.lexical_similarity = 1.0;
        hit.created_at = ts;
        hit.updated_at = ts;
        notes.exact.push(hit);
        let mut near = candidate(SourceKind::Note, "n2", 3);
        near.lexical_similarity = 0.6;
        near.created_at = ts;
        near.updated_at = ts;
        notes.fuzzy.push(near);
        let mut b = candidate(SourceKind::Bookmark, "b1", 3);
        b.lexical_similarity = 0.6;
        b.created_at = ts;
        b.updated_at = ts;
        books.fuzzy.push(b);
        ranker_over(vec![notes, books])
    };

    let first = build()
        .search_all("note", SearchWeights::default(), 10)
        .await
        .unwrap();
    for _ in 0..5 {
        let again = build()
            .search_all("note", SearchWeights::default(), 10)
            .await
            .unwrap();
        let ids: Vec<_> = again.results.iter().map(|r| r.source_id.clone()).collect();
        let first_ids: Vec<_> = first.results.iter().map(|r| r.source_id.clone()).collect();
        assert_eq!(ids, first_ids);
    }
    // b1 and n2 tie on every signal; bookmark sorts before note.
    assert_eq!(first.results[0].source_id, "n1");
    assert_eq!(first.results[1].source_id, "b1");
    assert_eq!(first.results[2].source_id, "n2");
}

#[tokio::test]
async fn raising_exact_weight_never_demotes_exact_hits() {
    for exact_weight in [1.0, 5.0, 20.0, 100.0] {
        let mut notes = StubAdapter::new(SourceKind::Note);
        let mut exact = candidate(SourceKind::Note, "hit", 3);
        exact.exact_hit = true;
        exact.lexical_similarity = 1.0;
        notes.exact.push(exact);
        let mut fuzzy = candidate(SourceKind::Note, "miss", 3);
        fuzzy.lexical_similarity = 1.0;
        notes.fuzzy.push(fuzzy);

        let weights = SearchWeights::resolve(Some(exact_weight), None, None, None).unwrap();
        let outcome = ranker_over(vec![notes])
            .search_all("note", weights, 10)
            .await
            .unwrap();
        assert_eq!(outcome.results[0].source_id, "hit");
    }
}

#[tokio::test]
async fn duplicate_sightings_keep_the_maximum_signal() {
    let mut notes = StubAdapter::new(SourceKind::Note);
    let mut from_exact = candidate(SourceKind::Note, "n1", 3);
    from_exact.exact_hit = true;
    from_exact.lexical_similarity = 1.0;
    notes.exact.push(from_exact);
    let mut from_fuzzy = candidate(SourceKind::Note, "n1", 3);
    from_fuzzy.lexical_similarity = 0.6;
    notes.fuzzy.push(from_fuzzy);

    let outcome = ranker_over(vec![notes])
        .search_all("note", SearchWeights::default(), 10)
        .await
        .unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].exact_hit);
    assert_eq!(outcome.results[0].lexical_similarity, 1.0);
}

#[tokio::test]
async fn failing_adapter_degrades_to_partial_results() {
    let mut notes = StubAdapter::new(SourceKind::Note);
    let mut hit = candidate(SourceKind::Note, "n1", 3);
    hit.exact_hit = true;
    notes.exact.push(hit);
    let mut rooms = StubAdapter::new(SourceKind::Room);
    rooms.fail = true;

    let outcome = ranker_over(vec![notes, rooms])
        .search_all("note", SearchWeights::default(), 10)
        .await
        .unwrap();
    assert!(outcome.partial);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].starts_with("room:"));
}

#[tokio::test]
async fn pre_cancelled_request_is_rejected() {
    let mut notes = StubAdapter::new(SourceKind::Note);
    notes.exact.push(candidate(SourceKind::Note, "n1", 3));

    let token = CancellationToken::new();
    token.cancel();
    let err = ranker_over(vec![notes])
        .search_all_with_cancel("note", SearchWeights::default(), 10, token)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Cancelled));
}

#[tokio::test]
async fn cancellation_abandons_in_flight_adapters() {
    let mut notes = StubAdapter::new(SourceKind::Note);
    notes.stall = true;
    let ranker = ranker_over(vec![notes]);

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = ranker
        .search_all_with_cancel("note", SearchWeights::default(), 10, token)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Cancelled));
    // The stalled adapter was abandoned, not awaited to completion.
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
}

#[tokio::test]
async fn overdue_vector_pass_is_skipped_and_marked_partial() {
    let mut notes = StubAdapter::new(SourceKind::Note);
    notes.slow_vector = true;
    let mut hit = candidate(SourceKind::Note, "n1", 3);
    hit.exact_hit = true;
    notes.exact.push(hit);

    let settings = SearchSettings {
        vector_timeout_ms: 20,
        ..Default::default()
    };
    let ranker = UnifiedSearch::with_adapters(
        vec![Arc::new(notes) as Arc<dyn SourceAdapter>],
        settings,
        Some(Arc::new(StubEmbedder) as Arc<dyn EmbeddingProvider>),
    );

    let outcome = ranker
        .search_all("note", SearchWeights::default(), 10)
        .await
        .unwrap();
    assert!(outcome.partial);
    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.errors[0].contains("vector pass exceeded budget"));
}

#[tokio::test]
async fn limit_is_clamped_to_the_ceiling() {
    let mut notes = StubAdapter::new(SourceKind::Note);
    for i in 0..10 {
        let mut c = candidate(SourceKind::Note, &format!("n{i}"), 3);
        c.lexical_similarity = 0.8;
        notes.fuzzy.push(c);
    }

    let outcome = ranker_over(vec![notes])
        .search_all("note", SearchWeights::default(), 3)
        .await
        .unwrap();
    assert_eq!(outcome.results.len(), 3);

    let mut notes = StubAdapter::new(SourceKind::Note);
    let mut c = candidate(SourceKind::Note, "n", 3);
    c.lexical_similarity = 0.8;
    notes.fuzzy.push(c);
    // A zero limit still returns one result rather than erroring.
    let outcome = ranker_over(vec![notes])
        .search_all("note", SearchWeights::default(), 0)
        .await
        .unwrap();
    assert_eq!(outcome.results.len(), 1);
}

#[tokio::test]
async fn fuzzy_scan_covers_rows_beyond_the_contribution_cap() {
    let db = DbPool::open_in_memory().await.expect("open db");
    let sources = SourceRepository::new(&db);
    let now = Utc::now();

    // Three non-matching rows ahead of the match in scan order.
    for i in 0..3 {
        sources
            .insert_note(Uuid::new_v4(), &format!("unrelated {i}"), "filler", now)
            .await
            .expect("decoy");
    }
    sources
        .insert_note(Uuid::new_v4(), "Raft", "last row", now)
        .await
        .expect("match");

    let adapter = DbSourceAdapter::new(&db, SourceKind::Note, "qa-v2-passage");
    let hits = adapter.fuzzy("raft", 0.55, 3).await.expect("fuzzy");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title.as_deref(), Some("Raft"));
}

#[tokio::test]
async fn blends_exact_fuzzy_and_recency_over_a_real_corpus() {
    let db = DbPool::open_in_memory().await.expect("open db");
    let sources = SourceRepository::new(&db);
    let now = Utc::now();

    // An exact title hit created yesterday.
    sources
        .insert_bookmark(
            Uuid::new_v4(),
            "Raft consensus",
            "https://raft.github.io",
            None,
            now - Duration::days(1),
        )
        .await
        .expect("bookmark");
    // A fuzzy-only title hit created 45 days ago; body avoids the needle.
    sources
        .insert_note(
            Uuid::new_v4(),
            "Roft",
            "leader election musings",
            now - Duration::days(45),
        )
        .await
        .expect("note");

    let ranker = UnifiedSearch::new(&db, SearchSettings::default(), None);
    let outcome = ranker
        .search_all("Raft", SearchWeights::default(), 10)
        .await
        .expect("search");

    assert!(!outcome.partial);
    assert_eq!(outcome.results.len(), 2);

    let bookmark = &outcome.results[0];
    assert_eq!(bookmark.source_kind, SourceKind::Bookmark);
    assert!(bookmark.exact_hit);
    // 5·1 + 2·1 + e^(-1/30) ≈ 7.967
    assert!((bookmark.score - 7.967).abs() < 0.02);

    let note = &outcome.results[1];
    assert_eq!(note.source_kind, SourceKind::Note);
    assert!(!note.exact_hit);
    // similarity("raft", "roft") = 0.75, so 2·0.75 + e^(-45/30) ≈ 1.723
    assert!((note.score - 1.723).abs() < 0.02);
}
