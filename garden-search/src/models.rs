//! Request and result shapes for unified search.

use chrono::{DateTime, Utc};
use garden_db::SourceKind;
use serde::Serialize;

use crate::errors::{SearchError, SearchResult};

/// Signal weights for score fusion. All non-negative; at least one must
/// be strictly positive for a query to make sense.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchWeights {
    pub exact_match: f64,
    pub similarity: f64,
    pub recency: f64,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            exact_match: 5.0,
            similarity: 2.0,
            recency: 1.0,
        }
    }
}

impl SearchWeights {
    /// Resolve caller-supplied overrides against the defaults.
    ///
    /// The similarity weight historically went by `levenshteinWeight`;
    /// when both spellings arrive, the legacy one wins. Negative values
    /// are clamped to zero.
    pub fn resolve(
        exact_match: Option<f64>,
        similarity: Option<f64>,
        levenshtein: Option<f64>,
        recency: Option<f64>,
    ) -> SearchResult<Self> {
        let defaults = Self::default();
        let weights = Self {
            exact_match: exact_match.unwrap_or(defaults.exact_match).max(0.0),
            similarity: levenshtein
                .or(similarity)
                .unwrap_or(defaults.similarity)
                .max(0.0),
            recency: recency.unwrap_or(defaults.recency).max(0.0),
        };
        if weights.exact_match <= 0.0 && weights.similarity <= 0.0 && weights.recency <= 0.0 {
            return Err(SearchError::invalid_weights());
        }
        Ok(weights)
    }
}

/// An intermediate hit produced by one adapter pass. Lives only for the
/// duration of a single search request.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source_kind: SourceKind,
    pub source_id: String,
    pub title: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub exact_hit: bool,
    pub lexical_similarity: f64,
    pub vector_similarity: f64,
}

impl Candidate {
    pub fn from_row(kind: SourceKind, row: garden_db::SourceRow) -> Self {
        Self {
            source_kind: kind,
            source_id: row.id,
            title: row.title,
            text: row.text,
            created_at: row.created_at,
            updated_at: row.updated_at,
            exact_hit: false,
            lexical_similarity: 0.0,
            vector_similarity: 0.0,
        }
    }

    /// Fold another sighting of the same `(kind, id)` into this one,
    /// keeping the maximum of every raw signal.
    pub fn absorb(&mut self, other: &Candidate) {
        self.exact_hit |= other.exact_hit;
        self.lexical_similarity = self.lexical_similarity.max(other.lexical_similarity);
        self.vector_similarity = self.vector_similarity.max(other.vector_similarity);
        if self.title.is_none() {
            self.title = other.title.clone();
        }
        if self.text.is_empty() {
            self.text = other.text.clone();
        }
    }
}

/// The public form of a candidate: fused score plus the per-signal
/// breakdown that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedSearchResult {
    pub source_kind: SourceKind,
    pub source_id: String,
    pub title: Option<String>,
    pub text: String,
    pub score: f64,
    pub exact_hit: bool,
    pub lexical_similarity: f64,
    pub vector_similarity: f64,
    pub recency: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A full search response. `partial` is set when one or more adapters
/// failed; their errors are listed so the caller can decide whether the
/// degraded result set is still useful.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SearchOutcome {
    pub results: Vec<UnifiedSearchResult>,
    pub partial: bool,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_five_two_one() {
        let w = SearchWeights::default();
        assert_eq!(w.exact_match, 5.0);
        assert_eq!(w.similarity, 2.0);
        assert_eq!(w.recency, 1.0);
    }

    #[test]
    fn legacy_similarity_spelling_wins() {
        let w = SearchWeights::resolve(None, Some(3.0), Some(1.0), None).expect("resolve");
        assert_eq!(w.similarity, 1.0);
    }

    #[test]
    fn negative_weights_clamp_to_zero() {
        let w = SearchWeights::resolve(Some(-4.0), None, None, None).expect("resolve");
        assert_eq!(w.exact_match, 0.0);
        assert_eq!(w.similarity, 2.0);
    }

    #[test]
    fn all_zero_weights_rejected() {
        let res = SearchWeights::resolve(Some(0.0), Some(-1.0), None, Some(0.0));
        assert!(res.is_err());
    }

    #[test]
    fn absorb_keeps_signal_maxima() {
        let now = Utc::now();
        let mut a = Candidate {
            source_kind: SourceKind::Note,
            source_id: "n1".into(),
            title: None,
            text: String::new(),
            created_at: now,
            updated_at: now,
            exact_hit: false,
            lexical_similarity: 0.6,
            vector_similarity: 0.0,
        };
        let b = Candidate {
            exact_hit: true,
            lexical_similarity: 0.4,
            vector_similarity: 0.8,
            title: Some("Raft".into()),
            text: "raft notes".into(),
            ..a.clone()
        };
        a.absorb(&b);
        assert!(a.exact_hit);
        assert_eq!(a.lexical_similarity, 0.6);
        assert_eq!(a.vector_similarity, 0.8);
        assert_eq!(a.title.as_deref(), Some("Raft"));
    }
}
