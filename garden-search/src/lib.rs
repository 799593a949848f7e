//! Unified search over the garden's source corpora.
//!
//! Requests fan out across one adapter per source kind, each answering
//! exact, fuzzy, and (where indexed) vector passes; the ranker fuses
//! the signals into a single deterministic ordering. The advanced path
//! layers answer synthesis over the bookmark vector index.

pub mod adapters;
pub mod advanced;
pub mod embeddings;
pub mod errors;
pub mod lexical;
pub mod llm;
pub mod models;
pub mod ranker;
pub mod recency;
pub mod text;

pub use adapters::{DbSourceAdapter, SourceAdapter};
pub use advanced::{AdvancedAnswer, AdvancedSearch, Citation};
pub use embeddings::{EmbeddingClient, EmbeddingProvider};
pub use errors::{SearchError, SearchResult};
pub use llm::{AnswerModel, LlmClient};
pub use models::{Candidate, SearchOutcome, SearchWeights, UnifiedSearchResult};
pub use ranker::UnifiedSearch;
