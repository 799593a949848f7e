//! Search subsystem error types.

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search query must not be empty")]
    EmptyQuery,

    #[error("invalid search request: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Db(#[from] garden_db::DbError),

    #[error("embedding provider unavailable: {0}")]
    Embedding(String),

    #[error("LLM provider unavailable: {0}")]
    Llm(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl SearchError {
    pub(crate) fn invalid_weights() -> Self {
        Self::Invalid("at least one search weight must be positive".into())
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
