//! Database error types.

/// Database operation errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// SQL error from sqlx
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Entity not found
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Config/data directory not found
    #[error("Config/data directory not found")]
    NoConfigDir,

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite-vec initialization error
    #[error("SQLite-vec initialization error: {0}")]
    SqliteVec(String),

    /// Property bag serialization error
    #[error("Properties serialization error: {0}")]
    Properties(#[from] serde_json::Error),
}

/// Result type alias for database operations
pub type DbResult<T> = Result<T, DbError>;
