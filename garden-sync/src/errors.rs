//! Sync subsystem error types.

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("another sync run is already in progress")]
    SyncInProgress,

    #[error("entity {0} not found")]
    EntityNotFound(String),

    #[error("page {0} not found")]
    PageNotFound(String),

    #[error("entity {0} has no page_path property")]
    MissingPagePath(String),

    #[error("git operation failed: {0}")]
    Git(String),

    #[error("database error: {0}")]
    Db(#[from] garden_db::DbError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

pub type SyncResult<T> = Result<T, SyncError>;
