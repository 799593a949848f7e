//! Test helpers for garden databases.

use crate::db::DbPool;
use crate::error::DbResult;

/// Create an in-memory garden database for testing
pub async fn create_test_pool() -> DbResult<DbPool> {
    DbPool::open_in_memory().await
}
