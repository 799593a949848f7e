//! Database connection pool and initialization.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libsqlite3_sys::{SQLITE_OK, sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::info;

use crate::error::{DbError, DbResult};

static SQLITE_VEC_INIT_RC: OnceLock<i32> = OnceLock::new();

/// Database pool wrapper
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: SqlitePool,
}

impl DbPool {
    /// Open (or create) the database at the default data location.
    pub async fn new() -> DbResult<Self> {
        let db_path = Self::default_db_path()?;
        Self::open(&db_path).await
    }

    /// Open (or create) the database at an explicit path.
    pub async fn open(db_path: &Path) -> DbResult<Self> {
        init_sqlite_vec_once()?;
        info!("Initializing database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA synchronous = NORMAL")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA cache_size = -64000")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Open an in-memory database. Used by tests.
    pub async fn open_in_memory() -> DbResult<Self> {
        init_sqlite_vec_once()?;

        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);

        // A single connection so the in-memory database is shared
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Get the inner SQLx pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Default database file path
    pub fn default_db_path() -> DbResult<PathBuf> {
        let data_dir = dirs::data_dir().ok_or(DbError::NoConfigDir)?;
        Ok(data_dir.join("garden").join("db.sqlite3"))
    }

    /// Create the vec0 virtual table for the given embedding dimension.
    ///
    /// Idempotent; the recorded dimension wins over the argument on
    /// subsequent calls so existing vectors are never invalidated.
    pub async fn ensure_vec_table(&self, dim: usize) -> DbResult<usize> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT value FROM meta WHERE key = 'embedding_dim' LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        let dimension = existing
            .and_then(|(value,)| value.parse::<usize>().ok())
            .unwrap_or(dim);

        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS embedding_vec USING vec0(embedding float[{dimension}] distance_metric=cosine)"
        );
        sqlx::query(&sql).execute(&self.pool).await?;

        sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding_dim', ?)")
            .bind(dimension.to_string())
            .execute(&self.pool)
            .await?;

        Ok(dimension)
    }
}

/// Initialize the sqlite-vec extension globally.
///
/// Must happen before the first connection is opened.
fn init_sqlite_vec_once() -> DbResult<()> {
    let rc = *SQLITE_VEC_INIT_RC.get_or_init(|| unsafe {
        type SqliteVecInitFn =
            unsafe extern "C" fn(*mut sqlite3, *mut *const i8, *const sqlite3_api_routines) -> i32;

        sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteVecInitFn>(
            sqlite3_vec_init as *const (),
        )))
    });

    if rc == SQLITE_OK {
        Ok(())
    } else {
        Err(DbError::SqliteVec(format!(
            "sqlite-vec init failed with code {rc}"
        )))
    }
}

async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let migration_sql = include_str!("../migrations/001_initial_schema.sql");

    // Drop comment lines before splitting so a `;` inside a comment
    // cannot truncate the statement that follows it.
    let sql: String = migration_sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    for statement in sql.split(';') {
        let stmt = statement.trim();
        if stmt.is_empty() {
            continue;
        }
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| DbError::Migration(format!("{e}: {stmt}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migration_runs_clean_on_a_fresh_database() {
        let db = DbPool::open_in_memory().await.expect("open db");

        // Every table the migration declares must exist afterwards.
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
             AND name IN ('meta', 'entities', 'entity_relationships',
                          'entity_references', 'bookmarks', 'notes', 'items',
                          'contacts', 'browser_history', 'rooms', 'messages',
                          'sessions', 'embeddings')",
        )
        .fetch_one(db.pool())
        .await
        .expect("count tables");
        assert_eq!(count, 13);
    }

    #[tokio::test]
    async fn vec_table_dimension_is_pinned_on_first_create() {
        let db = DbPool::open_in_memory().await.expect("open db");

        assert_eq!(db.ensure_vec_table(4).await.expect("create"), 4);
        // A later call with a different dimension keeps the recorded one.
        assert_eq!(db.ensure_vec_table(8).await.expect("re-create"), 4);
    }
}
