//! Vector index over sqlite-vec, keyed by `(source_kind, strategy)`.
//!
//! Distances are cosine (`distance_metric=cosine` on the vec0 table),
//! so `cos = 1 - distance`. Mapping into `[0,1]` is the ranker's job.

use sqlx::SqlitePool;

use crate::db::DbPool;
use crate::error::{DbError, DbResult};
use crate::sources::SourceKind;

#[derive(Debug, Clone)]
pub struct VectorStore {
    db: DbPool,
    pool: SqlitePool,
}

impl VectorStore {
    pub fn new(db: &DbPool) -> Self {
        Self {
            db: db.clone(),
            pool: db.pool().clone(),
        }
    }

    /// Insert or replace one embedding.
    pub async fn upsert(
        &self,
        kind: SourceKind,
        strategy: &str,
        source_id: &str,
        embedding: &[f32],
    ) -> DbResult<()> {
        let dimension = self.db.ensure_vec_table(embedding.len()).await?;
        if dimension != embedding.len() {
            return Err(DbError::SqliteVec(format!(
                "embedding dimension mismatch: index has {dimension}, got {}",
                embedding.len()
            )));
        }

        sqlx::query(
            "INSERT OR IGNORE INTO embeddings (source_kind, strategy, source_id) VALUES (?, ?, ?)",
        )
        .bind(kind.as_str())
        .bind(strategy)
        .bind(source_id)
        .execute(&self.pool)
        .await?;

        let (rowid,): (i64,) = sqlx::query_as(
            "SELECT id FROM embeddings WHERE source_kind = ? AND strategy = ? AND source_id = ? LIMIT 1",
        )
        .bind(kind.as_str())
        .bind(strategy)
        .bind(source_id)
        .fetch_one(&self.pool)
        .await?;

        let payload = serde_json::to_string(embedding)?;
        sqlx::query("INSERT OR REPLACE INTO embedding_vec (rowid, embedding) VALUES (?, ?)")
            .bind(rowid)
            .bind(payload)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Nearest neighbors for one `(kind, strategy)` slice.
    ///
    /// Returns `(source_id, cosine_distance)` pairs ordered by
    /// ascending distance. An index that was never populated yields no
    /// hits rather than an error.
    pub async fn query(
        &self,
        kind: SourceKind,
        strategy: &str,
        query_vec: &[f32],
        top_k: usize,
    ) -> DbResult<Vec<(String, f32)>> {
        if !self.vec_table_exists().await? {
            return Ok(Vec::new());
        }

        // vec0 knn queries take their neighbor count through the `k`
        // constraint; a parameterized LIMIT is rejected. `k` bounds the
        // scan before the slice filter, so over-fetch and trim below.
        let payload = serde_json::to_string(query_vec)?;
        let rows: Vec<(String, f32)> = sqlx::query_as(
            r#"SELECT e.source_id, v.distance
               FROM embedding_vec v
               JOIN embeddings e ON e.id = v.rowid
               WHERE v.embedding MATCH ? AND v.k = ? AND e.source_kind = ? AND e.strategy = ?
               ORDER BY v.distance ASC"#,
        )
        .bind(payload)
        .bind((top_k.saturating_mul(4)) as i64)
        .bind(kind.as_str())
        .bind(strategy)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().take(top_k).collect())
    }

    async fn vec_table_exists(&self) -> DbResult<bool> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'embedding_vec'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_query_orders_by_distance() {
        let db = DbPool::open_in_memory().await.expect("open db");
        let vectors = VectorStore::new(&db);

        vectors
            .upsert(SourceKind::Bookmark, "qa-v2-passage", "a", &[1.0, 0.0, 0.0])
            .await
            .expect("upsert a");
        vectors
            .upsert(SourceKind::Bookmark, "qa-v2-passage", "b", &[0.0, 1.0, 0.0])
            .await
            .expect("upsert b");
        // Different strategy must not leak into the query below
        vectors
            .upsert(SourceKind::Bookmark, "other", "c", &[1.0, 0.0, 0.0])
            .await
            .expect("upsert c");

        let hits = vectors
            .query(SourceKind::Bookmark, "qa-v2-passage", &[1.0, 0.0, 0.0], 10)
            .await
            .expect("query");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "a");
        assert!(hits[0].1 < hits[1].1);
    }

    #[tokio::test]
    async fn query_honors_top_k() {
        let db = DbPool::open_in_memory().await.expect("open db");
        let vectors = VectorStore::new(&db);

        for (id, vec) in [
            ("a", [1.0, 0.0, 0.0]),
            ("b", [0.9, 0.1, 0.0]),
            ("c", [0.0, 1.0, 0.0]),
        ] {
            vectors
                .upsert(SourceKind::Note, "qa-v2-passage", id, &vec)
                .await
                .expect("upsert");
        }

        let hits = vectors
            .query(SourceKind::Note, "qa-v2-passage", &[1.0, 0.0, 0.0], 1)
            .await
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "a");
    }

    #[tokio::test]
    async fn empty_index_yields_no_hits() {
        let db = DbPool::open_in_memory().await.expect("open db");
        let vectors = VectorStore::new(&db);
        let hits = vectors
            .query(SourceKind::Note, "qa-v2-passage", &[0.5, 0.5], 5)
            .await
            .expect("query");
        assert!(hits.is_empty());
    }
}
