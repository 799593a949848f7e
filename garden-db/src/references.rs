//! Entity reference storage: one row per `[[Name]]` occurrence in a
//! source document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{DbError, DbResult};

/// One recorded `[[Name]]` occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityReference {
    pub id: Uuid,
    pub source_type: String,
    pub source_id: Uuid,
    pub entity_id: Uuid,
    pub reference_text: String,
    pub position: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Input for one reference row.
#[derive(Debug, Clone)]
pub struct NewReference {
    pub entity_id: Uuid,
    pub reference_text: String,
    pub position: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ReferenceRepository {
    pool: SqlitePool,
}

impl ReferenceRepository {
    pub fn new(db: &DbPool) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Replace all references recorded for one source document.
    ///
    /// Delete-then-insert inside one transaction, so readers never see
    /// a partial reference set.
    pub async fn replace_for_source(
        &self,
        source_type: &str,
        source_id: Uuid,
        references: &[NewReference],
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entity_references WHERE source_type = ? AND source_id = ?")
            .bind(source_type)
            .bind(source_id.to_string())
            .execute(&mut *tx)
            .await?;

        let now = Utc::now().to_rfc3339();
        for reference in references {
            sqlx::query(
                r#"INSERT INTO entity_references (id, source_type, source_id, entity_id, reference_text, position, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(source_type)
            .bind(source_id.to_string())
            .bind(reference.entity_id.to_string())
            .bind(&reference.reference_text)
            .bind(reference.position)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// List references pointing at an entity, optionally filtered by
    /// source type. Ordered by source then position.
    pub async fn list_for_entity(
        &self,
        entity_id: Uuid,
        source_type: Option<&str>,
    ) -> DbResult<Vec<EntityReference>> {
        let rows: Vec<(String, String, String, String, String, Option<i64>, String)> =
            if let Some(source_type) = source_type {
                sqlx::query_as(
                    r#"SELECT id, source_type, source_id, entity_id, reference_text, position, created_at
                       FROM entity_references
                       WHERE entity_id = ? AND source_type = ?
                       ORDER BY source_id, position"#,
                )
                .bind(entity_id.to_string())
                .bind(source_type)
                .fetch_all(&self.pool)
                .await?
            } else {
                sqlx::query_as(
                    r#"SELECT id, source_type, source_id, entity_id, reference_text, position, created_at
                       FROM entity_references
                       WHERE entity_id = ?
                       ORDER BY source_id, position"#,
                )
                .bind(entity_id.to_string())
                .fetch_all(&self.pool)
                .await?
            };

        rows.into_iter().map(decode_reference).collect()
    }
}

fn decode_reference(
    row: (String, String, String, String, String, Option<i64>, String),
) -> DbResult<EntityReference> {
    let (id, source_type, source_id, entity_id, reference_text, position, created_at) = row;
    Ok(EntityReference {
        id: id.parse().map_err(|_| DbError::EntityNotFound(id))?,
        source_type,
        source_id: source_id
            .parse()
            .map_err(|_| DbError::EntityNotFound(source_id))?,
        entity_id: entity_id
            .parse()
            .map_err(|_| DbError::EntityNotFound(entity_id))?,
        reference_text,
        position,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
