//! Typed relationship edges between an entity and another resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{DbError, DbResult};

/// A directed typed edge from an entity to some related resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub related_type: String,
    pub related_id: Uuid,
    pub relationship_type: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a relationship.
#[derive(Debug, Clone)]
pub struct NewRelationship {
    pub entity_id: Uuid,
    pub related_type: String,
    pub related_id: Uuid,
    pub relationship_type: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct RelationshipRepository {
    pool: SqlitePool,
}

impl RelationshipRepository {
    pub fn new(db: &DbPool) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    pub async fn create(&self, input: NewRelationship) -> DbResult<EntityRelationship> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let metadata = input.metadata.unwrap_or_else(|| Value::Object(Default::default()));

        sqlx::query(
            r#"INSERT INTO entity_relationships (id, entity_id, related_type, related_id, relationship_type, metadata, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id.to_string())
        .bind(input.entity_id.to_string())
        .bind(&input.related_type)
        .bind(input.related_id.to_string())
        .bind(&input.relationship_type)
        .bind(serde_json::to_string(&metadata)?)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(EntityRelationship {
            id,
            entity_id: input.entity_id,
            related_type: input.related_type,
            related_id: input.related_id,
            relationship_type: input.relationship_type,
            metadata,
            created_at: now,
            updated_at: now,
        })
    }

    /// List relationships of an entity, optionally filtered.
    pub async fn list_for_entity(
        &self,
        entity_id: Uuid,
        related_type: Option<&str>,
        relationship_type: Option<&str>,
    ) -> DbResult<Vec<EntityRelationship>> {
        let rows: Vec<(String, String, String, String, String, String, String, String)> =
            sqlx::query_as(
                r#"SELECT id, entity_id, related_type, related_id, relationship_type, metadata, created_at, updated_at
                   FROM entity_relationships
                   WHERE entity_id = ?
                   ORDER BY created_at ASC"#,
            )
            .bind(entity_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut relationships = Vec::with_capacity(rows.len());
        for row in rows {
            let relationship = decode_relationship(row)?;
            if let Some(filter) = related_type
                && relationship.related_type != filter
            {
                continue;
            }
            if let Some(filter) = relationship_type
                && relationship.relationship_type != filter
            {
                continue;
            }
            relationships.push(relationship);
        }

        Ok(relationships)
    }

    pub async fn delete(&self, relationship_id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM entity_relationships WHERE id = ?")
            .bind(relationship_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::EntityNotFound(relationship_id.to_string()));
        }
        Ok(())
    }
}

fn decode_relationship(
    row: (String, String, String, String, String, String, String, String),
) -> DbResult<EntityRelationship> {
    let (id, entity_id, related_type, related_id, relationship_type, metadata, created_at, updated_at) =
        row;
    Ok(EntityRelationship {
        id: id.parse().map_err(|_| DbError::EntityNotFound(id))?,
        entity_id: entity_id
            .parse()
            .map_err(|_| DbError::EntityNotFound(entity_id))?,
        related_type,
        related_id: related_id
            .parse()
            .map_err(|_| DbError::EntityNotFound(related_id))?,
        relationship_type,
        metadata: serde_json::from_str(&metadata)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
