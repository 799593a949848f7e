//! Entity storage: typed entities with a free-form property bag.
//!
//! `properties` may carry `page_path` (the markdown identity link) and
//! `last_sync_at` (the last-sync marker). `page_path` is unique among
//! live entities, enforced by a partial index in the schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{DbError, DbResult};

/// A typed entity with a free-form JSON property bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: Option<String>,
    pub properties: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// The markdown file this entity is backed by, when present.
    pub fn page_path(&self) -> Option<&str> {
        self.properties.get("page_path").and_then(Value::as_str)
    }

    /// The last-sync marker, when present and well-formed.
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.properties
            .get("last_sync_at")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for creating an entity. An explicit `entity_id` is honored
/// (the sync path keeps file-side ids); otherwise one is assigned.
#[derive(Debug, Clone, Default)]
pub struct NewEntity {
    pub entity_id: Option<Uuid>,
    pub name: String,
    pub entity_type: String,
    pub description: Option<String>,
    pub properties: Option<Value>,
}

/// Input for updating an entity. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateEntity {
    pub name: Option<String>,
    pub entity_type: Option<String>,
    pub description: Option<String>,
    pub properties: Option<Value>,
}

/// Repository for entity rows.
#[derive(Debug, Clone)]
pub struct EntityRepository {
    pool: SqlitePool,
}

type EntityRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    Option<String>,
);

const ENTITY_COLUMNS: &str =
    "entity_id, name, entity_type, description, properties, created_at, updated_at, deleted_at";

impl EntityRepository {
    pub fn new(db: &DbPool) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Create a new entity.
    pub async fn create(&self, input: NewEntity) -> DbResult<Entity> {
        let entity_id = input.entity_id.unwrap_or_else(Uuid::new_v4);
        let now = Utc::now();
        let properties = input.properties.unwrap_or_else(|| Value::Object(Default::default()));

        sqlx::query(
            r#"INSERT INTO entities (entity_id, name, entity_type, description, properties, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entity_id.to_string())
        .bind(&input.name)
        .bind(&input.entity_type)
        .bind(&input.description)
        .bind(serde_json::to_string(&properties)?)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Entity {
            entity_id,
            name: input.name,
            entity_type: input.entity_type,
            description: input.description,
            properties,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Fetch an entity regardless of deletion state.
    pub async fn get(&self, entity_id: Uuid) -> DbResult<Option<Entity>> {
        let row: Option<EntityRow> = sqlx::query_as(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_id = ? LIMIT 1"
        ))
        .bind(entity_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_entity).transpose()
    }

    /// Fetch a live (non-deleted) entity, or `EntityNotFound`.
    pub async fn get_live(&self, entity_id: Uuid) -> DbResult<Entity> {
        match self.get(entity_id).await? {
            Some(entity) if !entity.is_deleted() => Ok(entity),
            _ => Err(DbError::EntityNotFound(entity_id.to_string())),
        }
    }

    /// Find the live entity backed by the given page path.
    pub async fn get_by_page_path(&self, page_path: &str) -> DbResult<Option<Entity>> {
        let row: Option<EntityRow> = sqlx::query_as(&format!(
            r#"SELECT {ENTITY_COLUMNS} FROM entities
               WHERE json_extract(properties, '$.page_path') = ? AND deleted_at IS NULL
               LIMIT 1"#
        ))
        .bind(page_path)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_entity).transpose()
    }

    /// Find a soft-deleted entity that used to own the given page path.
    pub async fn get_tombstone_by_page_path(&self, page_path: &str) -> DbResult<Option<Entity>> {
        let row: Option<EntityRow> = sqlx::query_as(&format!(
            r#"SELECT {ENTITY_COLUMNS} FROM entities
               WHERE json_extract(properties, '$.page_path') = ? AND deleted_at IS NOT NULL
               ORDER BY deleted_at DESC
               LIMIT 1"#
        ))
        .bind(page_path)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_entity).transpose()
    }

    /// Find the first live entity with the given name and type.
    pub async fn get_by_name_and_type(&self, name: &str, entity_type: &str) -> DbResult<Option<Entity>> {
        let row: Option<EntityRow> = sqlx::query_as(&format!(
            r#"SELECT {ENTITY_COLUMNS} FROM entities
               WHERE name = ? AND entity_type = ? AND deleted_at IS NULL
               ORDER BY created_at ASC
               LIMIT 1"#
        ))
        .bind(name)
        .bind(entity_type)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_entity).transpose()
    }

    /// Find the first live entity with the given name, any type.
    pub async fn get_by_name(&self, name: &str) -> DbResult<Option<Entity>> {
        let row: Option<EntityRow> = sqlx::query_as(&format!(
            r#"SELECT {ENTITY_COLUMNS} FROM entities
               WHERE name = ? AND deleted_at IS NULL
               ORDER BY created_at ASC
               LIMIT 1"#
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_entity).transpose()
    }

    /// List live entities whose type is in the given set.
    pub async fn list_by_types(&self, types: &[String]) -> DbResult<Vec<Entity>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = types.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_type IN ({placeholders}) AND deleted_at IS NULL ORDER BY name ASC"
        );

        let mut query = sqlx::query_as::<_, EntityRow>(&sql);
        for entity_type in types {
            query = query.bind(entity_type);
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(decode_entity)
            .collect()
    }

    /// Update an entity. Bumps `updated_at`.
    pub async fn update(&self, entity_id: Uuid, input: UpdateEntity) -> DbResult<Entity> {
        let mut entity = self.get_live(entity_id).await?;

        if let Some(name) = input.name {
            entity.name = name;
        }
        if let Some(entity_type) = input.entity_type {
            entity.entity_type = entity_type;
        }
        if let Some(description) = input.description {
            entity.description = Some(description);
        }
        if let Some(properties) = input.properties {
            entity.properties = properties;
        }
        entity.updated_at = Utc::now();

        sqlx::query(
            r#"UPDATE entities
               SET name = ?, entity_type = ?, description = ?, properties = ?, updated_at = ?
               WHERE entity_id = ?"#,
        )
        .bind(&entity.name)
        .bind(&entity.entity_type)
        .bind(&entity.description)
        .bind(serde_json::to_string(&entity.properties)?)
        .bind(entity.updated_at.to_rfc3339())
        .bind(entity_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(entity)
    }

    /// Record a successful sync write without bumping `updated_at`.
    ///
    /// The marker and the page path land in the property bag in one
    /// statement so the pair commits together.
    pub async fn set_sync_marker(
        &self,
        entity_id: Uuid,
        page_path: &str,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"UPDATE entities
               SET properties = json_set(properties, '$.page_path', ?, '$.last_sync_at', ?)
               WHERE entity_id = ? AND deleted_at IS NULL"#,
        )
        .bind(page_path)
        .bind(at.to_rfc3339())
        .bind(entity_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::EntityNotFound(entity_id.to_string()));
        }
        Ok(())
    }

    /// Soft-delete an entity.
    pub async fn soft_delete(&self, entity_id: Uuid) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE entities SET deleted_at = ? WHERE entity_id = ? AND deleted_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(entity_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::EntityNotFound(entity_id.to_string()));
        }
        Ok(())
    }
}

fn decode_entity(row: EntityRow) -> DbResult<Entity> {
    let (entity_id, name, entity_type, description, properties, created_at, updated_at, deleted_at) =
        row;

    Ok(Entity {
        entity_id: entity_id
            .parse()
            .map_err(|_| DbError::EntityNotFound(entity_id))?,
        name,
        entity_type,
        description,
        properties: serde_json::from_str(&properties)?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
        deleted_at: deleted_at.as_deref().map(parse_rfc3339),
    })
}

fn parse_rfc3339(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn repo() -> EntityRepository {
        let db = DbPool::open_in_memory().await.expect("open db");
        EntityRepository::new(&db)
    }

    #[tokio::test]
    async fn create_get_update_roundtrip() {
        let repo = repo().await;
        let created = repo
            .create(NewEntity {
                name: "Raft".to_string(),
                entity_type: "concept".to_string(),
                description: Some("consensus algorithm".to_string()),
                properties: Some(json!({"page_path": "pages/raft.md"})),
                ..Default::default()
            })
            .await
            .expect("create");

        let fetched = repo.get_live(created.entity_id).await.expect("get");
        assert_eq!(fetched.name, "Raft");
        assert_eq!(fetched.page_path(), Some("pages/raft.md"));

        let updated = repo
            .update(
                created.entity_id,
                UpdateEntity {
                    name: Some("Raft consensus".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.name, "Raft consensus");
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn page_path_unique_among_live_entities() {
        let repo = repo().await;
        let first = repo
            .create(NewEntity {
                name: "a".to_string(),
                entity_type: "note".to_string(),
                properties: Some(json!({"page_path": "pages/a.md"})),
                ..Default::default()
            })
            .await
            .expect("create first");

        let duplicate = repo
            .create(NewEntity {
                name: "b".to_string(),
                entity_type: "note".to_string(),
                properties: Some(json!({"page_path": "pages/a.md"})),
                ..Default::default()
            })
            .await;
        assert!(duplicate.is_err());

        // After soft-deleting the holder, the path is free again
        repo.soft_delete(first.entity_id).await.expect("delete");
        repo.create(NewEntity {
            name: "c".to_string(),
            entity_type: "note".to_string(),
            properties: Some(json!({"page_path": "pages/a.md"})),
            ..Default::default()
        })
        .await
        .expect("create after tombstone");

        let tombstone = repo
            .get_tombstone_by_page_path("pages/a.md")
            .await
            .expect("query tombstone");
        assert_eq!(tombstone.map(|e| e.entity_id), Some(first.entity_id));
    }

    #[tokio::test]
    async fn sync_marker_does_not_bump_updated_at() {
        let repo = repo().await;
        let created = repo
            .create(NewEntity {
                name: "n".to_string(),
                entity_type: "note".to_string(),
                ..Default::default()
            })
            .await
            .expect("create");

        let marker = Utc::now();
        repo.set_sync_marker(created.entity_id, "pages/n.md", marker)
            .await
            .expect("marker");

        let fetched = repo.get_live(created.entity_id).await.expect("get");
        assert_eq!(fetched.page_path(), Some("pages/n.md"));
        assert_eq!(
            fetched.last_sync_at().map(|t| t.timestamp()),
            Some(marker.timestamp())
        );
        assert_eq!(fetched.updated_at.to_rfc3339(), created.updated_at.to_rfc3339());
    }
}
