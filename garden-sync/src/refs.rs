//! `[[Name]]` reference parsing and reconciliation.

use std::sync::LazyLock;

use garden_db::{DbPool, EntityRepository, NewEntity, NewReference, ReferenceRepository};
use regex::Regex;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::errors::SyncResult;

/// `[[Name]]` or `[[Name|Display]]`; nested brackets are not matched
/// and a dangling `[[` is simply not a reference.
static REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]|]+)(?:\|([^\]]+))?\]\]").expect("regex"));

/// One parsed occurrence. `position` is the zero-based byte offset of
/// `original` in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedReference {
    pub original: String,
    pub entity_name: String,
    pub display_text: String,
    pub position: usize,
}

pub fn parse_entity_references(content: &str) -> Vec<ParsedReference> {
    REFERENCE_RE
        .captures_iter(content)
        .map(|caps| {
            let whole = caps.get(0).map(|m| (m.as_str(), m.start())).unwrap_or(("", 0));
            let name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let display = caps
                .get(2)
                .map(|m| m.as_str().trim())
                .unwrap_or(name);
            ParsedReference {
                original: whole.0.to_string(),
                entity_name: name.to_string(),
                display_text: display.to_string(),
                position: whole.1,
            }
        })
        .collect()
}

/// Resolves parsed references against the entity store and rewrites the
/// reference rows for one source document.
pub struct ReferenceResolver {
    entities: EntityRepository,
    references: ReferenceRepository,
}

impl ReferenceResolver {
    pub fn new(db: &DbPool) -> Self {
        Self {
            entities: EntityRepository::new(db),
            references: ReferenceRepository::new(db),
        }
    }

    /// Parse `content`, resolve every name (creating `unresolved`
    /// placeholders for unknown ones), and atomically replace the
    /// reference set for `(source_type, source_id)`.
    pub async fn reconcile(
        &self,
        source_type: &str,
        source_id: Uuid,
        content: &str,
    ) -> SyncResult<usize> {
        let parsed = parse_entity_references(content);
        let mut rows = Vec::with_capacity(parsed.len());

        for reference in &parsed {
            let entity_id = match self.entities.get_by_name(&reference.entity_name).await? {
                Some(entity) => entity.entity_id,
                None => {
                    debug!(name = %reference.entity_name, "creating placeholder entity");
                    self.entities
                        .create(NewEntity {
                            name: reference.entity_name.clone(),
                            entity_type: "unresolved".to_string(),
                            ..Default::default()
                        })
                        .await?
                        .entity_id
                }
            };
            rows.push(NewReference {
                entity_id,
                reference_text: reference.original.clone(),
                position: Some(reference.position as i64),
            });
        }

        self.references
            .replace_for_source(source_type, source_id, &rows)
            .await?;
        Ok(rows.len())
    }
}
