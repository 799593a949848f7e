//! Mapping between entities and Logseq pages.
//!
//! Structured fields (`name`, `type`, `description`, `alias`) live in
//! front matter; the body prose is carried in the entity's `content`
//! property. Bookkeeping properties never reach the file.

use garden_db::Entity;
use serde_json::{Map, Value, json};

use crate::page::{LogseqPage, PropertyValue};

/// Properties that are sync bookkeeping, not page content.
const INTERNAL_KEYS: [&str; 3] = ["page_path", "last_sync_at", "content"];

/// Front-matter keys with dedicated entity fields.
const SPECIAL_KEYS: [&str; 4] = ["id", "type", "description", "alias"];

/// Render an entity as a page at the given path.
pub fn page_from_entity(entity: &Entity, page_path: &str) -> LogseqPage {
    let mut properties = vec![
        (
            "id".to_string(),
            PropertyValue::Scalar(entity.entity_id.to_string()),
        ),
        (
            "type".to_string(),
            PropertyValue::Scalar(entity.entity_type.clone()),
        ),
    ];
    if let Some(description) = &entity.description {
        properties.push((
            "description".to_string(),
            PropertyValue::Scalar(description.clone()),
        ));
    }

    if let Value::Object(map) = &entity.properties {
        if let Some(Value::Array(items)) = map.get("alias") {
            let aliases: Vec<String> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            if !aliases.is_empty() {
                properties.push(("alias".to_string(), PropertyValue::List(aliases)));
            }
        }
        for (key, value) in map {
            if INTERNAL_KEYS.contains(&key.as_str()) || SPECIAL_KEYS.contains(&key.as_str()) {
                continue;
            }
            match value {
                Value::Array(items) => {
                    let items = items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                    properties.push((key.clone(), PropertyValue::List(items)));
                }
                Value::String(s) => {
                    properties.push((key.clone(), PropertyValue::Scalar(s.clone())));
                }
                other => {
                    properties.push((key.clone(), PropertyValue::Scalar(other.to_string())));
                }
            }
        }
    }

    let body = entity
        .properties
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    LogseqPage {
        page_path: page_path.to_string(),
        properties,
        body,
        last_modified: None,
    }
}

/// Entity fields extracted from a page.
#[derive(Debug, Clone)]
pub struct PageFields {
    pub name: String,
    pub entity_type: String,
    pub description: Option<String>,
    pub properties: Value,
}

/// Extract entity fields from a page. `page_path` and the body always
/// land in the property bag; the caller supplies the fallback type.
pub fn fields_from_page(page: &LogseqPage, default_type: &str) -> PageFields {
    let entity_type = page
        .get("type")
        .and_then(PropertyValue::as_scalar)
        .unwrap_or(default_type)
        .to_string();
    let description = page
        .get("description")
        .and_then(PropertyValue::as_scalar)
        .map(str::to_string);

    let mut properties = Map::new();
    for (key, value) in &page.properties {
        if key == "id" || key == "type" || key == "description" || key == "page_path" {
            continue;
        }
        let value = match value {
            PropertyValue::Scalar(s) => json!(s),
            PropertyValue::List(items) => json!(items),
        };
        properties.insert(key.clone(), value);
    }
    properties.insert("page_path".to_string(), json!(page.page_path));
    properties.insert("content".to_string(), json!(page.body));

    PageFields {
        name: page.name(),
        entity_type,
        description,
        properties: Value::Object(properties),
    }
}

/// File name for an entity that has never had a page: `pages/<name>.md`
/// with path-hostile characters replaced.
pub fn default_page_path(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    format!("pages/{}.md", sanitized.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn entity() -> Entity {
        Entity {
            entity_id: Uuid::new_v4(),
            name: "Raft".to_string(),
            entity_type: "concept".to_string(),
            description: Some("Consensus algorithm".to_string()),
            properties: json!({
                "page_path": "pages/Raft.md",
                "last_sync_at": "2026-01-01T00:00:00Z",
                "content": "Leader election notes.\n",
                "alias": ["raft protocol"],
                "source": "https://raft.github.io",
            }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn emitted_page_omits_bookkeeping_properties() {
        let entity = entity();
        let page = page_from_entity(&entity, "pages/Raft.md");
        let text = page.emit();
        assert!(text.contains(&format!("id: {}", entity.entity_id)));
        assert!(text.contains("type: concept"));
        assert!(text.contains("source: https://raft.github.io"));
        assert!(text.contains("  - raft protocol"));
        assert!(!text.contains("last_sync_at"));
        assert!(!text.contains("page_path"));
        assert!(text.ends_with("Leader election notes.\n"));
    }

    #[test]
    fn fields_round_trip_through_a_page() {
        let entity = entity();
        let page = page_from_entity(&entity, "pages/Raft.md");
        let fields = fields_from_page(&page, "note");

        assert_eq!(fields.name, "Raft");
        assert_eq!(fields.entity_type, "concept");
        assert_eq!(fields.description.as_deref(), Some("Consensus algorithm"));
        assert_eq!(fields.properties["page_path"], json!("pages/Raft.md"));
        assert_eq!(fields.properties["content"], json!("Leader election notes.\n"));
        assert_eq!(fields.properties["alias"], json!(["raft protocol"]));
    }

    #[test]
    fn default_path_sanitizes_separators() {
        assert_eq!(default_page_path("a/b: c"), "pages/a_b_ c.md");
    }
}
