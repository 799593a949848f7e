//! Logseq page codec: front matter plus markdown body.
//!
//! Front matter is a leading `---` block of lowercase `key: value`
//! pairs; list values use indented `- item` lines. Property order is
//! preserved so that `emit(parse(x))` reproduces `x` (modulo blank
//! lines between keys and a trailing newline on the body).

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Scalar(String),
    List(Vec<String>),
}

impl PropertyValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::List(_) => None,
        }
    }
}

/// One markdown page, reconstructed from disk each sync run.
#[derive(Debug, Clone)]
pub struct LogseqPage {
    /// POSIX-style path relative to the Logseq root.
    pub page_path: String,
    pub properties: Vec<(String, PropertyValue)>,
    pub body: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl LogseqPage {
    pub fn parse(page_path: &str, content: &str) -> Self {
        let (properties, body) = split_front_matter(content);
        Self {
            page_path: page_path.to_string(),
            properties,
            body,
            last_modified: None,
        }
    }

    pub fn emit(&self) -> String {
        let mut out = String::new();
        if !self.properties.is_empty() {
            out.push_str("---\n");
            for (key, value) in &self.properties {
                match value {
                    PropertyValue::Scalar(s) => {
                        out.push_str(key);
                        out.push_str(": ");
                        out.push_str(s);
                        out.push('\n');
                    }
                    PropertyValue::List(items) => {
                        out.push_str(key);
                        out.push_str(":\n");
                        for item in items {
                            out.push_str("  - ");
                            out.push_str(item);
                            out.push('\n');
                        }
                    }
                }
            }
            out.push_str("---\n");
        }
        out.push_str(&self.body);
        out
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Set a scalar property, replacing in place or appending.
    pub fn set_scalar(&mut self, key: &str, value: &str) {
        let value = PropertyValue::Scalar(value.to_string());
        if let Some(entry) = self.properties.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.properties.push((key.to_string(), value));
        }
    }

    /// The `id` front-matter key, when present and a valid UUID.
    pub fn entity_id(&self) -> Option<Uuid> {
        self.get("id")
            .and_then(PropertyValue::as_scalar)
            .and_then(|raw| raw.parse().ok())
    }

    /// The page name: file stem of `page_path`.
    pub fn name(&self) -> String {
        let file = self
            .page_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.page_path);
        file.strip_suffix(".md").unwrap_or(file).to_string()
    }
}

fn split_front_matter(content: &str) -> (Vec<(String, PropertyValue)>, String) {
    let mut lines = content.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return (Vec::new(), String::new());
    };
    if first.trim_end() != "---" {
        return (Vec::new(), content.to_string());
    }

    let mut properties: Vec<(String, PropertyValue)> = Vec::new();
    let mut consumed = first.len();
    let mut closed = false;

    for line in lines {
        consumed += line.len();
        let trimmed = line.trim_end_matches('\n');
        if trimmed.trim_end() == "---" {
            closed = true;
            break;
        }
        if trimmed.trim().is_empty() {
            continue;
        }
        if let Some(item) = trimmed.strip_prefix("  - ") {
            // Continuation of the most recent list key.
            if let Some((_, PropertyValue::List(items))) = properties.last_mut() {
                items.push(item.trim().to_string());
            }
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            properties.push((key, PropertyValue::List(Vec::new())));
        } else {
            properties.push((key, PropertyValue::Scalar(value.to_string())));
        }
    }

    if !closed {
        // Unterminated front matter: treat the whole file as body.
        return (Vec::new(), content.to_string());
    }

    (properties, content[consumed..].to_string())
}

/// Content hash used for the cheap in-sync test.
pub fn content_hash(content: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "---\nid: 550e8400-e29b-41d4-a716-446655440000\ntype: concept\ndescription: Distributed consensus algorithm\nalias:\n  - raft protocol\n  - the raft paper\nsource: https://raft.github.io\n---\nRaft elects a leader per term.\n\nSee [[Paxos]] for contrast.\n";

    #[test]
    fn parse_reads_scalars_lists_and_body() {
        let page = LogseqPage::parse("pages/Raft.md", FIXTURE);
        assert_eq!(
            page.entity_id(),
            Some("550e8400-e29b-41d4-a716-446655440000".parse().unwrap())
        );
        assert_eq!(
            page.get("type").and_then(PropertyValue::as_scalar),
            Some("concept")
        );
        assert_eq!(
            page.get("alias"),
            Some(&PropertyValue::List(vec![
                "raft protocol".to_string(),
                "the raft paper".to_string()
            ]))
        );
        assert!(page.body.starts_with("Raft elects a leader"));
        assert_eq!(page.name(), "Raft");
    }

    #[test]
    fn emit_round_trips_the_fixture() {
        let page = LogseqPage::parse("pages/Raft.md", FIXTURE);
        assert_eq!(page.emit(), FIXTURE);
    }

    #[test]
    fn round_trips_without_front_matter() {
        let raw = "just a body\nwith two lines\n";
        let page = LogseqPage::parse("pages/Plain.md", raw);
        assert!(page.properties.is_empty());
        assert_eq!(page.emit(), raw);
    }

    #[test]
    fn unterminated_front_matter_is_body() {
        let raw = "---\nid: not-closed\nstill the body\n";
        let page = LogseqPage::parse("pages/Broken.md", raw);
        assert!(page.properties.is_empty());
        assert_eq!(page.body, raw);
    }

    #[test]
    fn set_scalar_replaces_in_place() {
        let mut page = LogseqPage::parse("pages/Raft.md", FIXTURE);
        page.set_scalar("type", "note");
        assert_eq!(
            page.get("type").and_then(PropertyValue::as_scalar),
            Some("note")
        );
        // Order unchanged: type is still the second key.
        assert_eq!(page.properties[1].0, "type");
    }

    #[test]
    fn hash_distinguishes_content() {
        assert_eq!(content_hash("a"), content_hash("a"));
        assert_ne!(content_hash("a"), content_hash("b"));
    }
}
