//! Read access to the searchable source corpora.
//!
//! Each source kind maps to one table (rooms and their messages are
//! searched together). The unified ranker is the only consumer; the
//! CRUD surfaces for these corpora live outside this core.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{DbError, DbResult};

/// The searchable source kinds.
///
/// The string form doubles as the lexicographic tie-break key in
/// unified search ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Bookmark,
    BrowserHistory,
    Contact,
    Item,
    Note,
    Room,
    Session,
}

impl SourceKind {
    pub const ALL: [SourceKind; 7] = [
        SourceKind::Bookmark,
        SourceKind::BrowserHistory,
        SourceKind::Contact,
        SourceKind::Item,
        SourceKind::Note,
        SourceKind::Room,
        SourceKind::Session,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bookmark => "bookmark",
            Self::BrowserHistory => "browser_history",
            Self::Contact => "contact",
            Self::Item => "item",
            Self::Note => "note",
            Self::Room => "room",
            Self::Session => "session",
        }
    }
}

impl FromStr for SourceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bookmark" => Ok(Self::Bookmark),
            "browser_history" => Ok(Self::BrowserHistory),
            "contact" => Ok(Self::Contact),
            "item" => Ok(Self::Item),
            "note" => Ok(Self::Note),
            "room" => Ok(Self::Room),
            "session" => Ok(Self::Session),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row from a source corpus, in the shape candidate production needs.
#[derive(Debug, Clone)]
pub struct SourceRow {
    pub id: String,
    pub title: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A bookmark as the advanced-search orchestrator sees it.
#[derive(Debug, Clone, Serialize)]
pub struct BookmarkDoc {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SourceRepository {
    pool: SqlitePool,
}

type RawRow = (String, Option<String>, Option<String>, String, String);

struct TableSpec {
    select: &'static str,
    match_clause: &'static str,
}

/// Column layout per kind: id, title, text, created_at, updated_at.
fn spec(kind: SourceKind) -> TableSpec {
    match kind {
        SourceKind::Bookmark => TableSpec {
            select: "SELECT id, title, COALESCE(summary, title), created_at, updated_at FROM bookmarks",
            match_clause: "instr(lower(title), ?1) > 0 OR instr(lower(COALESCE(summary, '')), ?1) > 0 OR instr(lower(COALESCE(content, '')), ?1) > 0",
        },
        SourceKind::Note => TableSpec {
            select: "SELECT id, title, body, created_at, updated_at FROM notes",
            match_clause: "instr(lower(title), ?1) > 0 OR instr(lower(body), ?1) > 0",
        },
        SourceKind::Item => TableSpec {
            select: "SELECT id, title, body, created_at, updated_at FROM items",
            match_clause: "instr(lower(title), ?1) > 0 OR instr(lower(body), ?1) > 0",
        },
        SourceKind::Contact => TableSpec {
            select: "SELECT id, name, COALESCE(details, name), created_at, updated_at FROM contacts",
            match_clause: "instr(lower(name), ?1) > 0 OR instr(lower(COALESCE(details, '')), ?1) > 0",
        },
        SourceKind::BrowserHistory => TableSpec {
            select: "SELECT id, title, url, visited_at, visited_at FROM browser_history",
            match_clause: "instr(lower(COALESCE(title, '')), ?1) > 0 OR instr(lower(url), ?1) > 0",
        },
        SourceKind::Session => TableSpec {
            select: "SELECT id, title, COALESCE(title, id), started_at, COALESCE(ended_at, started_at) FROM sessions",
            match_clause: "instr(lower(COALESCE(title, '')), ?1) > 0",
        },
        // Rooms are handled separately (join against messages)
        SourceKind::Room => TableSpec {
            select: "",
            match_clause: "",
        },
    }
}

impl SourceRepository {
    pub fn new(db: &DbPool) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Exact-substring pass: rows whose indexed fields contain the
    /// (lowercased) needle.
    pub async fn exact_match(
        &self,
        kind: SourceKind,
        needle: &str,
        cap: usize,
    ) -> DbResult<Vec<SourceRow>> {
        let needle = needle.to_lowercase();

        let rows: Vec<RawRow> = if kind == SourceKind::Room {
            sqlx::query_as(
                r#"SELECT r.id, r.name, m.body, r.created_at, MAX(m.created_at)
                   FROM rooms r
                   JOIN messages m ON m.room_id = r.id
                   WHERE instr(lower(m.body), ?1) > 0 OR instr(lower(r.name), ?1) > 0
                   GROUP BY r.id, r.name, r.created_at
                   LIMIT ?2"#,
            )
            .bind(&needle)
            .bind(cap as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            let spec = spec(kind);
            let sql = format!("{} WHERE {} LIMIT ?2", spec.select, spec.match_clause);
            sqlx::query_as(&sql)
                .bind(&needle)
                .bind(cap as i64)
                .fetch_all(&self.pool)
                .await?
        };

        Ok(rows.into_iter().map(decode_row).collect())
    }

    /// Titles/names for the fuzzy pass, over the whole corpus. The
    /// edit-distance scoring (and any capping of the matches) happens
    /// in the search crate; this only feeds it rows.
    pub async fn titles(&self, kind: SourceKind) -> DbResult<Vec<SourceRow>> {
        let rows: Vec<RawRow> = if kind == SourceKind::Room {
            sqlx::query_as(
                r#"SELECT r.id, r.name, r.name, r.created_at,
                          COALESCE(MAX(m.created_at), r.updated_at)
                   FROM rooms r
                   LEFT JOIN messages m ON m.room_id = r.id
                   GROUP BY r.id, r.name, r.created_at, r.updated_at"#,
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(spec(kind).select)
                .fetch_all(&self.pool)
                .await?
        };

        Ok(rows.into_iter().map(decode_row).collect())
    }

    /// Hydrate rows by id, preserving no particular order. Used by the
    /// vector pass to attach titles and timestamps to ANN hits.
    pub async fn by_ids(&self, kind: SourceKind, ids: &[String]) -> DbResult<Vec<SourceRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = if kind == SourceKind::Room {
            format!(
                r#"SELECT r.id, r.name, r.name, r.created_at,
                          COALESCE(MAX(m.created_at), r.updated_at)
                   FROM rooms r
                   LEFT JOIN messages m ON m.room_id = r.id
                   WHERE r.id IN ({placeholders})
                   GROUP BY r.id, r.name, r.created_at, r.updated_at"#
            )
        } else {
            format!("{} WHERE id IN ({placeholders})", spec(kind).select)
        };

        let mut query = sqlx::query_as::<_, RawRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        Ok(query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(decode_row)
            .collect())
    }

    /// Bookmarks by id, for advanced-search context assembly.
    pub async fn bookmarks_by_ids(&self, ids: &[String]) -> DbResult<Vec<BookmarkDoc>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT id, title, url, summary FROM bookmarks WHERE id IN ({placeholders})"
        );

        let mut query = sqlx::query_as::<_, (String, String, String, Option<String>)>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(id, title, url, summary)| {
                Ok(BookmarkDoc {
                    id: id.parse().map_err(|_| DbError::EntityNotFound(id))?,
                    title,
                    url,
                    summary,
                })
            })
            .collect()
    }

    // Seeding helpers. Production write paths for these corpora live in
    // the out-of-scope CRUD layer; tests and fixtures go through these.

    pub async fn insert_bookmark(
        &self,
        id: Uuid,
        title: &str,
        url: &str,
        summary: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO bookmarks (id, title, url, summary, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(title)
        .bind(url)
        .bind(summary)
        .bind(created_at.to_rfc3339())
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_note(
        &self,
        id: Uuid,
        title: &str,
        body: &str,
        created_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query("INSERT INTO notes (id, title, body, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(title)
            .bind(body)
            .bind(created_at.to_rfc3339())
            .bind(created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_item(
        &self,
        id: Uuid,
        title: &str,
        body: &str,
        created_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query("INSERT INTO items (id, title, body, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(title)
            .bind(body)
            .bind(created_at.to_rfc3339())
            .bind(created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_contact(
        &self,
        id: Uuid,
        name: &str,
        details: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO contacts (id, name, details, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(details)
        .bind(created_at.to_rfc3339())
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_history(
        &self,
        id: Uuid,
        title: Option<&str>,
        url: &str,
        visited_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query("INSERT INTO browser_history (id, title, url, visited_at) VALUES (?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(title)
            .bind(url)
            .bind(visited_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_room(&self, id: Uuid, name: &str, created_at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("INSERT INTO rooms (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(name)
            .bind(created_at.to_rfc3339())
            .bind(created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_message(
        &self,
        id: Uuid,
        room_id: Uuid,
        sender: &str,
        body: &str,
        created_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO messages (id, room_id, sender, body, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(room_id.to_string())
        .bind(sender)
        .bind(body)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_session(
        &self,
        id: Uuid,
        room_id: Uuid,
        title: Option<&str>,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO sessions (id, room_id, title, started_at, ended_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(room_id.to_string())
        .bind(title)
        .bind(started_at.to_rfc3339())
        .bind(ended_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn decode_row(row: RawRow) -> SourceRow {
    let (id, title, text, created_at, updated_at) = row;
    SourceRow {
        id,
        text: text.or_else(|| title.clone()).unwrap_or_default(),
        title,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    }
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exact_match_is_case_insensitive_substring() {
        let db = DbPool::open_in_memory().await.expect("open db");
        let sources = SourceRepository::new(&db);
        let now = Utc::now();

        sources
            .insert_bookmark(Uuid::new_v4(), "Raft consensus", "https://raft.github.io", None, now)
            .await
            .expect("insert");
        sources
            .insert_bookmark(Uuid::new_v4(), "CRDTs", "https://crdt.tech", None, now)
            .await
            .expect("insert");

        let hits = sources
            .exact_match(SourceKind::Bookmark, "raft", 10)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title.as_deref(), Some("Raft consensus"));
    }

    #[tokio::test]
    async fn room_match_joins_messages() {
        let db = DbPool::open_in_memory().await.expect("open db");
        let sources = SourceRepository::new(&db);
        let now = Utc::now();
        let room_id = Uuid::new_v4();

        sources.insert_room(room_id, "lab", now).await.expect("room");
        sources
            .insert_message(Uuid::new_v4(), room_id, "ada", "thoughts on raft leadership", now)
            .await
            .expect("message");

        let hits = sources
            .exact_match(SourceKind::Room, "raft", 10)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, room_id.to_string());
        assert!(hits[0].text.contains("raft"));
    }
}
