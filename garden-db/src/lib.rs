//! garden-db: SQLite persistence with sqlite-vec support.
//!
//! This crate provides:
//! - Entity storage (typed entities, soft deletion, `page_path` identity)
//! - Relationship and reference storage
//! - Read access to the searchable source corpora
//! - The per-`(source_kind, strategy)` vector index

pub mod db;
pub mod entities;
pub mod error;
pub mod references;
pub mod relationships;
pub mod sources;
pub mod vectors;

// Re-export commonly used types
pub use db::DbPool;
pub use entities::{Entity, EntityRepository, NewEntity, UpdateEntity};
pub use error::{DbError, DbResult};
pub use references::{EntityReference, NewReference, ReferenceRepository};
pub use relationships::{EntityRelationship, NewRelationship, RelationshipRepository};
pub use sources::{BookmarkDoc, SourceKind, SourceRepository, SourceRow};
pub use vectors::VectorStore;

// Re-export test helpers when running tests or when the test-helpers
// feature is enabled
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
