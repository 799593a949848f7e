//! Bidirectional synchronization between the entity store and a
//! Logseq-format git worktree.
//!
//! The reconciler pairs markdown files with page-backed entities,
//! classifies each pair against a fixed state table, and executes the
//! transition that state dictates. The codec round-trips page files;
//! the reference resolver keeps `[[Name]]` links materialized as
//! entity references.

pub mod convert;
pub mod errors;
pub mod git;
pub mod page;
pub mod reconcile;
pub mod refs;

pub use errors::{SyncError, SyncResult};
pub use git::{CliGit, GitGateway};
pub use page::{LogseqPage, PropertyValue};
pub use reconcile::{HardSyncReport, LogseqSync, OutOfSyncPair, SyncStats};
pub use refs::{ParsedReference, parse_entity_references};
