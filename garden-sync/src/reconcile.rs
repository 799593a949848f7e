//! The bidirectional reconciler between the entity store and the
//! Logseq worktree.
//!
//! The database is the system-of-record for structured fields, the
//! markdown file for body prose. One run snapshots both sides, pairs
//! them by `page_path`, classifies every pair, and executes the
//! transition that state dictates. A per-entity `last_sync_at`
//! property marks the last successful write in either direction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use garden_core::LogseqSettings;
use garden_db::{DbPool, Entity, EntityRepository, NewEntity, UpdateEntity};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::convert::{default_page_path, fields_from_page, page_from_entity};
use crate::errors::{SyncError, SyncResult};
use crate::git::GitGateway;
use crate::page::{LogseqPage, content_hash};
use crate::refs::ReferenceResolver;

/// Source type under which page references are recorded.
const PAGE_SOURCE_TYPE: &str = "logseq_page";

/// Counters for one sync run. Errors accumulate; a single bad pair
/// never aborts the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub pages_processed: u64,
    pub pages_created: u64,
    pub pages_updated: u64,
    pub pages_skipped: u64,
    pub entities_processed: u64,
    pub entities_created: u64,
    pub entities_updated: u64,
    pub entities_skipped: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    NewFile,
    NewEntity,
    InSync,
    FileNewer,
    DbNewer,
    Conflict,
    OrphanFile,
    OrphanEntity,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewFile => "new_file",
            Self::NewEntity => "new_entity",
            Self::InSync => "in_sync",
            Self::FileNewer => "file_newer",
            Self::DbNewer => "db_newer",
            Self::Conflict => "conflict",
            Self::OrphanFile => "orphan_file",
            Self::OrphanEntity => "orphan_entity",
        }
    }
}

/// One file as read from disk: the parsed page plus the raw bytes it
/// was parsed from (for hash comparison).
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    pub page: LogseqPage,
    pub raw: String,
    pub modified: DateTime<Utc>,
}

/// The reconciler's working record for one page path.
#[derive(Debug)]
struct SyncPair {
    page_path: String,
    file: Option<FileSnapshot>,
    entity: Option<Entity>,
}

/// One out-of-sync pair in a hard-check report.
#[derive(Debug, Clone, Serialize)]
pub struct OutOfSyncPair {
    pub page_path: String,
    pub state: String,
    pub file_modified: Option<DateTime<Utc>>,
    pub entity_updated: Option<DateTime<Utc>>,
}

/// Result of `hard_sync_check`: what a real run would do, without
/// doing it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HardSyncReport {
    pub missing_in_db: Vec<String>,
    pub missing_in_git: Vec<String>,
    pub out_of_sync: Vec<OutOfSyncPair>,
}

pub struct LogseqSync {
    root: PathBuf,
    settings: LogseqSettings,
    entities: EntityRepository,
    resolver: ReferenceResolver,
    git: Arc<dyn GitGateway>,
    // Exclusive access to the worktree; try_lock so concurrent callers
    // fail fast instead of queueing.
    lock: Mutex<()>,
}

impl LogseqSync {
    pub fn new(db: &DbPool, settings: LogseqSettings, git: Arc<dyn GitGateway>) -> Self {
        Self {
            root: settings.root.clone(),
            settings,
            entities: EntityRepository::new(db),
            resolver: ReferenceResolver::new(db),
            git,
            lock: Mutex::new(()),
        }
    }

    fn skew(&self) -> Duration {
        Duration::seconds(self.settings.clock_skew_seconds)
    }

    /// Run a full bidirectional sync. Fails fast with `SyncInProgress`
    /// when another run holds the worktree.
    pub async fn synchronize(&self, cancel: CancellationToken) -> SyncResult<SyncStats> {
        let guard = self.lock.try_lock().map_err(|_| SyncError::SyncInProgress)?;

        let mut stats = SyncStats::default();
        let pairs = self.build_pairs().await?;
        info!(pairs = pairs.len(), "starting logseq sync");

        let mut wrote_files = false;
        for pair in pairs {
            // Finish the in-flight pair, then stop with partial stats.
            if cancel.is_cancelled() {
                warn!("sync cancelled, returning partial stats");
                break;
            }
            let path = pair.page_path.clone();
            match self.process_pair(pair, &mut stats).await {
                Ok(wrote) => wrote_files |= wrote,
                Err(err) => stats.errors.push(format!("{path}: {err}")),
            }
        }

        if wrote_files
            && let Err(err) = self.git.commit_sync(Utc::now()).await
        {
            stats.errors.push(format!("git: {err}"));
        }

        drop(guard);
        info!(
            pages_created = stats.pages_created,
            pages_updated = stats.pages_updated,
            entities_created = stats.entities_created,
            entities_updated = stats.entities_updated,
            errors = stats.errors.len(),
            "logseq sync finished"
        );
        Ok(stats)
    }

    /// Classify every pair without executing any transition.
    pub async fn hard_sync_check(&self) -> SyncResult<HardSyncReport> {
        let pairs = self.build_pairs().await?;
        let mut report = HardSyncReport::default();

        for pair in pairs {
            let state = self.classify_pair(&pair).await?;
            match state {
                SyncState::InSync => continue,
                SyncState::NewFile => report.missing_in_db.push(pair.page_path.clone()),
                SyncState::NewEntity | SyncState::OrphanEntity => {
                    report.missing_in_git.push(pair.page_path.clone())
                }
                _ => {}
            }
            report.out_of_sync.push(OutOfSyncPair {
                page_path: pair.page_path,
                state: state.as_str().to_string(),
                file_modified: pair.file.as_ref().map(|f| f.modified),
                entity_updated: pair.entity.as_ref().map(|e| e.updated_at),
            });
        }
        Ok(report)
    }

    /// Overwrite the entity's file from the database, regardless of
    /// pair state.
    pub async fn force_update_file_from_db(&self, entity_id: Uuid) -> SyncResult<()> {
        let _guard = self.lock.try_lock().map_err(|_| SyncError::SyncInProgress)?;

        let entity = self
            .entities
            .get_live(entity_id)
            .await
            .map_err(|_| SyncError::EntityNotFound(entity_id.to_string()))?;
        let page_path = entity
            .page_path()
            .ok_or_else(|| SyncError::MissingPagePath(entity_id.to_string()))?
            .to_string();

        self.write_page(&entity, &page_path).await?;
        self.entities
            .set_sync_marker(entity.entity_id, &page_path, Utc::now())
            .await?;
        self.git.commit_sync(Utc::now()).await?;
        Ok(())
    }

    /// Overwrite the entity from its file, regardless of pair state.
    pub async fn force_update_db_from_file(&self, page_path: &str) -> SyncResult<Entity> {
        let _guard = self.lock.try_lock().map_err(|_| SyncError::SyncInProgress)?;
        self.upsert_from_file(page_path).await
    }

    /// Variant keyed by entity id: the page path comes from the
    /// entity's own properties.
    pub async fn force_update_db_by_entity(&self, entity_id: Uuid) -> SyncResult<Entity> {
        let _guard = self.lock.try_lock().map_err(|_| SyncError::SyncInProgress)?;

        let entity = self
            .entities
            .get_live(entity_id)
            .await
            .map_err(|_| SyncError::EntityNotFound(entity_id.to_string()))?;
        let page_path = entity
            .page_path()
            .ok_or_else(|| SyncError::MissingPagePath(entity_id.to_string()))?
            .to_string();
        self.upsert_from_file(&page_path).await
    }

    async fn upsert_from_file(&self, page_path: &str) -> SyncResult<Entity> {
        let full = self.root.join(page_path);
        if !full.is_file() {
            return Err(SyncError::PageNotFound(page_path.to_string()));
        }
        let snapshot = read_snapshot(&full, page_path)?;
        let entity = self.apply_file_to_db(&snapshot, None).await?;
        Ok(entity)
    }

    async fn build_pairs(&self) -> SyncResult<Vec<SyncPair>> {
        let files = self.snapshot_files()?;
        let entities = self
            .entities
            .list_by_types(&self.settings.page_types)
            .await?;

        let mut pairs: BTreeMap<String, SyncPair> = BTreeMap::new();
        for snapshot in files {
            let path = snapshot.page.page_path.clone();
            pairs.insert(
                path.clone(),
                SyncPair {
                    page_path: path,
                    file: Some(snapshot),
                    entity: None,
                },
            );
        }
        for entity in entities {
            let path = entity
                .page_path()
                .map(str::to_string)
                .unwrap_or_else(|| default_page_path(&entity.name));
            pairs
                .entry(path.clone())
                .and_modify(|pair| pair.entity = Some(entity.clone()))
                .or_insert(SyncPair {
                    page_path: path,
                    file: None,
                    entity: Some(entity),
                });
        }
        Ok(pairs.into_values().collect())
    }

    fn snapshot_files(&self) -> SyncResult<Vec<FileSnapshot>> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            return Err(SyncError::PageNotFound(format!(
                "logseq root {} is not a directory",
                self.root.display()
            )));
        }

        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| SyncError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if self
                .settings
                .excluded_prefixes
                .iter()
                .any(|prefix| relative.starts_with(prefix.as_str()))
            {
                continue;
            }
            out.push(read_snapshot(entry.path(), &relative)?);
        }
        Ok(out)
    }

    async fn classify_pair(&self, pair: &SyncPair) -> SyncResult<SyncState> {
        let tombstoned = match (&pair.file, &pair.entity) {
            (Some(_), None) => self
                .entities
                .get_tombstone_by_page_path(&pair.page_path)
                .await?
                .is_some(),
            _ => false,
        };
        let content_equal = match (&pair.file, &pair.entity) {
            (Some(file), Some(entity)) => {
                let emitted = page_from_entity(entity, &pair.page_path).emit();
                content_hash(&file.raw) == content_hash(&emitted)
            }
            _ => false,
        };
        Ok(classify(
            pair.file.as_ref(),
            pair.entity.as_ref(),
            content_equal,
            tombstoned,
            self.skew(),
        ))
    }

    async fn process_pair(&self, pair: SyncPair, stats: &mut SyncStats) -> SyncResult<bool> {
        if pair.file.is_some() {
            stats.pages_processed += 1;
        }
        if pair.entity.is_some() {
            stats.entities_processed += 1;
        }

        let state = self.classify_pair(&pair).await?;
        let mut wrote_file = false;

        match state {
            SyncState::InSync => {
                stats.pages_skipped += 1;
                stats.entities_skipped += 1;
            }
            SyncState::NewFile => {
                let file = pair.file.as_ref().ok_or_else(|| {
                    SyncError::PageNotFound(pair.page_path.clone())
                })?;
                self.apply_file_to_db(file, None).await?;
                stats.entities_created += 1;
            }
            SyncState::FileNewer => {
                let file = pair.file.as_ref().ok_or_else(|| {
                    SyncError::PageNotFound(pair.page_path.clone())
                })?;
                self.apply_file_to_db(file, pair.entity.as_ref()).await?;
                stats.entities_updated += 1;
            }
            SyncState::NewEntity | SyncState::OrphanEntity => {
                let entity = pair.entity.as_ref().ok_or_else(|| {
                    SyncError::EntityNotFound(pair.page_path.clone())
                })?;
                self.write_page(entity, &pair.page_path).await?;
                self.entities
                    .set_sync_marker(entity.entity_id, &pair.page_path, Utc::now())
                    .await?;
                stats.pages_created += 1;
                wrote_file = true;
            }
            SyncState::DbNewer => {
                let entity = pair.entity.as_ref().ok_or_else(|| {
                    SyncError::EntityNotFound(pair.page_path.clone())
                })?;
                self.write_page(entity, &pair.page_path).await?;
                self.entities
                    .set_sync_marker(entity.entity_id, &pair.page_path, Utc::now())
                    .await?;
                stats.pages_updated += 1;
                wrote_file = true;
            }
            SyncState::Conflict => {
                stats.errors.push(format!(
                    "conflict: {} changed on both sides since last sync",
                    pair.page_path
                ));
            }
            SyncState::OrphanFile => {
                stats.errors.push(format!(
                    "orphan file: {} belongs to a deleted entity",
                    pair.page_path
                ));
            }
        }

        Ok(wrote_file)
    }

    /// Upsert the entity backing a file and reconcile its references.
    /// The sync marker rides in the same row write as the entity
    /// fields, so the two can never commit apart; the reference pass
    /// runs after both have landed.
    async fn apply_file_to_db(
        &self,
        file: &FileSnapshot,
        known: Option<&Entity>,
    ) -> SyncResult<Entity> {
        let page = &file.page;
        let mut fields = fields_from_page(page, &default_page_type(&self.settings));
        if let serde_json::Value::Object(map) = &mut fields.properties {
            map.insert(
                "last_sync_at".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }

        let existing = match known {
            Some(entity) => Some(entity.clone()),
            None => match page.entity_id() {
                Some(id) => self.entities.get(id).await?.filter(|e| !e.is_deleted()),
                None => {
                    match self.entities.get_by_page_path(&page.page_path).await? {
                        Some(entity) => Some(entity),
                        None => {
                            self.entities
                                .get_by_name_and_type(&fields.name, &fields.entity_type)
                                .await?
                        }
                    }
                }
            },
        };

        let entity = match existing {
            Some(entity) => {
                self.entities
                    .update(
                        entity.entity_id,
                        UpdateEntity {
                            name: Some(fields.name),
                            entity_type: Some(fields.entity_type),
                            description: fields.description,
                            properties: Some(fields.properties),
                        },
                    )
                    .await?
            }
            None => {
                self.entities
                    .create(NewEntity {
                        entity_id: page.entity_id(),
                        name: fields.name,
                        entity_type: fields.entity_type,
                        description: fields.description,
                        properties: Some(fields.properties),
                    })
                    .await?
            }
        };

        self.resolver
            .reconcile(PAGE_SOURCE_TYPE, entity.entity_id, &page.body)
            .await?;
        Ok(entity)
    }

    async fn write_page(&self, entity: &Entity, page_path: &str) -> SyncResult<()> {
        let page = page_from_entity(entity, page_path);
        let full = self.root.join(page_path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, page.emit()).await?;
        Ok(())
    }
}

fn default_page_type(settings: &LogseqSettings) -> String {
    settings
        .page_types
        .first()
        .cloned()
        .unwrap_or_else(|| "note".to_string())
}

fn read_snapshot(full: &Path, relative: &str) -> SyncResult<FileSnapshot> {
    let raw = std::fs::read_to_string(full)?;
    let modified = std::fs::metadata(full)?
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    let mut page = LogseqPage::parse(relative, &raw);
    page.last_modified = Some(modified);
    Ok(FileSnapshot {
        page,
        raw,
        modified,
    })
}

/// Pure classification over one pair, per the state table.
fn classify(
    file: Option<&FileSnapshot>,
    entity: Option<&Entity>,
    content_equal: bool,
    tombstoned: bool,
    skew: Duration,
) -> SyncState {
    match (file, entity) {
        (Some(_), None) => {
            if tombstoned {
                SyncState::OrphanFile
            } else {
                SyncState::NewFile
            }
        }
        (None, Some(entity)) => {
            if entity.page_path().is_some() {
                SyncState::OrphanEntity
            } else {
                SyncState::NewEntity
            }
        }
        (Some(file), Some(entity)) => {
            if content_equal {
                return SyncState::InSync;
            }
            // Once a marker exists, direction comes from which side
            // moved past it. A pair where neither side moved is
            // settled even when the emitted form differs textually
            // from the file (the file may predate our front matter).
            if let Some(last_sync) = entity.last_sync_at() {
                let horizon = last_sync + skew;
                return match (file.modified > horizon, entity.updated_at > horizon) {
                    (true, true) => SyncState::Conflict,
                    (true, false) => SyncState::FileNewer,
                    (false, true) => SyncState::DbNewer,
                    (false, false) => SyncState::InSync,
                };
            }
            if file.modified > entity.updated_at + skew {
                SyncState::FileNewer
            } else if entity.updated_at > file.modified + skew {
                SyncState::DbNewer
            } else {
                SyncState::InSync
            }
        }
        (None, None) => SyncState::InSync,
    }
}
