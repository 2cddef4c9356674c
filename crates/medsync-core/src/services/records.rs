//! Shared record service used by clients and the sync engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use crate::db::{Database, LibSqlRecordRepository};
use crate::error::{Error, Result};
use crate::models::{OwnerId, Record, RecordBody, RecordId, RecordKind, SyncConflict};
use crate::store::LocalStore;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Emitted after every user-initiated local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// Free-text description of what changed
    pub reason: String,
    /// Owner of the changed record
    pub owner_id: OwnerId,
}

/// Thread-safe service for record storage.
///
/// User mutations go through the `create`/`update`/`delete` methods and are
/// announced on the change channel. Writes made by the sync engine through
/// [`LocalStore`] are not announced, so a sync never triggers another sync.
#[derive(Clone)]
pub struct RecordService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    changes: broadcast::Sender<StorageChange>,
}

impl RecordService {
    /// Open a record service at the given filesystem path.
    ///
    /// A file that is not a valid database is moved aside and a fresh
    /// database is created in its place.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local database at {} is unreadable: {}. Moving it aside and starting fresh.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self::from_database(db, Some(db_path)))
    }

    /// Open an in-memory record service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db, None))
    }

    fn from_database(db: Database, db_path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            db: Arc::new(Mutex::new(db)),
            db_path,
            changes,
        }
    }

    /// Path of the backing database file, if any.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Subscribe to local mutation events.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    fn announce(&self, reason: String, owner_id: &OwnerId) {
        // No subscribers is normal for one-shot CLI commands
        let _ = self.changes.send(StorageChange {
            reason,
            owner_id: owner_id.clone(),
        });
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("medsync.db");
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale database sidecar file {}", path.display());
            }
        }

        Ok(())
    }

    /// Create a new dirty record.
    pub async fn create(&self, owner_id: &OwnerId, body: RecordBody) -> Result<Record> {
        let record = Record::new(owner_id.clone(), body);
        {
            let db = self.db.lock().await;
            LibSqlRecordRepository::new(db.connection())
                .save(&record)
                .await?;
        }
        self.announce(format!("created {} {}", record.kind(), record.id), owner_id);
        Ok(record)
    }

    /// Replace a record's payload.
    pub async fn update(&self, kind: RecordKind, id: &RecordId, body: RecordBody) -> Result<Record> {
        let record = {
            let db = self.db.lock().await;
            let repo = LibSqlRecordRepository::new(db.connection());
            let mut record = repo
                .get(kind, id)
                .await?
                .filter(|record| !record.tombstoned)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            record.update(body)?;
            repo.save(&record).await?;
            record
        };
        self.announce(format!("updated {kind} {id}"), &record.owner_id);
        Ok(record)
    }

    /// Soft-delete a record; it stays until the remote delete is confirmed.
    pub async fn delete(&self, kind: RecordKind, id: &RecordId) -> Result<Record> {
        let record = {
            let db = self.db.lock().await;
            let repo = LibSqlRecordRepository::new(db.connection());
            let mut record = repo
                .get(kind, id)
                .await?
                .filter(|record| !record.tombstoned)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            record.tombstone();
            repo.save(&record).await?;
            record
        };
        self.announce(format!("deleted {kind} {id}"), &record.owner_id);
        Ok(record)
    }

    /// Fetch a live record by id.
    pub async fn get(&self, kind: RecordKind, id: &RecordId) -> Result<Option<Record>> {
        let db = self.db.lock().await;
        let record = LibSqlRecordRepository::new(db.connection())
            .get(kind, id)
            .await?;
        Ok(record.filter(|record| !record.tombstoned))
    }

    /// List an owner's live records, most recently updated first.
    pub async fn list(&self, kind: RecordKind, owner_id: &OwnerId, limit: usize) -> Result<Vec<Record>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list(kind, owner_id, limit)
            .await
    }

    /// Ids of live records starting with `prefix`.
    pub async fn list_ids_by_prefix(
        &self,
        kind: RecordKind,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list_ids_by_prefix(kind, prefix, limit)
            .await
    }

    /// Number of records of one kind waiting for upload.
    pub async fn count_dirty(&self, kind: RecordKind) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .count_dirty(kind)
            .await
    }

    /// List recently resolved sync conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list_conflicts(limit)
            .await
    }
}

#[async_trait]
impl LocalStore for RecordService {
    async fn fetch_dirty(&self, kind: RecordKind) -> Result<Vec<Record>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .fetch_dirty(kind)
            .await
    }

    async fn mark_clean(&self, kind: RecordKind, id: &RecordId, version: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .mark_clean(kind, id, version)
            .await
    }

    async fn upsert(&self, kind: RecordKind, record: &Record) -> Result<()> {
        ensure_kind(kind, record)?;
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .save(record)
            .await
    }

    async fn upsert_if_unchanged(
        &self,
        kind: RecordKind,
        record: &Record,
        expected_updated_at: Option<i64>,
    ) -> Result<bool> {
        ensure_kind(kind, record)?;
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .save_if_unchanged(record, expected_updated_at)
            .await
    }

    async fn fetch_all(&self, kind: RecordKind, owner_id: &OwnerId) -> Result<Vec<Record>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .fetch_all(kind, owner_id)
            .await
    }

    async fn purge_tombstones(&self, kind: RecordKind) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .purge_tombstones(kind)
            .await
    }

    async fn log_conflict(&self, conflict: &SyncConflict) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .log_conflict(conflict)
            .await
    }
}

fn ensure_kind(kind: RecordKind, record: &Record) -> Result<()> {
    if record.kind() == kind {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "record {} is a {}, not a {kind}",
            record.id,
            record.kind()
        )))
    }
}
