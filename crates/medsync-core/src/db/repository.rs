//! Record repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT
#![allow(clippy::cast_sign_loss)]

use crate::error::{Error, Result};
use crate::models::{
    ConflictWinner, OwnerId, Record, RecordBody, RecordId, RecordKind, SyncConflict,
};
use libsql::{params, Connection, Row};

const RECORD_COLUMNS: &str =
    "kind, owner_id, id, body, created_at, updated_at, dirty, tombstoned";

/// libSQL-backed storage for synchronizable records
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace a record, flags included
    pub async fn save(&self, record: &Record) -> Result<()> {
        let body = serde_json::to_string(&record.body)?;
        self.conn
            .execute(
                "INSERT INTO records (kind, owner_id, id, body, created_at, updated_at, dirty, tombstoned)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(kind, id) DO UPDATE SET
                     owner_id = excluded.owner_id,
                     body = excluded.body,
                     created_at = excluded.created_at,
                     updated_at = excluded.updated_at,
                     dirty = excluded.dirty,
                     tombstoned = excluded.tombstoned",
                params![
                    record.kind().as_str(),
                    record.owner_id.as_str().to_string(),
                    record.id.as_str(),
                    body,
                    record.created_at,
                    record.updated_at,
                    i64::from(record.dirty),
                    i64::from(record.tombstoned)
                ],
            )
            .await?;
        Ok(())
    }

    /// Write `record` only if the stored copy is still the one the caller saw.
    ///
    /// `expected_updated_at` of `None` means the record must not exist yet.
    /// Returns whether the write happened.
    pub async fn save_if_unchanged(
        &self,
        record: &Record,
        expected_updated_at: Option<i64>,
    ) -> Result<bool> {
        let body = serde_json::to_string(&record.body)?;
        let affected = match expected_updated_at {
            None => {
                self.conn
                    .execute(
                        "INSERT INTO records (kind, owner_id, id, body, created_at, updated_at, dirty, tombstoned)
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                         ON CONFLICT(kind, id) DO NOTHING",
                        params![
                            record.kind().as_str(),
                            record.owner_id.as_str().to_string(),
                            record.id.as_str(),
                            body,
                            record.created_at,
                            record.updated_at,
                            i64::from(record.dirty),
                            i64::from(record.tombstoned)
                        ],
                    )
                    .await?
            }
            Some(expected) => {
                self.conn
                    .execute(
                        "UPDATE records SET
                             owner_id = ?, body = ?, created_at = ?, updated_at = ?,
                             dirty = ?, tombstoned = ?
                         WHERE kind = ? AND id = ? AND updated_at = ?",
                        params![
                            record.owner_id.as_str().to_string(),
                            body,
                            record.created_at,
                            record.updated_at,
                            i64::from(record.dirty),
                            i64::from(record.tombstoned),
                            record.kind().as_str(),
                            record.id.as_str(),
                            expected
                        ],
                    )
                    .await?
            }
        };
        Ok(affected == 1)
    }

    /// Get a record by id, tombstones included
    pub async fn get(&self, kind: RecordKind, id: &RecordId) -> Result<Option<Record>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE kind = ? AND id = ?"),
                params![kind.as_str(), id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_record(&row)?)),
            None => Ok(None),
        }
    }

    /// List an owner's live records, most recently updated first
    pub async fn list(&self, kind: RecordKind, owner_id: &OwnerId, limit: usize) -> Result<Vec<Record>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM records
                     WHERE kind = ? AND owner_id = ? AND tombstoned = 0
                     ORDER BY updated_at DESC
                     LIMIT ?"
                ),
                params![kind.as_str(), owner_id.as_str().to_string(), limit as i64],
            )
            .await?;
        collect_records(rows).await
    }

    /// Ids of live records starting with `prefix`
    pub async fn list_ids_by_prefix(
        &self,
        kind: RecordKind,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM records
                 WHERE kind = ? AND tombstoned = 0 AND id LIKE ?
                 ORDER BY updated_at DESC
                 LIMIT ?",
                params![kind.as_str(), format!("{prefix}%"), limit as i64],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    /// Dirty records of one kind, oldest first
    pub async fn fetch_dirty(&self, kind: RecordKind) -> Result<Vec<Record>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM records
                     WHERE kind = ? AND dirty = 1
                     ORDER BY created_at ASC, id ASC"
                ),
                params![kind.as_str()],
            )
            .await?;
        collect_records(rows).await
    }

    /// All records of one kind for an owner, tombstones included
    pub async fn fetch_all(&self, kind: RecordKind, owner_id: &OwnerId) -> Result<Vec<Record>> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM records
                     WHERE kind = ? AND owner_id = ?
                     ORDER BY created_at ASC, id ASC"
                ),
                params![kind.as_str(), owner_id.as_str().to_string()],
            )
            .await?;
        collect_records(rows).await
    }

    /// Clear the dirty flag if the stored version still matches
    pub async fn mark_clean(&self, kind: RecordKind, id: &RecordId, version: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE records SET dirty = 0 WHERE kind = ? AND id = ? AND updated_at = ?",
                params![kind.as_str(), id.as_str(), version],
            )
            .await?;
        Ok(rows > 0)
    }

    /// Delete clean tombstones
    pub async fn purge_tombstones(&self, kind: RecordKind) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM records WHERE kind = ? AND tombstoned = 1 AND dirty = 0",
                params![kind.as_str()],
            )
            .await?;
        Ok(rows)
    }

    /// Number of records of one kind still waiting for upload
    pub async fn count_dirty(&self, kind: RecordKind) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM records WHERE kind = ? AND dirty = 1",
                params![kind.as_str()],
            )
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(count.max(0) as usize)
    }

    /// Store a resolved download conflict
    pub async fn log_conflict(&self, conflict: &SyncConflict) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_conflicts (
                    kind, record_id, local_updated_at, incoming_updated_at, resolved_at, winner, strategy
                 ) VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    conflict.kind.as_str(),
                    conflict.record_id.clone(),
                    conflict.local_updated_at,
                    conflict.incoming_updated_at,
                    conflict.resolved_at,
                    conflict.winner.as_str(),
                    conflict.strategy.clone()
                ],
            )
            .await?;
        Ok(())
    }

    /// Most recently resolved conflicts first
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, kind, record_id, local_updated_at, incoming_updated_at, resolved_at, winner, strategy
                 FROM sync_conflicts
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?",
                params![limit as i64],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            let kind: String = row.get(1)?;
            let winner: String = row.get(6)?;
            conflicts.push(SyncConflict {
                id: row.get(0)?,
                kind: kind.parse()?,
                record_id: row.get(2)?,
                local_updated_at: row.get(3)?,
                incoming_updated_at: row.get(4)?,
                resolved_at: row.get(5)?,
                winner: if winner == "local" {
                    ConflictWinner::Local
                } else {
                    ConflictWinner::Remote
                },
                strategy: row.get(7)?,
            });
        }
        Ok(conflicts)
    }
}

async fn collect_records(mut rows: libsql::Rows) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    while let Some(row) = rows.next().await? {
        records.push(parse_record(&row)?);
    }
    Ok(records)
}

/// Parse a record from a database row selected with `RECORD_COLUMNS`
fn parse_record(row: &Row) -> Result<Record> {
    let kind: RecordKind = row.get::<String>(0)?.parse()?;
    let owner_id = OwnerId::new(row.get::<String>(1)?)?;
    let id: String = row.get(2)?;
    let body: String = row.get(3)?;

    Ok(Record {
        id: id
            .parse()
            .map_err(|_| Error::Database(format!("invalid record id in database: {id}")))?,
        owner_id,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        dirty: row.get::<i64>(6)? != 0,
        tombstoned: row.get::<i64>(7)? != 0,
        body: RecordBody::from_json(kind, serde_json::from_str(&body)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Doctor, Medication};
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn owner() -> OwnerId {
        OwnerId::new("owner-a").unwrap()
    }

    fn medication(name: &str) -> Record {
        Record::new(
            owner(),
            RecordBody::Medication(Medication {
                name: name.to_string(),
                ..Medication::default()
            }),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_and_get() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let record = medication("Metformin");
        repo.save(&record).await.unwrap();

        let fetched = repo
            .get(RecordKind::Medication, &record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, record);
        assert!(repo.get(RecordKind::Doctor, &record.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_dirty_orders_by_creation() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let mut first = medication("First");
        first.created_at = 100;
        let mut second = medication("Second");
        second.created_at = 200;
        let mut clean = medication("Clean");
        clean.dirty = false;

        repo.save(&second).await.unwrap();
        repo.save(&clean).await.unwrap();
        repo.save(&first).await.unwrap();

        let dirty = repo.fetch_dirty(RecordKind::Medication).await.unwrap();
        let ids = dirty.iter().map(|record| record.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_clean_requires_matching_version() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let record = medication("Lisinopril");
        repo.save(&record).await.unwrap();

        assert!(!repo
            .mark_clean(RecordKind::Medication, &record.id, record.updated_at - 1)
            .await
            .unwrap());
        assert!(repo
            .mark_clean(RecordKind::Medication, &record.id, record.updated_at)
            .await
            .unwrap());
        assert!(repo.fetch_dirty(RecordKind::Medication).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_if_unchanged_guards_on_stored_version() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let record = medication("Atorvastatin");
        assert!(repo.save_if_unchanged(&record, None).await.unwrap());
        // Already present, so an insert-only write is skipped
        assert!(!repo.save_if_unchanged(&record, None).await.unwrap());

        let mut incoming = record.clone();
        incoming.updated_at += 10;
        incoming.dirty = false;
        assert!(!repo
            .save_if_unchanged(&incoming, Some(record.updated_at - 1))
            .await
            .unwrap());
        assert!(repo
            .save_if_unchanged(&incoming, Some(record.updated_at))
            .await
            .unwrap());

        let stored = repo
            .get(RecordKind::Medication, &record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, incoming);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_purge_only_clean_tombstones() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let mut pending = medication("Pending delete");
        pending.tombstone();
        let mut confirmed = medication("Confirmed delete");
        confirmed.tombstone();
        confirmed.dirty = false;

        repo.save(&pending).await.unwrap();
        repo.save(&confirmed).await.unwrap();

        assert_eq!(repo.purge_tombstones(RecordKind::Medication).await.unwrap(), 1);
        assert!(repo.get(RecordKind::Medication, &pending.id).await.unwrap().is_some());
        assert!(repo.get(RecordKind::Medication, &confirmed.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_hides_tombstones_and_other_owners() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let live = medication("Live");
        let mut deleted = medication("Deleted");
        deleted.tombstone();
        let other = Record::new(
            OwnerId::new("owner-b").unwrap(),
            RecordBody::Medication(Medication::default()),
        );
        let doctor = Record::new(owner(), RecordBody::Doctor(Doctor::default()));

        for record in [&live, &deleted, &other, &doctor] {
            repo.save(record).await.unwrap();
        }

        let listed = repo.list(RecordKind::Medication, &owner(), 10).await.unwrap();
        assert_eq!(listed, vec![live]);

        let all = repo.fetch_all(RecordKind::Medication, &owner()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(repo.count_dirty(RecordKind::Medication).await.unwrap(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_log_roundtrip() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::new(db.connection());

        let conflict = SyncConflict {
            id: 0,
            kind: RecordKind::Doctor,
            record_id: "11111111-1111-7111-8111-111111111111".to_string(),
            local_updated_at: 200,
            incoming_updated_at: 100,
            resolved_at: 300,
            winner: ConflictWinner::Local,
            strategy: "lww".to_string(),
        };
        repo.log_conflict(&conflict).await.unwrap();

        let conflicts = repo.list_conflicts(10).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, RecordKind::Doctor);
        assert_eq!(conflicts[0].winner, ConflictWinner::Local);
        assert!(conflicts[0].id > 0);
    }
}
