//! Store interfaces consumed by the sync engine.
//!
//! `LocalStore` is the on-device database, `RemoteStore` the cloud document
//! store. Both are object-safe so the coordinator can take them as
//! `Arc<dyn ...>` and tests can substitute doubles.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::Result;
use crate::models::{OwnerId, Record, RecordId, RecordKind, SyncConflict};

/// On-device record storage.
///
/// Writes must be visible to subsequent reads immediately.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Dirty records of one kind, across owners, oldest first.
    async fn fetch_dirty(&self, kind: RecordKind) -> Result<Vec<Record>>;

    /// Clear the dirty flag for `id`, but only if the stored copy is still at
    /// `version`. Returns whether the record was marked clean.
    async fn mark_clean(&self, kind: RecordKind, id: &RecordId, version: i64) -> Result<bool>;

    /// Insert or replace a record as given, flags included.
    async fn upsert(&self, kind: RecordKind, record: &Record) -> Result<()>;

    /// Write `record` only if the stored copy is unchanged since it was read.
    ///
    /// `expected_updated_at` is the `updated_at` the caller saw, or `None` when
    /// the record was absent. Returns whether the write happened.
    async fn upsert_if_unchanged(
        &self,
        kind: RecordKind,
        record: &Record,
        expected_updated_at: Option<i64>,
    ) -> Result<bool>;

    /// Every record of one kind for one owner, tombstones included.
    async fn fetch_all(&self, kind: RecordKind, owner_id: &OwnerId) -> Result<Vec<Record>>;

    /// Physically remove tombstones whose remote delete has been confirmed.
    async fn purge_tombstones(&self, kind: RecordKind) -> Result<u64>;

    /// Keep a log entry for a resolved download conflict.
    async fn log_conflict(&self, _conflict: &SyncConflict) -> Result<()> {
        Ok(())
    }
}

/// Errors surfaced by a remote store call
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP transport failure
    #[error("Remote request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The request did not complete in time
    #[error("Remote request timed out")]
    Timeout,
    /// The remote store is not reachable
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
    /// The remote store answered with an error status
    #[error("Remote store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The response could not be understood
    #[error("Invalid remote payload: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether the failure points at connectivity rather than the request.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Http(error) => error.is_connect() || error.is_timeout(),
            Self::Timeout | Self::Unavailable(_) => true,
            Self::Rejected { .. } | Self::Decode(_) => false,
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// One write in a grouped remote commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteWrite {
    /// Create or replace the record's document
    Upsert(Record),
    /// Delete the document at `owners/{owner_id}/{collection}/{id}`
    Delete { owner_id: OwnerId, id: RecordId },
}

impl RemoteWrite {
    /// Stage the remote write a local record needs.
    #[must_use]
    pub fn for_record(record: &Record) -> Self {
        if record.tombstoned {
            Self::Delete {
                owner_id: record.owner_id.clone(),
                id: record.id,
            }
        } else {
            Self::Upsert(record.clone())
        }
    }

    pub const fn owner_id(&self) -> &OwnerId {
        match self {
            Self::Upsert(record) => &record.owner_id,
            Self::Delete { owner_id, .. } => owner_id,
        }
    }

    pub const fn record_id(&self) -> RecordId {
        match self {
            Self::Upsert(record) => record.id,
            Self::Delete { id, .. } => *id,
        }
    }

    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Remote document path for a record.
pub fn document_path(kind: RecordKind, owner_id: &OwnerId, id: &RecordId) -> String {
    format!("{}/{id}", collection_path(kind, owner_id))
}

/// Remote collection path for an owner's records of one kind.
pub fn collection_path(kind: RecordKind, owner_id: &OwnerId) -> String {
    format!("owners/{owner_id}/{}", kind.collection_name())
}

/// Cloud document storage, one collection per kind scoped by owner.
///
/// Implementations bound each network call themselves and report timeouts as
/// errors; the engine never wraps calls in its own timeout.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upsert(&self, kind: RecordKind, owner_id: &OwnerId, record: &Record)
        -> RemoteResult<()>;

    async fn delete(&self, kind: RecordKind, owner_id: &OwnerId, id: &RecordId)
        -> RemoteResult<()>;

    async fn fetch_all(&self, kind: RecordKind, owner_id: &OwnerId) -> RemoteResult<Vec<Record>>;

    /// Apply a group of writes, returning one outcome per write in order.
    ///
    /// Writes are independent: a failed write does not roll back the others.
    async fn commit(&self, kind: RecordKind, writes: &[RemoteWrite]) -> Vec<RemoteResult<()>> {
        let mut outcomes = Vec::with_capacity(writes.len());
        for write in writes {
            let outcome = match write {
                RemoteWrite::Upsert(record) => self.upsert(kind, &record.owner_id, record).await,
                RemoteWrite::Delete { owner_id, id } => self.delete(kind, owner_id, id).await,
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}
