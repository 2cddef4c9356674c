//! In-process remote store.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::models::{OwnerId, Record, RecordId, RecordKind};
use crate::store::{collection_path, document_path, RemoteError, RemoteResult, RemoteStore};

/// Remote store holding documents in memory, laid out by document path.
///
/// Useful for tests and for running the engine without a server. Documents
/// go through the same JSON shape as the HTTP store.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    documents: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents across all collections.
    pub fn document_count(&self) -> usize {
        self.lock().len()
    }

    /// Raw document at `path`, if any.
    pub fn document(&self, path: &str) -> Option<serde_json::Value> {
        self.lock().get(path).cloned()
    }

    /// Place a raw document at `path`, bypassing validation.
    pub fn insert_document(&self, path: impl Into<String>, document: serde_json::Value) {
        self.lock().insert(path.into(), document);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, serde_json::Value>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn upsert(
        &self,
        kind: RecordKind,
        owner_id: &OwnerId,
        record: &Record,
    ) -> RemoteResult<()> {
        if record.owner_id != *owner_id {
            return Err(RemoteError::Rejected {
                status: 403,
                message: format!("record {} belongs to another owner", record.id),
            });
        }
        let document = record
            .to_document()
            .map_err(|error| RemoteError::Decode(error.to_string()))?;
        self.lock()
            .insert(document_path(kind, owner_id, &record.id), document);
        Ok(())
    }

    async fn delete(&self, kind: RecordKind, owner_id: &OwnerId, id: &RecordId) -> RemoteResult<()> {
        self.lock().remove(&document_path(kind, owner_id, id));
        Ok(())
    }

    async fn fetch_all(&self, kind: RecordKind, owner_id: &OwnerId) -> RemoteResult<Vec<Record>> {
        let prefix = format!("{}/", collection_path(kind, owner_id));
        let documents = self
            .lock()
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(path, document)| (path.clone(), document.clone()))
            .collect::<Vec<_>>();

        let mut records = Vec::with_capacity(documents.len());
        for (path, document) in documents {
            match Record::from_document(kind, document) {
                Ok(record) => records.push(record),
                Err(error) => tracing::warn!(path = %path, "Skipping undecodable document: {error}"),
            }
        }
        Ok(records)
    }
}
