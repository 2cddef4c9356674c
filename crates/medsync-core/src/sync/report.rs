//! Summary of a completed sync run.

use std::collections::BTreeMap;

use serde::Serialize;

use super::error::ErrorKind;
use crate::models::{RecordId, RecordKind};

/// Per-kind counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    /// Records upserted remotely and marked clean
    pub uploaded: usize,
    /// Tombstones deleted remotely and marked clean
    pub deleted: usize,
    /// Records whose remote write or read failed
    pub failed: usize,
    /// Remote records written locally during a download
    pub downloaded: usize,
    /// Local copies kept over an older remote copy during a download
    pub kept_local: usize,
    /// Confirmed tombstones removed from the local store
    pub purged: u64,
}

/// A record-level failure that did not abort the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub kind: RecordKind,
    pub record_id: Option<RecordId>,
    pub error: ErrorKind,
    pub message: String,
}

/// Result of a completed upload or download run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Tag of the request that started the run
    pub request: String,
    pub kinds: BTreeMap<RecordKind, KindReport>,
    pub failures: Vec<RecordFailure>,
    /// Number of grouped remote commits issued
    pub commits: usize,
}

impl SyncReport {
    pub(crate) fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            ..Self::default()
        }
    }

    pub(crate) fn kind_mut(&mut self, kind: RecordKind) -> &mut KindReport {
        self.kinds.entry(kind).or_default()
    }

    /// Number of remote writes that succeeded
    pub fn remote_writes(&self) -> usize {
        self.kinds
            .values()
            .map(|report| report.uploaded + report.deleted)
            .sum()
    }

    pub fn downloaded(&self) -> usize {
        self.kinds.values().map(|report| report.downloaded).sum()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Upload and download halves of one full sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FullSyncReport {
    pub upload: SyncReport,
    pub download: SyncReport,
}
