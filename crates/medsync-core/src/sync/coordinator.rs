//! The sync state machine.
//!
//! [`SyncCoordinator`] owns the [`SyncState`], admits one run at a time, and
//! drives the per-kind upload and download passes.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, MutexGuard};

use super::cancel::CancelToken;
use super::conflict::ConflictResolver;
use super::error::{ErrorKind, LastError, SyncError};
use super::report::{FullSyncReport, RecordFailure, SyncReport};
use super::request::SyncRequest;
use super::state::SyncState;
use crate::models::{ConflictWinner, OwnerId, Record, RecordId, RecordKind, SyncConflict};
use crate::store::{LocalStore, RemoteError, RemoteResult, RemoteStore, RemoteWrite};
use crate::util::unix_millis_now;

/// Maximum number of writes grouped into one remote commit.
pub const BATCH_SIZE: usize = 10;

/// Something that can run a sync for a request. Implemented by
/// [`SyncCoordinator`]; the request queue only depends on this seam.
#[async_trait]
pub trait SyncExecutor: Send + Sync {
    async fn execute(&self, request: SyncRequest) -> Result<SyncReport, SyncError>;
}

/// Single-flight sync coordinator.
pub struct SyncCoordinator {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    resolver: Arc<dyn ConflictResolver>,
    state: watch::Sender<SyncState>,
    flight: Mutex<()>,
    current: std::sync::Mutex<Option<CancelToken>>,
}

impl SyncCoordinator {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        resolver: Arc<dyn ConflictResolver>,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            local,
            remote,
            resolver,
            state,
            flight: Mutex::new(()),
            current: std::sync::Mutex::new(None),
        }
    }

    /// Current state snapshot. Never blocks on a running sync.
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Record a reachability change. Returns whether the value changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_online == online {
                false
            } else {
                state.is_online = online;
                true
            }
        })
    }

    /// Cancel the running sync, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        current.as_ref().map_or(false, |token| {
            token.cancel();
            true
        })
    }

    /// Push local changes for every kind.
    pub async fn execute(&self, request: SyncRequest) -> Result<SyncReport, SyncError> {
        self.execute_with(request, CancelToken::new()).await
    }

    /// Push local changes for every kind, stopping when `token` is cancelled.
    pub async fn execute_with(
        &self,
        request: SyncRequest,
        token: CancelToken,
    ) -> Result<SyncReport, SyncError> {
        let run = self.begin(request.tag(), &token)?;
        tracing::info!(request = %request, "Sync started");

        let result = self.upload_pass(&request, &token).await;
        self.finish(&result);
        drop(run);
        result
    }

    /// Pull every remote record for `owner_id` and merge it locally.
    pub async fn download_all(&self, owner_id: &OwnerId) -> Result<SyncReport, SyncError> {
        self.download_all_with(owner_id, CancelToken::new()).await
    }

    /// Pull every remote record for `owner_id`, stopping when `token` is cancelled.
    ///
    /// Local records missing remotely are left alone.
    pub async fn download_all_with(
        &self,
        owner_id: &OwnerId,
        token: CancelToken,
    ) -> Result<SyncReport, SyncError> {
        let run = self.begin("download-all", &token)?;
        tracing::info!(owner = %owner_id, "Download started");

        let result = self.download_pass(owner_id, &token).await;
        self.finish(&result);
        drop(run);
        result
    }

    /// Push local changes, then pull everything for `owner_id`, as one run.
    pub async fn full_sync(&self, owner_id: &OwnerId) -> Result<FullSyncReport, SyncError> {
        self.full_sync_with(owner_id, CancelToken::new()).await
    }

    /// Upload then download under a single admission, so no other run can
    /// slip in between the two passes.
    pub async fn full_sync_with(
        &self,
        owner_id: &OwnerId,
        token: CancelToken,
    ) -> Result<FullSyncReport, SyncError> {
        let request = SyncRequest::ForcedFullSync;
        let run = self.begin(request.tag(), &token)?;
        tracing::info!(request = %request, owner = %owner_id, "Full sync started");

        let result = async {
            let upload = self.upload_pass(&request, &token).await?;
            let download = self.download_pass(owner_id, &token).await?;
            Ok::<_, SyncError>(FullSyncReport { upload, download })
        }
        .await;
        match &result {
            Ok(full) => self.succeed(&[&full.upload, &full.download]),
            Err(error) => self.fail(error),
        }
        drop(run);
        result
    }

    /// Admit a run: single-flight check, connectivity check, then mark syncing.
    fn begin(&self, label: &str, token: &CancelToken) -> Result<RunGuard<'_>, SyncError> {
        let Ok(flight) = self.flight.try_lock() else {
            tracing::debug!(request = label, "Sync already in progress; request dropped");
            return Err(SyncError::AlreadyInProgress);
        };

        if !self.state.borrow().is_online {
            drop(flight);
            tracing::info!(request = label, "Offline; sync not started");
            let error = SyncError::NoConnection;
            self.record_error(&error);
            return Err(error);
        }

        *self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        self.state.send_modify(|state| state.is_syncing = true);

        Ok(RunGuard {
            _flight: flight,
            coordinator: self,
        })
    }

    fn finish(&self, result: &Result<SyncReport, SyncError>) {
        match result {
            Ok(report) => self.succeed(&[report]),
            Err(error) => self.fail(error),
        }
    }

    fn succeed(&self, reports: &[&SyncReport]) {
        let now = unix_millis_now();
        self.state.send_modify(|state| {
            state.last_success_at = Some(now);
            state.last_error = None;
        });
        for report in reports {
            tracing::info!(
                request = %report.request,
                remote_writes = report.remote_writes(),
                downloaded = report.downloaded(),
                failed = report.failed(),
                commits = report.commits,
                "Sync finished"
            );
        }
    }

    fn fail(&self, error: &SyncError) {
        if matches!(error, SyncError::Cancelled) {
            tracing::info!("Sync cancelled");
        } else {
            tracing::error!(error = %error, "Sync aborted");
            self.record_error(error);
        }
    }

    fn record_error(&self, error: &SyncError) {
        if !error.is_recorded() {
            return;
        }
        let last_error = LastError {
            kind: error.kind(),
            message: error.to_string(),
            at: unix_millis_now(),
        };
        self.state
            .send_modify(|state| state.last_error = Some(last_error));
    }

    async fn upload_pass(
        &self,
        request: &SyncRequest,
        token: &CancelToken,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::new(request.tag());
        for kind in RecordKind::ALL {
            check_cancelled(token)?;
            self.upload_kind(kind, token, &mut report).await?;
        }
        Ok(report)
    }

    async fn upload_kind(
        &self,
        kind: RecordKind,
        token: &CancelToken,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let records = self.local.fetch_dirty(kind).await?;
        if !records.is_empty() {
            tracing::debug!(kind = %kind, dirty = records.len(), "Uploading dirty records");
        }

        let mut staged = Vec::with_capacity(BATCH_SIZE);
        for record in records {
            check_cancelled(token)?;
            staged.push(record);
            if staged.len() == BATCH_SIZE {
                self.commit_staged(kind, &mut staged, report).await?;
            }
        }
        if !staged.is_empty() {
            self.commit_staged(kind, &mut staged, report).await?;
        }

        let purged = self.local.purge_tombstones(kind).await?;
        if purged > 0 {
            tracing::debug!(kind = %kind, purged, "Purged confirmed tombstones");
            report.kind_mut(kind).purged += purged;
        }
        Ok(())
    }

    async fn commit_staged(
        &self,
        kind: RecordKind,
        staged: &mut Vec<Record>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let batch = std::mem::take(staged);
        let writes = batch.iter().map(RemoteWrite::for_record).collect::<Vec<_>>();
        let outcomes = self.remote.commit(kind, &writes).await;
        report.commits += 1;

        if outcomes.len() != batch.len() {
            tracing::warn!(
                kind = %kind,
                expected = batch.len(),
                received = outcomes.len(),
                "Remote commit returned a mismatched number of outcomes"
            );
        }
        let outcomes = outcomes
            .into_iter()
            .map(Some)
            .chain(std::iter::repeat_with(|| None));

        for (record, outcome) in batch.iter().zip(outcomes) {
            let outcome: RemoteResult<()> = outcome.unwrap_or_else(|| {
                Err(RemoteError::Decode("missing outcome for write".to_string()))
            });
            match outcome {
                Ok(()) => {
                    let cleaned = self
                        .local
                        .mark_clean(kind, &record.id, record.updated_at)
                        .await?;
                    if !cleaned {
                        tracing::debug!(
                            kind = %kind,
                            id = %record.id,
                            "Record changed during upload; it stays dirty"
                        );
                    }
                    let counts = report.kind_mut(kind);
                    if record.tombstoned {
                        counts.deleted += 1;
                    } else {
                        counts.uploaded += 1;
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        kind = %kind,
                        id = %record.id,
                        error = %error,
                        "Remote write failed; record stays dirty"
                    );
                    report.kind_mut(kind).failed += 1;
                    report.failures.push(RecordFailure {
                        kind,
                        record_id: Some(record.id),
                        error: ErrorKind::RemoteWriteFailed,
                        message: SyncError::RemoteWrite(error).to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn download_pass(
        &self,
        owner_id: &OwnerId,
        token: &CancelToken,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::new("download-all");
        for kind in RecordKind::ALL {
            check_cancelled(token)?;
            self.download_kind(kind, owner_id, token, &mut report)
                .await?;
        }
        Ok(report)
    }

    async fn download_kind(
        &self,
        kind: RecordKind,
        owner_id: &OwnerId,
        token: &CancelToken,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let remote_records = match self.remote.fetch_all(kind, owner_id).await {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(kind = %kind, error = %error, "Remote read failed; kind skipped");
                report.kind_mut(kind).failed += 1;
                report.failures.push(RecordFailure {
                    kind,
                    record_id: None,
                    error: ErrorKind::RemoteReadFailed,
                    message: SyncError::RemoteRead(error).to_string(),
                });
                return Ok(());
            }
        };

        let mut local_by_id: HashMap<RecordId, Record> = self
            .local
            .fetch_all(kind, owner_id)
            .await?
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        for remote in remote_records {
            check_cancelled(token)?;

            if remote.kind() != kind || remote.owner_id != *owner_id {
                tracing::warn!(kind = %kind, id = %remote.id, "Skipping remote record outside the requested collection");
                report.kind_mut(kind).failed += 1;
                report.failures.push(RecordFailure {
                    kind,
                    record_id: Some(remote.id),
                    error: ErrorKind::RemoteReadFailed,
                    message: "record does not belong to this collection".to_string(),
                });
                continue;
            }

            let Some(local) = local_by_id.remove(&remote.id) else {
                self.apply_remote(kind, remote, None, report).await?;
                continue;
            };

            if is_in_sync(&local, &remote) {
                continue;
            }

            let winner = self.resolver.resolve(&local, &remote);
            if local.dirty {
                self.log_conflict(kind, &local, &remote, winner).await?;
            }
            match winner {
                ConflictWinner::Remote => {
                    self.apply_remote(kind, remote, Some(local.updated_at), report)
                        .await?;
                }
                ConflictWinner::Local => {
                    // Left untouched so pending local changes still upload
                    report.kind_mut(kind).kept_local += 1;
                }
            }
        }
        Ok(())
    }

    /// Store a remote winner as clean, unless the local copy moved on since
    /// the snapshot was taken; a newer local edit is kept for upload.
    async fn apply_remote(
        &self,
        kind: RecordKind,
        remote: Record,
        expected_updated_at: Option<i64>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let id = remote.id;
        let written = self
            .local
            .upsert_if_unchanged(kind, &remote.into_clean(), expected_updated_at)
            .await?;
        if written {
            report.kind_mut(kind).downloaded += 1;
        } else {
            tracing::debug!(kind = %kind, id = %id, "Local copy changed during download; kept");
            report.kind_mut(kind).kept_local += 1;
        }
        Ok(())
    }

    async fn log_conflict(
        &self,
        kind: RecordKind,
        local: &Record,
        remote: &Record,
        winner: ConflictWinner,
    ) -> Result<(), SyncError> {
        tracing::info!(
            kind = %kind,
            id = %local.id,
            local_updated_at = local.updated_at,
            remote_updated_at = remote.updated_at,
            winner = winner.as_str(),
            "Resolved download conflict"
        );
        let conflict = SyncConflict {
            id: 0,
            kind,
            record_id: local.id.to_string(),
            local_updated_at: local.updated_at,
            incoming_updated_at: remote.updated_at,
            resolved_at: unix_millis_now(),
            winner,
            strategy: self.resolver.strategy().to_string(),
        };
        self.local.log_conflict(&conflict).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncExecutor for SyncCoordinator {
    async fn execute(&self, request: SyncRequest) -> Result<SyncReport, SyncError> {
        Self::execute(self, request).await
    }
}

/// Held for the duration of a run; resets `is_syncing` however the run ends,
/// including when the run's future is dropped.
struct RunGuard<'a> {
    _flight: MutexGuard<'a, ()>,
    coordinator: &'a SyncCoordinator,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self
            .coordinator
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.coordinator
            .state
            .send_modify(|state| state.is_syncing = false);
    }
}

fn check_cancelled(token: &CancelToken) -> Result<(), SyncError> {
    if token.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

/// A clean local copy identical to the remote one needs no write.
fn is_in_sync(local: &Record, remote: &Record) -> bool {
    !local.dirty
        && !local.tombstoned
        && local.updated_at == remote.updated_at
        && local.body == remote.body
}
