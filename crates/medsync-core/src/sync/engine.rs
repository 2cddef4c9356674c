//! Engine wiring: coordinator, request queue, network monitor and the
//! periodic and storage-change trigger sources.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::conflict::LastWriteWins;
use super::coordinator::SyncCoordinator;
use super::error::SyncError;
use super::network::{NetworkMonitor, ReachabilityProbe};
use super::queue::{forward_storage_changes, spawn_periodic, RequestQueue};
use super::report::FullSyncReport;
use super::request::SyncRequest;
use super::state::SyncState;
use crate::config::SyncSettings;
use crate::models::OwnerId;
use crate::services::RecordService;
use crate::store::RemoteStore;

/// A running sync engine.
pub struct SyncEngine {
    coordinator: Arc<SyncCoordinator>,
    monitor: Arc<NetworkMonitor>,
    queue: RequestQueue,
    owner_id: OwnerId,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncEngine {
    /// Wire every trigger source and start the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        records: &RecordService,
        remote: Arc<dyn RemoteStore>,
        probe: Arc<dyn ReachabilityProbe>,
        settings: &SyncSettings,
    ) -> Self {
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::new(records.clone()),
            remote,
            Arc::new(LastWriteWins),
        ));
        let queue = RequestQueue::spawn(coordinator.clone());
        let monitor = Arc::new(NetworkMonitor::new(
            Arc::clone(&coordinator),
            queue.handle(),
        ));

        let tasks = vec![
            spawn_periodic(queue.handle(), settings.periodic_interval()),
            forward_storage_changes(queue.handle(), records.subscribe()),
            Arc::clone(&monitor).spawn_polling(probe, settings.poll_interval()),
        ];

        tracing::info!(
            owner = %settings.owner_id,
            periodic_secs = settings.periodic_interval_secs,
            poll_secs = settings.poll_interval_secs,
            "Sync engine started"
        );

        Self {
            coordinator,
            monitor,
            queue,
            owner_id: settings.owner_id.clone(),
            tasks,
        }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn state(&self) -> SyncState {
        self.coordinator.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.coordinator.subscribe()
    }

    /// Feed a reachability observation from outside the poller.
    pub fn set_online(&self, online: bool) -> bool {
        self.monitor.update(online)
    }

    /// Ask for a debounced push of pending changes.
    pub fn sync_now(&self) -> bool {
        self.queue.submit(SyncRequest::PendingChanges)
    }

    /// Push pending changes, then pull everything for the configured owner.
    pub async fn force_full_sync(&self) -> Result<FullSyncReport, SyncError> {
        self.coordinator.full_sync(&self.owner_id).await
    }

    /// Cancel the running sync, if any.
    pub fn cancel(&self) -> bool {
        self.coordinator.cancel()
    }

    /// Stop every trigger source and cancel the running sync.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        self.coordinator.cancel();
        self.queue.shutdown().await;
        tracing::info!("Sync engine stopped");
    }
}
