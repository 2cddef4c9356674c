//! Connectivity tracking.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::coordinator::SyncCoordinator;
use super::queue::QueueHandle;
use super::request::SyncRequest;

/// Answers whether the remote store can currently be reached.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Feeds reachability changes into the coordinator and asks for a catch-up
/// sync when the connection comes back.
pub struct NetworkMonitor {
    coordinator: Arc<SyncCoordinator>,
    queue: QueueHandle,
}

impl NetworkMonitor {
    pub fn new(coordinator: Arc<SyncCoordinator>, queue: QueueHandle) -> Self {
        Self { coordinator, queue }
    }

    /// Record the latest reachability observation. Returns whether it was a
    /// transition.
    ///
    /// An offline to online transition submits
    /// [`SyncRequest::NetworkReconnected`], but only once a sync has
    /// succeeded before; the first sync is left to explicit triggers.
    pub fn update(&self, reachable: bool) -> bool {
        if !self.coordinator.set_online(reachable) {
            return false;
        }

        if !reachable {
            tracing::info!("Network unreachable; syncing paused");
            return true;
        }

        tracing::info!("Network reachable");
        if self.coordinator.state().last_success_at.is_some() {
            self.queue.submit(SyncRequest::NetworkReconnected);
        }
        true
    }

    /// Poll `probe` every `interval` and feed the results into [`Self::update`].
    pub fn spawn_polling(
        self: Arc<Self>,
        probe: Arc<dyn ReachabilityProbe>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reachable = probe.is_reachable().await;
                self.update(reachable);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::remote::MemoryRemoteStore;
    use crate::services::RecordService;
    use crate::sync::LastWriteWins;

    async fn monitor() -> (
        Arc<NetworkMonitor>,
        Arc<SyncCoordinator>,
        tokio::sync::mpsc::UnboundedReceiver<SyncRequest>,
    ) {
        let local = RecordService::open_in_memory().await.unwrap();
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::new(local),
            Arc::new(MemoryRemoteStore::new()),
            Arc::new(LastWriteWins),
        ));
        let (handle, requests) = QueueHandle::detached();
        let monitor = Arc::new(NetworkMonitor::new(Arc::clone(&coordinator), handle));
        (monitor, coordinator, requests)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_connection_does_not_trigger_sync() {
        let (monitor, coordinator, mut requests) = monitor().await;

        assert!(monitor.update(true));
        assert!(coordinator.state().is_online);
        assert!(requests.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconnect_after_success_requests_sync() {
        let (monitor, coordinator, mut requests) = monitor().await;
        monitor.update(true);
        coordinator
            .execute(SyncRequest::ForcedFullSync)
            .await
            .unwrap();

        assert!(monitor.update(false));
        assert!(!coordinator.state().is_online);
        assert!(requests.try_recv().is_err());

        assert!(monitor.update(true));
        assert_eq!(requests.try_recv().ok(), Some(SyncRequest::NetworkReconnected));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_observations_are_not_transitions() {
        let (monitor, coordinator, mut requests) = monitor().await;
        monitor.update(true);
        coordinator
            .execute(SyncRequest::ForcedFullSync)
            .await
            .unwrap();

        assert!(!monitor.update(true));
        assert!(requests.try_recv().is_err());
    }

    struct Toggle(AtomicBool);

    #[async_trait]
    impl ReachabilityProbe for Toggle {
        async fn is_reachable(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polling_tracks_reachability() {
        let (monitor, coordinator, _requests) = monitor().await;
        let probe = Arc::new(Toggle(AtomicBool::new(true)));
        let task = Arc::clone(&monitor).spawn_polling(probe.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(coordinator.state().is_online);

        probe.0.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!coordinator.state().is_online);
        task.abort();
    }
}
