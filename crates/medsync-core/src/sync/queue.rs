//! Debounced sync request queue.
//!
//! Requests arriving in a burst are collapsed: each new request replaces the
//! pending one and restarts the debounce timer. When the timer fires, the
//! surviving request is handed to the executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::cancel::CancelToken;
use super::coordinator::SyncExecutor;
use super::error::SyncError;
use super::request::SyncRequest;
use crate::services::StorageChange;

/// Quiet period before a pending request is executed.
pub const DEBOUNCE: Duration = Duration::from_secs(1);

/// Interval of the periodic safety-net sync.
pub const PERIODIC_INTERVAL: Duration = Duration::from_secs(300);

/// Cloneable submit side of a [`RequestQueue`].
#[derive(Debug, Clone)]
pub struct QueueHandle {
    sender: mpsc::UnboundedSender<SyncRequest>,
}

impl QueueHandle {
    /// Enqueue a request. Returns `false` once the queue has shut down.
    pub fn submit(&self, request: SyncRequest) -> bool {
        tracing::debug!(request = %request, "Sync requested");
        self.sender.send(request).is_ok()
    }

    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<SyncRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

/// Background task that debounces requests into executor calls.
pub struct RequestQueue {
    handle: QueueHandle,
    shutdown: CancelToken,
    task: JoinHandle<()>,
}

impl RequestQueue {
    /// Start a queue with the default debounce window.
    pub fn spawn(executor: Arc<dyn SyncExecutor>) -> Self {
        Self::with_debounce(executor, DEBOUNCE)
    }

    pub fn with_debounce(executor: Arc<dyn SyncExecutor>, debounce: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shutdown = CancelToken::new();
        let task = tokio::spawn(run_queue(receiver, executor, debounce, shutdown.clone()));
        Self {
            handle: QueueHandle { sender },
            shutdown,
            task,
        }
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub fn submit(&self, request: SyncRequest) -> bool {
        self.handle.submit(request)
    }

    /// Stop the queue, dropping any request still waiting for its timer.
    ///
    /// A sync already handed to the executor keeps running.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(error) = self.task.await {
            tracing::warn!("Sync queue task ended abnormally: {error}");
        }
    }
}

async fn run_queue(
    mut receiver: mpsc::UnboundedReceiver<SyncRequest>,
    executor: Arc<dyn SyncExecutor>,
    debounce: Duration,
    shutdown: CancelToken,
) {
    loop {
        let mut pending = tokio::select! {
            () = shutdown.cancelled() => return,
            request = receiver.recv() => match request {
                Some(request) => request,
                None => return,
            },
        };

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::debug!(request = %pending, "Queue shut down; pending request dropped");
                    return;
                }
                () = tokio::time::sleep(debounce) => break,
                request = receiver.recv() => match request {
                    Some(next) => {
                        tracing::debug!(replaced = %pending, by = %next, "Debounced sync request");
                        pending = next;
                    }
                    None => break,
                },
            }
        }

        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            match executor.execute(pending).await {
                Ok(_) | Err(SyncError::Cancelled) => {}
                Err(SyncError::AlreadyInProgress) => {
                    tracing::debug!("Debounced request dropped; a sync is already running");
                }
                Err(error) => tracing::warn!("Queued sync failed: {error}"),
            }
        });
    }
}

/// Submit a [`SyncRequest::PeriodicTick`] every `period`, starting one period
/// from now. Ends when the queue shuts down.
pub fn spawn_periodic(handle: QueueHandle, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !handle.submit(SyncRequest::PeriodicTick) {
                break;
            }
        }
    })
}

/// Turn local storage change events into sync requests.
pub fn forward_storage_changes(
    handle: QueueHandle,
    mut changes: broadcast::Receiver<StorageChange>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let request = match changes.recv().await {
                Ok(change) => SyncRequest::StorageChanged {
                    reason: change.reason,
                    owner_id: change.owner_id,
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Storage change listener lagged");
                    SyncRequest::PendingChanges
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if !handle.submit(request) {
                break;
            }
        }
    })
}
