//! Offline-first synchronization engine.
//!
//! Triggers flow through the [`RequestQueue`], which debounces them into
//! calls on the [`SyncCoordinator`]. The coordinator admits one run at a time
//! and pushes dirty records kind by kind; [`SyncCoordinator::download_all`]
//! pulls remote records and merges them with a [`ConflictResolver`].

mod cancel;
mod conflict;
mod coordinator;
mod engine;
mod error;
mod network;
mod queue;
mod report;
mod request;
mod state;

pub use cancel::CancelToken;
pub use conflict::{ConflictResolver, LastWriteWins};
pub use coordinator::{SyncCoordinator, SyncExecutor, BATCH_SIZE};
pub use engine::SyncEngine;
pub use error::{ErrorKind, LastError, SyncError};
pub use network::{NetworkMonitor, ReachabilityProbe};
pub use queue::{
    forward_storage_changes, spawn_periodic, QueueHandle, RequestQueue, DEBOUNCE,
    PERIODIC_INTERVAL,
};
pub use report::{FullSyncReport, KindReport, RecordFailure, SyncReport};
pub use request::SyncRequest;
pub use state::{SyncState, SyncStatus};
