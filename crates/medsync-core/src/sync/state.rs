//! Process-wide sync state.

use serde::{Deserialize, Serialize};

use super::error::LastError;

/// Snapshot of the engine's state, written only by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub is_syncing: bool,
    /// Completion time of the last successful pass (Unix ms)
    pub last_success_at: Option<i64>,
    pub last_error: Option<LastError>,
    pub is_online: bool,
}

impl SyncState {
    /// Presentation status derived from the snapshot
    #[must_use]
    pub const fn status(&self) -> SyncStatus {
        if self.is_syncing {
            SyncStatus::Syncing
        } else if !self.is_online {
            SyncStatus::Offline
        } else if self.last_error.is_some() {
            SyncStatus::Error
        } else if self.last_success_at.is_some() {
            SyncStatus::Synced
        } else {
            SyncStatus::Idle
        }
    }
}

/// Unified sync status for clients to render.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Offline,
    Syncing,
    Synced,
    Error,
    /// Online but never synced
    Idle,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ErrorKind;

    #[test]
    fn initial_state_is_offline() {
        let state = SyncState::default();
        assert!(!state.is_syncing);
        assert!(state.last_success_at.is_none());
        assert_eq!(state.status(), SyncStatus::Offline);
    }

    #[test]
    fn status_prefers_syncing_then_offline_then_error() {
        let mut state = SyncState {
            is_syncing: true,
            last_success_at: Some(1),
            last_error: Some(LastError {
                kind: ErrorKind::LocalStoreFailed,
                message: "disk".to_string(),
                at: 2,
            }),
            is_online: false,
        };
        assert_eq!(state.status(), SyncStatus::Syncing);

        state.is_syncing = false;
        assert_eq!(state.status(), SyncStatus::Offline);

        state.is_online = true;
        assert_eq!(state.status(), SyncStatus::Error);

        state.last_error = None;
        assert_eq!(state.status(), SyncStatus::Synced);
    }
}
