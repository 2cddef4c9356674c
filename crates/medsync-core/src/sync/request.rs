//! Reasons a sync was requested.

use std::fmt;

use crate::models::OwnerId;

/// Why a sync should run.
///
/// The tag is informational only: the coordinator always derives the actual
/// work from the local store's dirty records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    /// Explicit user request to sync everything now
    ForcedFullSync,
    /// Explicit request to push pending local changes
    PendingChanges,
    /// Connectivity came back after being lost
    NetworkReconnected,
    /// A local record was mutated
    StorageChanged { reason: String, owner_id: OwnerId },
    /// The periodic timer fired
    PeriodicTick,
    /// A background scheduler asked for a batch run
    ScheduledBatch,
}

impl SyncRequest {
    /// Short tag used in logs
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::ForcedFullSync => "forced-full-sync",
            Self::PendingChanges => "pending-changes-sync",
            Self::NetworkReconnected => "network-reconnected",
            Self::StorageChanged { .. } => "storage-changed",
            Self::PeriodicTick => "periodic-tick",
            Self::ScheduledBatch => "scheduled-batch",
        }
    }
}

impl fmt::Display for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageChanged { reason, owner_id } => {
                write!(f, "{} ({reason}, owner {owner_id})", self.tag())
            }
            other => f.write_str(other.tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_storage_change_details() {
        let request = SyncRequest::StorageChanged {
            reason: "created medication".to_string(),
            owner_id: OwnerId::new("u1").unwrap(),
        };
        assert_eq!(
            request.to_string(),
            "storage-changed (created medication, owner u1)"
        );
        assert_eq!(SyncRequest::PeriodicTick.to_string(), "periodic-tick");
    }
}
