//! Sync conflict model

use serde::{Deserialize, Serialize};

use super::record::RecordKind;

/// Which side of a download merge was kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictWinner {
    Local,
    Remote,
}

impl ConflictWinner {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// Recorded sync conflict resolved by strategy (e.g., LWW)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier (0 until stored)
    pub id: i64,
    /// Kind of the record involved
    pub kind: RecordKind,
    /// Record involved in the conflict
    pub record_id: String,
    /// Local copy's timestamp when the conflict occurred
    pub local_updated_at: i64,
    /// Incoming copy's timestamp
    pub incoming_updated_at: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Side that was kept
    pub winner: ConflictWinner,
    /// Resolution strategy name
    pub strategy: String,
}
