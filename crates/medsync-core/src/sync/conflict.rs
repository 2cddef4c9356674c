//! Conflict resolution between a local and a remote copy of a record.

use crate::models::{ConflictWinner, Record};

/// Chooses which of two versions of the same record survives a download merge.
pub trait ConflictResolver: Send + Sync {
    /// Pick the winner. Must be pure and deterministic.
    fn resolve(&self, local: &Record, remote: &Record) -> ConflictWinner;

    /// Name recorded in the conflict log.
    fn strategy(&self) -> &'static str;
}

/// Last-write-wins by `updated_at`.
///
/// The local copy wins only when its timestamp is strictly greater. Ties go to
/// the remote copy, which is treated as the durable source of truth.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWins;

impl ConflictResolver for LastWriteWins {
    fn resolve(&self, local: &Record, remote: &Record) -> ConflictWinner {
        if local.updated_at > remote.updated_at {
            ConflictWinner::Local
        } else {
            ConflictWinner::Remote
        }
    }

    fn strategy(&self) -> &'static str {
        "lww"
    }
}
