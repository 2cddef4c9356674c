//! Sync error kinds.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::RemoteError;

/// Category of a sync failure, as exposed in [`super::SyncState::last_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Aborted before starting because the device is offline
    NoConnection,
    /// Another sync is running; not a failure
    SyncAlreadyInProgress,
    /// A single record could not be written remotely
    RemoteWriteFailed,
    /// Remote records could not be read during a download
    RemoteReadFailed,
    /// The local store failed; the pass was aborted
    LocalStoreFailed,
    /// The pass was stopped cooperatively
    Cancelled,
}

/// Outcome of a sync entry point that did not complete.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No network connection; sync not started")]
    NoConnection,
    #[error("Sync already in progress")]
    AlreadyInProgress,
    #[error("Remote write failed: {0}")]
    RemoteWrite(#[source] RemoteError),
    #[error("Remote read failed: {0}")]
    RemoteRead(#[source] RemoteError),
    #[error("Local store failed: {0}")]
    LocalStore(#[from] crate::Error),
    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoConnection => ErrorKind::NoConnection,
            Self::AlreadyInProgress => ErrorKind::SyncAlreadyInProgress,
            Self::RemoteWrite(_) => ErrorKind::RemoteWriteFailed,
            Self::RemoteRead(_) => ErrorKind::RemoteReadFailed,
            Self::LocalStore(_) => ErrorKind::LocalStoreFailed,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the next natural trigger may succeed without intervention.
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::LocalStore(_))
    }

    /// Pass-level failures are recorded in the sync state; rejections and
    /// cooperative stops are not.
    pub const fn is_recorded(&self) -> bool {
        matches!(self, Self::NoConnection | Self::LocalStore(_))
    }
}

/// Last recorded pass-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
    /// When the failure happened (Unix ms)
    pub at: i64,
}
