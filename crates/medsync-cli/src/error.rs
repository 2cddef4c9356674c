use std::io;

use medsync_core::sync::SyncError;
use medsync_core::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] medsync_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No record fields provided")]
    EmptyFields,
    #[error("Invalid field '{0}'; expected name=value")]
    InvalidField(String),
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("Record not found for id/prefix: {0}")]
    RecordNotFound(String),
    #[error("{0}")]
    AmbiguousRecordId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "No owner configured. Pass --owner, set MEDSYNC_OWNER_ID, or run `medsync config init --owner-id <OWNER>`."
    )]
    OwnerNotConfigured,
    #[error(
        "Sync is not configured. Run `medsync config init --remote-url <URL> --owner-id <OWNER>`, or set MEDSYNC_REMOTE_URL and MEDSYNC_OWNER_ID."
    )]
    SyncNotConfigured,
}
