//! Data models for medsync

mod body;
mod record;
mod sync_conflict;

pub use body::{ConflictReport, DietEntry, Doctor, Medication, RecordBody, Severity, Supplement};
pub use record::{OwnerId, Record, RecordId, RecordKind};
pub use sync_conflict::{ConflictWinner, SyncConflict};
