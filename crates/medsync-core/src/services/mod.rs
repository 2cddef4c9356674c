//! Services shared by medsync clients

mod records;

pub use records::{RecordService, StorageChange};
