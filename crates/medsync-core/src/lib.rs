//! medsync-core - Core library for medsync
//!
//! This crate contains the record models, the libSQL local store, the remote
//! store clients and the offline-first sync engine used by medsync clients.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod store;
pub mod sync;
pub mod util;

pub use config::SyncSettings;
pub use error::{Error, Result};
pub use models::{OwnerId, Record, RecordBody, RecordId, RecordKind};
pub use services::{RecordService, StorageChange};
pub use store::{LocalStore, RemoteError, RemoteStore};
