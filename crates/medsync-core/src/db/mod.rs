//! Database layer for medsync

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::LibSqlRecordRepository;
