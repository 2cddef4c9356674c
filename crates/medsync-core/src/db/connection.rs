//! libSQL handle for the local record store

use std::path::Path;

use libsql::{Builder, Connection, Database as LibSqlDatabase};

use super::migrations;
use crate::error::Result;

/// An open, migrated local database.
///
/// The libSQL database object must outlive its connection, so both are kept.
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let location = path.as_ref().to_string_lossy().into_owned();
        Self::build(&location).await
    }

    /// Private in-memory database; every call gets an empty store.
    pub async fn open_in_memory() -> Result<Self> {
        Self::build(":memory:").await
    }

    async fn build(location: &str) -> Result<Self> {
        let db = Builder::new_local(location).build().await?;
        let conn = db.connect()?;

        // WAL is refused for :memory:, which is fine.
        if conn.execute("PRAGMA journal_mode = WAL;", ()).await.is_err() {
            tracing::debug!(location, "WAL journal mode unavailable");
        }
        conn.execute("PRAGMA synchronous = NORMAL;", ()).await?;
        migrations::run(&conn).await?;

        Ok(Self { _db: db, conn })
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
