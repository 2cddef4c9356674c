//! Versioned schema for the local record store

use libsql::Connection;

use crate::error::Result;

/// One schema step; `statements` run in a single transaction together with
/// the `schema_version` bump.
struct Migration {
    version: i32,
    label: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        label: "records",
        statements: &[
            "CREATE TABLE IF NOT EXISTS records (
                kind TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                dirty INTEGER NOT NULL DEFAULT 1,
                tombstoned INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (kind, id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_records_dirty ON records(kind, dirty, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_records_owner ON records(kind, owner_id, updated_at DESC)",
        ],
    },
    Migration {
        version: 2,
        label: "sync conflict log",
        statements: &[
            "CREATE TABLE IF NOT EXISTS sync_conflicts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                record_id TEXT NOT NULL,
                local_updated_at INTEGER NOT NULL,
                incoming_updated_at INTEGER NOT NULL,
                resolved_at INTEGER NOT NULL,
                winner TEXT NOT NULL,
                strategy TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_record_id ON sync_conflicts(record_id)",
            "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolved_at DESC)",
        ],
    },
];

/// Bring the schema up to the latest version.
pub async fn run(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        (),
    )
    .await?;

    let applied = applied_version(conn).await?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        apply(conn, migration).await?;
        tracing::info!(
            version = migration.version,
            "Applied schema migration: {}",
            migration.label
        );
    }
    Ok(())
}

async fn applied_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<i32>(0)?),
        None => Ok(0),
    }
}

async fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    let tx = conn.transaction().await?;
    for statement in migration.statements {
        tx.execute(statement, ()).await?;
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [migration.version],
    )
    .await?;
    tx.commit().await?;
    Ok(())
}
