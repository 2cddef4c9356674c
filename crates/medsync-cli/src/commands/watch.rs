use std::path::Path;
use std::sync::Arc;

use medsync_core::remote::HttpRemoteStore;
use medsync_core::sync::{SyncEngine, SyncState, SyncStatus};
use medsync_core::SyncSettings;

use crate::commands::common::{format_sync_timestamp, open_records};
use crate::error::CliError;

/// Run every trigger source until Ctrl-C.
pub async fn run_watch(settings: &SyncSettings, db_path: &Path) -> Result<(), CliError> {
    let records = open_records(db_path).await?;
    let remote = Arc::new(HttpRemoteStore::from_settings(settings)?);
    let engine = SyncEngine::start(&records, remote.clone(), remote, settings);
    engine.sync_now();

    println!(
        "Watching {} as {} (Ctrl-C to stop)",
        settings.remote_url, settings.owner_id
    );

    let mut state = engine.subscribe();
    let mut last_line = String::new();
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = format_state_line(&state.borrow_and_update());
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }
        }
    }

    engine.shutdown().await;
    println!("Stopped");
    Ok(())
}

pub fn format_state_line(state: &SyncState) -> String {
    match state.status() {
        SyncStatus::Offline => "offline".to_string(),
        SyncStatus::Syncing => "syncing...".to_string(),
        SyncStatus::Idle => "online, waiting for changes".to_string(),
        SyncStatus::Synced => state.last_success_at.map_or_else(
            || "synced".to_string(),
            |at| format!("synced at {}", format_sync_timestamp(at)),
        ),
        SyncStatus::Error => state.last_error.as_ref().map_or_else(
            || "error".to_string(),
            |error| format!("error: {}", error.message),
        ),
    }
}
