use std::path::Path;
use std::sync::Arc;

use medsync_core::remote::HttpRemoteStore;
use medsync_core::sync::{
    LastWriteWins, ReachabilityProbe, SyncCoordinator, SyncReport, SyncRequest,
};
use medsync_core::{RecordService, SyncSettings};

use crate::commands::common::{
    format_sync_conflict_lines, open_records, sync_conflict_to_item, SyncConflictItem,
};
use crate::error::CliError;

/// One-shot coordinator over the HTTP remote, with reachability checked once.
async fn connect(
    records: &RecordService,
    settings: &SyncSettings,
) -> Result<SyncCoordinator, CliError> {
    let remote = Arc::new(HttpRemoteStore::from_settings(settings)?);
    let coordinator = SyncCoordinator::new(
        Arc::new(records.clone()),
        remote.clone(),
        Arc::new(LastWriteWins),
    );
    coordinator.set_online(remote.is_reachable().await);
    Ok(coordinator)
}

pub async fn run_sync(full: bool, settings: &SyncSettings, db_path: &Path) -> Result<(), CliError> {
    let records = open_records(db_path).await?;
    let coordinator = connect(&records, settings).await?;

    if full {
        let report = coordinator.full_sync(&settings.owner_id).await?;
        print_report(&report.upload);
        print_report(&report.download);
    } else {
        let report = coordinator.execute(SyncRequest::PendingChanges).await?;
        print_report(&report);
    }

    println!("Sync completed");
    Ok(())
}

pub async fn run_pull(settings: &SyncSettings, db_path: &Path) -> Result<(), CliError> {
    let records = open_records(db_path).await?;
    let coordinator = connect(&records, settings).await?;

    let report = coordinator.download_all(&settings.owner_id).await?;
    print_report(&report);
    Ok(())
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = report
        .kinds
        .iter()
        .filter(|(_, counts)| **counts != medsync_core::sync::KindReport::default())
        .map(|(kind, counts)| {
            format!(
                "{kind:<16} uploaded={} deleted={} downloaded={} kept_local={} failed={}",
                counts.uploaded, counts.deleted, counts.downloaded, counts.kept_local, counts.failed
            )
        })
        .collect::<Vec<_>>();
    if lines.is_empty() {
        lines.push(format!("{}: nothing to do", report.request));
    }
    lines
}

fn print_report(report: &SyncReport) {
    for line in format_report_lines(report) {
        println!("{line}");
    }
    for failure in &report.failures {
        let id = failure
            .record_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        eprintln!("failed {} {id}: {}", failure.kind, failure.message);
    }
}

pub async fn run_conflicts(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let records = open_records(db_path).await?;
    let conflicts = records.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
