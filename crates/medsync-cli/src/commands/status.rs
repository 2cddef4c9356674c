use std::path::Path;

use medsync_core::remote::HttpRemoteStore;
use medsync_core::sync::ReachabilityProbe;
use medsync_core::{RecordKind, SyncSettings};
use serde::Serialize;

use crate::commands::common::open_records;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub db_path: String,
    pub pending: Vec<PendingCount>,
    pub remote_url: Option<String>,
    pub owner_id: Option<String>,
    pub reachable: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct PendingCount {
    pub kind: RecordKind,
    pub dirty: usize,
}

/// Pending counts are always shown; remote details only when sync is configured.
pub async fn run_status(
    settings: Option<&SyncSettings>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let records = open_records(db_path).await?;
    let mut pending = Vec::with_capacity(RecordKind::ALL.len());
    for kind in RecordKind::ALL {
        pending.push(PendingCount {
            kind,
            dirty: records.count_dirty(kind).await?,
        });
    }

    let reachable = match settings {
        Some(settings) => Some(HttpRemoteStore::from_settings(settings)?.is_reachable().await),
        None => None,
    };

    let report = StatusReport {
        db_path: db_path.display().to_string(),
        pending,
        remote_url: settings.map(|settings| settings.remote_url.clone()),
        owner_id: settings.map(|settings| settings.owner_id.to_string()),
        reachable,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let mut lines = vec![format!("database: {}", report.db_path)];
    let total = report.pending.iter().map(|count| count.dirty).sum::<usize>();
    lines.push(format!("pending changes: {total}"));
    for count in report.pending.iter().filter(|count| count.dirty > 0) {
        lines.push(format!("  {:<16} {}", count.kind, count.dirty));
    }

    match (&report.remote_url, report.reachable) {
        (Some(url), Some(reachable)) => {
            let label = if reachable { "reachable" } else { "unreachable" };
            lines.push(format!("remote: {url} ({label})"));
        }
        _ => lines.push("remote: not configured".to_string()),
    }
    if let Some(owner_id) = &report.owner_id {
        lines.push(format!("owner: {owner_id}"));
    }
    lines
}
