use std::path::Path;

use medsync_core::models::{ConflictWinner, Medication, SyncConflict};
use medsync_core::store::LocalStore;
use medsync_core::sync::{LastError, SyncError, SyncState};
use medsync_core::{OwnerId, Record, RecordBody, RecordKind, RecordService};
use serde_json::{json, Value};

use crate::cli::CompletionShell;
use crate::commands::common::{
    default_editor, format_relative_time, format_sync_conflict_lines, format_sync_timestamp,
    merge_body, normalize_content, normalize_record_identifier, parse_fields, resolve_record,
    settings_from_profile, truncate,
};
use crate::commands::completions::run_completions;
use crate::commands::config::{init_profile, missing_profile_fields, ProfileValues};
use crate::commands::delete::run_delete;
use crate::commands::sync::format_report_lines;
use crate::commands::watch::format_state_line;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

fn owner() -> OwnerId {
    OwnerId::new("owner-a").unwrap()
}

fn aspirin() -> RecordBody {
    RecordBody::Medication(Medication {
        name: "Aspirin".to_string(),
        dosage: "81mg".to_string(),
        ..Medication::default()
    })
}

fn record_with_id(id: &str, body: RecordBody) -> Record {
    let mut record = Record::new(owner(), body);
    record.id = id.parse().unwrap();
    record
}

async fn seeded_service(db_path: &Path, records: &[Record]) -> RecordService {
    let service = RecordService::open_path(db_path.to_path_buf()).await.unwrap();
    for record in records {
        service.upsert(record.kind(), record).await.unwrap();
    }
    service
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn normalize_record_identifier_rejects_empty() {
    assert!(matches!(
        normalize_record_identifier("   "),
        Err(CliError::EmptyRecordId)
    ));
    assert_eq!(normalize_record_identifier(" abc ").unwrap(), "abc");
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn parse_fields_reads_text_and_json_values() {
    let fields = vec![
        "name=Aspirin".to_string(),
        "dosage=81 mg".to_string(),
        "active:=true".to_string(),
        "startedAt:=1700000000000".to_string(),
    ];

    let parsed = parse_fields(&fields).unwrap();
    assert_eq!(parsed["name"], "Aspirin");
    assert_eq!(parsed["dosage"], "81 mg");
    assert_eq!(parsed["active"], Value::Bool(true));
    assert_eq!(parsed["startedAt"], 1_700_000_000_000_i64);
}

#[test]
fn parse_fields_accepts_single_json_object() {
    let parsed = parse_fields(&[r#"{"meal":"lunch","calories":600}"#.to_string()]).unwrap();
    assert_eq!(parsed["meal"], "lunch");
    assert_eq!(parsed["calories"], 600);
}

#[test]
fn parse_fields_rejects_malformed_pairs() {
    for bad in ["name", "=value", "count:=not-json"] {
        let error = parse_fields(&[bad.to_string()]).unwrap_err();
        assert!(matches!(error, CliError::InvalidField(_)), "{bad}");
    }
}

#[test]
fn merge_body_overlays_changes() {
    let changes = parse_fields(&["dosage=325mg".to_string()]).unwrap();
    let merged = merge_body(RecordKind::Medication, &aspirin(), changes).unwrap();

    let RecordBody::Medication(medication) = merged else {
        panic!("expected medication");
    };
    assert_eq!(medication.name, "Aspirin");
    assert_eq!(medication.dosage, "325mg");
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn truncate_collapses_whitespace_and_adds_ellipsis() {
    assert_eq!(truncate("a  b\nc", 10), "a b c");
    assert_eq!(
        truncate("This is a very long sentence that should be shortened", 20),
        "This is a very lo..."
    );
}

#[test]
fn format_sync_timestamp_returns_utc_label() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn format_sync_conflict_lines_include_key_fields() {
    let conflicts = vec![SyncConflict {
        id: 1,
        kind: RecordKind::Doctor,
        record_id: "11111111-1111-7111-8111-111111111111".to_string(),
        local_updated_at: 200,
        incoming_updated_at: 100,
        resolved_at: 300,
        winner: ConflictWinner::Local,
        strategy: "lww".to_string(),
    }];

    let rendered = format_sync_conflict_lines(&conflicts);
    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].contains("lww"));
    assert!(rendered[0].contains("doctor=11111111-1111-7111-8111-111111111111"));
    assert!(rendered[0].contains("winner=local"));
    assert!(rendered[0].contains("local=200"));
    assert!(rendered[0].contains("incoming=100"));
}

#[test]
fn empty_report_says_nothing_to_do() {
    let report = medsync_core::sync::SyncReport {
        request: "pending-changes".to_string(),
        ..Default::default()
    };
    assert_eq!(format_report_lines(&report), vec!["pending-changes: nothing to do"]);
}

#[test]
fn state_line_reflects_status() {
    let offline = SyncState::default();
    assert_eq!(format_state_line(&offline), "offline");

    let failed = SyncState {
        is_online: true,
        last_error: Some(LastError {
            kind: SyncError::NoConnection.kind(),
            message: SyncError::NoConnection.to_string(),
            at: 0,
        }),
        ..SyncState::default()
    };
    assert!(format_state_line(&failed).starts_with("error: "));
}

#[tokio::test(flavor = "current_thread")]
async fn resolve_record_supports_exact_and_prefix_id() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("medsync.db");
    let first = record_with_id("11111111-1111-7111-8111-111111111111", aspirin());
    let second = record_with_id("11111111-1111-7111-8111-222222222222", aspirin());
    let records = seeded_service(&db_path, &[first.clone(), second.clone()]).await;

    let by_exact = resolve_record(
        RecordKind::Medication,
        "11111111-1111-7111-8111-111111111111",
        &records,
    )
    .await
    .unwrap();
    assert_eq!(by_exact.id, first.id);

    let by_prefix = resolve_record(RecordKind::Medication, "11111111-1111-7111-8111-2", &records)
        .await
        .unwrap();
    assert_eq!(by_prefix.id, second.id);
}

#[tokio::test(flavor = "current_thread")]
async fn resolve_record_rejects_ambiguous_and_missing_ids() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("medsync.db");
    let records = seeded_service(
        &db_path,
        &[
            record_with_id("aaaaaaaa-aaaa-7aaa-8aaa-aaaaaaaaaaaa", aspirin()),
            record_with_id("aaaaaaaa-aaaa-7aaa-8aaa-bbbbbbbbbbbb", aspirin()),
        ],
    )
    .await;

    let error = resolve_record(RecordKind::Medication, "aaaaaaaa-aaaa-7aaa-8aaa", &records)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::AmbiguousRecordId(_)));

    let error = resolve_record(RecordKind::Medication, "does-not-exist", &records)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::RecordNotFound(_)));

    // Kind is part of the key.
    let error = resolve_record(RecordKind::Doctor, "aaaaaaaa", &records)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::RecordNotFound(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn run_delete_tombstones_record_by_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("medsync.db");
    let keep = record_with_id("bbbbbbbb-bbbb-7bbb-8bbb-111111111111", aspirin());
    let remove = record_with_id("bbbbbbbb-bbbb-7bbb-8bbb-222222222222", aspirin());
    drop(seeded_service(&db_path, &[keep.clone(), remove.clone()]).await);

    run_delete(RecordKind::Medication, "bbbbbbbb-bbbb-7bbb-8bbb-2", &db_path)
        .await
        .unwrap();

    let records = RecordService::open_path(db_path.clone()).await.unwrap();
    assert!(records
        .get(RecordKind::Medication, &remove.id)
        .await
        .unwrap()
        .is_none());
    assert!(records
        .get(RecordKind::Medication, &keep.id)
        .await
        .unwrap()
        .is_some());
    // The tombstone waits for upload.
    let dirty = records.fetch_dirty(RecordKind::Medication).await.unwrap();
    assert!(dirty
        .iter()
        .any(|record| record.id == remove.id && record.tombstoned));
}

#[test]
fn settings_from_profile_requires_remote_url() {
    if std::env::var_os("MEDSYNC_REMOTE_URL").is_some() {
        return;
    }
    let profile = CliProfile {
        owner_id: Some("owner-a".to_string()),
        ..CliProfile::default()
    };
    let error = settings_from_profile(&profile, None).unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));
}

#[test]
fn settings_from_profile_prefers_cli_owner() {
    let profile = CliProfile {
        remote_url: Some("https://sync.example.com/".to_string()),
        owner_id: Some("owner-a".to_string()),
        poll_interval_secs: Some(5),
        ..CliProfile::default()
    };
    let settings = settings_from_profile(&profile, Some("owner-b")).unwrap();
    assert_eq!(settings.owner_id.as_str(), "owner-b");
    assert_eq!(settings.poll_interval().as_secs(), 5);
}

#[test]
fn init_profile_validates_and_activates() {
    let mut config = CliProfilesConfig::default();
    let error = init_profile(
        &mut config,
        Some("home"),
        ProfileValues {
            remote_url: Some("sync.example.com".to_string()),
            ..ProfileValues::default()
        },
        false,
    )
    .unwrap_err();
    assert!(matches!(error, CliError::Config(_)));

    let name = init_profile(
        &mut config,
        Some("home"),
        ProfileValues {
            remote_url: Some("https://sync.example.com".to_string()),
            owner_id: Some("owner-a".to_string()),
            auth_token: Some("secret".to_string()),
        },
        false,
    )
    .unwrap();
    assert_eq!(name, "home");
    assert_eq!(config.active_profile.as_deref(), Some("home"));
    let profile = config.profile("home").unwrap();
    assert!(missing_profile_fields(profile).is_empty());
    assert_eq!(profile.auth_token.as_deref(), Some("secret"));
}

#[test]
fn init_profile_keeps_existing_values_and_active_profile() {
    let mut config = CliProfilesConfig {
        active_profile: Some("work".to_string()),
        ..CliProfilesConfig::default()
    };
    config.profile_mut_or_default("home").owner_id = Some("owner-a".to_string());

    init_profile(
        &mut config,
        Some("home"),
        ProfileValues {
            remote_url: Some("http://localhost:8080".to_string()),
            ..ProfileValues::default()
        },
        true,
    )
    .unwrap();

    let profile = config.profile("home").unwrap();
    assert_eq!(profile.owner_id().as_deref(), Some("owner-a"));
    assert_eq!(config.active_profile.as_deref(), Some("work"));
}

#[test]
fn run_completions_writes_bash_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("medsync.bash");

    run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("_medsync()"));
    assert!(script.contains("complete -F _medsync"));
}

#[test]
fn json_object_fields_build_a_valid_body() {
    let fields = parse_fields(&[json!({"name": "Dr. Rao", "specialty": "GP"}).to_string()]).unwrap();
    let body = RecordBody::from_json(RecordKind::Doctor, Value::Object(fields)).unwrap();
    assert_eq!(body.title(), "Dr. Rao (GP)");
}
