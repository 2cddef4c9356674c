use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use medsync_core::models::SyncConflict;
use medsync_core::{OwnerId, Record, RecordBody, RecordId, RecordKind, RecordService, SyncSettings};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub kind: RecordKind,
    pub owner_id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub pending_sync: bool,
    pub fields: Value,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub kind: RecordKind,
    pub record_id: String,
    pub local_updated_at: i64,
    pub incoming_updated_at: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub winner: String,
    pub strategy: String,
}

pub async fn open_records(db_path: &Path) -> Result<RecordService, CliError> {
    Ok(RecordService::open_path(db_path.to_path_buf()).await?)
}

pub async fn resolve_record(
    kind: RecordKind,
    record_query: &str,
    records: &RecordService,
) -> Result<Record, CliError> {
    if let Ok(record_id) = record_query.parse::<RecordId>() {
        if let Some(record) = records.get(kind, &record_id).await? {
            return Ok(record);
        }
    }

    let matching_ids = records.list_ids_by_prefix(kind, record_query, 3).await?;

    match matching_ids.len() {
        0 => Err(CliError::RecordNotFound(record_query.to_string())),
        1 => {
            let resolved_id = matching_ids[0]
                .parse::<RecordId>()
                .map_err(|_| CliError::RecordNotFound(record_query.to_string()))?;
            records
                .get(kind, &resolved_id)
                .await?
                .ok_or_else(|| CliError::RecordNotFound(record_query.to_string()))
        }
        _ => {
            let options = matching_ids
                .iter()
                .take(3)
                .map(|id| id.chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousRecordId(format!(
                "ID prefix '{record_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn format_record_lines(records: &[Record]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let id = record.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let title = truncate(&record.body.title(), 40);
            let relative_time = format_relative_time(record.updated_at, now_ms);

            if record.dirty {
                format!("{short_id:<13}  {title:<40}  {relative_time:<10}  *")
            } else {
                format!("{short_id:<13}  {title:<40}  {relative_time}")
            }
        })
        .collect()
}

pub fn record_to_list_item(record: &Record) -> Result<RecordListItem, CliError> {
    let now_ms = Utc::now().timestamp_millis();
    Ok(RecordListItem {
        id: record.id.to_string(),
        kind: record.kind(),
        owner_id: record.owner_id.to_string(),
        title: record.body.title(),
        created_at: record.created_at,
        updated_at: record.updated_at,
        relative_time: format_relative_time(record.updated_at, now_ms),
        pending_sync: record.dirty,
        fields: record.body.to_json()?,
    })
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        kind: conflict.kind,
        record_id: conflict.record_id.clone(),
        local_updated_at: conflict.local_updated_at,
        incoming_updated_at: conflict.incoming_updated_at,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        winner: conflict.winner.as_str().to_string(),
        strategy: conflict.strategy.clone(),
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<4}  {}={}  winner={}  local={} incoming={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.kind,
                conflict.record_id,
                conflict.winner.as_str(),
                conflict.local_updated_at,
                conflict.incoming_updated_at
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Parse command-line record fields.
///
/// A single argument starting with `{` is a JSON object. Otherwise each
/// argument is `name=text` for a string value or `name:=json` for a raw JSON
/// value such as a number, boolean or list.
pub fn parse_fields(fields: &[String]) -> Result<Map<String, Value>, CliError> {
    if let [single] = fields {
        if single.trim_start().starts_with('{') {
            return match serde_json::from_str::<Value>(single)? {
                Value::Object(map) => Ok(map),
                _ => Err(CliError::InvalidField(single.clone())),
            };
        }
    }

    let mut map = Map::new();
    for field in fields {
        let (name, value) = if let Some((name, raw)) = field.split_once(":=") {
            let value = serde_json::from_str::<Value>(raw)
                .map_err(|_| CliError::InvalidField(field.clone()))?;
            (name, value)
        } else if let Some((name, text)) = field.split_once('=') {
            (name, Value::String(text.to_string()))
        } else {
            return Err(CliError::InvalidField(field.clone()));
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(CliError::InvalidField(field.clone()));
        }
        map.insert(name.to_string(), value);
    }
    Ok(map)
}

/// Overlay `changes` onto an existing body and re-validate it for `kind`.
pub fn merge_body(
    kind: RecordKind,
    base: &RecordBody,
    changes: Map<String, Value>,
) -> Result<RecordBody, CliError> {
    let mut fields = match base.to_json()? {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    fields.extend(changes);
    Ok(RecordBody::from_json(kind, Value::Object(fields))?)
}

/// Resolve the body of a new record from arguments, piped stdin or `$EDITOR`.
pub fn resolve_new_body(kind: RecordKind, fields: &[String]) -> Result<RecordBody, CliError> {
    if !fields.is_empty() {
        return Ok(RecordBody::from_json(
            kind,
            Value::Object(parse_fields(fields)?),
        )?);
    }

    if let Some(input) = read_piped_stdin()? {
        return Ok(RecordBody::from_json(kind, serde_json::from_str(&input)?)?);
    }

    let template = RecordBody::from_json(kind, Value::Object(Map::new()))?;
    let initial = serde_json::to_string_pretty(&template.to_json()?)?;
    if let Some(input) = capture_editor_input_with_initial(&initial)? {
        return Ok(RecordBody::from_json(kind, serde_json::from_str(&input)?)?);
    }

    Err(CliError::EmptyFields)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_record_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRecordId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_record_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_record_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("medsync-record-{}-{now}.json", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("MEDSYNC_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("medsync")
        .join("medsync.db")
}

fn load_profile(profile_name: Option<&str>) -> Result<(String, CliProfile), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let name = config.resolve_profile_name(profile_name);
    let profile = config.profile(&name).cloned().unwrap_or_default();
    Ok((name, profile))
}

/// Pick the owner from `--owner`, `MEDSYNC_OWNER_ID`, then the profile.
pub fn resolve_owner_id(
    cli_owner: Option<&str>,
    profile: &CliProfile,
) -> Result<OwnerId, CliError> {
    let raw = normalize_text_option(cli_owner.map(str::to_string))
        .or_else(|| normalize_text_option(env::var("MEDSYNC_OWNER_ID").ok()))
        .or_else(|| profile.owner_id())
        .ok_or(CliError::OwnerNotConfigured)?;
    Ok(OwnerId::new(raw)?)
}

pub fn resolve_owner(
    cli_owner: Option<&str>,
    profile_name: Option<&str>,
) -> Result<OwnerId, CliError> {
    let (_, profile) = load_profile(profile_name)?;
    resolve_owner_id(cli_owner, &profile)
}

/// Build sync settings from a profile with environment overrides.
pub fn settings_from_profile(
    profile: &CliProfile,
    cli_owner: Option<&str>,
) -> Result<SyncSettings, CliError> {
    let remote_url = normalize_text_option(env::var("MEDSYNC_REMOTE_URL").ok())
        .or_else(|| profile.remote_url())
        .ok_or(CliError::SyncNotConfigured)?;
    let owner_id = resolve_owner_id(cli_owner, profile)?;
    let auth_token =
        normalize_text_option(env::var("MEDSYNC_AUTH_TOKEN").ok()).or_else(|| profile.auth_token());

    let mut settings = SyncSettings::new(remote_url, owner_id)?.with_auth_token(auth_token);
    if let Some(secs) = profile.request_timeout_secs {
        settings = settings.with_request_timeout(std::time::Duration::from_secs(secs));
    }
    if let Some(secs) = profile.poll_interval_secs {
        settings = settings.with_poll_interval(std::time::Duration::from_secs(secs));
    }
    settings.validate()?;
    Ok(settings)
}

pub fn resolve_sync_settings(
    profile_name: Option<&str>,
    cli_owner: Option<&str>,
) -> Result<SyncSettings, CliError> {
    let (name, profile) = load_profile(profile_name)?;
    let settings = settings_from_profile(&profile, cli_owner)?;
    tracing::debug!("Using sync settings from profile '{}'", name);
    Ok(settings)
}
