use std::path::Path;

use medsync_core::{RecordBody, RecordKind};

use crate::commands::common::{
    capture_editor_input_with_initial, merge_body, normalize_record_identifier, open_records,
    parse_fields, resolve_record,
};
use crate::error::CliError;

pub async fn run_update(
    kind: RecordKind,
    id: &str,
    fields: &[String],
    db_path: &Path,
) -> Result<(), CliError> {
    let normalized_id = normalize_record_identifier(id)?;
    let records = open_records(db_path).await?;
    let record = resolve_record(kind, &normalized_id, &records).await?;

    let body = if fields.is_empty() {
        let initial = serde_json::to_string_pretty(&record.body.to_json()?)?;
        let Some(edited) = capture_editor_input_with_initial(&initial)? else {
            return Err(CliError::EmptyFields);
        };
        RecordBody::from_json(kind, serde_json::from_str(&edited)?)?
    } else {
        merge_body(kind, &record.body, parse_fields(fields)?)?
    };

    if body == record.body {
        println!("{} (unchanged)", record.id);
        return Ok(());
    }

    let updated = records.update(kind, &record.id, body).await?;
    println!("{}", updated.id);
    Ok(())
}
