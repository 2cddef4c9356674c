use std::path::Path;

use medsync_core::RecordKind;

use crate::commands::common::{
    normalize_record_identifier, open_records, record_to_list_item, resolve_record,
};
use crate::error::CliError;

pub async fn run_show(kind: RecordKind, id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_record_identifier(id)?;
    let records = open_records(db_path).await?;
    let record = resolve_record(kind, &normalized_id, &records).await?;

    println!("{}", serde_json::to_string_pretty(&record_to_list_item(&record)?)?);
    Ok(())
}
