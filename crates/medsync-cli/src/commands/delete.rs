use std::path::Path;

use medsync_core::RecordKind;

use crate::commands::common::{normalize_record_identifier, open_records, resolve_record};
use crate::error::CliError;

pub async fn run_delete(kind: RecordKind, id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_record_identifier(id)?;
    let records = open_records(db_path).await?;
    let record = resolve_record(kind, &normalized_id, &records).await?;

    records.delete(kind, &record.id).await?;
    println!("{}", record.id);
    Ok(())
}
