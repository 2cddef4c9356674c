use std::path::Path;

use medsync_core::{OwnerId, RecordKind};

use crate::commands::common::{open_records, resolve_new_body};
use crate::error::CliError;

pub async fn run_add(
    kind: RecordKind,
    fields: &[String],
    owner_id: &OwnerId,
    db_path: &Path,
) -> Result<(), CliError> {
    let body = resolve_new_body(kind, fields)?;

    let records = open_records(db_path).await?;
    let record = records.create(owner_id, body).await?;

    println!("{}", record.id);
    Ok(())
}
