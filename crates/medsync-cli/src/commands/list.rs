use std::path::Path;

use medsync_core::{OwnerId, RecordKind};

use crate::commands::common::{format_record_lines, open_records, record_to_list_item};
use crate::error::CliError;

pub async fn run_list(
    kind: RecordKind,
    limit: usize,
    as_json: bool,
    owner_id: &OwnerId,
    db_path: &Path,
) -> Result<(), CliError> {
    let records = open_records(db_path).await?;
    let listed = records.list(kind, owner_id, limit).await?;

    if as_json {
        let json_items = listed
            .iter()
            .map(record_to_list_item)
            .collect::<Result<Vec<_>, _>>()?;
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if listed.is_empty() {
        println!("No {kind} records.");
    } else {
        for line in format_record_lines(&listed) {
            println!("{line}");
        }
    }

    Ok(())
}
