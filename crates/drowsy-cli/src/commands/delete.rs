use std::path::Path;

use drowsy_core::LocalId;

use crate::commands::common::open_store;
use crate::error::CliError;

pub fn parse_event_id(raw: &str) -> Result<LocalId, CliError> {
    raw.parse::<LocalId>()
        .map_err(|_| CliError::InvalidEventId(raw.trim().to_string()))
}

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let id = parse_event_id(id)?;
    let store = open_store(db_path).await?;

    if !store.delete(id).await? {
        return Err(CliError::EventNotFound(id.to_string()));
    }
    println!("{id}");
    Ok(())
}
