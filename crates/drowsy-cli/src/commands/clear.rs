use std::path::Path;

use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn run_clear(confirmed: bool, db_path: &Path) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ClearNotConfirmed);
    }

    let store = open_store(db_path).await?;
    let removed = store.clear().await?;
    println!("Removed {removed} readings");
    Ok(())
}
