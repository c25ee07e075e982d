use std::path::Path;

use drowsy_core::sync::{SyncEngine, SyncOutcome};

use crate::commands::common::{load_config, open_store, require_remote};
use crate::error::CliError;
use crate::token_store::TokenStore;

pub async fn run_sync(db_path: &Path, config_path: &Path) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let remote = require_remote(&config, &TokenStore::default())?;
    let store = open_store(db_path).await?;

    report_outcome(SyncEngine::new(store, remote).run_once().await)
}

pub fn report_outcome(outcome: SyncOutcome) -> Result<(), CliError> {
    match outcome {
        SyncOutcome::NothingToSync => {
            println!("Nothing to sync");
            Ok(())
        }
        SyncOutcome::Synced { .. } => {
            println!("Sync completed: {outcome}");
            Ok(())
        }
        SyncOutcome::Retry { reason } => Err(CliError::SyncDeferred(reason)),
    }
}
