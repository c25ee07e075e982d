use std::path::Path;

use drowsy_core::cache::ReadPolicy;

use crate::commands::common::{
    format_reading_lines, load_config, open_store, reading_items, ReadingItem,
};
use crate::commands::view::{load_view, ViewRequest};
use crate::error::CliError;
use crate::token_store::TokenStore;

pub async fn run_list(
    limit: usize,
    policy: ReadPolicy,
    as_json: bool,
    db_path: &Path,
    config_path: &Path,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let store = open_store(db_path).await?;
    let mut view = load_view(
        store,
        &config,
        ViewRequest::All,
        policy,
        &TokenStore::default(),
    )
    .await?;
    view.readings.truncate(limit);

    if as_json {
        let items = reading_items(&view.readings);
        println!("{}", serde_json::to_string_pretty::<Vec<ReadingItem>>(&items)?);
    } else if view.readings.is_empty() {
        println!("No readings recorded.");
    } else {
        for line in format_reading_lines(&view.readings) {
            println!("{line}");
        }
    }

    Ok(())
}
