use std::path::Path;

use drowsy_core::cache::ReadPolicy;
use drowsy_core::models::TimeRange;

use crate::commands::common::{
    format_reading_lines, load_config, open_store, parse_time_arg, reading_items,
};
use crate::commands::view::{load_view, ViewRequest};
use crate::error::CliError;
use crate::token_store::TokenStore;

pub fn parse_range(from: &str, to: &str) -> Result<TimeRange, CliError> {
    Ok(TimeRange::new(parse_time_arg(from)?, parse_time_arg(to)?))
}

pub async fn run_range(
    from: &str,
    to: &str,
    policy: ReadPolicy,
    as_json: bool,
    db_path: &Path,
    config_path: &Path,
) -> Result<(), CliError> {
    let range = parse_range(from, to)?;
    let config = load_config(config_path)?;
    let store = open_store(db_path).await?;
    let view = load_view(
        store,
        &config,
        ViewRequest::Range(range),
        policy,
        &TokenStore::default(),
    )
    .await?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reading_items(&view.readings))?
        );
        return Ok(());
    }

    if view.readings.is_empty() {
        println!("No readings in range.");
        return Ok(());
    }
    for line in format_reading_lines(&view.readings) {
        println!("{line}");
    }
    Ok(())
}
