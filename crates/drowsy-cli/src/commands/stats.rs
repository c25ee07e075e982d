use std::path::Path;

use crate::commands::common::{format_summary, open_store};
use crate::commands::range::parse_range;
use crate::error::CliError;

pub async fn run_stats(from: &str, to: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let range = parse_range(from, to)?;
    let store = open_store(db_path).await?;
    let summary = store.score_summary(range).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_summary(&summary));
    }
    Ok(())
}
