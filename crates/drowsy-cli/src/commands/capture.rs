use std::path::Path;

use drowsy_core::util::unix_millis_now;
use drowsy_core::NewFatigueEvent;

use crate::commands::common::{open_store, parse_reading, read_piped_lines};
use crate::error::CliError;

pub async fn run_capture(readings: &[String], db_path: &Path) -> Result<(), CliError> {
    let lines = if readings.is_empty() {
        read_piped_lines()?
    } else {
        readings.to_vec()
    };
    if lines.is_empty() {
        return Err(CliError::NoReadings);
    }

    let inputs = lines
        .iter()
        .map(|line| parse_reading(line))
        .collect::<Result<Vec<_>, _>>()?;

    let store = open_store(db_path).await?;
    let now_ms = unix_millis_now();
    for input in inputs {
        let event = NewFatigueEvent::captured(input.at_ms.unwrap_or(now_ms), input.score);
        let id = store.insert(&event).await?;
        println!("{id}");
    }
    Ok(())
}
