use std::env;
use std::io::{self, BufRead, IsTerminal};
use std::path::{Path, PathBuf};

use chrono::Utc;
use drowsy_core::config::EngineConfig;
use drowsy_core::models::ScoreSummary;
use drowsy_core::remote::{HttpRemoteClient, StaticToken};
use drowsy_core::{EventStore, Reading};
use serde::Serialize;

use crate::config_file;
use crate::error::CliError;
use crate::token_store::{resolve_token_source, TokenStore};

#[derive(Debug, Serialize)]
pub struct ReadingItem {
    pub id: Option<i64>,
    pub server_id: Option<String>,
    pub captured_at: i64,
    pub captured_at_iso: String,
    pub relative_time: String,
    pub score: f32,
    pub synced: bool,
}

/// One parsed `capture`/`watch` input line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingInput {
    pub at_ms: Option<i64>,
    pub score: f32,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    cli_db_path
        .or_else(|| env::var_os("DROWSY_DB_PATH").map(PathBuf::from))
        .or_else(default_db_path)
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("drowsy").join("drowsy.db"))
}

pub async fn open_store(path: &Path) -> Result<EventStore, CliError> {
    Ok(EventStore::open_path(path).await?)
}

pub fn load_config(config_path: &Path) -> Result<EngineConfig, CliError> {
    config_file::load_effective(config_path).map_err(CliError::Config)
}

/// HTTP client for the configured backend, if there is one.
pub fn build_remote(
    config: &EngineConfig,
    tokens: &TokenStore,
) -> Result<Option<HttpRemoteClient<StaticToken>>, CliError> {
    if !config.remote_configured() {
        return Ok(None);
    }

    Ok(Some(HttpRemoteClient::from_config(
        config,
        resolve_token_source(tokens),
    )?))
}

pub fn require_remote(
    config: &EngineConfig,
    tokens: &TokenStore,
) -> Result<HttpRemoteClient<StaticToken>, CliError> {
    build_remote(config, tokens)?.ok_or(CliError::RemoteNotConfigured)
}

pub fn parse_score(raw: &str) -> Result<f32, CliError> {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|score| score.is_finite())
        .ok_or_else(|| CliError::InvalidReading(raw.trim().to_string()))
}

/// Parse `score` or `epoch_ms,score`.
pub fn parse_reading(raw: &str) -> Result<ReadingInput, CliError> {
    let raw = raw.trim();
    match raw.split_once(',') {
        Some((at, score)) => {
            let at_ms = at
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|at| *at > 0)
                .ok_or_else(|| CliError::InvalidReading(raw.to_string()))?;
            Ok(ReadingInput {
                at_ms: Some(at_ms),
                score: parse_score(score).map_err(|_| CliError::InvalidReading(raw.to_string()))?,
            })
        }
        None => Ok(ReadingInput {
            at_ms: None,
            score: parse_score(raw)?,
        }),
    }
}

/// Parse epoch milliseconds or an RFC 3339 timestamp.
pub fn parse_time_arg(raw: &str) -> Result<i64, CliError> {
    let raw = raw.trim();
    if let Ok(millis) = raw.parse::<i64>() {
        return Ok(millis);
    }
    drowsy_core::remote::parse_iso_millis(raw).ok_or_else(|| CliError::InvalidTime(raw.to_string()))
}

/// Non-empty stdin lines, or nothing when stdin is a terminal.
pub fn read_piped_lines() -> Result<Vec<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(Vec::new());
    }

    let mut lines = Vec::new();
    for line in stdin.lock().lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

pub fn reading_to_item(reading: &Reading, now_ms: i64) -> ReadingItem {
    ReadingItem {
        id: reading.local_id.map(drowsy_core::LocalId::get),
        server_id: reading.server_id.clone(),
        captured_at: reading.captured_at_ms,
        captured_at_iso: format_timestamp(reading.captured_at_ms),
        relative_time: format_relative_time(reading.captured_at_ms, now_ms),
        score: reading.score,
        synced: reading.synced,
    }
}

pub fn reading_items(readings: &[Reading]) -> Vec<ReadingItem> {
    let now_ms = Utc::now().timestamp_millis();
    readings
        .iter()
        .map(|reading| reading_to_item(reading, now_ms))
        .collect()
}

pub fn format_reading_lines(readings: &[Reading]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    readings
        .iter()
        .map(|reading| {
            let id = reading
                .local_id
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            let state = if reading.synced { "synced" } else { "pending" };
            format!(
                "{id:>6}  {}  {:>5.2}  {state:<7}  {}",
                format_timestamp(reading.captured_at_ms),
                reading.score,
                format_relative_time(reading.captured_at_ms, now_ms)
            )
        })
        .collect()
}

pub fn format_summary(summary: &ScoreSummary) -> String {
    let render = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
    format!(
        "count={}  avg={}  min={}  max={}",
        summary.count,
        render(summary.average),
        render(summary.min),
        render(summary.max)
    )
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
