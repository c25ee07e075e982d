//! JSON shapes exchanged with the backend.
//!
//! Field names are camelCase on the way out. Responses are decoded leniently:
//! the older snake_case names are accepted as aliases and ids may arrive as
//! integers or strings.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::mapping::{fatigue_level_to_score, parse_iso_millis};
use super::{CreatedRecord, RemoteRecord, UploadItem};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UploadItemDto<'a> {
    subject_id: &'a str,
    captured_at_ms: i64,
    score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_key: Option<&'a str>,
}

impl<'a> UploadItemDto<'a> {
    pub(super) fn new(subject_id: &'a str, item: &'a UploadItem) -> Self {
        Self {
            subject_id,
            captured_at_ms: item.captured_at_ms,
            score: item.score,
            client_key: item.client_key.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Integer(i64),
    Text(String),
}

impl WireId {
    fn into_server_id(self) -> Option<String> {
        match self {
            Self::Integer(id) => Some(id.to_string()),
            Self::Text(id) => crate::util::normalize_text_option(Some(id)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireLevel {
    Number(f64),
    Text(String),
}

impl WireLevel {
    #[allow(clippy::cast_possible_truncation)]
    fn score(&self) -> f32 {
        match self {
            Self::Number(value) if value.is_finite() => *value as f32,
            Self::Number(_) => 0.0,
            Self::Text(label) => fatigue_level_to_score(label),
        }
    }
}

/// Millisecond-timestamped record (upload echo and legacy fetch).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TimedRecordDto {
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default, alias = "timestamp_ms", alias = "captured_at_ms")]
    captured_at_ms: Option<i64>,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default, alias = "client_key")]
    client_key: Option<String>,
}

impl TimedRecordDto {
    fn usable_time(&self) -> Option<i64> {
        self.captured_at_ms.filter(|millis| *millis > 0)
    }

    pub(super) fn into_created(self) -> Option<CreatedRecord> {
        let captured_at_ms = self.usable_time()?;
        Some(CreatedRecord {
            server_id: self.id?.into_server_id()?,
            captured_at_ms,
            score: self.score?,
            client_key: crate::util::normalize_text_option(self.client_key),
        })
    }

    pub(super) fn into_remote(self) -> Option<RemoteRecord> {
        let captured_at_ms = self.usable_time()?;
        Some(RemoteRecord {
            server_id: self.id.and_then(WireId::into_server_id),
            captured_at_ms,
            score: self.score?,
        })
    }
}

/// Driving record keyed by member id, timed with ISO strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MemberRecordDto {
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default, alias = "start_time")]
    start_time: Option<String>,
    #[serde(default, alias = "fatigue_level")]
    fatigue_level: Option<WireLevel>,
}

impl MemberRecordDto {
    pub(super) fn into_remote(self) -> Option<RemoteRecord> {
        let captured_at_ms = self
            .start_time
            .as_deref()
            .and_then(parse_iso_millis)
            .filter(|millis| *millis > 0)?;
        Some(RemoteRecord {
            server_id: self.id.and_then(WireId::into_server_id),
            captured_at_ms,
            score: self.fatigue_level.as_ref().map_or(0.0, WireLevel::score),
        })
    }
}

/// Decode each element independently, dropping the ones that fail.
///
/// Returns the converted records and how many were dropped.
pub(super) fn decode_each<D, R>(
    values: Vec<Value>,
    convert: impl Fn(D) -> Option<R>,
) -> (Vec<R>, usize)
where
    D: DeserializeOwned,
{
    let total = values.len();
    let records: Vec<R> = values
        .into_iter()
        .filter_map(|value| serde_json::from_value::<D>(value).ok())
        .filter_map(convert)
        .collect();
    let dropped = total - records.len();
    (records, dropped)
}
