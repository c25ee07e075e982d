//! reqwest implementation of the remote contract.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;

use super::wire::{decode_each, MemberRecordDto, TimedRecordDto, UploadItemDto};
use super::{
    CreatedRecord, FetchSchema, RemoteClient, RemoteError, RemoteRecord, RemoteResult,
    TokenSource, UploadItem,
};
use crate::config::EngineConfig;
use crate::models::TimeRange;
use crate::util::{compact_text, is_http_url, normalize_text_option};

const RECORDS_PATH: &str = "driving_records";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP client for the driving records API.
#[derive(Clone)]
pub struct HttpRemoteClient<T: TokenSource> {
    base_url: String,
    subject_id: String,
    member_id: Option<i64>,
    client: Client,
    tokens: T,
}

impl<T: TokenSource> std::fmt::Debug for HttpRemoteClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteClient")
            .field("base_url", &self.base_url)
            .field("subject_id", &self.subject_id)
            .field("member_id", &self.member_id)
            .finish_non_exhaustive()
    }
}

impl<T: TokenSource> HttpRemoteClient<T> {
    /// Client speaking the legacy range-fetch schema.
    pub fn new(base_url: &str, subject_id: &str, tokens: T) -> RemoteResult<Self> {
        let base_url = normalize_base_url(base_url)?;
        let subject_id = normalize_text_option(Some(subject_id.to_string())).ok_or_else(|| {
            RemoteError::InvalidConfiguration("subject id must not be empty".to_string())
        })?;

        Ok(Self {
            base_url,
            subject_id,
            member_id: None,
            client: build_client(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)?,
            tokens,
        })
    }

    /// Build from engine configuration, honoring the selected fetch schema.
    pub fn from_config(config: &EngineConfig, tokens: T) -> RemoteResult<Self> {
        let base_url = config.api_base_url.as_deref().ok_or_else(|| {
            RemoteError::InvalidConfiguration("api_base_url is not configured".to_string())
        })?;
        let subject_id = config.subject_id.as_deref().unwrap_or_default();
        let client = Self::new(base_url, subject_id, tokens)?.with_timeouts(
            Duration::from_secs(config.sync.connect_timeout_secs),
            Duration::from_secs(config.sync.request_timeout_secs),
        )?;

        match (config.fetch_schema, config.member_id) {
            (FetchSchema::Legacy, _) => Ok(client),
            (FetchSchema::Member, Some(member_id)) => Ok(client.with_member_schema(member_id)),
            (FetchSchema::Member, None) => Err(RemoteError::InvalidConfiguration(
                "member_id is required for the member fetch schema".to_string(),
            )),
        }
    }

    /// Fetch ranges by integer member id instead of subject id and millis.
    #[must_use]
    pub const fn with_member_schema(mut self, member_id: i64) -> Self {
        self.member_id = Some(member_id);
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> RemoteResult<Self> {
        self.client = build_client(connect, request)?;
        Ok(self)
    }

    pub const fn schema(&self) -> FetchSchema {
        if self.member_id.is_some() {
            FetchSchema::Member
        } else {
            FetchSchema::Legacy
        }
    }

    fn records_url(&self) -> String {
        format!("{}/{RECORDS_PATH}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_for_list(&self, request: RequestBuilder) -> RemoteResult<Vec<Value>> {
        let response = self
            .authorize(request)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Server {
                status: status.as_u16(),
                message: parse_api_error(&body),
            });
        }

        let body = response.text().await?;
        serde_json::from_str::<Vec<Value>>(&body).map_err(|error| {
            RemoteError::InvalidPayload(format!(
                "expected a JSON array ({error}): {}",
                compact_text(&body)
            ))
        })
    }

    async fn fetch_legacy(&self, range: TimeRange) -> RemoteResult<Vec<RemoteRecord>> {
        let request = self
            .client
            .get(self.records_url())
            .query(&[("user_id", self.subject_id.as_str())])
            .query(&[("start_ms", range.start), ("end_ms", range.end)]);
        let values = self.send_for_list(request).await?;

        let (records, dropped) = decode_each(values, TimedRecordDto::into_remote);
        log_dropped("range fetch", dropped);
        Ok(records)
    }

    async fn fetch_member(&self, member_id: i64, range: TimeRange) -> RemoteResult<Vec<RemoteRecord>> {
        let request = self
            .client
            .get(self.records_url())
            .query(&[("member_id", member_id)]);
        let values = self.send_for_list(request).await?;

        let (records, dropped) = decode_each(values, MemberRecordDto::into_remote);
        log_dropped("member fetch", dropped);
        Ok(records
            .into_iter()
            .filter(|record| range.contains(record.captured_at_ms))
            .collect())
    }
}

impl<T: TokenSource> RemoteClient for HttpRemoteClient<T> {
    async fn upload_batch(&self, items: &[UploadItem]) -> RemoteResult<Vec<CreatedRecord>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let payload: Vec<UploadItemDto<'_>> = items
            .iter()
            .map(|item| UploadItemDto::new(&self.subject_id, item))
            .collect();
        let request = self.client.post(self.records_url()).json(&payload);
        let values = self.send_for_list(request).await?;

        let (created, dropped) = decode_each(values, TimedRecordDto::into_created);
        log_dropped("upload response", dropped);
        tracing::debug!(
            "Uploaded {} fatigue events, server created {}",
            items.len(),
            created.len()
        );
        Ok(created)
    }

    async fn fetch_range(&self, range: TimeRange) -> RemoteResult<Vec<RemoteRecord>> {
        match self.member_id {
            Some(member_id) => self.fetch_member(member_id, range).await,
            None => self.fetch_legacy(range).await,
        }
    }
}

fn build_client(connect: Duration, request: Duration) -> RemoteResult<Client> {
    Ok(Client::builder()
        .connect_timeout(connect)
        .timeout(request)
        .build()?)
}

fn normalize_base_url(raw: &str) -> RemoteResult<String> {
    let url = normalize_text_option(Some(raw.to_string())).ok_or_else(|| {
        RemoteError::InvalidConfiguration("base URL must not be empty".to_string())
    })?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

fn log_dropped(context: &str, dropped: usize) {
    if dropped > 0 {
        tracing::warn!("Dropped {} unparsable records from {}", dropped, context);
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: Option<Value>,
    message: Option<String>,
    error: Option<String>,
}

fn parse_api_error(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        let detail = payload.detail.map(|detail| match detail {
            Value::String(text) => text,
            other => other.to_string(),
        });
        if let Some(message) = payload.message.or(payload.error).or(detail) {
            return compact_text(&message);
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed
    }
}
