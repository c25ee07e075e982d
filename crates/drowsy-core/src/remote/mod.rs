//! Remote service boundary.
//!
//! The sync engine and cache coordinator only talk to the backend through the
//! [`RemoteClient`] trait. [`HttpRemoteClient`] is the production
//! implementation; tests substitute in-process fakes.

mod http;
mod mapping;
mod wire;

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::TimeRange;

pub use http::HttpRemoteClient;
pub use mapping::{fatigue_level_to_score, parse_iso_millis};

/// Failure of a whole remote call.
///
/// Per-record decoding problems are not represented here: the offending
/// record is dropped and the rest of the response is used.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Remote service returned HTTP {status}: {message}")]
    Server { status: u16, message: String },
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

impl RemoteError {
    /// Whether a later attempt may succeed without operator action.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        !matches!(self, Self::InvalidConfiguration(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Which range-fetch contract the backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchSchema {
    /// `GET driving_records?user_id=&start_ms=&end_ms=` returning epoch millis
    #[default]
    Legacy,
    /// `GET driving_records?member_id=` returning ISO times and level labels
    Member,
}

impl fmt::Display for FetchSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::Member => f.write_str("member"),
        }
    }
}

impl FromStr for FetchSchema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "member" | "alternate" => Ok(Self::Member),
            other => Err(format!("unknown fetch schema '{other}'")),
        }
    }
}

/// One event projected for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadItem {
    pub captured_at_ms: i64,
    pub score: f32,
    /// Idempotency key the server may echo back
    pub client_key: Option<String>,
}

/// A record the server created in response to an upload.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedRecord {
    pub server_id: String,
    pub captured_at_ms: i64,
    pub score: f32,
    pub client_key: Option<String>,
}

/// A record returned by a range fetch, already mapped to the local model.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub server_id: Option<String>,
    pub captured_at_ms: i64,
    pub score: f32,
}

/// Request/response contract with the backend.
pub trait RemoteClient: Send + Sync {
    /// Upload a batch; the response lists the records the server created.
    fn upload_batch(
        &self,
        items: &[UploadItem],
    ) -> impl Future<Output = RemoteResult<Vec<CreatedRecord>>> + Send;

    /// Fetch records whose time lies in the inclusive range.
    fn fetch_range(
        &self,
        range: TimeRange,
    ) -> impl Future<Output = RemoteResult<Vec<RemoteRecord>>> + Send;
}

impl<R: RemoteClient> RemoteClient for Arc<R> {
    fn upload_batch(
        &self,
        items: &[UploadItem],
    ) -> impl Future<Output = RemoteResult<Vec<CreatedRecord>>> + Send {
        (**self).upload_batch(items)
    }

    fn fetch_range(
        &self,
        range: TimeRange,
    ) -> impl Future<Output = RemoteResult<Vec<RemoteRecord>>> + Send {
        (**self).fetch_range(range)
    }
}

/// Supplies the optional bearer token attached to every request.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token (or none).
#[derive(Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self(crate::util::normalize_text_option(token))
    }

    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.0.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_tuple("StaticToken").field(&token).finish()
    }
}

impl TokenSource for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}
