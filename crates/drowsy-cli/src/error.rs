use std::io;

use drowsy_core::cache::FallbackError;
use drowsy_core::remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] drowsy_core::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Fallback(#[from] FallbackError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No readings provided")]
    NoReadings,
    #[error("Invalid reading '{0}': expected `score` or `epoch_ms,score`")]
    InvalidReading(String),
    #[error("Invalid time '{0}': expected epoch milliseconds or RFC 3339")]
    InvalidTime(String),
    #[error("Invalid reading id: {0}")]
    InvalidEventId(String),
    #[error("Reading not found: {0}")]
    EventNotFound(String),
    #[error("Refusing to clear without --yes")]
    ClearNotConfirmed,
    #[error("Sync deferred: {0}")]
    SyncDeferred(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error(
        "Backend is not configured. Run `drowsy config init --api-base-url <URL> --subject-id <ID>`, or set DROWSY_API_BASE_URL and DROWSY_SUBJECT_ID."
    )]
    RemoteNotConfigured,
}
