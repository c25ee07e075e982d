//! Engine configuration.
//!
//! One serde-friendly `EngineConfig` drives the capture policy, the remote
//! client, the sync worker, and the cache coordinator. Hosts persist it however
//! they like and may layer environment overrides on top with
//! [`EngineConfig::apply_env_overrides`].

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::CapturePolicyConfig;
use crate::error::{Error, Result};
use crate::remote::FetchSchema;
use crate::sync::WorkerSettings;
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_API_BASE_URL: &str = "DROWSY_API_BASE_URL";
pub const ENV_SUBJECT_ID: &str = "DROWSY_SUBJECT_ID";
pub const ENV_MEMBER_ID: &str = "DROWSY_MEMBER_ID";
pub const ENV_FETCH_SCHEMA: &str = "DROWSY_FETCH_SCHEMA";

pub(crate) const DEFAULT_BACKFILL_WINDOW_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend root, e.g. `https://api.example.com`
    pub api_base_url: Option<String>,
    /// Identity sent with uploads and legacy range fetches
    pub subject_id: Option<String>,
    /// Integer owner id for the member fetch schema
    pub member_id: Option<i64>,
    pub fetch_schema: FetchSchema,
    pub capture: CaptureSettings,
    pub sync: SyncSettings,
    /// Window hydrated by "show everything" views on an empty store
    pub backfill_window_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            subject_id: None,
            member_id: None,
            fetch_schema: FetchSchema::default(),
            capture: CaptureSettings::default(),
            sync: SyncSettings::default(),
            backfill_window_days: DEFAULT_BACKFILL_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub threshold: f32,
    pub cooldown_ms: u64,
    pub periodic_interval_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            cooldown_ms: 10_000,
            periodic_interval_ms: 60_000,
        }
    }
}

impl CaptureSettings {
    #[must_use]
    pub const fn policy_config(&self) -> CapturePolicyConfig {
        CapturePolicyConfig {
            threshold: self.threshold,
            cooldown: Duration::from_millis(self.cooldown_ms),
            periodic_interval: Duration::from_millis(self.periodic_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub periodic_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            initial_backoff_secs: 30,
            max_backoff_secs: 3_600,
            periodic_interval_secs: 900,
            request_timeout_secs: 20,
            connect_timeout_secs: 15,
        }
    }
}

impl SyncSettings {
    #[must_use]
    pub const fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            initial_backoff: Duration::from_secs(self.initial_backoff_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            periodic_interval: Duration::from_secs(self.periodic_interval_secs),
        }
    }
}

impl EngineConfig {
    /// Whether enough is configured to talk to the backend.
    pub fn remote_configured(&self) -> bool {
        self.api_base_url.is_some() && self.subject_id.is_some()
    }

    /// Parse a stored JSON config; missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Apply `DROWSY_*` environment variables on top of this config.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        let values: HashMap<String, String> = env::vars().collect();
        self.apply_overrides(|name| values.get(name).cloned())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = normalize_text_option(lookup(ENV_API_BASE_URL)) {
            self.api_base_url = Some(url);
        }
        if let Some(subject) = normalize_text_option(lookup(ENV_SUBJECT_ID)) {
            self.subject_id = Some(subject);
        }
        if let Some(member) = normalize_text_option(lookup(ENV_MEMBER_ID)) {
            let member_id = member.parse::<i64>().map_err(|_| {
                Error::Config(format!("{ENV_MEMBER_ID} must be an integer, got '{member}'"))
            })?;
            self.member_id = Some(member_id);
        }
        if let Some(schema) = normalize_text_option(lookup(ENV_FETCH_SCHEMA)) {
            self.fetch_schema = schema
                .parse()
                .map_err(|error| Error::Config(format!("{ENV_FETCH_SCHEMA}: {error}")))?;
        }
        Ok(())
    }

    /// Normalize text fields and reject values the engine cannot run with.
    pub fn validate(&mut self) -> Result<()> {
        self.api_base_url = normalize_text_option(self.api_base_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.subject_id = normalize_text_option(self.subject_id.take());

        if let Some(url) = &self.api_base_url {
            if !is_http_url(url) {
                return Err(Error::Config(
                    "api_base_url must start with http:// or https://".to_string(),
                ));
            }
        }
        if self.fetch_schema == FetchSchema::Member && self.member_id.is_none() {
            return Err(Error::Config(
                "member_id is required when fetch_schema is 'member'".to_string(),
            ));
        }
        if !self.capture.threshold.is_finite() {
            return Err(Error::Config("capture.threshold must be finite".to_string()));
        }
        if self.capture.cooldown_ms == 0 || self.capture.periodic_interval_ms == 0 {
            return Err(Error::Config(
                "capture intervals must be greater than zero".to_string(),
            ));
        }
        let sync = &self.sync;
        if sync.initial_backoff_secs == 0
            || sync.periodic_interval_secs == 0
            || sync.request_timeout_secs == 0
            || sync.connect_timeout_secs == 0
        {
            return Err(Error::Config(
                "sync intervals and timeouts must be greater than zero".to_string(),
            ));
        }
        if sync.max_backoff_secs < sync.initial_backoff_secs {
            return Err(Error::Config(
                "sync.max_backoff_secs must be at least initial_backoff_secs".to_string(),
            ));
        }
        if self.backfill_window_days == 0 {
            return Err(Error::Config(
                "backfill_window_days must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
