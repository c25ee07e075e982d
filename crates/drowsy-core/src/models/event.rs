//! Fatigue event model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Store-assigned identity of a fatigue event.
///
/// Ascending and never reused; only the event store hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocalId(i64);

impl LocalId {
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// When a reading occurred.
///
/// Two timestamp columns exist for historical reasons: the primary
/// `captured_at` and the older `legacy_timestamp`. Callers only ever see the
/// resolved [`EventTime::effective`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventTime {
    primary: Option<i64>,
    legacy: Option<i64>,
}

impl EventTime {
    /// Timestamp for a new reading; both columns carry the same value.
    #[must_use]
    pub const fn at(millis: i64) -> Self {
        Self {
            primary: Some(millis),
            legacy: Some(millis),
        }
    }

    /// Rebuild from the raw column pair. A zero primary means "unset".
    #[must_use]
    pub const fn from_parts(primary: Option<i64>, legacy: Option<i64>) -> Self {
        let primary = match primary {
            Some(0) => None,
            other => other,
        };
        Self { primary, legacy }
    }

    #[must_use]
    pub const fn primary(&self) -> Option<i64> {
        self.primary
    }

    #[must_use]
    pub const fn legacy(&self) -> Option<i64> {
        self.legacy
    }

    /// Primary if non-zero, else legacy if present, else 0.
    #[must_use]
    pub const fn effective(&self) -> i64 {
        match (self.primary, self.legacy) {
            (Some(primary), _) if primary != 0 => primary,
            (_, Some(legacy)) => legacy,
            _ => 0,
        }
    }

    /// A record with no resolvable time is unusable and hidden from reads.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.effective() > 0
    }
}

/// A persisted fatigue reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueEvent {
    /// Store-assigned identity
    pub local_id: LocalId,
    /// Identity assigned by the remote service once accepted
    pub server_id: Option<String>,
    /// Primary/legacy timestamp pair
    pub time: EventTime,
    /// Fatigue intensity, nominally 0..=10 (not clamped)
    pub score: f32,
    /// True once the remote service accepted the record
    pub synced: bool,
    /// Client-generated idempotency key sent with uploads
    pub client_key: Option<String>,
}

impl FatigueEvent {
    #[must_use]
    pub const fn effective_time(&self) -> i64 {
        self.time.effective()
    }

    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.time.is_usable()
    }
}

/// A fatigue reading that has not been stored yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFatigueEvent {
    /// Explicit identity; `None` lets the store assign the next one
    pub local_id: Option<LocalId>,
    pub server_id: Option<String>,
    pub time: EventTime,
    pub score: f32,
    pub synced: bool,
    pub client_key: Option<String>,
}

impl NewFatigueEvent {
    /// A locally captured reading, pending upload, with a fresh idempotency key.
    #[must_use]
    pub fn captured(at_millis: i64, score: f32) -> Self {
        Self {
            local_id: None,
            server_id: None,
            time: EventTime::at(at_millis),
            score,
            synced: false,
            client_key: Some(Uuid::now_v7().to_string()),
        }
    }

    /// A reading hydrated from the remote service; already synced.
    #[must_use]
    pub fn backfilled(server_id: Option<String>, at_millis: i64, score: f32) -> Self {
        Self {
            local_id: None,
            server_id,
            time: EventTime::at(at_millis),
            score,
            synced: true,
            client_key: None,
        }
    }

    /// Request a specific local identity instead of an assigned one.
    #[must_use]
    pub const fn with_local_id(mut self, local_id: LocalId) -> Self {
        self.local_id = Some(local_id);
        self
    }

    #[must_use]
    pub const fn with_time(mut self, time: EventTime) -> Self {
        self.time = time;
        self
    }

    #[must_use]
    pub const fn effective_time(&self) -> i64 {
        self.time.effective()
    }
}
