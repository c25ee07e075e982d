//! Read-side projections

use serde::{Deserialize, Serialize};

use super::{FatigueEvent, LocalId};

/// Inclusive time window in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    #[must_use]
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// The window ending at `end` that spans `days` whole days.
    #[must_use]
    pub fn trailing_days(end: i64, days: u32) -> Self {
        let span = i64::from(days).saturating_mul(24 * 60 * 60 * 1000);
        Self {
            start: end.saturating_sub(span),
            end,
        }
    }

    #[must_use]
    pub const fn contains(&self, millis: i64) -> bool {
        millis >= self.start && millis <= self.end
    }

    /// An inverted range matches nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// What a display surface renders for one reading.
///
/// Cloud-only views render remote records that never touch the store, so the
/// local identity is optional here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub local_id: Option<LocalId>,
    pub server_id: Option<String>,
    pub captured_at_ms: i64,
    pub score: f32,
    pub synced: bool,
}

impl From<&FatigueEvent> for Reading {
    fn from(event: &FatigueEvent) -> Self {
        Self {
            local_id: Some(event.local_id),
            server_id: event.server_id.clone(),
            captured_at_ms: event.effective_time(),
            score: event.score,
            synced: event.synced,
        }
    }
}

/// Aggregate over the usable events of a time range
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub count: u64,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}
