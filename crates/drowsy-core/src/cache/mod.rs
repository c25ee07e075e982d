//! Read path for display surfaces.
//!
//! Ranges are served from the event store. A local miss may fall back to the
//! remote service, in which case the fetched records are written through to
//! the store and the range is read locally once more. The second read never
//! falls back, so a remote that is also empty cannot cause a loop.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DEFAULT_BACKFILL_WINDOW_DAYS;
use crate::models::{NewFatigueEvent, Reading, TimeRange};
use crate::remote::{RemoteClient, RemoteError, RemoteRecord};
use crate::services::EventStore;
use crate::util::unix_millis_now;
use crate::Result;

/// Where a view is allowed to get its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPolicy {
    /// Store first; fetch and backfill on a miss
    #[default]
    LocalFirst,
    /// Store only
    LocalOnly,
    /// Remote only, rendered without touching the store
    CloudOnly,
}

/// Which path produced a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewSource {
    Local,
    /// Local read after writing through a remote fallback
    Backfilled,
    Cloud,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeView {
    pub source: ViewSource,
    pub readings: Vec<Reading>,
}

impl RangeView {
    fn empty(source: ViewSource) -> Self {
        Self {
            source,
            readings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Ready(RangeView),
    /// A newer request started before this one finished; do not render
    Superseded,
}

impl LoadOutcome {
    #[must_use]
    pub fn into_view(self) -> Option<RangeView> {
        match self {
            Self::Ready(view) => Some(view),
            Self::Superseded => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error(transparent)]
    Store(#[from] crate::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub struct CacheCoordinator<R: RemoteClient> {
    store: EventStore,
    remote: R,
    backfill_window_days: u32,
    latest_request: AtomicU64,
}

impl<R: RemoteClient> CacheCoordinator<R> {
    pub const fn new(store: EventStore, remote: R) -> Self {
        Self {
            store,
            remote,
            backfill_window_days: DEFAULT_BACKFILL_WINDOW_DAYS,
            latest_request: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn with_backfill_window_days(mut self, days: u32) -> Self {
        self.backfill_window_days = days;
        self
    }

    /// Readings in the inclusive range, oldest first.
    ///
    /// Store errors are returned. Failures on the remote path render empty.
    pub async fn load_range(&self, range: TimeRange, policy: ReadPolicy) -> Result<LoadOutcome> {
        let ticket = self.begin_request();
        let view = match policy {
            ReadPolicy::CloudOnly => self.cloud_view(range).await,
            ReadPolicy::LocalOnly => self.local_view(range).await?,
            ReadPolicy::LocalFirst => self.read_through(range).await?,
        };
        Ok(self.finish_request(ticket, view))
    }

    /// Every reading, newest first.
    ///
    /// With fallback permitted, an empty store is hydrated from the trailing
    /// backfill window before the single re-read.
    pub async fn load_all(&self, policy: ReadPolicy) -> Result<LoadOutcome> {
        let ticket = self.begin_request();
        let view = match policy {
            ReadPolicy::CloudOnly => {
                let mut view = self.cloud_view(self.backfill_window()).await;
                view.readings.reverse();
                view
            }
            ReadPolicy::LocalOnly => self.all_local(ViewSource::Local).await?,
            ReadPolicy::LocalFirst => {
                let view = self.all_local(ViewSource::Local).await?;
                if view.readings.is_empty() {
                    self.try_backfill(self.backfill_window()).await;
                    self.all_local(ViewSource::Backfilled).await?
                } else {
                    view
                }
            }
        };
        Ok(self.finish_request(ticket, view))
    }

    /// Fetch the range from the remote service and write it through,
    /// regardless of what the store already holds.
    pub async fn refresh(&self, range: TimeRange) -> std::result::Result<usize, FallbackError> {
        let records = self.remote.fetch_range(range).await?;
        let events: Vec<NewFatigueEvent> = records.into_iter().map(backfill_event).collect();
        let written = self.store.insert_backfill(&events).await?;
        tracing::info!("Backfilled {} fatigue events for {:?}", written, range);
        Ok(written)
    }

    fn backfill_window(&self) -> TimeRange {
        TimeRange::trailing_days(unix_millis_now(), self.backfill_window_days)
    }

    fn begin_request(&self) -> u64 {
        self.latest_request.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn finish_request(&self, ticket: u64, view: RangeView) -> LoadOutcome {
        if self.latest_request.load(Ordering::SeqCst) == ticket {
            LoadOutcome::Ready(view)
        } else {
            tracing::debug!("Discarding stale view for request {}", ticket);
            LoadOutcome::Superseded
        }
    }

    async fn read_through(&self, range: TimeRange) -> Result<RangeView> {
        let view = self.local_view(range).await?;
        if !view.readings.is_empty() || range.is_empty() {
            return Ok(view);
        }

        self.try_backfill(range).await;
        let mut view = self.local_view(range).await?;
        view.source = ViewSource::Backfilled;
        Ok(view)
    }

    async fn try_backfill(&self, range: TimeRange) {
        if let Err(error) = self.refresh(range).await {
            tracing::warn!("Remote fallback failed, rendering local data only: {}", error);
        }
    }

    async fn local_view(&self, range: TimeRange) -> Result<RangeView> {
        let events = self.store.query_range(range).await?;
        Ok(RangeView {
            source: ViewSource::Local,
            readings: events.iter().map(Reading::from).collect(),
        })
    }

    async fn all_local(&self, source: ViewSource) -> Result<RangeView> {
        let events = self.store.query_all_descending().await?;
        Ok(RangeView {
            source,
            readings: events.iter().map(Reading::from).collect(),
        })
    }

    async fn cloud_view(&self, range: TimeRange) -> RangeView {
        match self.remote.fetch_range(range).await {
            Ok(records) => {
                let mut readings: Vec<Reading> = records.into_iter().map(cloud_reading).collect();
                readings.sort_by_key(|reading| reading.captured_at_ms);
                RangeView {
                    source: ViewSource::Cloud,
                    readings,
                }
            }
            Err(error) => {
                tracing::warn!("Cloud read failed, rendering empty view: {}", error);
                RangeView::empty(ViewSource::Cloud)
            }
        }
    }
}

fn backfill_event(record: RemoteRecord) -> NewFatigueEvent {
    NewFatigueEvent::backfilled(record.server_id, record.captured_at_ms, record.score)
}

fn cloud_reading(record: RemoteRecord) -> Reading {
    Reading {
        local_id: None,
        server_id: record.server_id,
        captured_at_ms: record.captured_at_ms,
        score: record.score,
        synced: true,
    }
}
