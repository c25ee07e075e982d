//! Upload of unsynced events and reconciliation of server identities.

use std::fmt;

use thiserror::Error;

use super::scheduler::{Job, JobConstraints, JobOutcome};
use crate::models::{FatigueEvent, LocalId};
use crate::remote::{CreatedRecord, RemoteClient, RemoteError, UploadItem};
use crate::services::EventStore;

/// Result of one sync attempt, reported to whoever scheduled it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No usable pending events; no request was made
    NothingToSync,
    Synced {
        uploaded: usize,
        reconciled: usize,
        /// Uploaded events with no matching created record; retried next run
        unmatched: usize,
        /// Pending events dropped from the batch for lacking a usable time
        skipped: usize,
    },
    /// The attempt failed and should be re-run later
    Retry { reason: String },
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NothingToSync => f.write_str("nothing to sync"),
            Self::Synced {
                uploaded,
                reconciled,
                unmatched,
                skipped,
            } => write!(
                f,
                "uploaded {uploaded}, reconciled {reconciled}, unmatched {unmatched}, skipped {skipped}"
            ),
            Self::Retry { reason } => write!(f, "retry scheduled: {reason}"),
        }
    }
}

#[derive(Debug, Error)]
enum SyncFailure {
    #[error("event store: {0}")]
    Store(#[from] crate::Error),
    #[error("{0}")]
    Remote(#[from] RemoteError),
}

impl SyncFailure {
    const fn is_retriable(&self) -> bool {
        match self {
            Self::Store(_) => true,
            Self::Remote(error) => error.is_retriable(),
        }
    }
}

/// Drains unsynced events to the remote service.
pub struct SyncEngine<R: RemoteClient> {
    store: EventStore,
    remote: R,
}

impl<R: RemoteClient> SyncEngine<R> {
    pub const fn new(store: EventStore, remote: R) -> Self {
        Self { store, remote }
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Run one attempt. Failures are absorbed into [`SyncOutcome::Retry`].
    pub async fn run_once(&self) -> SyncOutcome {
        match self.try_sync().await {
            Ok(outcome) => {
                if let SyncOutcome::Synced { .. } = &outcome {
                    tracing::info!("Sync finished: {}", outcome);
                }
                outcome
            }
            Err(error) => {
                if error.is_retriable() {
                    tracing::warn!("Sync attempt failed, will retry: {}", error);
                } else {
                    tracing::error!(
                        "Sync cannot succeed until the remote client is reconfigured: {}",
                        error
                    );
                }
                SyncOutcome::Retry {
                    reason: error.to_string(),
                }
            }
        }
    }

    async fn try_sync(&self) -> Result<SyncOutcome, SyncFailure> {
        let pending = self.store.unsynced().await?;
        if pending.is_empty() {
            return Ok(SyncOutcome::NothingToSync);
        }

        let (usable, unusable): (Vec<FatigueEvent>, Vec<FatigueEvent>) =
            pending.into_iter().partition(FatigueEvent::is_usable);
        for event in &unusable {
            tracing::debug!("Skipping event {} without a usable timestamp", event.local_id);
        }
        if usable.is_empty() {
            return Ok(SyncOutcome::NothingToSync);
        }

        let batch: Vec<UploadItem> = usable
            .iter()
            .map(|event| UploadItem {
                captured_at_ms: event.effective_time(),
                score: event.score,
                client_key: event.client_key.clone(),
            })
            .collect();
        let created = self.remote.upload_batch(&batch).await?;

        let matches = reconcile(&usable, created);
        for (local_id, server_id) in &matches {
            self.store.mark_synced(*local_id, server_id).await?;
        }

        let unmatched = usable.len() - matches.len();
        if unmatched > 0 {
            tracing::warn!(
                "{} uploaded events had no matching server record and stay pending",
                unmatched
            );
        }
        Ok(SyncOutcome::Synced {
            uploaded: batch.len(),
            reconciled: matches.len(),
            unmatched,
            skipped: unusable.len(),
        })
    }
}

impl<R: RemoteClient + 'static> Job for SyncEngine<R> {
    fn constraints(&self) -> JobConstraints {
        JobConstraints {
            requires_network: true,
        }
    }

    async fn run(&self) -> JobOutcome {
        if self.run_once().await.is_retry() {
            JobOutcome::Retry
        } else {
            JobOutcome::Success
        }
    }
}

/// Pair local events with the records the server created for them.
///
/// An echoed idempotency key is an exact match. Events left over fall back to
/// `(captured_at_ms, score)` equality against records that echoed no key.
/// Every created record is claimed by at most one event.
fn reconcile(events: &[FatigueEvent], created: Vec<CreatedRecord>) -> Vec<(LocalId, String)> {
    let mut available: Vec<Option<CreatedRecord>> = created.into_iter().map(Some).collect();
    let mut matches = Vec::with_capacity(events.len());
    let mut leftovers = Vec::new();

    for event in events {
        let slot = event.client_key.as_deref().and_then(|key| {
            available.iter().position(|record| {
                record
                    .as_ref()
                    .is_some_and(|record| record.client_key.as_deref() == Some(key))
            })
        });
        match slot.and_then(|index| available[index].take()) {
            Some(record) => matches.push((event.local_id, record.server_id)),
            None => leftovers.push(event),
        }
    }

    for event in leftovers {
        let slot = available.iter().position(|record| {
            record.as_ref().is_some_and(|record| {
                record.client_key.is_none()
                    && record.captured_at_ms == event.effective_time()
                    && same_score(record.score, event.score)
            })
        });
        if let Some(record) = slot.and_then(|index| available[index].take()) {
            matches.push((event.local_id, record.server_id));
        }
    }

    matches
}

#[allow(clippy::float_cmp)]
fn same_score(left: f32, right: f32) -> bool {
    left == right
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{EventTime, NewFatigueEvent};
    use crate::test_support::{FakeRemote, UploadMode};

    async fn engine_with(fake: FakeRemote) -> (SyncEngine<Arc<FakeRemote>>, EventStore, Arc<FakeRemote>) {
        let store = EventStore::open_in_memory().await.unwrap();
        let fake = Arc::new(fake);
        (
            SyncEngine::new(store.clone(), Arc::clone(&fake)),
            store,
            fake,
        )
    }

    fn event(local_id: i64, at: i64, score: f32, key: Option<&str>) -> FatigueEvent {
        FatigueEvent {
            local_id: LocalId::new(local_id),
            server_id: None,
            time: EventTime::at(at),
            score,
            synced: false,
            client_key: key.map(str::to_string),
        }
    }

    fn created(server_id: &str, at: i64, score: f32, key: Option<&str>) -> CreatedRecord {
        CreatedRecord {
            server_id: server_id.to_string(),
            captured_at_ms: at,
            score,
            client_key: key.map(str::to_string),
        }
    }

    #[test]
    fn reconcile_prefers_echoed_keys_over_values() {
        let events = [event(1, 1_000, 5.0, Some("a")), event(2, 1_000, 5.0, Some("b"))];
        let response = vec![created("s-b", 1_000, 5.0, Some("b")), created("s-a", 1_000, 5.0, Some("a"))];

        assert_eq!(
            reconcile(&events, response),
            vec![
                (LocalId::new(1), "s-a".to_string()),
                (LocalId::new(2), "s-b".to_string())
            ]
        );
    }

    #[test]
    fn reconcile_value_match_claims_each_record_once() {
        let events = [event(1, 1_000, 5.0, None), event(2, 1_000, 5.0, None)];
        let response = vec![created("s-1", 1_000, 5.0, None)];

        assert_eq!(
            reconcile(&events, response),
            vec![(LocalId::new(1), "s-1".to_string())]
        );
    }

    #[test]
    fn reconcile_ignores_records_keyed_for_other_events() {
        let events = [event(1, 1_000, 5.0, None)];
        let response = vec![created("s-x", 1_000, 5.0, Some("someone-else"))];
        assert!(reconcile(&events, response).is_empty());
    }

    #[test]
    fn reconcile_requires_exact_values() {
        let events = [event(1, 1_000, 5.0, Some("a"))];
        let response = vec![created("s-1", 1_000, 5.5, None), created("s-2", 1_001, 5.0, None)];
        assert!(reconcile(&events, response).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_store_makes_no_network_call() {
        let (engine, _store, fake) = engine_with(FakeRemote::new()).await;
        assert_eq!(engine.run_once().await, SyncOutcome::NothingToSync);
        assert_eq!(fake.network_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_run_after_success_makes_no_network_call() {
        let (engine, store, fake) = engine_with(FakeRemote::new()).await;
        store.insert(&NewFatigueEvent::captured(1_000, 6.0)).await.unwrap();
        store.insert(&NewFatigueEvent::captured(2_000, 3.0)).await.unwrap();

        assert_eq!(
            engine.run_once().await,
            SyncOutcome::Synced {
                uploaded: 2,
                reconciled: 2,
                unmatched: 0,
                skipped: 0,
            }
        );
        assert_eq!(fake.upload_calls(), 1);

        assert_eq!(engine.run_once().await, SyncOutcome::NothingToSync);
        assert_eq!(fake.network_calls(), 1);

        let events = store.query_all_descending().await.unwrap();
        assert!(events
            .iter()
            .all(|event| event.synced && event.server_id.is_some()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_projects_effective_time_and_keys() {
        let (engine, store, fake) = engine_with(FakeRemote::new()).await;
        let legacy_only = NewFatigueEvent::captured(0, 4.0)
            .with_time(EventTime::from_parts(Some(0), Some(7_000)));
        store.insert(&legacy_only).await.unwrap();

        engine.run_once().await;

        let uploads = fake.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0][0].captured_at_ms, 7_000);
        assert_eq!(uploads[0][0].client_key, legacy_only.client_key);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unusable_events_are_skipped() {
        let (engine, store, fake) = engine_with(FakeRemote::new()).await;
        store
            .insert(&NewFatigueEvent::captured(0, 4.0).with_time(EventTime::from_parts(None, None)))
            .await
            .unwrap();

        assert_eq!(engine.run_once().await, SyncOutcome::NothingToSync);
        assert_eq!(fake.network_calls(), 0);

        store.insert(&NewFatigueEvent::captured(5_000, 4.0)).await.unwrap();
        assert_eq!(
            engine.run_once().await,
            SyncOutcome::Synced {
                uploaded: 1,
                reconciled: 1,
                unmatched: 0,
                skipped: 1,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_failure_is_retriable_and_leaves_events_pending() {
        let fake = FakeRemote::new();
        fake.set_upload_mode(UploadMode::Unavailable);
        let (engine, store, fake) = engine_with(fake).await;
        store.insert(&NewFatigueEvent::captured(1_000, 6.0)).await.unwrap();

        let outcome = engine.run_once().await;
        assert!(outcome.is_retry());
        assert_eq!(store.unsynced().await.unwrap().len(), 1);

        fake.set_upload_mode(UploadMode::EchoWithKeys);
        assert!(!engine.run_once().await.is_retry());
        assert!(store.unsynced().await.unwrap().is_empty());
    }

    #[test]
    fn only_configuration_failures_are_not_retriable() {
        assert!(SyncFailure::from(crate::remote::RemoteError::InvalidPayload("x".to_string()))
            .is_retriable());
        assert!(SyncFailure::from(crate::Error::Config("x".to_string())).is_retriable());
        assert!(!SyncFailure::from(crate::remote::RemoteError::InvalidConfiguration(
            "x".to_string()
        ))
        .is_retriable());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn configuration_failure_still_reports_retry_with_reason() {
        let fake = FakeRemote::new();
        fake.set_upload_mode(UploadMode::Misconfigured);
        let (engine, store, _fake) = engine_with(fake).await;
        store.insert(&NewFatigueEvent::captured(1_000, 6.0)).await.unwrap();

        match engine.run_once().await {
            SyncOutcome::Retry { reason } => assert!(reason.contains("subject id")),
            other => panic!("expected retry, got {other:?}"),
        }
        assert_eq!(store.unsynced().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn value_matching_without_echoed_keys() {
        let fake = FakeRemote::new();
        fake.set_upload_mode(UploadMode::EchoWithoutKeys);
        let (engine, store, _fake) = engine_with(fake).await;
        let first = store.insert(&NewFatigueEvent::captured(1_000, 6.0)).await.unwrap();
        let second = store.insert(&NewFatigueEvent::captured(1_000, 6.0)).await.unwrap();

        engine.run_once().await;

        let first = store.get(first).await.unwrap().unwrap();
        let second = store.get(second).await.unwrap().unwrap();
        assert!(first.synced && second.synced);
        assert_ne!(first.server_id, second.server_id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unmatched_events_stay_pending() {
        let fake = FakeRemote::new();
        fake.set_upload_mode(UploadMode::Respond(vec![created("s-1", 1_000, 6.0, None)]));
        let (engine, store, _fake) = engine_with(fake).await;
        store.insert(&NewFatigueEvent::captured(1_000, 6.0)).await.unwrap();
        let orphan = store.insert(&NewFatigueEvent::captured(2_000, 6.0)).await.unwrap();

        assert_eq!(
            engine.run_once().await,
            SyncOutcome::Synced {
                uploaded: 2,
                reconciled: 1,
                unmatched: 1,
                skipped: 0,
            }
        );
        let pending = store.unsynced().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].local_id, orphan);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_job_reports_retry_on_failure() {
        let fake = FakeRemote::new();
        fake.set_upload_mode(UploadMode::Unavailable);
        let (engine, store, _fake) = engine_with(fake).await;
        store.insert(&NewFatigueEvent::captured(1_000, 6.0)).await.unwrap();

        assert!(engine.constraints().requires_network);
        assert_eq!(engine.run().await, JobOutcome::Retry);
    }
}
