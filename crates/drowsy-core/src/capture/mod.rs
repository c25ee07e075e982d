//! Capture policy: turns a continuous score stream into sparse persisted events.
//!
//! Two rate limiters share one action. A threshold trigger fires when a score
//! reaches the threshold and the cooldown since the previous threshold fire
//! has elapsed. A periodic trigger fires when the periodic interval since the
//! last persist of either kind has elapsed. At most one event is persisted per
//! evaluated sample.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{LocalId, NewFatigueEvent};
use crate::services::EventStore;
use crate::sync::SyncTrigger;
use crate::util::duration_millis;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturePolicyConfig {
    /// Scores at or above this value are significant
    pub threshold: f32,
    /// Minimum spacing between threshold triggers
    pub cooldown: Duration,
    /// Maximum spacing between any two persists
    pub periodic_interval: Duration,
}

impl Default for CapturePolicyConfig {
    fn default() -> Self {
        crate::config::CaptureSettings::default().policy_config()
    }
}

/// Why a sample was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTrigger {
    Threshold,
    Periodic,
}

/// Two-timer rate limiter. Owned by the single producer feeding it scores.
#[derive(Debug, Clone)]
pub struct CapturePolicy {
    config: CapturePolicyConfig,
    cooldown_ms: i64,
    periodic_ms: i64,
    last_threshold_fire: Option<i64>,
    last_persist: Option<i64>,
}

impl CapturePolicy {
    #[must_use]
    pub fn new(config: CapturePolicyConfig) -> Self {
        Self {
            config,
            cooldown_ms: duration_millis(config.cooldown),
            periodic_ms: duration_millis(config.periodic_interval),
            last_threshold_fire: None,
            last_persist: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &CapturePolicyConfig {
        &self.config
    }

    /// Evaluate one sample and advance the timers when it should be kept.
    ///
    /// The periodic baseline is the first sample seen, so a session does not
    /// persist its very first below-threshold frame. When both triggers fire,
    /// `Threshold` is reported.
    pub fn evaluate(&mut self, now_ms: i64, score: f32) -> Option<CaptureTrigger> {
        let baseline = *self.last_persist.get_or_insert(now_ms);

        let threshold_fires = score >= self.config.threshold
            && self
                .last_threshold_fire
                .map_or(true, |last| now_ms.saturating_sub(last) >= self.cooldown_ms);
        let periodic_fires = now_ms.saturating_sub(baseline) >= self.periodic_ms;

        let trigger = if threshold_fires {
            self.last_threshold_fire = Some(now_ms);
            CaptureTrigger::Threshold
        } else if periodic_fires {
            CaptureTrigger::Periodic
        } else {
            return None;
        };

        self.last_persist = Some(now_ms);
        Some(trigger)
    }

    /// Forget all timing state, as at the start of a new session.
    pub fn reset(&mut self) {
        self.last_threshold_fire = None;
        self.last_persist = None;
    }
}

/// A sample that was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedEvent {
    pub local_id: LocalId,
    pub trigger: CaptureTrigger,
}

/// Couples a [`CapturePolicy`] with the event store and an optional sync nudge.
pub struct CaptureRecorder {
    policy: CapturePolicy,
    store: EventStore,
    sync_trigger: Option<Box<dyn SyncTrigger>>,
}

impl CaptureRecorder {
    #[must_use]
    pub fn new(store: EventStore, config: CapturePolicyConfig) -> Self {
        Self {
            policy: CapturePolicy::new(config),
            store,
            sync_trigger: None,
        }
    }

    /// Nudge a sync after every persisted event.
    #[must_use]
    pub fn with_sync_trigger(mut self, trigger: impl SyncTrigger + 'static) -> Self {
        self.sync_trigger = Some(Box::new(trigger));
        self
    }

    pub const fn policy(&self) -> &CapturePolicy {
        &self.policy
    }

    /// Feed one score; persists it when the policy says so.
    pub async fn observe(&mut self, now_ms: i64, score: f32) -> Result<Option<CapturedEvent>> {
        let Some(trigger) = self.policy.evaluate(now_ms, score) else {
            return Ok(None);
        };

        let local_id = self
            .store
            .insert(&NewFatigueEvent::captured(now_ms, score))
            .await?;
        tracing::debug!(
            "Captured fatigue event {} ({:?}, score {})",
            local_id,
            trigger,
            score
        );

        if let Some(sync_trigger) = &self.sync_trigger {
            sync_trigger.request_sync();
        }
        Ok(Some(CapturedEvent { local_id, trigger }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::models::{FatigueEvent, TimeRange};

    fn policy(threshold: f32, cooldown_ms: u64, periodic_ms: u64) -> CapturePolicy {
        CapturePolicy::new(CapturePolicyConfig {
            threshold,
            cooldown: Duration::from_millis(cooldown_ms),
            periodic_interval: Duration::from_millis(periodic_ms),
        })
    }

    fn persisted_times(policy: &mut CapturePolicy, samples: &[(i64, f32)]) -> Vec<i64> {
        samples
            .iter()
            .filter_map(|(at, score)| policy.evaluate(*at, *score).map(|_| *at))
            .collect()
    }

    #[test]
    fn cooldown_suppresses_repeated_threshold_hits() {
        let mut policy = policy(5.0, 10_000, 30_000);
        let kept = persisted_times(&mut policy, &[(0, 9.0), (5_000, 9.0), (11_000, 9.0)]);
        assert_eq!(kept, vec![0, 11_000]);
    }

    #[test]
    fn below_threshold_scores_only_persist_periodically() {
        let mut policy = policy(5.0, 10_000, 30_000);
        let kept = persisted_times(
            &mut policy,
            &[(0, 1.0), (10_000, 1.0), (29_999, 1.0), (30_000, 1.0), (45_000, 1.0), (60_000, 1.0)],
        );
        assert_eq!(kept, vec![30_000, 60_000]);
    }

    #[test]
    fn threshold_fire_restarts_the_periodic_window() {
        let mut policy = policy(5.0, 10_000, 30_000);
        assert_eq!(policy.evaluate(0, 1.0), None);
        assert_eq!(policy.evaluate(20_000, 8.0), Some(CaptureTrigger::Threshold));
        assert_eq!(policy.evaluate(30_000, 1.0), None);
        assert_eq!(policy.evaluate(50_000, 1.0), Some(CaptureTrigger::Periodic));
    }

    #[test]
    fn periodic_fire_does_not_reset_the_cooldown() {
        let mut policy = policy(5.0, 10_000, 3_000);
        assert_eq!(policy.evaluate(0, 9.0), Some(CaptureTrigger::Threshold));
        assert_eq!(policy.evaluate(4_000, 1.0), Some(CaptureTrigger::Periodic));
        // Periodic fired at 4s, but the threshold timer still counts from 0.
        assert_eq!(policy.evaluate(10_000, 9.0), Some(CaptureTrigger::Threshold));
    }

    #[test]
    fn both_triggers_in_one_sample_persist_once_as_threshold() {
        let mut policy = policy(5.0, 10_000, 30_000);
        assert_eq!(policy.evaluate(0, 1.0), None);
        assert_eq!(policy.evaluate(30_000, 9.0), Some(CaptureTrigger::Threshold));
        assert_eq!(policy.evaluate(30_000, 9.0), None);
    }

    #[test]
    fn sub_threshold_scores_never_touch_the_cooldown() {
        let mut policy = policy(5.0, 10_000, 60_000);
        assert_eq!(policy.evaluate(0, 9.0), Some(CaptureTrigger::Threshold));
        for at in (1_000..10_000).step_by(1_000) {
            assert_eq!(policy.evaluate(at, 4.9), None);
        }
        assert_eq!(policy.evaluate(10_000, 5.0), Some(CaptureTrigger::Threshold));
    }

    #[test]
    fn reset_starts_a_fresh_session() {
        let mut policy = policy(5.0, 10_000, 30_000);
        assert!(policy.evaluate(0, 9.0).is_some());
        policy.reset();
        assert_eq!(policy.evaluate(1_000, 9.0), Some(CaptureTrigger::Threshold));
    }

    #[test]
    fn nan_scores_never_cross_the_threshold() {
        let mut policy = policy(5.0, 10_000, 30_000);
        assert_eq!(policy.evaluate(0, f32::NAN), None);
    }

    struct CountingTrigger(Arc<AtomicUsize>);

    impl SyncTrigger for CountingTrigger {
        fn request_sync(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recorder_persists_kept_samples_and_nudges_sync() {
        let store = EventStore::open_in_memory().await.unwrap();
        let nudges = Arc::new(AtomicUsize::new(0));
        let mut recorder = CaptureRecorder::new(
            store.clone(),
            CapturePolicyConfig {
                threshold: 5.0,
                cooldown: Duration::from_secs(10),
                periodic_interval: Duration::from_secs(30),
            },
        )
        .with_sync_trigger(CountingTrigger(Arc::clone(&nudges)));

        let mut kept = Vec::new();
        for (at, score) in [(1_000, 9.0), (6_000, 9.0), (12_000, 9.0)] {
            if let Some(captured) = recorder.observe(at, score).await.unwrap() {
                kept.push(captured);
            }
        }

        assert_eq!(kept.len(), 2);
        assert!(kept
            .iter()
            .all(|captured| captured.trigger == CaptureTrigger::Threshold));
        assert_eq!(nudges.load(Ordering::SeqCst), 2);

        let events = store.query_range(TimeRange::new(0, 20_000)).await.unwrap();
        assert_eq!(
            events
                .iter()
                .map(FatigueEvent::effective_time)
                .collect::<Vec<_>>(),
            vec![1_000, 12_000]
        );
        assert!(events
            .iter()
            .all(|event| !event.synced && event.client_key.is_some()));
    }
}
