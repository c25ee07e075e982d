//! In-process job scheduling for background sync.
//!
//! A [`Job`] is a unit of work that reports success or a retriable failure.
//! [`SyncWorker`] owns when it runs: it coalesces nudges, periodic ticks, and
//! connectivity changes into single runs, holds off while the network is down
//! if the job requires it, and spaces retries with capped exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// Re-run later, after backoff
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobConstraints {
    pub requires_network: bool,
}

pub trait Job: Send + Sync + 'static {
    fn constraints(&self) -> JobConstraints;

    fn run(&self) -> impl Future<Output = JobOutcome> + Send;
}

/// Something that can be asked to sync soon.
pub trait SyncTrigger: Send + Sync {
    fn request_sync(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub periodic_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        crate::config::SyncSettings::default().worker_settings()
    }
}

/// Delay before retry number `attempt` (1-based): doubles from the initial
/// backoff and never exceeds the maximum.
pub fn backoff_delay(settings: &WorkerSettings, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    settings
        .initial_backoff
        .saturating_mul(1_u32 << exponent)
        .min(settings.max_backoff)
}

/// Cheap, cloneable nudge for a running [`SyncWorker`].
///
/// Nudges that arrive before the next run starts are folded into that run.
#[derive(Debug, Clone)]
pub struct SyncNudge(mpsc::Sender<()>);

impl SyncTrigger for SyncNudge {
    fn request_sync(&self) {
        // A full channel already guarantees a run.
        let _ = self.0.try_send(());
    }
}

/// Background loop that runs one job under the scheduling rules above.
pub struct SyncWorker<J: Job> {
    job: J,
    settings: WorkerSettings,
    connectivity: watch::Receiver<bool>,
    nudges: mpsc::Receiver<()>,
    shutdown: watch::Receiver<bool>,
}

/// Owner side of a spawned [`SyncWorker`].
#[derive(Debug)]
pub struct SyncWorkerHandle {
    nudge: SyncNudge,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncWorkerHandle {
    pub fn nudge(&self) -> SyncNudge {
        self.nudge.clone()
    }

    /// Stop the worker, letting an in-flight run finish first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            tracing::warn!("Sync worker ended abnormally: {}", error);
        }
    }
}

impl SyncTrigger for SyncWorkerHandle {
    fn request_sync(&self) {
        self.nudge.request_sync();
    }
}

impl<J: Job> SyncWorker<J> {
    /// Spawn the worker on the current runtime.
    ///
    /// `connectivity` reports whether the network is reachable; pending work
    /// also runs when it flips to `true`. The job runs once at start to drain
    /// anything left from a previous session.
    pub fn spawn(
        job: J,
        settings: WorkerSettings,
        connectivity: watch::Receiver<bool>,
    ) -> SyncWorkerHandle {
        let (nudge_tx, nudge_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Self {
            job,
            settings,
            connectivity,
            nudges: nudge_rx,
            shutdown: shutdown_rx,
        };

        SyncWorkerHandle {
            nudge: SyncNudge(nudge_tx),
            shutdown: shutdown_tx,
            task: tokio::spawn(worker.run_loop()),
        }
    }

    async fn run_loop(mut self) {
        let mut pending = true;
        let mut attempt: u32 = 0;
        let mut next_periodic = Instant::now() + self.settings.periodic_interval;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            if pending {
                if self.job.constraints().requires_network && !self.wait_for_network().await {
                    break;
                }
                while self.nudges.try_recv().is_ok() {}

                match self.job.run().await {
                    JobOutcome::Success => {
                        attempt = 0;
                        pending = false;
                        next_periodic = Instant::now() + self.settings.periodic_interval;
                    }
                    JobOutcome::Retry => {
                        attempt = attempt.saturating_add(1);
                        let delay = backoff_delay(&self.settings, attempt);
                        tracing::debug!("Sync retry {} scheduled in {:?}", attempt, delay);
                        tokio::select! {
                            () = sleep(delay) => {}
                            _ = self.shutdown.changed() => break,
                        }
                    }
                }
                continue;
            }

            tokio::select! {
                _ = self.shutdown.changed() => break,
                Some(()) = self.nudges.recv() => pending = true,
                () = sleep_until(next_periodic) => pending = true,
                changed = self.connectivity.changed(), if self.connectivity.has_changed().is_ok() => {
                    if changed.is_ok() && *self.connectivity.borrow_and_update() {
                        tracing::debug!("Connectivity regained, syncing");
                        pending = true;
                    }
                }
            }
        }

        tracing::debug!("Sync worker stopped");
    }

    /// Block until the network is reported up. Returns `false` on shutdown.
    async fn wait_for_network(&mut self) -> bool {
        loop {
            if *self.connectivity.borrow_and_update() {
                return true;
            }

            tracing::debug!("Waiting for connectivity before syncing");
            tokio::select! {
                _ = self.shutdown.changed() => return false,
                changed = self.connectivity.changed() => {
                    if changed.is_err() {
                        // Nobody can report connectivity anymore; wait for shutdown.
                        let _ = self.shutdown.changed().await;
                        return false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct ScriptedJob {
        outcomes: Arc<Mutex<VecDeque<JobOutcome>>>,
        runs: Arc<Mutex<Vec<Instant>>>,
        offline_ok: bool,
    }

    impl ScriptedJob {
        fn with_outcomes(outcomes: &[JobOutcome]) -> Self {
            Self {
                outcomes: Arc::new(Mutex::new(outcomes.iter().copied().collect())),
                ..Self::default()
            }
        }

        fn run_count(&self) -> usize {
            self.runs.lock().unwrap().len()
        }

        fn run_times(&self) -> Vec<Instant> {
            self.runs.lock().unwrap().clone()
        }
    }

    impl Job for ScriptedJob {
        fn constraints(&self) -> JobConstraints {
            JobConstraints {
                requires_network: !self.offline_ok,
            }
        }

        async fn run(&self) -> JobOutcome {
            self.runs.lock().unwrap().push(Instant::now());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(JobOutcome::Success)
        }
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(100),
            periodic_interval: Duration::from_secs(900),
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let settings = settings();
        assert_eq!(backoff_delay(&settings, 1), Duration::from_secs(30));
        assert_eq!(backoff_delay(&settings, 2), Duration::from_secs(60));
        assert_eq!(backoff_delay(&settings, 3), Duration::from_secs(100));
        assert_eq!(backoff_delay(&settings, 40), Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_at_start_then_on_nudge() {
        let job = ScriptedJob::default();
        let (_online, connectivity) = watch::channel(true);
        let handle = SyncWorker::spawn(job.clone(), settings(), connectivity);

        settle().await;
        assert_eq!(job.run_count(), 1);

        handle.request_sync();
        settle().await;
        assert_eq!(job.run_count(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn nudges_while_idle_coalesce_into_one_run() {
        let job = ScriptedJob::default();
        let (_online, connectivity) = watch::channel(true);
        let handle = SyncWorker::spawn(job.clone(), settings(), connectivity);
        settle().await;

        let nudge = handle.nudge();
        for _ in 0..5 {
            nudge.request_sync();
        }
        settle().await;
        assert_eq!(job.run_count(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retries_back_off_exponentially() {
        let job = ScriptedJob::with_outcomes(&[JobOutcome::Retry, JobOutcome::Retry]);
        let (_online, connectivity) = watch::channel(true);
        let handle = SyncWorker::spawn(job.clone(), settings(), connectivity);

        tokio::time::sleep(Duration::from_secs(200)).await;
        let runs = job.run_times();
        assert_eq!(runs.len(), 3);
        let first_gap = runs[1] - runs[0];
        let second_gap = runs[2] - runs[1];
        assert!(first_gap >= Duration::from_secs(30) && first_gap < Duration::from_secs(31));
        assert!(second_gap >= Duration::from_secs(60) && second_gap < Duration::from_secs(61));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_tick_runs_the_job() {
        let job = ScriptedJob::default();
        let (_online, connectivity) = watch::channel(true);
        let handle = SyncWorker::spawn(job.clone(), settings(), connectivity);

        tokio::time::sleep(Duration::from_secs(901)).await;
        assert_eq!(job.run_count(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_connectivity_before_running() {
        let job = ScriptedJob::default();
        let (online, connectivity) = watch::channel(false);
        let handle = SyncWorker::spawn(job.clone(), settings(), connectivity);

        settle().await;
        handle.request_sync();
        settle().await;
        assert_eq!(job.run_count(), 0);

        online.send(true).unwrap();
        settle().await;
        assert_eq!(job.run_count(), 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn regained_connectivity_triggers_a_run() {
        let job = ScriptedJob::default();
        let (online, connectivity) = watch::channel(true);
        let handle = SyncWorker::spawn(job.clone(), settings(), connectivity);
        settle().await;
        assert_eq!(job.run_count(), 1);

        online.send(false).unwrap();
        settle().await;
        online.send(true).unwrap();
        settle().await;
        assert_eq!(job.run_count(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_without_network_constraint_ignore_connectivity() {
        let job = ScriptedJob {
            offline_ok: true,
            ..ScriptedJob::default()
        };
        let (_offline, connectivity) = watch::channel(false);
        let handle = SyncWorker::spawn(job.clone(), settings(), connectivity);

        settle().await;
        assert_eq!(job.run_count(), 1);

        handle.shutdown().await;
    }
}
