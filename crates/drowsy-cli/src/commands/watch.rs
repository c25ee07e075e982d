//! Live capture: stdin scores run through the capture policy while a
//! background worker uploads what gets persisted.

use std::path::Path;

use drowsy_core::capture::{CaptureRecorder, CaptureTrigger};
use drowsy_core::sync::{SyncEngine, SyncWorker};
use drowsy_core::util::unix_millis_now;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::commands::common::{build_remote, load_config, open_store, parse_reading};
use crate::commands::sync::report_outcome;
use crate::error::CliError;
use crate::token_store::TokenStore;

const fn trigger_label(trigger: CaptureTrigger) -> &'static str {
    match trigger {
        CaptureTrigger::Threshold => "threshold",
        CaptureTrigger::Periodic => "periodic",
    }
}

pub async fn run_watch(
    threshold: Option<f32>,
    offline: bool,
    db_path: &Path,
    config_path: &Path,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let store = open_store(db_path).await?;

    let mut policy_config = config.capture.policy_config();
    if let Some(threshold) = threshold {
        if !threshold.is_finite() {
            return Err(CliError::InvalidReading(threshold.to_string()));
        }
        policy_config.threshold = threshold;
    }

    let remote = if offline {
        None
    } else {
        build_remote(&config, &TokenStore::default())?
    };
    let mut recorder = CaptureRecorder::new(store.clone(), policy_config);

    // The CLI has no connectivity probe; requests that fail are retried
    // with backoff instead.
    let (_online_tx, online_rx) = watch::channel(true);
    let worker = remote.as_ref().map(|remote| {
        SyncWorker::spawn(
            SyncEngine::new(store.clone(), remote.clone()),
            config.sync.worker_settings(),
            online_rx,
        )
    });
    if let Some(worker) = &worker {
        recorder = recorder.with_sync_trigger(worker.nudge());
    } else {
        tracing::info!("Watching without background sync");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut captured = 0_usize;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let input = match parse_reading(&line) {
            Ok(input) => input,
            Err(error) => {
                eprintln!("Skipping line: {error}");
                continue;
            }
        };

        let now_ms = input.at_ms.unwrap_or_else(unix_millis_now);
        if let Some(event) = recorder.observe(now_ms, input.score).await? {
            captured += 1;
            println!(
                "{}  {:>5.2}  {}",
                event.local_id,
                input.score,
                trigger_label(event.trigger)
            );
        }
    }

    tracing::info!("Input closed after {} captured readings", captured);
    if let Some(worker) = worker {
        worker.shutdown().await;
    }

    // Final flush so nothing captured in the last moments waits for the next session.
    match remote {
        Some(remote) => report_outcome(SyncEngine::new(store, remote).run_once().await),
        None => Ok(()),
    }
}
