//! Shared read path for `list` and `range`.

use drowsy_core::cache::{CacheCoordinator, LoadOutcome, RangeView, ReadPolicy, ViewSource};
use drowsy_core::config::EngineConfig;
use drowsy_core::models::TimeRange;
use drowsy_core::remote::{
    CreatedRecord, RemoteClient, RemoteError, RemoteRecord, RemoteResult, UploadItem,
};
use drowsy_core::EventStore;

use crate::commands::common::build_remote;
use crate::error::CliError;
use crate::token_store::TokenStore;

#[derive(Debug, Clone, Copy)]
pub enum ViewRequest {
    All,
    Range(TimeRange),
}

/// Stand-in remote used when no backend is configured; only ever paired with
/// [`ReadPolicy::LocalOnly`].
struct NoBackend;

impl RemoteClient for NoBackend {
    async fn upload_batch(&self, _items: &[UploadItem]) -> RemoteResult<Vec<CreatedRecord>> {
        Err(not_configured())
    }

    async fn fetch_range(&self, _range: TimeRange) -> RemoteResult<Vec<RemoteRecord>> {
        Err(not_configured())
    }
}

fn not_configured() -> RemoteError {
    RemoteError::InvalidConfiguration("no backend configured".to_string())
}

pub async fn load_view(
    store: EventStore,
    config: &EngineConfig,
    request: ViewRequest,
    policy: ReadPolicy,
    tokens: &TokenStore,
) -> Result<RangeView, CliError> {
    match build_remote(config, tokens)? {
        Some(remote) => {
            let coordinator = CacheCoordinator::new(store, remote)
                .with_backfill_window_days(config.backfill_window_days);
            resolve(&coordinator, request, policy).await
        }
        None => {
            if policy == ReadPolicy::CloudOnly {
                return Err(CliError::RemoteNotConfigured);
            }
            tracing::debug!("No backend configured, reading local data only");
            let coordinator = CacheCoordinator::new(store, NoBackend);
            resolve(&coordinator, request, ReadPolicy::LocalOnly).await
        }
    }
}

async fn resolve<R: RemoteClient>(
    coordinator: &CacheCoordinator<R>,
    request: ViewRequest,
    policy: ReadPolicy,
) -> Result<RangeView, CliError> {
    let outcome = match request {
        ViewRequest::All => coordinator.load_all(policy).await?,
        ViewRequest::Range(range) => coordinator.load_range(range, policy).await?,
    };
    Ok(match outcome {
        LoadOutcome::Ready(view) => view,
        LoadOutcome::Superseded => RangeView {
            source: ViewSource::Local,
            readings: Vec::new(),
        },
    })
}
