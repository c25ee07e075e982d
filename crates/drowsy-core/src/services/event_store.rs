//! Shared event store handle used by the capture, sync, and read paths.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::db::{Database, EventRepository, LibSqlEventRepository};
use crate::models::{FatigueEvent, LocalId, NewFatigueEvent, ScoreSummary, TimeRange};
use crate::Result;

/// Thread-safe handle over the fatigue event database.
///
/// Every mutation holds the write half of one lock, so writes are applied one
/// at a time and a reader never observes a partially applied backfill. Reads
/// share the read half and may overlap each other.
#[derive(Clone)]
pub struct EventStore {
    db: Arc<RwLock<Database>>,
    db_path: Option<PathBuf>,
}

impl EventStore {
    /// Open an event store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::info!("Event store opened at {}", db_path.display());
        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory event store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location, if the store is file-backed.
    pub fn path(&self) -> Option<&std::path::Path> {
        self.db_path.as_deref()
    }

    /// Insert a new event and return its local identity.
    pub async fn insert(&self, event: &NewFatigueEvent) -> Result<LocalId> {
        let db = self.db.write().await;
        let repo = LibSqlEventRepository::new(db.connection());
        let id = repo.insert(event).await?;
        tracing::debug!("Stored fatigue event {} (score {})", id, event.score);
        Ok(id)
    }

    /// Hydrate the store from remote records in a single transaction.
    pub async fn insert_backfill(&self, events: &[NewFatigueEvent]) -> Result<usize> {
        let db = self.db.write().await;
        let repo = LibSqlEventRepository::new(db.connection());
        repo.insert_backfill(events).await
    }

    /// Fetch one event.
    pub async fn get(&self, id: LocalId) -> Result<Option<FatigueEvent>> {
        let db = self.db.read().await;
        let repo = LibSqlEventRepository::new(db.connection());
        repo.get(id).await
    }

    /// Usable events in the inclusive range, oldest first.
    pub async fn query_range(&self, range: TimeRange) -> Result<Vec<FatigueEvent>> {
        let db = self.db.read().await;
        let repo = LibSqlEventRepository::new(db.connection());
        repo.query_range(range).await
    }

    /// Every usable event, newest first.
    pub async fn query_all_descending(&self) -> Result<Vec<FatigueEvent>> {
        let db = self.db.read().await;
        let repo = LibSqlEventRepository::new(db.connection());
        repo.query_all_descending().await
    }

    /// Events pending upload, oldest first.
    pub async fn unsynced(&self) -> Result<Vec<FatigueEvent>> {
        let db = self.db.read().await;
        let repo = LibSqlEventRepository::new(db.connection());
        repo.unsynced().await
    }

    /// Record the server identity of an accepted event.
    pub async fn mark_synced(&self, id: LocalId, server_id: &str) -> Result<bool> {
        let db = self.db.write().await;
        let repo = LibSqlEventRepository::new(db.connection());
        repo.mark_synced(id, server_id).await
    }

    /// Delete one event.
    pub async fn delete(&self, id: LocalId) -> Result<bool> {
        let db = self.db.write().await;
        let repo = LibSqlEventRepository::new(db.connection());
        repo.delete(id).await
    }

    /// Delete every event.
    pub async fn clear(&self) -> Result<u64> {
        let db = self.db.write().await;
        let repo = LibSqlEventRepository::new(db.connection());
        let removed = repo.clear().await?;
        tracing::info!("Cleared {} fatigue events", removed);
        Ok(removed)
    }

    /// Number of stored rows.
    pub async fn count(&self) -> Result<u64> {
        let db = self.db.read().await;
        let repo = LibSqlEventRepository::new(db.connection());
        repo.count().await
    }

    /// Score statistics over the range.
    pub async fn score_summary(&self, range: TimeRange) -> Result<ScoreSummary> {
        let db = self.db.read().await;
        let repo = LibSqlEventRepository::new(db.connection());
        repo.score_summary(range).await
    }
}
