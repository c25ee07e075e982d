//! Fatigue event repository implementation

use crate::error::{Error, Result};
use crate::models::{EventTime, FatigueEvent, LocalId, NewFatigueEvent, ScoreSummary, TimeRange};
use libsql::{Connection, Row, Rows, Value};

/// Effective time as a SQL expression; never stored as a column.
const EFFECTIVE_TIME: &str =
    "(CASE WHEN captured_at = 0 THEN COALESCE(legacy_timestamp, 0) ELSE captured_at END)";

const EVENT_COLUMNS: &str =
    "local_id, server_id, captured_at, legacy_timestamp, score, synced, client_key";

/// Trait for fatigue event storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EventRepository {
    /// Insert one event and return its local identity
    async fn insert(&self, event: &NewFatigueEvent) -> Result<LocalId>;

    /// Insert remote-sourced events, replacing rows that share an identity
    async fn insert_backfill(&self, events: &[NewFatigueEvent]) -> Result<usize>;

    /// Get an event by local identity
    async fn get(&self, id: LocalId) -> Result<Option<FatigueEvent>>;

    /// Usable events whose effective time lies in the range, oldest first
    async fn query_range(&self, range: TimeRange) -> Result<Vec<FatigueEvent>>;

    /// Every usable event, newest first
    async fn query_all_descending(&self) -> Result<Vec<FatigueEvent>>;

    /// Events not yet accepted by the remote service, oldest first
    async fn unsynced(&self) -> Result<Vec<FatigueEvent>>;

    /// Flag an event as synced and attach its server identity
    async fn mark_synced(&self, id: LocalId, server_id: &str) -> Result<bool>;

    /// Remove one event
    async fn delete(&self, id: LocalId) -> Result<bool>;

    /// Remove every event
    async fn clear(&self) -> Result<u64>;

    /// Total number of stored rows, usable or not
    async fn count(&self) -> Result<u64>;

    /// Count/average/min/max of usable scores in the range
    async fn score_summary(&self, range: TimeRange) -> Result<ScoreSummary>;
}

/// libSQL implementation of `EventRepository`
pub struct LibSqlEventRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEventRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an event from a row selected with `EVENT_COLUMNS`
    #[allow(clippy::cast_possible_truncation)]
    fn parse_event(row: &Row) -> Result<FatigueEvent> {
        let local_id: i64 = row.get(0)?;
        let captured_at: i64 = row.get(2)?;
        let score: f64 = row.get(4)?;
        let synced: i64 = row.get(5)?;

        Ok(FatigueEvent {
            local_id: LocalId::new(local_id),
            server_id: optional_text(row.get_value(1)?),
            time: EventTime::from_parts(Some(captured_at), optional_integer(row.get_value(3)?)),
            score: score as f32,
            synced: synced != 0,
            client_key: optional_text(row.get_value(6)?),
        })
    }

    async fn collect_events(mut rows: Rows) -> Result<Vec<FatigueEvent>> {
        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(Self::parse_event(&row)?);
        }
        Ok(events)
    }

    async fn exists(&self, id: LocalId) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM fatigue_events WHERE local_id = ?)",
                [id.get()],
            )
            .await?;
        Ok(match rows.next().await? {
            Some(row) => row.get::<i64>(0)? != 0,
            None => false,
        })
    }

    async fn find_by_server_id(&self, server_id: &str) -> Result<Option<LocalId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT local_id FROM fatigue_events WHERE server_id = ? ORDER BY local_id ASC LIMIT 1",
                [server_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(LocalId::new(row.get(0)?))),
            None => Ok(None),
        }
    }

    /// A synced row without server identity carrying the same time and score
    async fn find_anonymous_duplicate(&self, event: &NewFatigueEvent) -> Result<Option<LocalId>> {
        let sql = format!(
            "SELECT local_id FROM fatigue_events
             WHERE server_id IS NULL AND synced = 1 AND {EFFECTIVE_TIME} = ? AND score = ?
             ORDER BY local_id ASC LIMIT 1"
        );
        let mut rows = self
            .conn
            .query(
                &sql,
                libsql::params![
                    Value::Integer(event.effective_time()),
                    Value::Real(f64::from(event.score))
                ],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(LocalId::new(row.get(0)?))),
            None => Ok(None),
        }
    }

    async fn insert_row(&self, event: &NewFatigueEvent) -> Result<LocalId> {
        let [server_id, captured_at, legacy, score, synced, client_key] = row_values(event);
        self.conn
            .execute(
                "INSERT INTO fatigue_events
                 (local_id, server_id, captured_at, legacy_timestamp, score, synced, client_key)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    event.local_id.map_or(Value::Null, |id| Value::Integer(id.get())),
                    server_id,
                    captured_at,
                    legacy,
                    score,
                    synced,
                    client_key
                ],
            )
            .await?;

        Ok(event
            .local_id
            .unwrap_or_else(|| LocalId::new(self.conn.last_insert_rowid())))
    }

    async fn replace_row(&self, id: LocalId, event: &NewFatigueEvent) -> Result<()> {
        let [server_id, captured_at, legacy, score, synced, client_key] = row_values(event);
        self.conn
            .execute(
                "UPDATE fatigue_events
                 SET server_id = ?, captured_at = ?, legacy_timestamp = ?, score = ?, synced = ?, client_key = ?
                 WHERE local_id = ?",
                libsql::params![
                    server_id,
                    captured_at,
                    legacy,
                    score,
                    synced,
                    client_key,
                    Value::Integer(id.get())
                ],
            )
            .await?;
        Ok(())
    }

    async fn backfill_rows(&self, events: &[NewFatigueEvent]) -> Result<usize> {
        let mut written = 0;

        for event in events {
            let known_local = match event.local_id {
                Some(id) => self.exists(id).await?.then_some(id),
                None => None,
            };
            let existing = match (known_local, &event.server_id) {
                (Some(id), _) => Some(id),
                (None, Some(server_id)) => self.find_by_server_id(server_id).await?,
                (None, None) => {
                    if let Some(duplicate) = self.find_anonymous_duplicate(event).await? {
                        tracing::debug!("Skipping backfill row already stored as {}", duplicate);
                        continue;
                    }
                    None
                }
            };

            match existing {
                Some(id) => self.replace_row(id, event).await?,
                None => {
                    self.insert_row(event).await?;
                }
            }
            written += 1;
        }

        Ok(written)
    }
}

impl EventRepository for LibSqlEventRepository<'_> {
    async fn insert(&self, event: &NewFatigueEvent) -> Result<LocalId> {
        if let Some(id) = event.local_id {
            if self.exists(id).await? {
                return Err(Error::Constraint(format!("local id {id} already exists")));
            }
        }
        self.insert_row(event).await
    }

    async fn insert_backfill(&self, events: &[NewFatigueEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        match self.backfill_rows(events).await {
            Ok(written) => {
                if let Err(e) = self.conn.execute("COMMIT", ()).await {
                    self.conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
                Ok(written)
            }
            Err(e) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                Err(e)
            }
        }
    }

    async fn get(&self, id: LocalId) -> Result<Option<FatigueEvent>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM fatigue_events WHERE local_id = ?");
        let rows = self.conn.query(&sql, [id.get()]).await?;
        Ok(Self::collect_events(rows).await?.pop())
    }

    async fn query_range(&self, range: TimeRange) -> Result<Vec<FatigueEvent>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM fatigue_events
             WHERE {EFFECTIVE_TIME} > 0 AND {EFFECTIVE_TIME} BETWEEN ? AND ?
             ORDER BY {EFFECTIVE_TIME} ASC, local_id ASC"
        );
        let rows = self.conn.query(&sql, [range.start, range.end]).await?;
        Self::collect_events(rows).await
    }

    async fn query_all_descending(&self) -> Result<Vec<FatigueEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM fatigue_events
             WHERE {EFFECTIVE_TIME} > 0
             ORDER BY {EFFECTIVE_TIME} DESC, local_id DESC"
        );
        let rows = self.conn.query(&sql, ()).await?;
        Self::collect_events(rows).await
    }

    async fn unsynced(&self) -> Result<Vec<FatigueEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM fatigue_events
             WHERE synced = 0
             ORDER BY {EFFECTIVE_TIME} ASC, local_id ASC"
        );
        let rows = self.conn.query(&sql, ()).await?;
        Self::collect_events(rows).await
    }

    async fn mark_synced(&self, id: LocalId, server_id: &str) -> Result<bool> {
        if server_id.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "event {id} cannot be marked synced without a server id"
            )));
        }
        let rows = self
            .conn
            .execute(
                "UPDATE fatigue_events SET synced = 1, server_id = ? WHERE local_id = ?",
                libsql::params![server_id, id.get()],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn delete(&self, id: LocalId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM fatigue_events WHERE local_id = ?", [id.get()])
            .await?;
        Ok(rows > 0)
    }

    async fn clear(&self) -> Result<u64> {
        let rows = self.conn.execute("DELETE FROM fatigue_events", ()).await?;
        Ok(rows)
    }

    async fn count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM fatigue_events", ())
            .await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn score_summary(&self, range: TimeRange) -> Result<ScoreSummary> {
        if range.is_empty() {
            return Ok(ScoreSummary::default());
        }

        let sql = format!(
            "SELECT COUNT(*), AVG(score), MIN(score), MAX(score) FROM fatigue_events
             WHERE {EFFECTIVE_TIME} > 0 AND {EFFECTIVE_TIME} BETWEEN ? AND ?"
        );
        let mut rows = self.conn.query(&sql, [range.start, range.end]).await?;
        let Some(row) = rows.next().await? else {
            return Ok(ScoreSummary::default());
        };

        let count: i64 = row.get(0)?;
        Ok(ScoreSummary {
            count: u64::try_from(count).unwrap_or_default(),
            average: optional_real(row.get_value(1)?),
            min: optional_real(row.get_value(2)?),
            max: optional_real(row.get_value(3)?),
        })
    }
}

/// Column values shared by insert and replace, in `EVENT_COLUMNS` order minus `local_id`
fn row_values(event: &NewFatigueEvent) -> [Value; 6] {
    [
        event
            .server_id
            .clone()
            .map_or(Value::Null, Value::Text),
        Value::Integer(event.time.primary().unwrap_or(0)),
        event.time.legacy().map_or(Value::Null, Value::Integer),
        Value::Real(f64::from(event.score)),
        Value::Integer(i64::from(event.synced)),
        event
            .client_key
            .clone()
            .map_or(Value::Null, Value::Text),
    ]
}

fn optional_text(value: Value) -> Option<String> {
    match value {
        Value::Text(text) => Some(text),
        _ => None,
    }
}

fn optional_integer(value: Value) -> Option<i64> {
    match value {
        Value::Integer(number) => Some(number),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn optional_real(value: Value) -> Option<f64> {
    match value {
        Value::Real(number) => Some(number),
        Value::Integer(number) => Some(number as f64),
        _ => None,
    }
}
