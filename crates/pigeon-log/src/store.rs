//! The append-only event log.
//!
//! All writes go through [`EventLog::append`], which assigns the next
//! [`RecordId`] and inserts the row inside one `BEGIN IMMEDIATE`
//! transaction. SQLite's writer lock serialises concurrent appends, so ids
//! are handed out in commit order and never repeat.
//!
//! Reads come in two shapes: [`EventLog::read_recent`] is a bounded,
//! newest-first snapshot, and [`EventLog::tail_from`] blocks until a record
//! after a cursor exists. Tail readers are woken through an in-process
//! `watch` channel carrying the latest committed id; the wait also selects
//! on a [`CancellationToken`], so a stop request unblocks it immediately.

use std::sync::Arc;

use pigeon_db::DbPool;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::LogError;
use crate::record::{Cursor, NewRecord, Record, RecordId};

/// Largest `limit` accepted by [`EventLog::read_recent`] unless configured.
pub const DEFAULT_MAX_RECENT_LIMIT: u32 = 100;

/// Tunables for an [`EventLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    /// Upper bound (inclusive) for `read_recent` limits.
    pub max_recent_limit: u32,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            max_recent_limit: DEFAULT_MAX_RECENT_LIMIT,
        }
    }
}

/// Handle to an opened event log.
///
/// Cheap to clone; clones share the same pool and head notifier.
#[derive(Clone)]
pub struct EventLog {
    pool: DbPool,
    settings: LogSettings,
    head: Arc<watch::Sender<Option<RecordId>>>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("settings", &self.settings)
            .field("head", &*self.head.borrow())
            .finish_non_exhaustive()
    }
}

impl EventLog {
    /// Opens the log on `pool`, creating the table on first use.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::StoreUnavailable`] if no connection can be
    /// obtained and [`LogError::Schema`] if an existing table has the wrong
    /// shape or a newer schema version.
    pub async fn open(pool: DbPool, settings: LogSettings) -> Result<Self, LogError> {
        let setup_pool = pool.clone();
        let head = tokio::task::spawn_blocking(move || -> Result<_, LogError> {
            let conn = setup_pool.get()?;
            pigeon_db::ensure_schema(&conn)?;
            last_id(&conn)
        })
        .await??;

        tracing::debug!(head = ?head, "opened event log");

        let (head_tx, _) = watch::channel(head);
        Ok(Self {
            pool,
            settings,
            head: Arc::new(head_tx),
        })
    }

    /// The configured settings.
    pub fn settings(&self) -> LogSettings {
        self.settings
    }

    /// Latest id committed through this handle (or seen at open).
    pub fn head(&self) -> Option<RecordId> {
        *self.head.borrow()
    }

    /// Appends a record and returns its newly assigned id.
    ///
    /// The id is strictly greater than every id assigned before this call
    /// committed. Once this returns, the record is visible to all readers
    /// and pending tail reads are woken.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::StoreUnavailable`] if the store cannot accept the
    /// write. Nothing is stored when an error is returned.
    pub async fn append(&self, record: NewRecord) -> Result<RecordId, LogError> {
        let pool = self.pool.clone();
        let id = tokio::task::spawn_blocking(move || -> Result<RecordId, LogError> {
            let mut conn = pool.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let id = RecordId::next_after(last_id(&tx)?, now_ms());
            tx.execute(
                "INSERT INTO event_log (ms, seq, payload_json, enriched_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    to_sql_int(id.ms),
                    to_sql_int(id.seq),
                    record.payload_json,
                    record.enriched_at,
                ],
            )?;
            tx.commit()?;
            Ok(id)
        })
        .await??;

        // Appends can finish committing out of order relative to each
        // other's notifications; the head only moves forward.
        self.head.send_if_modified(|head| {
            if *head < Some(id) {
                *head = Some(id);
                true
            } else {
                false
            }
        });

        tracing::trace!(%id, "appended record");
        Ok(id)
    }

    /// Returns up to `limit` of the newest records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] without touching storage when
    /// `limit` is zero or above the configured maximum.
    pub async fn read_recent(&self, limit: u32) -> Result<Vec<Record>, LogError> {
        let max = self.settings.max_recent_limit;
        if limit == 0 || limit > max {
            return Err(LogError::InvalidArgument(format!(
                "limit must be between 1 and {max}, got {limit}"
            )));
        }

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Record>, LogError> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare_cached(
                "SELECT ms, seq, payload_json, enriched_at
                 FROM event_log
                 ORDER BY ms DESC, seq DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit], record_from_row)?;
            let mut records = Vec::with_capacity(limit as usize);
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await?
    }

    /// Replaces [`Cursor::Tail`] with a concrete position: after the current
    /// newest record, or [`Cursor::Start`] if the log is empty. Other cursors
    /// are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::StoreUnavailable`] if the store cannot be read.
    pub async fn resolve(&self, cursor: Cursor) -> Result<Cursor, LogError> {
        match cursor {
            Cursor::Tail => {
                let pool = self.pool.clone();
                let last = tokio::task::spawn_blocking(move || {
                    let conn = pool.get()?;
                    last_id(&conn)
                })
                .await??;
                Ok(last.map_or(Cursor::Start, Cursor::After))
            }
            other => Ok(other),
        }
    }

    /// Blocks until a record after `cursor` exists and returns the earliest
    /// one.
    ///
    /// [`Cursor::Tail`] is first resolved against the current newest record,
    /// so only records appended after this call starts are returned.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Cancelled`] as soon as `cancel` fires, whether or
    /// not a record ever arrives, and [`LogError::StoreUnavailable`] if the
    /// store cannot be read.
    pub async fn tail_from(
        &self,
        cursor: &Cursor,
        cancel: &CancellationToken,
    ) -> Result<Record, LogError> {
        // Subscribe before the first read so an append that commits between
        // the read and the wait still marks the receiver as changed.
        let mut head = self.head.subscribe();

        let after = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(LogError::Cancelled),
            resolved = self.resolve(*cursor) => match resolved? {
                Cursor::After(id) => Some(id),
                Cursor::Start | Cursor::Tail => None,
            },
        };

        loop {
            head.borrow_and_update();

            let pool = self.pool.clone();
            let next = tokio::task::spawn_blocking(move || {
                let conn = pool.get()?;
                first_after(&conn, after)
            })
            .await??;

            if let Some(record) = next {
                return Ok(record);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(LogError::Cancelled),
                changed = head.changed() => {
                    if changed.is_err() {
                        return Err(LogError::StoreUnavailable("event log closed".to_string()));
                    }
                }
            }
        }
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

// Ids are far below i64::MAX in practice; saturate rather than wrap.
fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn last_id(conn: &Connection) -> Result<Option<RecordId>, LogError> {
    let id = conn
        .query_row(
            "SELECT ms, seq FROM event_log ORDER BY ms DESC, seq DESC LIMIT 1",
            [],
            |row| {
                Ok(RecordId::new(
                    from_sql_int(row.get(0)?),
                    from_sql_int(row.get(1)?),
                ))
            },
        )
        .optional()?;
    Ok(id)
}

fn first_after(conn: &Connection, after: Option<RecordId>) -> Result<Option<Record>, LogError> {
    let record = match after {
        None => conn
            .query_row(
                "SELECT ms, seq, payload_json, enriched_at
                 FROM event_log
                 ORDER BY ms ASC, seq ASC
                 LIMIT 1",
                [],
                record_from_row,
            )
            .optional()?,
        Some(id) => conn
            .query_row(
                "SELECT ms, seq, payload_json, enriched_at
                 FROM event_log
                 WHERE (ms, seq) > (?1, ?2)
                 ORDER BY ms ASC, seq ASC
                 LIMIT 1",
                params![to_sql_int(id.ms), to_sql_int(id.seq)],
                record_from_row,
            )
            .optional()?,
    };
    Ok(record)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        id: RecordId::new(from_sql_int(row.get(0)?), from_sql_int(row.get(1)?)),
        payload_json: row.get(2)?,
        enriched_at: row.get(3)?,
    })
}
