//! Event log schema setup and verification.
//!
//! The table definition is embedded from `schema/event_log.sql` and applied
//! with `CREATE TABLE IF NOT EXISTS`. The schema revision lives in SQLite's
//! `user_version` header field. Opening a database that already holds an
//! `event_log` table checks that rows are still keyed by `(ms, seq)`, since
//! record ordering and cursor queries depend on that key.

use rusqlite::Connection;
use thiserror::Error;

/// Schema revision written to `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const EVENT_LOG_SQL: &str = include_str!("schema/event_log.sql");

/// Columns that must make up the primary key, in key order.
const KEY_COLUMNS: [&str; 2] = ["ms", "seq"];

/// Columns every stored record carries.
const VALUE_COLUMNS: [&str; 2] = ["payload_json", "enriched_at"];

/// Errors raised while preparing the event log schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A statement against SQLite failed.
    #[error("schema setup failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database was written by a newer release.
    #[error("database schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found in the database header.
        found: i64,
        /// Highest version this build understands.
        supported: i64,
    },

    /// An existing `event_log` table has the wrong shape.
    #[error("incompatible event_log table: {0}")]
    Incompatible(String),
}

/// What [`ensure_schema`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    /// The table was created by this call.
    Created,
    /// A compatible table already existed.
    Existing,
}

/// Creates the `event_log` table if needed and verifies its shape.
///
/// # Errors
///
/// Returns [`SchemaError::UnsupportedVersion`] if the database carries a
/// newer schema version, and [`SchemaError::Incompatible`] if an existing
/// table is not keyed by `(ms, seq)` or lacks a payload column.
pub fn ensure_schema(conn: &Connection) -> Result<SchemaStatus, SchemaError> {
    let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if found > SCHEMA_VERSION {
        return Err(SchemaError::UnsupportedVersion {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    let existed: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'event_log')",
        [],
        |row| row.get(0),
    )?;

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(EVENT_LOG_SQL)?;
    verify_event_log(&tx)?;
    if found < SCHEMA_VERSION {
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    tx.commit()?;

    if existed {
        tracing::debug!(version = SCHEMA_VERSION, "event_log schema verified");
        Ok(SchemaStatus::Existing)
    } else {
        tracing::info!(version = SCHEMA_VERSION, "created event_log table");
        Ok(SchemaStatus::Created)
    }
}

fn verify_event_log(conn: &Connection) -> Result<(), SchemaError> {
    let mut stmt = conn.prepare("SELECT name, pk FROM pragma_table_info('event_log')")?;
    let columns = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut key: Vec<(i64, &str)> = columns
        .iter()
        .filter(|(_, pk)| *pk > 0)
        .map(|(name, pk)| (*pk, name.as_str()))
        .collect();
    key.sort_unstable();
    let key: Vec<&str> = key.into_iter().map(|(_, name)| name).collect();
    if key != KEY_COLUMNS {
        return Err(SchemaError::Incompatible(format!(
            "primary key is ({}), expected ({})",
            key.join(", "),
            KEY_COLUMNS.join(", ")
        )));
    }

    for wanted in VALUE_COLUMNS {
        if !columns.iter().any(|(name, _)| name == wanted) {
            return Err(SchemaError::Incompatible(format!("missing column {wanted}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_version(conn: &Connection) -> i64 {
        conn.query_row("PRAGMA user_version", [], |row| row.get(0))
            .expect("should read user_version")
    }

    #[test]
    fn fresh_database_gets_table_and_version() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let status = ensure_schema(&conn).expect("schema should apply");
        assert_eq!(status, SchemaStatus::Created);
        assert_eq!(user_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn second_call_reports_existing() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        ensure_schema(&conn).expect("first call should succeed");
        let status = ensure_schema(&conn).expect("second call should succeed");
        assert_eq!(status, SchemaStatus::Existing);
    }

    #[test]
    fn event_log_table_is_keyed_by_record_id() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        ensure_schema(&conn).expect("schema should apply");

        conn.execute(
            "INSERT INTO event_log (ms, seq, payload_json, enriched_at) VALUES (1, 0, '{}', 'x')",
            [],
        )
        .expect("first insert should succeed");

        let dup = conn.execute(
            "INSERT INTO event_log (ms, seq, payload_json, enriched_at) VALUES (1, 0, '{}', 'y')",
            [],
        );
        assert!(dup.is_err(), "duplicate record id must be rejected");
    }

    #[test]
    fn rowid_keyed_table_is_rejected() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        conn.execute_batch(
            "CREATE TABLE event_log (
                id INTEGER PRIMARY KEY,
                ms INTEGER NOT NULL,
                seq INTEGER NOT NULL,
                payload_json TEXT NOT NULL,
                enriched_at TEXT NOT NULL
            );",
        )
        .expect("should create legacy table");

        let err = ensure_schema(&conn).expect_err("wrong key must be rejected");
        match err {
            SchemaError::Incompatible(detail) => assert!(detail.contains("(id)"), "{detail}"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(user_version(&conn), 0, "version must not be stamped");
    }

    #[test]
    fn swapped_key_order_is_rejected() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        conn.execute_batch(
            "CREATE TABLE event_log (
                ms INTEGER NOT NULL,
                seq INTEGER NOT NULL,
                payload_json TEXT NOT NULL,
                enriched_at TEXT NOT NULL,
                PRIMARY KEY (seq, ms)
            ) WITHOUT ROWID;",
        )
        .expect("should create table");

        assert!(matches!(
            ensure_schema(&conn),
            Err(SchemaError::Incompatible(_))
        ));
    }

    #[test]
    fn missing_payload_column_is_rejected() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        conn.execute_batch(
            "CREATE TABLE event_log (
                ms INTEGER NOT NULL,
                seq INTEGER NOT NULL,
                enriched_at TEXT NOT NULL,
                PRIMARY KEY (ms, seq)
            ) WITHOUT ROWID;",
        )
        .expect("should create table");

        let err = ensure_schema(&conn).expect_err("missing column must be rejected");
        assert!(err.to_string().contains("payload_json"), "{err}");
    }

    #[test]
    fn newer_schema_version_is_refused() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .expect("should set user_version");

        match ensure_schema(&conn) {
            Err(SchemaError::UnsupportedVersion { found, supported }) => {
                assert_eq!(found, SCHEMA_VERSION + 1);
                assert_eq!(supported, SCHEMA_VERSION);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = 'event_log')",
                [],
                |row| row.get(0),
            )
            .expect("should query sqlite_master");
        assert!(!exists, "no table is created for a newer database");
    }
}
