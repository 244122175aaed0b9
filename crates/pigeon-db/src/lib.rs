//! Database layer for EventPigeon.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and the `event_log` table definition with a shape check for databases
//! created by earlier runs.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: readers never block the single writer, which
//!   matches the log's many-tailers / few-publishers access pattern.
//! - **`r2d2` connection pool**: bounded connection reuse. Pool exhaustion
//!   surfaces as a timeout error that callers map to "store unavailable".
//! - **Embedded schema**: the table DDL is compiled in via `include_str!`
//!   and its revision is kept in `PRAGMA user_version`.

mod pool;
mod schema;

pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
pub use schema::{ensure_schema, SchemaError, SchemaStatus, SCHEMA_VERSION};
