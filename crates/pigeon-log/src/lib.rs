//! Append-only alert log for EventPigeon.
//!
//! Producers publish records through a [`Publisher`]; every record gets a
//! strictly increasing [`RecordId`] and is kept for the lifetime of the
//! store. Consumers read it two ways:
//!
//! | Read | Shape |
//! |------|-------|
//! | [`EventLog::read_recent`] | bounded, non-blocking, newest first |
//! | [`EventLog::tail_from`] | blocks until the next record after a [`Cursor`] |
//!
//! A [`Consumer`] wraps `tail_from` in a loop that owns its cursor, steps
//! over malformed payloads, and stops when its [`CancellationToken`] fires.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pigeon_log::{Consumer, Cursor, EventLog, LogSettings, NewRecord, Publisher, WriterSink};
//! use tokio_util::sync::CancellationToken;
//!
//! let log = EventLog::open(pool, LogSettings::default()).await?;
//! let id = Publisher::new(log.clone())
//!     .publish(NewRecord::new(&payload, "2024-01-01T00:00:00Z")?)
//!     .await?;
//!
//! let mut consumer = Consumer::new(log, WriterSink::stdout(), Cursor::Start, CancellationToken::new());
//! consumer.run().await?;
//! ```
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

mod consumer;
mod error;
mod publisher;
mod record;
mod sink;
mod store;

pub use consumer::{Consumer, ConsumerState, ConsumerStats};
pub use error::LogError;
pub use publisher::Publisher;
pub use record::{Cursor, NewRecord, ParseRecordIdError, Record, RecordId, RecordView};
pub use sink::{ChannelSink, Sink, SinkError, WriterSink};
pub use store::{EventLog, LogSettings, DEFAULT_MAX_RECENT_LIMIT};
