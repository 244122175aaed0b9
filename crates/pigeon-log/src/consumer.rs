//! The consumer loop.
//!
//! A [`Consumer`] repeatedly tails the log from its cursor and hands each
//! record to a [`Sink`]. The cursor moves only after the delivery attempt
//! for a record has finished, so an interrupted consumer restarted from its
//! last cursor may see one record twice but never skips one.
//!
//! Records whose payload does not decode are reported and stepped over;
//! they never wedge the loop. Stopping is cooperative: [`Consumer::stop`]
//! cancels the token that the blocking tail read is waiting on.

use tokio_util::sync::CancellationToken;

use crate::error::LogError;
use crate::record::{Cursor, Record};
use crate::sink::{Sink, SinkError};
use crate::store::EventLog;

/// Lifecycle of a [`Consumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Tailing and delivering.
    Running,
    /// A stop was requested; the loop exits at its next checkpoint.
    StopRequested,
    /// The loop has exited. Terminal.
    Stopped,
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Records accepted by the sink.
    pub delivered: u64,
    /// Records skipped because their payload did not decode.
    pub malformed: u64,
    /// Records the sink failed to accept.
    pub failed: u64,
}

/// Drives a [`Sink`] from an [`EventLog`], resuming from an owned cursor.
pub struct Consumer<S> {
    log: EventLog,
    sink: S,
    cursor: Cursor,
    cancel: CancellationToken,
    state: ConsumerState,
    stats: ConsumerStats,
}

impl<S: Sink> Consumer<S> {
    /// Creates a consumer starting at `cursor`.
    ///
    /// `cancel` is the stop signal; it may be a child of a wider shutdown
    /// token.
    pub fn new(log: EventLog, sink: S, cursor: Cursor, cancel: CancellationToken) -> Self {
        Self {
            log,
            sink,
            cursor,
            cancel,
            state: ConsumerState::Running,
            stats: ConsumerStats::default(),
        }
    }

    /// Current read position.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Delivery counters so far.
    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Token that stops this consumer when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests a stop. Idempotent.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if self.state == ConsumerState::Running {
            self.state = ConsumerState::StopRequested;
        }
    }

    /// Consumes the consumer and returns its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Runs until stopped or until the store fails.
    ///
    /// Returns `Ok(())` once stopped, whether by cancellation or because the
    /// sink closed. On error the cursor is left at the last handled record,
    /// so calling `run` again resumes without gaps.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::StoreUnavailable`] or any other non-per-record
    /// failure from the log. Retrying is the caller's decision.
    pub async fn run(&mut self) -> Result<(), LogError> {
        if self.state == ConsumerState::Stopped {
            return Ok(());
        }

        if self.cursor == Cursor::Tail {
            self.cursor = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.state = ConsumerState::Stopped;
                    return Ok(());
                }
                resolved = self.log.resolve(Cursor::Tail) => resolved?,
            };
        }

        tracing::info!(cursor = %self.cursor, "consumer started");

        loop {
            if self.cancel.is_cancelled() {
                self.state = ConsumerState::StopRequested;
                break;
            }

            let record = match self.log.tail_from(&self.cursor, &self.cancel).await {
                Ok(record) => record,
                Err(LogError::Cancelled) => {
                    self.state = ConsumerState::StopRequested;
                    break;
                }
                Err(e) => {
                    tracing::error!(cursor = %self.cursor, error = %e, "tail read failed");
                    return Err(e);
                }
            };

            if !self.handle(record).await {
                break;
            }
        }

        self.state = ConsumerState::Stopped;
        tracing::info!(
            cursor = %self.cursor,
            delivered = self.stats.delivered,
            malformed = self.stats.malformed,
            failed = self.stats.failed,
            "consumer stopped"
        );
        Ok(())
    }

    /// Delivers one record and advances the cursor past it. Returns `false`
    /// when the sink has closed and the loop must end.
    async fn handle(&mut self, record: Record) -> bool {
        match record.decode() {
            Ok(view) => match self.sink.deliver(&view).await {
                Ok(()) => self.stats.delivered += 1,
                Err(SinkError::Closed) => {
                    tracing::info!(id = %record.id, "sink closed, stopping consumer");
                    return false;
                }
                Err(SinkError::Failed(reason)) => {
                    self.stats.failed += 1;
                    tracing::warn!(id = %record.id, %reason, "delivery failed, skipping record");
                }
            },
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!(id = %record.id, error = %e, "received malformed record");
            }
        }

        self.cursor = Cursor::After(record.id);
        true
    }
}
