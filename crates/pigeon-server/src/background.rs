//! Background tasks for the EventPigeon server.
//!
//! Includes:
//! - The console subscriber, which prints every alert to stdout.

use std::time::Duration;

use pigeon_log::{Consumer, Cursor, EventLog, Sink, WriterSink};
use tokio_util::sync::CancellationToken;

/// Starts the console subscriber.
///
/// Prints each alert as pretty JSON until `shutdown` fires. Starts at the
/// beginning of the log when `from_start` is set, otherwise at its tail.
pub async fn start_console_subscriber(
    log: EventLog,
    from_start: bool,
    retry_delay: Duration,
    shutdown: CancellationToken,
) {
    tracing::info!(from_start, "starting console subscriber");
    let consumer = Consumer::new(
        log,
        WriterSink::stdout(),
        Cursor::initial(from_start),
        shutdown,
    );
    let stats = drive(consumer, retry_delay).await.stats();
    tracing::info!(
        delivered = stats.delivered,
        malformed = stats.malformed,
        "console subscriber exited"
    );
}

/// Runs `consumer` until it stops, waiting `retry_delay` after each store
/// outage. Other failures end the loop.
pub async fn drive<S: Sink>(mut consumer: Consumer<S>, retry_delay: Duration) -> Consumer<S> {
    let cancel = consumer.cancel_token();
    loop {
        match consumer.run().await {
            Ok(()) => break,
            Err(e) if e.is_unavailable() => {
                tracing::warn!(
                    error = %e,
                    retry_in_ms = u64::try_from(retry_delay.as_millis()).unwrap_or(u64::MAX),
                    "event store unavailable, retrying"
                );
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(retry_delay) => {}
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "subscriber stopped on unrecoverable error");
                break;
            }
        }
    }
    consumer
}
