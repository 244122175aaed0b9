//! SSE live tail of the alert log.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use pigeon_log::{ChannelSink, Consumer, Cursor, LogError};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::error::ApiError;
use crate::AppState;

/// Records buffered per SSE connection before the consumer waits.
const STREAM_BUFFER: usize = 32;

/// Query parameters for `GET /alerts/stream`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Where to start: `start`, `tail` (default), or a record id.
    pub from: Option<String>,
}

/// Handler for `GET /alerts/stream`.
///
/// Runs a consumer per connection and emits each record as an `alert`
/// event whose SSE id is the record id. A `Last-Event-ID` header takes
/// precedence over `from`, so reconnecting clients resume after the last
/// record they saw.
pub async fn alert_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let requested = headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or(params.from);

    let cursor = match requested.as_deref() {
        None => Cursor::Tail,
        Some(raw) => raw
            .parse::<Cursor>()
            .map_err(|e| LogError::InvalidArgument(e.to_string()))?,
    };
    // Fix the baseline now so records published after the response starts
    // are never missed.
    let cursor = state.log.resolve(cursor).await?;

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let cancel = state.shutdown.child_token();
    let mut consumer = Consumer::new(
        state.log.clone(),
        ChannelSink::new(tx, cancel.child_token()),
        cursor,
        cancel.clone(),
    );

    tracing::debug!(%cursor, "opening alert stream");
    tokio::spawn(async move {
        if let Err(e) = consumer.run().await {
            tracing::warn!(cursor = %consumer.cursor(), error = %e, "alert stream consumer failed");
        }
    });

    let guard = cancel.drop_guard();
    let stream = ReceiverStream::new(rx).filter_map(move |view| {
        // Dropping the response stream (client gone) stops the consumer.
        let _guard = &guard;
        match serde_json::to_string(&view) {
            Ok(data) => Some(Ok(Event::default()
                .event("alert")
                .id(view.id.to_string())
                .data(data))),
            Err(e) => {
                tracing::error!(id = %view.id, "failed to serialize alert: {}", e);
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
