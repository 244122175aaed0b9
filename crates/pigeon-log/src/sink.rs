//! Delivery sinks for the consumer loop.

use std::future::Future;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::record::RecordView;

/// Failure reported by a [`Sink`].
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink will never accept another record; the consumer stops.
    #[error("sink closed")]
    Closed,

    /// This delivery failed; the consumer logs it and moves on.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Downstream receiver of delivered records, in cursor order.
pub trait Sink: Send {
    /// Delivers one record.
    fn deliver(&mut self, record: &RecordView) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Writes each record as pretty-printed JSON followed by a newline.
///
/// Object keys come out sorted, since `serde_json::Map` is ordered.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    /// Wraps `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<tokio::io::Stdout> {
    /// Sink printing to standard output.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> Sink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn deliver(&mut self, record: &RecordView) -> Result<(), SinkError> {
        let mut out =
            serde_json::to_vec_pretty(record).map_err(|e| SinkError::Failed(e.to_string()))?;
        out.push(b'\n');
        self.writer.write_all(&out).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe => SinkError::Closed,
            _ => SinkError::Failed(e.to_string()),
        })?;
        self.writer
            .flush()
            .await
            .map_err(|e| SinkError::Failed(e.to_string()))
    }
}

/// Forwards records into an `mpsc` channel.
///
/// Reports [`SinkError::Closed`] once the receiver is dropped, or when
/// `cancel` fires while waiting for channel capacity.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<RecordView>,
    cancel: CancellationToken,
}

impl ChannelSink {
    /// Wraps `tx`. A full channel stops blocking once `cancel` fires.
    pub fn new(tx: mpsc::Sender<RecordView>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }
}

impl Sink for ChannelSink {
    async fn deliver(&mut self, record: &RecordView) -> Result<(), SinkError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(SinkError::Closed),
            sent = self.tx.send(record.clone()) => sent.map_err(|_| SinkError::Closed),
        }
    }
}
