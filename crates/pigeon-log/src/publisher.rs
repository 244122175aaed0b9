//! Write-side entry point.

use crate::error::LogError;
use crate::record::{NewRecord, RecordId};
use crate::store::EventLog;

/// Commits already-enriched record candidates to an [`EventLog`].
///
/// Publishing is at-most-once from the publisher's point of view: failures
/// are returned as-is and never retried here. A caller that retries after
/// an ambiguous failure may produce a duplicate record.
#[derive(Debug, Clone)]
pub struct Publisher {
    log: EventLog,
}

impl Publisher {
    /// Creates a publisher writing to `log`.
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }

    /// Appends `record` and returns its assigned id.
    ///
    /// # Errors
    ///
    /// Propagates [`LogError::StoreUnavailable`] and any other append failure.
    pub async fn publish(&self, record: NewRecord) -> Result<RecordId, LogError> {
        match self.log.append(record).await {
            Ok(id) => {
                tracing::debug!(%id, "published record");
                Ok(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "publish failed");
                Err(e)
            }
        }
    }
}
