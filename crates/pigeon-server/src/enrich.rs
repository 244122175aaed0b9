//! Inbound alert schema and enrichment.
//!
//! Enrichment is a pure transform: it validates nothing beyond what serde
//! already enforced on [`AlertIn`] and stamps the UTC time the alert was
//! accepted. The event log assigns the record id afterwards.

use chrono::{DateTime, Utc};
use pigeon_log::{LogError, NewRecord, RecordId, RecordView};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamp layout for `enriched_at`, e.g. `2024-05-01T12:00:00Z`.
pub const ENRICHED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Incoming alert payload (client-provided fields only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertIn {
    /// Integration or source name.
    pub source: String,
    /// Category: security, uptime, game, system, etc.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable summary of the alert.
    pub message: String,
    /// Optional extra details as a JSON object.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// An alert with its server-managed timestamp, ready to append.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedAlert {
    /// The alert as a JSON object.
    pub payload: Map<String, Value>,
    /// When the alert was accepted.
    pub enriched_at: String,
}

impl EnrichedAlert {
    /// Encodes this alert as a log record candidate.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Serialization`] if the payload cannot be encoded.
    pub fn to_record(&self) -> Result<NewRecord, LogError> {
        NewRecord::new(&self.payload, self.enriched_at.as_str())
    }

    /// Combines this alert with the id the log assigned to it.
    pub fn into_view(self, id: RecordId) -> RecordView {
        RecordView {
            id,
            payload: self.payload,
            enriched_at: self.enriched_at,
        }
    }
}

/// Enriches `alert` with the current time.
///
/// # Errors
///
/// Returns [`LogError::Serialization`] if the alert cannot be represented
/// as a JSON object.
pub fn enrich(alert: AlertIn) -> Result<EnrichedAlert, LogError> {
    enrich_at(alert, Utc::now())
}

/// Enriches `alert` with the given time.
///
/// # Errors
///
/// See [`enrich`].
pub fn enrich_at(alert: AlertIn, now: DateTime<Utc>) -> Result<EnrichedAlert, LogError> {
    let payload = match serde_json::to_value(alert)? {
        Value::Object(map) => map,
        other => {
            return Err(LogError::InvalidArgument(format!(
                "alert did not encode as an object: {other}"
            )))
        }
    };

    Ok(EnrichedAlert {
        payload,
        enriched_at: format_timestamp(now),
    })
}

/// Formats `ts` as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(ENRICHED_AT_FORMAT).to_string()
}
