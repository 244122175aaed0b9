//! Record, record id, and cursor types for the event log.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LogError;

/// Ordering identifier assigned to a record at append time.
///
/// Ids compare as `(ms, seq)` pairs: milliseconds since the Unix epoch,
/// then a counter that breaks ties within the same millisecond. The text
/// form is `"<ms>-<seq>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RecordId {
    /// Millisecond component.
    pub ms: u64,
    /// Sequence within `ms`.
    pub seq: u64,
}

impl RecordId {
    /// Creates an id from its components.
    pub const fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Derives the id that follows `last` given the current wall clock.
    ///
    /// The result is always strictly greater than `last`, even when the
    /// clock has gone backwards, and always greater than `0-0`.
    pub fn next_after(last: Option<RecordId>, now_ms: u64) -> RecordId {
        match last {
            None => RecordId::new(now_ms.max(1), 0),
            Some(last) if now_ms > last.ms => RecordId::new(now_ms, 0),
            Some(last) => match last.seq.checked_add(1) {
                Some(seq) => RecordId::new(last.ms, seq),
                None => RecordId::new(last.ms + 1, 0),
            },
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// Error returned when parsing a malformed record id or cursor string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid record id: {0:?} (expected \"<ms>-<seq>\")")]
pub struct ParseRecordIdError(pub String);

impl FromStr for RecordId {
    type Err = ParseRecordIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseRecordIdError(s.to_string());
        let (ms, seq) = s.split_once('-').ok_or_else(invalid)?;
        let ms = parse_component(ms).ok_or_else(invalid)?;
        let seq = parse_component(seq).ok_or_else(invalid)?;
        Ok(RecordId::new(ms, seq))
    }
}

/// Parses one side of an id. Only ASCII digits are accepted.
fn parse_component(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for RecordId {
    type Error = ParseRecordIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A consumer's read position in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// Before the first record: replay everything.
    Start,
    /// Only records appended after the cursor is established.
    Tail,
    /// After a concrete, already-seen record.
    After(RecordId),
}

impl Cursor {
    /// Builds the initial cursor for a consumer.
    pub fn initial(from_start: bool) -> Self {
        if from_start {
            Self::Start
        } else {
            Self::Tail
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Tail => f.write_str("tail"),
            Self::After(id) => id.fmt(f),
        }
    }
}

impl FromStr for Cursor {
    type Err = ParseRecordIdError;

    /// Accepts `start`, `0`, or `0-0` for [`Cursor::Start`], `tail` or `$`
    /// for [`Cursor::Tail`], and any other `<ms>-<seq>` as [`Cursor::After`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" | "0" | "0-0" => Ok(Self::Start),
            "tail" | "$" => Ok(Self::Tail),
            other => other.parse().map(Self::After),
        }
    }
}

/// A record as stored in the log.
///
/// The payload is kept as the JSON text it was appended with; the log
/// never interprets it. Use [`Record::decode`] to get a structured view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Id assigned at append time.
    pub id: RecordId,
    /// Payload as appended.
    pub payload_json: String,
    /// UTC timestamp assigned by the enrichment step (`YYYY-MM-DDTHH:MM:SSZ`).
    pub enriched_at: String,
}

impl Record {
    /// Interprets the payload as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::MalformedRecord`] if the payload is not valid JSON
    /// or is valid JSON but not an object.
    pub fn decode(&self) -> Result<RecordView, LogError> {
        let payload: Map<String, Value> =
            serde_json::from_str(&self.payload_json).map_err(|source| {
                LogError::MalformedRecord {
                    id: self.id,
                    source,
                }
            })?;
        Ok(RecordView {
            id: self.id,
            payload,
            enriched_at: self.enriched_at.clone(),
        })
    }
}

/// Decoded, serialisable form of a [`Record`] handed to sinks and clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    /// Id assigned at append time.
    pub id: RecordId,
    /// Payload object (`source`, `type`, `message`, optional `metadata`).
    pub payload: Map<String, Value>,
    /// Enrichment timestamp.
    pub enriched_at: String,
}

/// A record candidate that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub(crate) payload_json: String,
    pub(crate) enriched_at: String,
}

impl NewRecord {
    /// Encodes a payload object into a new record candidate.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Serialization`] if the payload cannot be encoded.
    pub fn new(payload: &Map<String, Value>, enriched_at: impl Into<String>) -> Result<Self, LogError> {
        Ok(Self {
            payload_json: serde_json::to_string(payload)?,
            enriched_at: enriched_at.into(),
        })
    }

    /// Wraps an already-encoded payload. The text is stored verbatim and is
    /// not checked; consumers report it as malformed if it does not decode.
    pub fn from_raw(payload_json: impl Into<String>, enriched_at: impl Into<String>) -> Self {
        Self {
            payload_json: payload_json.into(),
            enriched_at: enriched_at.into(),
        }
    }

    /// The encoded payload.
    pub fn payload_json(&self) -> &str {
        &self.payload_json
    }

    /// The enrichment timestamp.
    pub fn enriched_at(&self) -> &str {
        &self.enriched_at
    }
}
