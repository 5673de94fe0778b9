//! Domain types for native log records.
//!
//! A log record is what the native host process ships to the supervising
//! process: a millisecond timestamp plus a free-text message. Records have
//! no identity beyond their two fields and no lifecycle beyond a single
//! encode/decode call.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, as carried on the wire.
///
/// The wire format has no sign, so the value is non-negative by
/// construction. The codec carries timestamps through verbatim; ordering
/// and display are the consumer's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampMs(pub u64);

impl TimestampMs {
    /// Returns the current wall-clock time.
    ///
    /// A system clock set before the epoch clamps to 0, since the wire
    /// format cannot represent it.
    pub fn now() -> Self {
        TimestampMs(Utc::now().timestamp_millis().max(0) as u64)
    }

    /// Converts to a chrono timestamp for display or ordering.
    ///
    /// Returns `None` for values beyond chrono's representable range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        i64::try_from(self.0)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }
}

impl fmt::Display for TimestampMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TimestampMs {
    fn from(ms: u64) -> Self {
        TimestampMs(ms)
    }
}

/// A single structured log record: when it happened and what was said.
///
/// Immutable once constructed. The message is arbitrary Unicode and may
/// contain quotes and backslashes; the codec escapes what it must. A raw
/// newline in the message is the producer's concern, since the encoded
/// form would no longer be a single line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// When the record was produced (milliseconds since the Unix epoch).
    pub ts: TimestampMs,

    /// The free-text message.
    pub message: String,
}

impl LogRecord {
    /// Creates a record with an explicit timestamp.
    pub fn new(ts: TimestampMs, message: impl Into<String>) -> Self {
        LogRecord {
            ts,
            message: message.into(),
        }
    }

    /// Creates a record stamped with the current time.
    pub fn now(message: impl Into<String>) -> Self {
        LogRecord::new(TimestampMs::now(), message)
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ts.to_datetime() {
            Some(dt) => write!(
                f,
                "{} {}",
                dt.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                self.message
            ),
            None => write!(f, "{} {}", self.ts, self.message),
        }
    }
}
