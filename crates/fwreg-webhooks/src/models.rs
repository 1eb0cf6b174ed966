//! Event names and the delivery envelope.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Emitted after a firmware binary is stored.
pub const FIRMWARE_UPLOADED: &str = "firmware.uploaded";

/// Emitted after a firmware binary is removed.
pub const FIRMWARE_DELETED: &str = "firmware.deleted";

/// Body POSTed to every subscriber: `{"event", "data", "time"}`.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope<'a, T: Serialize + ?Sized> {
    pub event: &'a str,
    pub data: &'a T,
    /// UTC, RFC 3339, second precision, `Z` suffix.
    pub time: String,
}

impl<'a, T: Serialize + ?Sized> EventEnvelope<'a, T> {
    /// Envelope stamped with the current time.
    pub fn new(event: &'a str, data: &'a T) -> Self {
        Self::at(event, data, Utc::now())
    }

    /// Envelope stamped with `time`.
    pub fn at(event: &'a str, data: &'a T, time: DateTime<Utc>) -> Self {
        Self {
            event,
            data,
            time: time.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Serialize once; every subscriber receives these exact bytes.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `data` cannot be represented as JSON.
    pub fn to_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
