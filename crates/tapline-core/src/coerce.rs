//! Conversion of backend-native values into row byte payloads.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::row::Row;

/// Dates become RFC-3339 text at midnight UTC.
pub fn date_to_bytes(date: NaiveDate) -> Vec<u8> {
    date.and_time(NaiveTime::MIN)
        .and_utc()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
        .into_bytes()
}

/// Zone-less timestamps are interpreted as UTC.
pub fn timestamp_to_bytes(ts: NaiveDateTime) -> Vec<u8> {
    timestamptz_to_bytes(ts.and_utc())
}

pub fn timestamptz_to_bytes(ts: DateTime<Utc>) -> Vec<u8> {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true).into_bytes()
}

pub fn uuid_to_bytes(id: Uuid) -> Vec<u8> {
    id.hyphenated().to_string().into_bytes()
}

/// Canonical text for a 16-byte binary UUID. Anything else is passed through
/// unchanged.
pub fn uuid_bytes_to_text(raw: &[u8]) -> Vec<u8> {
    match Uuid::from_slice(raw) {
        Ok(id) => uuid_to_bytes(id),
        Err(_) => raw.to_vec(),
    }
}

/// Byte payload of one JSON value.
///
/// Strings pass through unquoted, `null` becomes `None`, everything else is
/// its compact JSON encoding.
pub fn json_value_to_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.as_bytes().to_vec()),
        other => Some(other.to_string().into_bytes()),
    }
}

pub fn json_record_to_row(record: &Map<String, Value>) -> Row {
    record
        .iter()
        .map(|(key, value)| (key.clone(), json_value_to_bytes(value)))
        .collect()
}
