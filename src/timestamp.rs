use crate::error::{ConfigError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Textual form used by the trading runtime, e.g. `Tue Jan 02 14:30:00 2024`.
pub const SESSION_TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Parses a runtime timestamp as UTC. Runs of whitespace are collapsed first
/// so C-style space-padded days (`Tue Jan  2 ...`) are accepted.
pub fn parse_session_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&collapsed, SESSION_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ConfigError::Timestamp {
            input: raw.to_string(),
        })
}

pub fn format_session_timestamp(value: &DateTime<Utc>) -> String {
    value.format(SESSION_TIMESTAMP_FORMAT).to_string()
}

/// Group ids synthesized for callers that did not supply one: the current
/// time as a decimal string without separators (microsecond resolution).
pub fn synthesize_group_id(now: DateTime<Utc>) -> String {
    now.timestamp_micros().to_string()
}

/// Serde adapter for session timestamps in the runtime's textual form.
pub mod session_format {
    use super::{format_session_timestamp, parse_session_timestamp};
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_session_timestamp(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_session_timestamp(&raw).map_err(de::Error::custom)
    }
}
