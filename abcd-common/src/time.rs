// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wall-clock formatting and strict parsing.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};

/// Errors produced while interpreting a time string from a command.
#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    /// The string is not valid RFC 3339.
    #[error("invalid time string: {0}")]
    Invalid(#[from] chrono::ParseError),
}

/// Current local time in the `%Y-%m-%dT%H:%M:%S%z` form used by every
/// status message.
pub fn timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%z").to_string()
}

/// Parse an RFC 3339 time string with an explicit offset.
///
/// Both numeric offsets and `Z` are accepted; strings that carry no offset
/// information at all are rejected, so a command cannot silently be
/// interpreted in the wrong zone.
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, TimeParseError> {
    Ok(DateTime::parse_from_rfc3339(value)?)
}

/// Convert a parsed time to the `SystemTime` scale used by the FIFOs.
pub fn to_system_time(value: DateTime<FixedOffset>) -> SystemTime {
    let nanos = value.timestamp_nanos_opt().unwrap_or(i64::MAX);
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}

/// Nanoseconds between the Unix epoch and `value`.
///
/// Pre-epoch instants map to negative values, matching the signed record
/// field of the FIFO file format.
pub fn nanos_since_epoch(value: SystemTime) -> i64 {
    match value.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_nanos() as i64,
        Err(err) => -(err.duration().as_nanos() as i64),
    }
}

/// Inverse of [`nanos_since_epoch`].
pub fn system_time_from_nanos(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}

/// UTC rendering of a `SystemTime`, for diagnostics.
pub fn system_time_to_rfc3339(value: SystemTime) -> String {
    Utc.timestamp_nanos(nanos_since_epoch(value)).to_rfc3339()
}
